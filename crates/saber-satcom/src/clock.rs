use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Millisecond clock with a wrapping 32-bit counter. Compare timestamps
/// with `elapsed_ms` only.
pub trait Clock {
    fn now_ms(&self) -> u32;
    fn sleep_ms(&self, ms: u32);
}

pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // truncation is the wrap
        self.origin.elapsed().as_millis() as u32
    }

    fn sleep_ms(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// Clock that only moves when told to. Sleeping advances it, so blocking
/// protocol loops finish instantly in tests and replays.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn starting_at(ms: u32) -> Self {
        Self { now: Arc::new(AtomicU32::new(ms)) }
    }

    pub fn advance(&self, ms: u32) {
        // fetch_add wraps on overflow
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep_ms(&self, ms: u32) {
        self.advance(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_wrap_safe() {
        assert_eq!(elapsed_ms(5, u32::MAX - 4), 10);
        assert_eq!(elapsed_ms(1_000, 400), 600);
    }

    #[test]
    fn manual_clock_sleep_advances_shared_time() {
        let c = ManualClock::starting_at(u32::MAX);
        let other = c.clone();
        c.sleep_ms(2);
        assert_eq!(other.now_ms(), 1);
    }
}
