use saber_satcom::clock::elapsed_ms;
use tracing::{debug, info};

use crate::gps::GpsFix;

pub const BASELINE_WINDOW_MS: u32 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub altitude_m: f64,
    pub lat: f64,
    pub lon: f64,
}

/// Launch-site reference: mean altitude over the first window after the
/// first fix, plus the position at the moment the window closes.
#[derive(Debug, Clone)]
pub struct LaunchBaseline {
    window_ms: u32,
    started_ms: Option<u32>,
    sum_m: f64,
    samples: u32,
    result: Option<Baseline>,
}

impl Default for LaunchBaseline {
    fn default() -> Self {
        Self::new(BASELINE_WINDOW_MS)
    }
}

impl LaunchBaseline {
    pub fn new(window_ms: u32) -> Self {
        Self { window_ms, started_ms: None, sum_m: 0.0, samples: 0, result: None }
    }

    /// Feeds one tick. Returns the baseline on the tick it is established.
    pub fn update(&mut self, fix: &GpsFix, now_ms: u32) -> Option<Baseline> {
        if self.result.is_some() || !fix.has_position() {
            return None;
        }

        let window_ms = self.window_ms;
        let t0 = *self.started_ms.get_or_insert_with(|| {
            info!("mission: first fix, baselining for {} ms", window_ms);
            now_ms
        });
        if fix.alt_m.is_finite() {
            self.sum_m += fix.alt_m;
            self.samples += 1;
        }

        if elapsed_ms(now_ms, t0) < window_ms {
            return None;
        }
        if self.samples == 0 {
            debug!("mission: baseline window closed without altitude samples, waiting");
            return None;
        }

        let b = Baseline {
            altitude_m: self.sum_m / self.samples as f64,
            lat: fix.lat,
            lon: fix.lon,
        };
        info!(
            "mission: launch baseline alt={:.1} m lat={:.5} lon={:.5} ({} samples)",
            b.altitude_m, b.lat, b.lon, self.samples
        );
        self.result = Some(b);
        Some(b)
    }

    pub fn get(&self) -> Option<Baseline> {
        self.result
    }

    pub fn is_set(&self) -> bool {
        self.result.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(alt_m: f64) -> GpsFix {
        GpsFix { fix: true, lat: 40.0, lon: -105.0, alt_m, sats: 9, time_code: 0 }
    }

    #[test]
    fn averages_over_window() {
        let mut b = LaunchBaseline::default();
        assert!(b.update(&fix(1000.0), 5_000).is_none());
        assert!(b.update(&fix(1010.0), 20_000).is_none());
        let got = b.update(&fix(1020.0), 35_000).unwrap();
        assert!((got.altitude_m - 1010.0).abs() < 1e-9);
        assert!(b.is_set());
        // later samples do not move it
        assert!(b.update(&fix(5000.0), 40_000).is_none());
        assert_eq!(b.get(), Some(got));
    }

    #[test]
    fn ticks_without_fix_do_not_start_window() {
        let mut b = LaunchBaseline::default();
        let nofix = GpsFix { fix: false, ..fix(1000.0) };
        for t in (0..60_000).step_by(1000) {
            assert!(b.update(&nofix, t).is_none());
        }
        assert!(b.update(&fix(1000.0), 60_000).is_none());
        assert!(b.update(&fix(1000.0), 89_999).is_none());
        assert!(b.update(&fix(1000.0), 90_000).is_some());
    }

    #[test]
    fn waits_for_finite_altitude() {
        let mut b = LaunchBaseline::default();
        b.update(&fix(f64::NAN), 0);
        assert!(b.update(&fix(f64::NAN), 30_000).is_none());
        let got = b.update(&fix(1500.0), 31_000).unwrap();
        assert_eq!(got.altitude_m, 1500.0);
    }

    #[test]
    fn window_survives_clock_wrap() {
        let mut b = LaunchBaseline::default();
        let start = u32::MAX - 10_000;
        b.update(&fix(100.0), start);
        assert!(b.update(&fix(100.0), start.wrapping_add(29_999)).is_none());
        assert!(b.update(&fix(100.0), start.wrapping_add(30_000)).is_some());
    }
}
