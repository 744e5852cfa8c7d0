use tracing::{debug, error, info};

/// One-shot terminate signal. The actuator behind it is not our concern.
pub trait Termination {
    fn trigger(&mut self, reason: &str);
    fn triggered(&self) -> bool;
    fn reset(&mut self);
}

/// Latch that records the first reason it was fired with.
#[derive(Debug, Default, Clone)]
pub struct TerminationLatch {
    reason: Option<String>,
}

impl TerminationLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl Termination for TerminationLatch {
    fn trigger(&mut self, reason: &str) {
        if let Some(first) = &self.reason {
            debug!("termination: already latched ({}), ignoring '{}'", first, reason);
            return;
        }
        error!("termination: TRIGGERED: {}", reason);
        self.reason = Some(reason.to_string());
    }

    fn triggered(&self) -> bool {
        self.reason.is_some()
    }

    fn reset(&mut self) {
        if self.reason.take().is_some() {
            info!("termination: latch reset");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_reason() {
        let mut t = TerminationLatch::new();
        assert!(!t.triggered());
        t.trigger("flight timer elapsed");
        t.trigger("geofence violation: box");
        assert!(t.triggered());
        assert_eq!(t.reason(), Some("flight timer elapsed"));
    }

    #[test]
    fn reset_clears_reason() {
        let mut t = TerminationLatch::new();
        t.trigger("x");
        t.reset();
        assert!(!t.triggered());
        assert_eq!(t.reason(), None);
        t.trigger("y");
        assert_eq!(t.reason(), Some("y"));
    }
}
