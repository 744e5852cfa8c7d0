//! Status fields shown to the crew. Every text field has a fixed display
//! budget; longer input is cut, never rejected.

use serde::Serialize;

pub const CALLSIGN_MAX: usize = 6;
pub const BALLOON_TYPE_MAX: usize = 15;
pub const HOLD_STATE_MAX: usize = 11;
pub const FLIGHT_STATE_MAX: usize = 11;
pub const SATCOM_STATE_MAX: usize = 19;

const BALLOON_PREFIX: &str = "SABER-";

/// Write-only view of the status display.
pub trait StatusSink {
    fn set_callsign(&mut self, callsign: &str);
    fn set_balloon_type(&mut self, balloon_type: &str);
    fn set_hold_state(&mut self, state: &str);
    fn set_flight_state(&mut self, state: &str);
    fn set_satcom_state(&mut self, state: &str);
    fn set_geo_status(&mut self, count: usize, ok: bool);
    fn set_contained_launch(&mut self, inside: bool);
    fn set_display_power(&mut self, on: bool);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    pub callsign: String,
    pub balloon_type: String,
    pub hold_state: String,
    pub flight_state: String,
    pub satcom_state: String,
    pub geo_count: usize,
    pub geo_ok: bool,
    pub contained_launch: bool,
    pub display_on: bool,
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self {
            callsign: "NONE".into(),
            balloon_type: String::new(),
            hold_state: "HOLD".into(),
            flight_state: "GND".into(),
            satcom_state: "INIT".into(),
            geo_count: 0,
            geo_ok: true,
            contained_launch: false,
            display_on: true,
        }
    }
}

fn bounded(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn strip_balloon_prefix(s: &str) -> &str {
    match s.get(..BALLOON_PREFIX.len()) {
        Some(p) if p.eq_ignore_ascii_case(BALLOON_PREFIX) => &s[BALLOON_PREFIX.len()..],
        _ => s,
    }
}

impl StatusSink for SystemStatus {
    fn set_callsign(&mut self, callsign: &str) {
        self.callsign = bounded(callsign, CALLSIGN_MAX);
    }

    fn set_balloon_type(&mut self, balloon_type: &str) {
        self.balloon_type = bounded(strip_balloon_prefix(balloon_type), BALLOON_TYPE_MAX);
    }

    fn set_hold_state(&mut self, state: &str) {
        self.hold_state = bounded(state, HOLD_STATE_MAX);
    }

    fn set_flight_state(&mut self, state: &str) {
        self.flight_state = if state.eq_ignore_ascii_case("GROUND") || state.eq_ignore_ascii_case("GND") {
            "GND".into()
        } else if state.eq_ignore_ascii_case("FLIGHT") || state.eq_ignore_ascii_case("FLT") {
            "FLT".into()
        } else {
            bounded(state, FLIGHT_STATE_MAX)
        };
    }

    fn set_satcom_state(&mut self, state: &str) {
        self.satcom_state = bounded(state, SATCOM_STATE_MAX);
    }

    fn set_geo_status(&mut self, count: usize, ok: bool) {
        self.geo_count = count;
        self.geo_ok = ok;
    }

    fn set_contained_launch(&mut self, inside: bool) {
        self.contained_launch = inside;
    }

    fn set_display_power(&mut self, on: bool) {
        self.display_on = on;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callsign_is_cut_to_six() {
        let mut s = SystemStatus::default();
        s.set_callsign("KD0ABCDE");
        assert_eq!(s.callsign, "KD0ABC");
    }

    #[test]
    fn balloon_prefix_stripped_any_case() {
        let mut s = SystemStatus::default();
        s.set_balloon_type("saber-Zero Pressure 3000");
        assert_eq!(s.balloon_type, "Zero Pressure 3");
        s.set_balloon_type("Latex");
        assert_eq!(s.balloon_type, "Latex");
        s.set_balloon_type("SABER");
        assert_eq!(s.balloon_type, "SABER");
    }

    #[test]
    fn flight_state_normalized() {
        let mut s = SystemStatus::default();
        s.set_flight_state("flight");
        assert_eq!(s.flight_state, "FLT");
        s.set_flight_state("Ground");
        assert_eq!(s.flight_state, "GND");
        s.set_flight_state("DESCENDING-FAST");
        assert_eq!(s.flight_state, "DESCENDING-");
    }

    #[test]
    fn multibyte_text_cut_on_char_boundary() {
        let mut s = SystemStatus::default();
        s.set_callsign("ÄÖÜäöüß");
        assert_eq!(s.callsign, "ÄÖÜäöü");
    }
}
