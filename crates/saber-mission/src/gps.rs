use serde::{Deserialize, Serialize};

/// Latest position solution as seen by the control loop. Altitude may be
/// non-finite even with a valid fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub fix: bool,
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
    #[serde(default)]
    pub sats: u8,
    #[serde(default)]
    pub time_code: u32,
}

impl Default for GpsFix {
    fn default() -> Self {
        Self {
            fix: false,
            lat: f64::NAN,
            lon: f64::NAN,
            alt_m: f64::NAN,
            sats: 0,
            time_code: 0,
        }
    }
}

impl GpsFix {
    pub fn has_position(&self) -> bool {
        self.fix && self.lat.is_finite() && self.lon.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub temp_k: f64,
    pub pressure_hpa: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Self { temp_k: f64::NAN, pressure_hpa: f64::NAN }
    }
}
