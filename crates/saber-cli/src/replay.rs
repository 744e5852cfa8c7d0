//! GPS track replay. One JSON object per line, one line per tick:
//! `{"fix":true,"lat":40.5,"lon":-104.5,"alt_m":1600.0,"sats":9}` plus
//! optional `time_code`, `temp_k`, `pressure_hpa`.

use anyhow::{Context, Result};
use saber_mission::{Environment, GpsFix};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct TrackPoint {
    #[serde(default)]
    fix: bool,
    #[serde(default = "nan")]
    lat: f64,
    #[serde(default = "nan")]
    lon: f64,
    #[serde(default = "nan")]
    alt_m: f64,
    #[serde(default)]
    sats: u8,
    time_code: Option<u32>,
    temp_k: Option<f64>,
    pressure_hpa: Option<f64>,
}

fn nan() -> f64 {
    f64::NAN
}

pub struct GpsReplay {
    points: Vec<TrackPoint>,
    idx: usize,
    looped: bool,
}

impl GpsReplay {
    pub fn open(path: &str, looped: bool) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("read gps track {}", path))?;
        Self::parse(&text, looped)
    }

    pub fn parse(text: &str, looped: bool) -> Result<Self> {
        let mut points = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let p: TrackPoint =
                serde_json::from_str(line).with_context(|| format!("gps track line {}", n + 1))?;
            points.push(p);
        }
        anyhow::ensure!(!points.is_empty(), "gps track is empty");
        Ok(Self { points, idx: 0, looped })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Next sample. A finished track keeps repeating its last line unless
    /// looping is enabled.
    pub fn next_sample(&mut self) -> (GpsFix, Environment) {
        let i = self.idx.min(self.points.len() - 1);
        let p = &self.points[i];
        self.idx += 1;
        if self.looped && self.idx >= self.points.len() {
            self.idx = 0;
        }

        let fix = GpsFix {
            fix: p.fix,
            lat: p.lat,
            lon: p.lon,
            alt_m: p.alt_m,
            sats: p.sats,
            time_code: p.time_code.unwrap_or_else(utc_time_code),
        };
        let env = Environment {
            temp_k: p.temp_k.unwrap_or(f64::NAN),
            pressure_hpa: p.pressure_hpa.unwrap_or(f64::NAN),
        };
        (fix, env)
    }
}

/// Wall-clock UTC as hhmmsscc.
pub fn utc_time_code() -> u32 {
    let now = time::OffsetDateTime::now_utc();
    let cs = now.millisecond() as u32 / 10;
    now.hour() as u32 * 1_000_000 + now.minute() as u32 * 10_000 + now.second() as u32 * 100 + cs
}
