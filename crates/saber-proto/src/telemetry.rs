use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crc::{crc16_x25, CrcOrder};
use crate::{CMD_RAW_TELEMETRY, SENTINEL, SYNC};

const HEADER_LEN: usize = 4;
const FIELD_COUNT: usize = 6;
const CRC_LEN: usize = 2;
const RESERVED: u8 = 0x00;

/// Total size of an encoded raw telemetry frame.
pub const FRAME_LEN: usize = HEADER_LEN + FIELD_COUNT * 4 + CRC_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("output buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },
}

/// One telemetry sample. Any float may be NaN when the sensor has nothing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TelemetryFields {
    /// GPS time code (hhmmsscc), passed through untouched.
    pub time_code: u32,
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f64,
    pub temp_k: f64,
    pub pressure_hpa: f64,
}

impl Default for TelemetryFields {
    fn default() -> Self {
        Self {
            time_code: 0,
            lat: f64::NAN,
            lon: f64::NAN,
            alt_m: f64::NAN,
            temp_k: f64::NAN,
            pressure_hpa: f64::NAN,
        }
    }
}

impl TelemetryFields {
    /// Fixed-point payload words in wire order.
    pub fn to_words(&self) -> [u32; FIELD_COUNT] {
        [
            self.time_code,
            fixed_point(self.lat, 90.0, 1e5),
            fixed_point(self.lon, 180.0, 1e5),
            fixed_point(self.alt_m, 200.0, 1e2),
            fixed_point(self.temp_k, 0.0, 1e2),
            fixed_point(self.pressure_hpa, 0.0, 1e2),
        ]
    }
}

fn fixed_point(v: f64, offset: f64, scale: f64) -> u32 {
    if !v.is_finite() {
        return SENTINEL;
    }
    // `as` saturates, so below-range values land on 0
    ((v + offset) * scale).round() as u32
}

/// Writes a raw telemetry frame into `out` and returns the number of bytes
/// used. Checksum is written low byte first.
pub fn encode_into(fields: &TelemetryFields, out: &mut [u8]) -> Result<usize, CodecError> {
    if out.len() < FRAME_LEN {
        return Err(CodecError::BufferTooSmall { need: FRAME_LEN, have: out.len() });
    }

    let mut buf = &mut out[..FRAME_LEN];
    buf.put_u8(SYNC);
    buf.put_u8(FRAME_LEN as u8);
    buf.put_u8(CMD_RAW_TELEMETRY);
    buf.put_u8(RESERVED);
    for w in fields.to_words() {
        buf.put_u32(w);
    }

    let crc = crc16_x25(&out[..FRAME_LEN - CRC_LEN]);
    out[FRAME_LEN - CRC_LEN..FRAME_LEN].copy_from_slice(&CrcOrder::LowFirst.to_bytes(crc));
    Ok(FRAME_LEN)
}

/// Convenience wrapper returning an owned frame.
pub fn encode(fields: &TelemetryFields) -> Bytes {
    let mut buf = BytesMut::zeroed(FRAME_LEN);
    // buffer is exactly FRAME_LEN, encode_into cannot fail
    let n = encode_into(fields, &mut buf).unwrap_or(0);
    buf.truncate(n);
    buf.freeze()
}
