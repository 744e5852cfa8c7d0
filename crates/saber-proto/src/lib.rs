pub mod crc;
pub mod telemetry;

/// Start-of-frame byte shared by every modem frame.
pub const SYNC: u8 = 0xAA;

/// Command id of the legacy raw telemetry frame.
pub const CMD_RAW_TELEMETRY: u8 = 0x27;

/// Placeholder written for measurements that are not available.
pub const SENTINEL: u32 = 999_999_999;
