//! CRC16 used by the satellite modem (X-25 parameters: reflected 0x1021,
//! seed 0xFFFF, final complement).

const SEED: u16 = 0xFFFF;
const POLY_REFLECTED: u16 = 0x8408;

pub fn crc16_x25(data: &[u8]) -> u16 {
    let mut crc = SEED;
    for &b in data {
        crc ^= b as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

/// Checksum byte order on the wire. The raw telemetry frame and the
/// documented command frames disagree, and the modem expects both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcOrder {
    LowFirst,
    HighFirst,
}

impl CrcOrder {
    pub fn to_bytes(self, crc: u16) -> [u8; 2] {
        match self {
            CrcOrder::LowFirst => crc.to_le_bytes(),
            CrcOrder::HighFirst => crc.to_be_bytes(),
        }
    }

    pub fn from_bytes(self, bytes: [u8; 2]) -> u16 {
        match self {
            CrcOrder::LowFirst => u16::from_le_bytes(bytes),
            CrcOrder::HighFirst => u16::from_be_bytes(bytes),
        }
    }
}

/// Checks the trailing two checksum bytes of `frame` against the CRC of
/// everything before them.
pub fn verify_trailing(frame: &[u8], order: CrcOrder) -> bool {
    if frame.len() < 2 {
        return false;
    }
    let (body, tail) = frame.split_at(frame.len() - 2);
    order.from_bytes([tail[0], tail[1]]) == crc16_x25(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x25_check_value() {
        assert_eq!(crc16_x25(b"123456789"), 0x906E);
    }

    #[test]
    fn empty_input_is_complemented_seed() {
        assert_eq!(crc16_x25(&[]), 0x0000);
    }

    #[test]
    fn byte_orders_are_mirrored() {
        assert_eq!(CrcOrder::LowFirst.to_bytes(0x72A0), [0xA0, 0x72]);
        assert_eq!(CrcOrder::HighFirst.to_bytes(0x72A0), [0x72, 0xA0]);
    }

    #[test]
    fn verify_trailing_high_first() {
        // identity reply carrying id 0x0012D687
        let reply = [0xAA, 0x09, 0x01, 0x00, 0x12, 0xD6, 0x87, 0x65, 0xFF];
        assert!(verify_trailing(&reply, CrcOrder::HighFirst));
        assert!(!verify_trailing(&reply, CrcOrder::LowFirst));
    }
}
