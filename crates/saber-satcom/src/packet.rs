//! Modem frame layout: `AA LEN CMD payload.. CRC16`. LEN counts every byte
//! including the checksum.

use saber_proto::crc::{crc16_x25, CrcOrder};
use saber_proto::{CMD_RAW_TELEMETRY, SYNC};

use crate::LinkError;

pub const CMD_GET_ID: u8 = 0x01;
/// Reply command byte the modem uses for busy / not acknowledged.
pub const CMD_NAK: u8 = 0xFF;
pub const GET_ID_REPLY_LEN: u8 = 9;
pub const MIN_PACKET_LEN: u8 = 5;
/// Largest frame the modem accepts on its command port.
pub const MAX_FRAME_LEN: usize = 64;

const CMD_HEADER_LEN: usize = 3;
const RAW_HEADER_LEN: usize = 4;
const CRC_LEN: usize = 2;

/// Documented command frame; checksum high byte first.
pub fn build_command(cmd: u8, payload: &[u8]) -> Result<Vec<u8>, LinkError> {
    let total = CMD_HEADER_LEN + payload.len() + CRC_LEN;
    if total > MAX_FRAME_LEN {
        return Err(LinkError::FrameTooLarge { len: total, max: MAX_FRAME_LEN });
    }
    let mut msg = Vec::with_capacity(total);
    msg.extend_from_slice(&[SYNC, total as u8, cmd]);
    msg.extend_from_slice(payload);
    let crc = crc16_x25(&msg);
    msg.extend_from_slice(&CrcOrder::HighFirst.to_bytes(crc));
    Ok(msg)
}

/// Legacy raw 0x27 frame around an arbitrary payload; checksum low byte
/// first like the telemetry encoder.
pub fn build_raw(payload: &[u8]) -> Result<Vec<u8>, LinkError> {
    let total = RAW_HEADER_LEN + payload.len() + CRC_LEN;
    if total > MAX_FRAME_LEN {
        return Err(LinkError::FrameTooLarge { len: total, max: MAX_FRAME_LEN });
    }
    let mut msg = Vec::with_capacity(total);
    msg.extend_from_slice(&[SYNC, total as u8, CMD_RAW_TELEMETRY, 0x00]);
    msg.extend_from_slice(payload);
    let crc = crc16_x25(&msg);
    msg.extend_from_slice(&CrcOrder::LowFirst.to_bytes(crc));
    Ok(msg)
}

/// Decodes the big-endian identifier out of a get-id reply.
pub fn decode_id(reply: &[u8]) -> Option<u32> {
    if reply.len() < GET_ID_REPLY_LEN as usize
        || reply[2] != CMD_GET_ID
        || reply[1] != GET_ID_REPLY_LEN
    {
        return None;
    }
    Some(u32::from_be_bytes([reply[3], reply[4], reply[5], reply[6]]))
}
