//! RTCM 3 framing
//!
//! Frame layout: `D3`, six reserved zero bits and a ten-bit length, then
//! `length` bytes of payload whose first twelve bits are the message type,
//! then a big-endian CRC-24Q over everything before it.

use super::checksum::{crc24q, crc24q_update};
use super::framing::{ParseCursor, ParseError};
use super::message_id::MessageId;
use crate::core::error::{GnssError, Result};

/// Frame preamble
pub const PREAMBLE: u8 = 0xD3;
/// Preamble plus length field
pub const HEADER_LEN: usize = 3;
/// Length of the trailing CRC
pub const CRC_LEN: usize = 3;
/// Largest payload the ten-bit length field allows
pub const MAX_PAYLOAD_LEN: usize = 1023;

/// Stream parser: one RTCM 3 frame at the cursor.
pub fn parse(cursor: &mut ParseCursor<'_>) -> std::result::Result<MessageId, ParseError> {
    let preamble = cursor.next_byte().ok_or(ParseError::Timeout)?;
    if preamble != PREAMBLE {
        return Err(ParseError::NotFound);
    }
    let mut crc = crc24q_update(0, preamble);

    let len_hi = cursor.next_byte().ok_or(ParseError::Timeout)?;
    if len_hi & 0xFC != 0 {
        return Err(ParseError::NotFound);
    }
    crc = crc24q_update(crc, len_hi);
    let len_lo = cursor.next_byte().ok_or(ParseError::Timeout)?;
    crc = crc24q_update(crc, len_lo);

    let payload_len = (usize::from(len_hi & 0x03) << 8) | usize::from(len_lo);
    if payload_len < 2 {
        return Err(ParseError::NotFound);
    }
    if payload_len + CRC_LEN > cursor.remaining() {
        return Err(ParseError::Timeout);
    }

    let mut type_bytes = [0u8; 2];
    for slot in &mut type_bytes {
        *slot = cursor.next_byte().ok_or(ParseError::Timeout)?;
        crc = crc24q_update(crc, *slot);
    }
    for _ in 2..payload_len {
        crc = crc24q_update(crc, cursor.next_byte().ok_or(ParseError::Timeout)?);
    }

    for shift in [16, 8, 0] {
        if cursor.next_byte().ok_or(ParseError::Timeout)? != (crc >> shift) as u8 {
            return Err(ParseError::NotFound);
        }
    }

    Ok(MessageId::Rtcm(message_type(type_bytes)))
}

fn message_type([hi, lo]: [u8; 2]) -> u16 {
    (u16::from(hi) << 4) | u16::from(lo >> 4)
}

/// Encode a frame of `message_type` whose remaining payload is `data`.
///
/// The four bits following the message type are zero.
pub fn encode(message_type: u16, data: &[u8]) -> Result<Vec<u8>> {
    if message_type > 0x0FFF {
        return Err(GnssError::InvalidParameter(format!(
            "RTCM message type {message_type} does not fit in 12 bits"
        )));
    }
    let payload_len = data.len() + 2;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(GnssError::InvalidParameter(format!(
            "RTCM payload of {payload_len} bytes is too long"
        )));
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload_len + CRC_LEN);
    frame.push(PREAMBLE);
    frame.extend_from_slice(&(payload_len as u16).to_be_bytes());
    frame.push((message_type >> 4) as u8);
    frame.push(((message_type & 0x0F) << 4) as u8);
    frame.extend_from_slice(data);
    let crc = crc24q(&frame);
    frame.extend_from_slice(&crc.to_be_bytes()[1..]);
    Ok(frame)
}
