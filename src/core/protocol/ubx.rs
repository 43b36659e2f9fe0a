//! UBX binary protocol framing
//!
//! Frame layout: `B5 62 class id len_lo len_hi body... ck_a ck_b`

use super::checksum::{ubx_checksum, Fletcher8};
use super::framing::{ParseCursor, ParseError};
use super::message_id::MessageId;
use crate::core::error::{GnssError, Result};

/// First sync character
pub const SYNC_1: u8 = 0xB5;
/// Second sync character
pub const SYNC_2: u8 = 0x62;
/// Sync, class, id and length
pub const HEADER_LEN: usize = 6;
/// Header plus checksum
pub const OVERHEAD: usize = 8;
/// Largest body the driver expects from a receiver
pub const MAX_BODY_LEN: usize = 1024;

/// ACK class
pub const CLASS_ACK: u8 = 0x05;
/// ACK-NAK id
pub const ACK_NAK: u8 = 0x00;
/// ACK-ACK id
pub const ACK_ACK: u8 = 0x01;
/// CFG class
pub const CLASS_CFG: u8 = 0x06;
/// CFG-PRT id
pub const CFG_PRT: u8 = 0x00;
/// CFG-VALSET id
pub const CFG_VALSET: u8 = 0x8A;
/// CFG-VALGET id
pub const CFG_VALGET: u8 = 0x8B;
/// MON class
pub const CLASS_MON: u8 = 0x0A;
/// MON-MSGPP id
pub const MON_MSGPP: u8 = 0x06;

/// A decoded frame borrowing its body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UbxFrame<'a> {
    /// Message class
    pub class: u8,
    /// Message id
    pub id: u8,
    /// Message body
    pub body: &'a [u8],
}

/// Encode a complete frame.
pub fn encode(class: u8, id: u8, body: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(body.len()).map_err(|_| {
        GnssError::InvalidParameter(format!("UBX body of {} bytes is too long", body.len()))
    })?;
    let mut frame = Vec::with_capacity(body.len() + OVERHEAD);
    frame.extend_from_slice(&[SYNC_1, SYNC_2, class, id]);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(body);
    let (ck_a, ck_b) = ubx_checksum(&frame[2..]);
    frame.push(ck_a);
    frame.push(ck_b);
    Ok(frame)
}

/// Decode one frame from the start of `data`.
///
/// Short data reports [`GnssError::Timeout`], a bad header
/// [`GnssError::NotFound`] and a bad checksum [`GnssError::ChecksumMismatch`].
pub fn decode(data: &[u8]) -> Result<UbxFrame<'_>> {
    if data.len() < OVERHEAD {
        return Err(GnssError::Timeout);
    }
    if data[0] != SYNC_1 || data[1] != SYNC_2 {
        return Err(GnssError::NotFound);
    }
    let body_len = usize::from(u16::from_le_bytes([data[4], data[5]]));
    let end = HEADER_LEN + body_len;
    if data.len() < end + 2 {
        return Err(GnssError::Timeout);
    }
    if ubx_checksum(&data[2..end]) != (data[end], data[end + 1]) {
        return Err(GnssError::ChecksumMismatch);
    }
    Ok(UbxFrame {
        class: data[2],
        id: data[3],
        body: &data[HEADER_LEN..end],
    })
}

/// Stream parser: one UBX frame at the cursor.
pub fn parse(cursor: &mut ParseCursor<'_>) -> std::result::Result<MessageId, ParseError> {
    let mut next = || cursor.next_byte().ok_or(ParseError::Timeout);
    if next()? != SYNC_1 || next()? != SYNC_2 {
        return Err(ParseError::NotFound);
    }
    if cursor.remaining() < 4 {
        return Err(ParseError::Timeout);
    }

    let mut ck = Fletcher8::new();
    let mut header = [0u8; 4];
    for slot in &mut header {
        *slot = cursor.next_byte().ok_or(ParseError::Timeout)?;
        ck.update(*slot);
    }
    let [class, id, len_lo, len_hi] = header;
    let body_len = usize::from(u16::from_le_bytes([len_lo, len_hi]));
    if body_len + 2 > cursor.remaining() {
        return Err(ParseError::Timeout);
    }
    for _ in 0..body_len {
        ck.update(cursor.next_byte().ok_or(ParseError::Timeout)?);
    }

    let (ck_a, ck_b) = ck.finish();
    if cursor.next_byte() != Some(ck_a) || cursor.next_byte() != Some(ck_b) {
        return Err(ParseError::NotFound);
    }
    Ok(MessageId::ubx(class, id))
}

/// Little-endian u32 at `offset`, if in range
pub fn le_u32(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset + 4)?
        .try_into()
        .ok()
        .map(u32::from_le_bytes)
}

/// Little-endian u64 at `offset`, if in range
pub fn le_u64(data: &[u8], offset: usize) -> Option<u64> {
    data.get(offset..offset + 8)?
        .try_into()
        .ok()
        .map(u64::from_le_bytes)
}
