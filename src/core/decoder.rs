//! Pick wanted frames out of the receive stream
//!
//! [`decode_ring_buffer`] walks a cursor's unread data frame by frame,
//! discarding everything the caller does not want, until a wanted frame
//! sits at the head. [`GnssDevice::receive_stream_message`] wraps that in the
//! fill/decode/read loop with a timeout.

use crate::core::device::GnssDevice;
use crate::core::error::{GnssError, Result};
use crate::core::protocol::message_id::{ubx_id_matches, MessageId};
use crate::core::protocol::ubx::{ACK_NAK, CLASS_ACK};
use crate::core::protocol::Scan;
use crate::core::ring_buffer::{CursorGuard, CursorId, RingBuffer};
use crate::core::stream::FILL_POLL_INTERVAL_MS;

/// Size of a complete UBX-ACK-NAK frame
const NACK_FRAME_LEN: usize = 10;

/// Discard unwanted frames until a wanted one is at the head of `cursor`.
///
/// On success returns the frame length and updates `wanted` to the actual
/// identity; the frame itself is left unread. A NACK for a wanted UBX
/// message is consumed and reported as [`GnssError::Nack`]. When the data
/// runs out mid-frame (or there is none) the result is
/// [`GnssError::Timeout`].
pub fn decode_ring_buffer(
    ring: &mut RingBuffer,
    cursor: CursorId,
    wanted: &mut MessageId,
) -> Result<usize> {
    loop {
        let (id, len) = match ring.scan(cursor) {
            Scan::Frame { id, len } => (id, len),
            Scan::Garbage(len) => (MessageId::Unknown, len),
            Scan::Incomplete => return Err(GnssError::Timeout),
        };

        if id.is_wanted_by(wanted) {
            *wanted = id;
            return Ok(len);
        }

        if let (MessageId::Ubx(wanted_ubx), MessageId::Ubx(_)) = (*wanted, id) {
            if id == MessageId::ubx(CLASS_ACK, ACK_NAK) && len == NACK_FRAME_LEN {
                let mut frame = [0u8; NACK_FRAME_LEN];
                ring.read(cursor, &mut frame);
                let (class, msg_id) = (frame[6], frame[7]);
                if ubx_id_matches(u16::from_be_bytes([class, msg_id]), wanted_ubx) {
                    return Err(GnssError::Nack { class, id: msg_id });
                }
                continue;
            }
        }

        tracing::trace!("discarding {} bytes of {}", len, id);
        ring.discard(cursor, len);
    }
}

/// Outcome of a receive into a caller buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    /// Identity of the frame
    pub id: MessageId,
    /// Bytes copied into the buffer
    pub len: usize,
    /// Full length of the frame on the wire
    pub message_len: usize,
}

impl Received {
    /// Whether the buffer was too small for the whole frame
    pub fn is_truncated(&self) -> bool {
        self.len < self.message_len
    }
}

/// A received frame in its own allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedMessage {
    /// Identity of the frame
    pub id: MessageId,
    /// The complete frame
    pub data: Vec<u8>,
}

enum Sink<'a> {
    Caller(&'a mut [u8]),
    Allocate(&'a mut Vec<u8>),
}

impl Sink<'_> {
    /// Storage for a `len`-byte frame; the part that does not fit is added
    /// to `discard`.
    fn claim(&mut self, len: usize, discard: &mut usize) -> Result<&mut [u8]> {
        match self {
            Sink::Caller(buf) => {
                let n = len.min(buf.len());
                *discard = len - n;
                Ok(&mut buf[..n])
            }
            Sink::Allocate(data) => {
                data.clear();
                if let Err(e) = data.try_reserve_exact(len) {
                    *discard = len;
                    return Err(e.into());
                }
                data.resize(len, 0);
                Ok(&mut data[..])
            }
        }
    }
}

impl GnssDevice {
    fn receive_into_sink(
        &self,
        wanted: &MessageId,
        cursor: CursorId,
        sink: &mut Sink<'_>,
        timeout_ms: u64,
        keep_going: Option<&dyn Fn() -> bool>,
    ) -> Result<(MessageId, usize, usize)> {
        self.streamed("stream receive")?;
        let _lock = CursorGuard::new(&self.ring, cursor);
        let start = self.clock.now_ms();
        let fill_timeout = if timeout_ms > 0 {
            self.settings.min_fill_time_ms
        } else {
            0
        };
        let mut discard_pending = 0usize;
        let mut settled = false;
        let mut outcome: Result<(MessageId, usize, usize)> = Err(GnssError::Timeout);

        loop {
            let received = self.stream_fill(fill_timeout, 0).unwrap_or(0);

            if discard_pending > 0 {
                discard_pending -= self.ring.lock().discard(cursor, discard_pending);
            } else if !settled && self.ring.lock().data_size(cursor) > 0 {
                let mut id = *wanted;
                let decoded = decode_ring_buffer(&mut self.ring.lock(), cursor, &mut id);
                outcome = decoded.and_then(|len| {
                    let target = sink.claim(len, &mut discard_pending)?;
                    let left = timeout_ms
                        .saturating_sub(self.clock.elapsed_ms(start))
                        .max(self.settings.min_fill_time_ms);
                    self.stream_read(cursor, target, left)
                        .map(|copied| (id, copied, len))
                });
                settled = matches!(
                    outcome,
                    Ok(_) | Err(GnssError::Nack { .. } | GnssError::OutOfMemory)
                );
            }

            let again = if settled { discard_pending > 0 } else { true };
            if !again
                || timeout_ms == 0
                || self.clock.elapsed_ms(start) >= timeout_ms
                || !keep_going.map_or(true, |f| f())
            {
                break;
            }
            if received == 0 {
                self.clock.sleep_ms(FILL_POLL_INTERVAL_MS);
            }
        }

        outcome
    }

    /// Wait for a frame matching `wanted` on `cursor` and copy it into `buf`.
    ///
    /// A frame longer than `buf` is truncated; the rest is discarded so the
    /// next receive starts at a frame boundary. `keep_going` is polled every
    /// pass and ends the wait early when it returns false.
    pub fn receive_stream_message_into(
        &self,
        wanted: &MessageId,
        cursor: CursorId,
        buf: &mut [u8],
        timeout_ms: u64,
        keep_going: Option<&dyn Fn() -> bool>,
    ) -> Result<Received> {
        if buf.is_empty() {
            return Err(GnssError::InvalidParameter(
                "receive buffer is empty".to_string(),
            ));
        }
        let mut sink = Sink::Caller(buf);
        let (id, len, message_len) =
            self.receive_into_sink(wanted, cursor, &mut sink, timeout_ms, keep_going)?;
        Ok(Received {
            id,
            len,
            message_len,
        })
    }

    /// Wait for a frame matching `wanted` on `cursor` and return it in a
    /// fresh allocation.
    pub fn receive_stream_message(
        &self,
        wanted: &MessageId,
        cursor: CursorId,
        timeout_ms: u64,
        keep_going: Option<&dyn Fn() -> bool>,
    ) -> Result<OwnedMessage> {
        let mut data = Vec::new();
        let (id, copied, _) = self.receive_into_sink(
            wanted,
            cursor,
            &mut Sink::Allocate(&mut data),
            timeout_ms,
            keep_going,
        )?;
        data.truncate(copied);
        Ok(OwnedMessage { id, data })
    }
}
