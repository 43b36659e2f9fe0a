//! UBX request/response exchanges
//!
//! Every exchange holds the device's transport lock from send to final
//! reply. On streamed transports the driver's private cursor is locked and
//! flushed before sending, so only traffic that arrives after the request
//! can be taken as its response.

mod at;

pub use at::{AT_BUFFER_LENGTH, AT_COMMAND, AT_RESPONSE_PREFIX};

use crate::core::device::GnssDevice;
use crate::core::error::{GnssError, Result};
use crate::core::protocol::message_id::{MessageId, UBX_CLASS_ALL, UBX_ID_ALL};
use crate::core::protocol::ubx::{
    self, ACK_ACK, CLASS_ACK, CLASS_MON, HEADER_LEN, MON_MSGPP, OVERHEAD,
};
use crate::core::ring_buffer::CursorGuard;
use crate::core::transport::{Transport, TransportError};
use crate::config::SPI_FILL_THRESHOLD_MAX;

/// Size of the UBX-MON-MSGPP body
pub const MON_MSGPP_BODY_LEN: usize = 120;

/// A UBX reply copied into a caller buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UbxReply {
    /// Message class of the reply
    pub class: u8,
    /// Message id of the reply
    pub id: u8,
    /// Body bytes copied
    pub body_len: usize,
    /// Body length on the wire
    pub total_body_len: usize,
}

impl UbxReply {
    /// Whether the caller buffer was too small for the body
    pub fn is_truncated(&self) -> bool {
        self.body_len < self.total_body_len
    }
}

/// A UBX reply with its body in its own allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UbxMessage {
    /// Message class of the reply
    pub class: u8,
    /// Message id of the reply
    pub id: u8,
    /// Body
    pub body: Vec<u8>,
}

/// Which reply an exchange waits for; `None` parts match anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExpectedReply {
    pub(crate) class: Option<u8>,
    pub(crate) id: Option<u8>,
}

impl ExpectedReply {
    fn exact(class: u8, id: u8) -> Self {
        Self {
            class: Some(class),
            id: Some(id),
        }
    }

    fn message_id(&self) -> MessageId {
        MessageId::ubx(
            self.class.unwrap_or(UBX_CLASS_ALL),
            self.id.unwrap_or(UBX_ID_ALL),
        )
    }
}

/// Where a reply body goes
pub(crate) enum BodySink<'a> {
    Caller(&'a mut [u8]),
    Allocate,
}

pub(crate) enum Reply {
    Copied(UbxReply),
    Owned(UbxMessage),
}

impl BodySink<'_> {
    /// Deliver a decoded reply body.
    fn deliver(self, class: u8, id: u8, body: &[u8]) -> Reply {
        match self {
            BodySink::Caller(buf) => {
                let n = body.len().min(buf.len());
                buf[..n].copy_from_slice(&body[..n]);
                Reply::Copied(UbxReply {
                    class,
                    id,
                    body_len: n,
                    total_body_len: body.len(),
                })
            }
            BodySink::Allocate => Reply::Owned(UbxMessage {
                class,
                id,
                body: body.to_vec(),
            }),
        }
    }
}

impl GnssDevice {
    /// Encode, send and optionally wait for a reply, holding the transport
    /// lock throughout.
    pub(crate) fn exchange(
        &self,
        class: u8,
        id: u8,
        body: &[u8],
        reply: Option<(ExpectedReply, BodySink<'_>)>,
    ) -> Result<Option<Reply>> {
        let frame = ubx::encode(class, id, body)?;
        let _transport = self.transport_lock.lock();

        if !self.transport_type.is_streamed() {
            return self.at_exchange(&frame, reply);
        }

        let _cursor_lock = if reply.is_some() {
            // Anything already on the wire predates the request
            if let Err(e) =
                self.stream_fill(self.settings.min_fill_time_ms, self.settings.max_fill_time_ms)
            {
                tracing::debug!("drain before UBX {:#04x} {:#04x}: {}", class, id, e);
            }
            let guard = CursorGuard::new(&self.ring, self.private_cursor);
            self.ring.lock().flush(self.private_cursor);
            Some(guard)
        } else {
            None
        };

        self.send_stream(&frame)?;

        match reply {
            Some((expected, sink)) => self
                .receive_ubx_stream(expected, sink, self.settings.timeout_ms)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Write a frame to a streamed transport. Returns the bytes sent.
    pub(crate) fn send_stream(&self, frame: &[u8]) -> Result<usize> {
        let sent = match &mut *self.io.lock() {
            Transport::Uart(uart) => uart.write(frame)?,
            Transport::I2c { bus, address } => {
                bus.send(*address, frame, false)?;
                frame.len()
            }
            Transport::Spi(bus) => {
                let mut rx = [0u8; SPI_FILL_THRESHOLD_MAX];
                let mut offset = 0;
                while offset < frame.len() {
                    let chunk = (frame.len() - offset).min(SPI_FILL_THRESHOLD_MAX);
                    let n = bus.send_receive_block(&frame[offset..offset + chunk], &mut rx[..chunk])?;
                    if n == 0 {
                        return Err(TransportError::SendError("SPI exchanged no bytes".to_string()).into());
                    }
                    // Whatever the receiver clocked out meanwhile is real input
                    self.spi_add_received_data(&rx[..n])?;
                    offset += n;
                }
                offset
            }
            Transport::At(_) => {
                return Err(GnssError::NotSupported(
                    "AT transport cannot send raw frames".to_string(),
                ))
            }
        };
        if self.settings.print_ubx_messages {
            tracing::debug!("sent UBX command {}", hex::encode(frame));
        }
        Ok(sent)
    }

    fn receive_ubx_stream(
        &self,
        expected: ExpectedReply,
        sink: BodySink<'_>,
        timeout_ms: u64,
    ) -> Result<Reply> {
        let wanted = expected.message_id();
        let message =
            self.receive_stream_message(&wanted, self.private_cursor, timeout_ms, None)?;
        let (class, id) = message.id.ubx_class_id().ok_or_else(|| {
            GnssError::UnexpectedResponse(format!("{} is not a UBX reply", message.id))
        })?;
        if message.data.len() < OVERHEAD {
            return Err(GnssError::NotFound);
        }
        let mut data = message.data;
        data.truncate(data.len() - 2);
        if self.settings.print_ubx_messages {
            tracing::debug!("decoded UBX response {}", hex::encode(&data[HEADER_LEN..]));
        }
        Ok(match sink {
            BodySink::Allocate => {
                data.drain(..HEADER_LEN);
                Reply::Owned(UbxMessage {
                    class,
                    id,
                    body: data,
                })
            }
            caller => caller.deliver(class, id, &data[HEADER_LEN..]),
        })
    }

    /// Send a UBX message and copy the body of the reply with the same
    /// class and id into `body_out`.
    pub fn send_receive_ubx(
        &self,
        class: u8,
        id: u8,
        body: &[u8],
        body_out: &mut [u8],
    ) -> Result<UbxReply> {
        let reply = self.exchange(
            class,
            id,
            body,
            Some((ExpectedReply::exact(class, id), BodySink::Caller(body_out))),
        )?;
        match reply {
            Some(Reply::Copied(r)) => Ok(r),
            _ => Err(GnssError::UnexpectedResponse("no reply body".to_string())),
        }
    }

    /// Send a UBX message and return the reply with the same class and id.
    pub fn send_receive_ubx_alloc(&self, class: u8, id: u8, body: &[u8]) -> Result<UbxMessage> {
        let reply = self.exchange(
            class,
            id,
            body,
            Some((ExpectedReply::exact(class, id), BodySink::Allocate)),
        )?;
        match reply {
            Some(Reply::Owned(m)) => Ok(m),
            _ => Err(GnssError::UnexpectedResponse("no reply body".to_string())),
        }
    }

    /// Send a UBX message without waiting for anything.
    pub fn send_ubx_no_wait(&self, class: u8, id: u8, body: &[u8]) -> Result<()> {
        self.exchange(class, id, body, None).map(|_| ())
    }

    /// Send a UBX message and wait for its UBX-ACK.
    ///
    /// ACK-ACK for this message is success, any other ACK-class reply about
    /// it is [`GnssError::Nack`].
    pub fn send_ubx_with_ack(&self, class: u8, id: u8, body: &[u8]) -> Result<()> {
        let mut acked = [0u8; 2];
        let expected = ExpectedReply {
            class: Some(CLASS_ACK),
            id: None,
        };
        let reply = self.exchange(
            class,
            id,
            body,
            Some((expected, BodySink::Caller(&mut acked))),
        )?;
        match reply {
            Some(Reply::Copied(r))
                if r.class == CLASS_ACK && r.total_body_len == 2 && acked == [class, id] =>
            {
                if r.id == ACK_ACK {
                    Ok(())
                } else {
                    Err(GnssError::Nack { class, id })
                }
            }
            _ => Err(GnssError::UnexpectedResponse(format!(
                "no acknowledgement for UBX {class:#04x} {id:#04x}"
            ))),
        }
    }

    /// Send a UBX message on a streamed transport without locking a cursor
    /// or waiting. Returns the bytes sent.
    pub fn send_only_stream_ubx(&self, class: u8, id: u8, body: &[u8]) -> Result<usize> {
        self.streamed("send only")?;
        let frame = ubx::encode(class, id, body)?;
        let _transport = self.transport_lock.lock();
        self.send_stream(&frame)
    }

    /// [`send_only_stream_ubx`](Self::send_only_stream_ubx), confirmed by the
    /// receiver's per-port message counter.
    ///
    /// The counter must rise by exactly two: the send itself and the second
    /// MON-MSGPP poll.
    pub fn send_only_check_stream_ubx(&self, class: u8, id: u8, body: &[u8]) -> Result<usize> {
        self.streamed("send only")?;
        let before = self.port_message_count()?;
        let sent = self.send_only_stream_ubx(class, id, body)?;
        if sent != body.len() + OVERHEAD {
            return Err(TransportError::SendError(format!(
                "sent {sent} of {} bytes",
                body.len() + OVERHEAD
            ))
            .into());
        }
        let after = self.port_message_count()?;
        let delta = after.wrapping_sub(before);
        if delta != 2 {
            return Err(GnssError::Platform(format!(
                "port message count rose by {delta}, expected 2"
            )));
        }
        Ok(sent)
    }

    /// UBX messages the receiver has parsed on this device's port.
    pub fn port_message_count(&self) -> Result<u64> {
        let mut body = [0u8; MON_MSGPP_BODY_LEN];
        let reply = self.send_receive_ubx(CLASS_MON, MON_MSGPP, &[], &mut body)?;
        if reply.total_body_len != MON_MSGPP_BODY_LEN {
            return Err(GnssError::UnexpectedResponse(format!(
                "MON-MSGPP body of {} bytes",
                reply.total_body_len
            )));
        }
        ubx::le_u64(&body, usize::from(self.settings.port_number) * 16).ok_or_else(|| {
            GnssError::InvalidParameter(format!("no port {}", self.settings.port_number))
        })
    }
}
