//! UBX over the `AT+UGUBX` tunnel of an attached cellular module
//!
//! The module forwards one hex-encoded frame and hands back the receiver's
//! reply, also hex-encoded. There is no stream, so no cursor and no message
//! filtering; a NACK is recognised locally.

use super::{BodySink, ExpectedReply, Reply, UbxMessage};
use crate::core::device::GnssDevice;
use crate::core::error::{GnssError, Result};
use crate::core::protocol::ubx::{self, ACK_NAK, CLASS_ACK, HEADER_LEN, MAX_BODY_LEN, OVERHEAD};
use crate::core::transport::{Transport, TransportError};

/// Command that tunnels a UBX frame
pub const AT_COMMAND: &str = "AT+UGUBX=";
/// Prefix of the tunnel's response line
pub const AT_RESPONSE_PREFIX: &str = "+UGUBX:";
/// Longest hex response read back
pub const AT_BUFFER_LENGTH: usize = (MAX_BODY_LEN + OVERHEAD) * 2;

impl GnssDevice {
    pub(crate) fn at_exchange(
        &self,
        frame: &[u8],
        reply: Option<(ExpectedReply, BodySink<'_>)>,
    ) -> Result<Option<Reply>> {
        let encoded = hex::encode_upper(frame);
        let response = {
            let mut io = self.io.lock();
            let Transport::At(at) = &mut *io else {
                return Err(GnssError::NotSupported(format!(
                    "{} is not an AT transport",
                    self.transport_type
                )));
            };
            at.lock();
            at.set_timeout(self.settings.timeout_ms);
            at.command_start(AT_COMMAND);
            at.write_string(&encoded, true);
            at.command_stop();
            if self.settings.print_ubx_messages {
                tracing::debug!("sent UBX command {}", hex::encode(frame));
            }
            at.response_start(AT_RESPONSE_PREFIX);
            let text = at.read_string(AT_BUFFER_LENGTH.max(encoded.len()));
            at.response_stop();
            let unlocked = at.unlock();
            unlocked.and(text)?
        };

        let Some((expected, sink)) = reply else {
            return Ok(None);
        };

        let decoded = hex::decode(response.trim())
            .map_err(|e| GnssError::UnexpectedResponse(format!("bad hex from {AT_RESPONSE_PREFIX} ({e})")))?;
        if decoded.is_empty() {
            return Err(TransportError::ReceiveError("empty tunnel response".to_string()).into());
        }

        if let Ok(nak) = ubx::decode(&decoded) {
            if nak.class == CLASS_ACK
                && nak.id == ACK_NAK
                && nak.body.len() == 2
                && expected.class == Some(nak.body[0])
                && expected.id == Some(nak.body[1])
            {
                return Err(GnssError::Nack {
                    class: nak.body[0],
                    id: nak.body[1],
                });
            }
        }

        let (class, id, body_len) = {
            let frame = ubx::decode(&decoded)?;
            (frame.class, frame.id, frame.body.len())
        };
        if self.settings.print_ubx_messages {
            tracing::debug!(
                "decoded UBX response {}",
                hex::encode(&decoded[HEADER_LEN..HEADER_LEN + body_len])
            );
        }

        Ok(Some(match sink {
            BodySink::Allocate => {
                // Reuse the decode buffer as the body
                let mut body = decoded;
                body.truncate(HEADER_LEN + body_len);
                body.drain(..HEADER_LEN);
                Reply::Owned(UbxMessage { class, id, body })
            }
            caller => caller.deliver(class, id, &decoded[HEADER_LEN..HEADER_LEN + body_len]),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_buffer_holds_largest_frame() {
        assert_eq!(AT_BUFFER_LENGTH, 2064);
    }
}
