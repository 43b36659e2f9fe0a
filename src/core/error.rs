//! Error types for the GNSS framing core.
//!
//! Every fallible operation in the crate returns [`Result<T>`]. Stream-level
//! and protocol-level problems are absorbed where the design allows it; what
//! reaches a caller is one of the kinds below.

use super::transport::TransportError;

/// The error type for all GNSS core operations.
#[derive(Debug, thiserror::Error)]
pub enum GnssError {
    /// The call contract was violated (bad length, bad port, bad protocol).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No matching data arrived within the time budget.
    ///
    /// Recoverable: the caller may retry.
    #[error("timeout waiting for data")]
    Timeout,

    /// Bytes were present but did not form a frame of the expected format.
    #[error("no valid frame found")]
    NotFound,

    /// A frame was complete but its checksum or CRC did not match.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// The receiver explicitly rejected the command (UBX-ACK-NAK).
    #[error("negative acknowledgement for UBX message {class:#04x} {id:#04x}")]
    Nack {
        /// Class of the rejected message
        class: u8,
        /// ID of the rejected message
        id: u8,
    },

    /// Storage for a caller-delegated buffer could not be allocated.
    #[error("out of memory")]
    OutOfMemory,

    /// A transport primitive failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The operation is not valid for the active transport.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Every exchange succeeded but the receiver did not end up in the
    /// requested state.
    #[error("platform error: {0}")]
    Platform(String),

    /// A response arrived but was not the one the protocol calls for.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl GnssError {
    /// True for a plain timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// True when the receiver rejected the command.
    pub fn is_nack(&self) -> bool {
        matches!(self, Self::Nack { .. })
    }
}

impl From<std::collections::TryReserveError> for GnssError {
    fn from(_: std::collections::TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

/// A convenience `Result` alias using [`GnssError`].
pub type Result<T> = std::result::Result<T, GnssError>;
