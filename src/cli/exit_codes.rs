//! CLI Exit Codes
//!
//! Exit codes of the `gnsslink` binary, one per failure class a script may
//! want to branch on.

use crate::core::error::GnssError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// No reply in time
    pub const TIMEOUT: u8 = 4;

    /// Receiver rejected the command
    pub const NACK: u8 = 5;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Protocol error (bad frame, unexpected reply)
    pub const PROTOCOL_ERROR: u8 = 9;

    /// Receiver did not end up in the requested state
    pub const VERIFY_FAILED: u8 = 10;

    /// Operation not supported on this transport
    pub const NOT_SUPPORTED: u8 = 11;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Success without a message
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&GnssError> for CliResult {
    fn from(err: &GnssError) -> Self {
        let code = match err {
            GnssError::InvalidParameter(_) => ExitCodes::INVALID_ARGS,
            GnssError::Timeout => ExitCodes::TIMEOUT,
            GnssError::Nack { .. } => ExitCodes::NACK,
            GnssError::NotFound
            | GnssError::ChecksumMismatch
            | GnssError::UnexpectedResponse(_) => ExitCodes::PROTOCOL_ERROR,
            GnssError::Platform(_) => ExitCodes::VERIFY_FAILED,
            GnssError::NotSupported(_) => ExitCodes::NOT_SUPPORTED,
            GnssError::Transport(TransportError::PortNotFound(_)) => ExitCodes::PORT_NOT_FOUND,
            GnssError::Transport(TransportError::PermissionDenied(_)) => {
                ExitCodes::PERMISSION_DENIED
            }
            GnssError::Transport(_) => ExitCodes::CONNECTION_FAILED,
            GnssError::OutOfMemory => ExitCodes::INTERNAL_ERROR,
        };
        Self::Error(code, err.to_string())
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        4 => "No reply in time",
        5 => "Command rejected (NACK)",
        7 => "Permission denied",
        8 => "Configuration error",
        9 => "Protocol error",
        10 => "Verification failed",
        11 => "Not supported on this transport",
        14 => "Port not found",
        127 => "Internal error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 4, 5, 7, 8, 9, 10, 11, 14, 127] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);
        assert_eq!(success.message(), None);

        let error = CliResult::error(ExitCodes::CONFIG_ERROR, "bad config");
        assert!(!error.is_success());
        assert_eq!(error.code(), 8);
        assert_eq!(error.message(), Some("bad config"));
    }

    #[test]
    fn test_from_gnss_error() {
        assert_eq!(CliResult::from(&GnssError::Timeout).code(), ExitCodes::TIMEOUT);
        assert_eq!(
            CliResult::from(&GnssError::Nack { class: 6, id: 0x8a }).code(),
            ExitCodes::NACK
        );
        let missing = GnssError::Transport(TransportError::PortNotFound("/dev/x".into()));
        assert_eq!(CliResult::from(&missing).code(), ExitCodes::PORT_NOT_FOUND);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(exit_code_description(5), "Command rejected (NACK)");
        assert_eq!(exit_code_description(200), "Unknown error");
    }
}
