//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::core::error::{CallError, CallErrorKind};
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Argument could not be parsed
    pub const INVALID_ARGS: u8 = 2;

    /// Argument parsed but out of range
    pub const OUT_OF_RANGE: u8 = 3;

    /// The remote call or connection failed
    pub const CALL_FAILED: u8 = 4;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 5;

    /// No serial ports or devices found
    pub const NOT_FOUND: u8 = 6;
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
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a message for the user
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Unparsable argument
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::INVALID_ARGS, msg.into())
    }

    /// Argument out of range
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::OUT_OF_RANGE, msg.into())
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

impl From<CallError> for CliResult {
    fn from(err: CallError) -> Self {
        let code = match err.kind {
            CallErrorKind::InvalidArgument => ExitCodes::INVALID_ARGS,
            _ => ExitCodes::CALL_FAILED,
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
        3 => "Argument out of range",
        4 => "Call or connection failed",
        5 => "Configuration error",
        6 => "Nothing found",
        _ => "Unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::Fault;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);

        let error = CliResult::out_of_range("address out of range");
        assert!(!error.is_success());
        assert_eq!(error.code(), 3);
        assert_eq!(error.message(), Some("address out of range"));
    }

    #[test]
    fn test_from_call_error() {
        let err = CallError::exhausted(Fault::NoResponse, 0, 3);
        assert_eq!(CliResult::from(err).code(), ExitCodes::CALL_FAILED);

        let err = CallError::new(CallErrorKind::InvalidArgument, 0, "bad");
        assert_eq!(CliResult::from(err).code(), ExitCodes::INVALID_ARGS);
        assert_eq!(exit_code_description(4), "Call or connection failed");
    }
}
