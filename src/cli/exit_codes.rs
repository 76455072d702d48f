//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::sink::SinkError;
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

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 3;

    /// Serial interfaces could not be enumerated
    pub const ENUMERATION_FAILED: u8 = 4;

    /// Device not found
    pub const DEVICE_NOT_FOUND: u8 = 5;

    /// File not found
    pub const FILE_NOT_FOUND: u8 = 6;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Upload or notification failed
    pub const DELIVERY_FAILED: u8 = 8;

    /// Operation timed out
    pub const TIMEOUT: u8 = 9;

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
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success that prints a message
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Missing input file
    pub fn file_not_found(path: &str) -> Self {
        Self::Error(ExitCodes::FILE_NOT_FOUND, format!("File not found: {}", path))
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
            Self::Success(Some(msg)) => Some(msg),
            Self::Error(_, msg) => Some(msg),
            _ => None,
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

impl From<std::io::Error> for CliResult {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let code = match err.kind() {
            ErrorKind::NotFound => ExitCodes::FILE_NOT_FOUND,
            ErrorKind::PermissionDenied => ExitCodes::PERMISSION_DENIED,
            ErrorKind::TimedOut => ExitCodes::TIMEOUT,
            _ => ExitCodes::ERROR,
        };

        Self::Error(code, err.to_string())
    }
}

impl From<ConfigError> for CliResult {
    fn from(err: ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

impl From<TransportError> for CliResult {
    fn from(err: TransportError) -> Self {
        let code = match &err {
            TransportError::EnumerationFailed(_) => ExitCodes::ENUMERATION_FAILED,
            TransportError::PortNotFound(_) => ExitCodes::DEVICE_NOT_FOUND,
            TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
            _ => ExitCodes::ERROR,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<SinkError> for CliResult {
    fn from(err: SinkError) -> Self {
        let code = match &err {
            SinkError::Timeout(_) => ExitCodes::TIMEOUT,
            SinkError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ExitCodes::FILE_NOT_FOUND
            }
            _ => ExitCodes::DELIVERY_FAILED,
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
        3 => "Configuration error",
        4 => "Serial enumeration failed",
        5 => "Device not found",
        6 => "File not found",
        7 => "Permission denied",
        8 => "Delivery failed",
        9 => "Timeout",
        127 => "Internal error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 127] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}
