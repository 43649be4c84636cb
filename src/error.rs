//! Error types for the protocol engine
//!
//! One enum covers every failure the engine can report. Reads never surface
//! these to callers except through [`ReadResult::Unsupported`], writes return
//! them directly, and validation errors are raised before any network I/O.
//!
//! [`ReadResult::Unsupported`]: crate::access::ReadResult::Unsupported

use thiserror::Error;

/// Result alias used across the crate
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Engine error taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModbusError {
    /// TCP connection could not be established or is gone
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Socket-level read/write failure on an established connection
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// No response within the configured bound
    #[error("Timeout during {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Server sent something that is not a valid response
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Server answered with a Modbus exception PDU
    #[error("Modbus exception 0x{code:02X} for function 0x{function:02X}")]
    Exception { function: u8, code: u8 },

    /// Response frame is truncated or inconsistent
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Function code outside the supported set
    #[error("Invalid function code: 0x{code:02X}")]
    InvalidFunction { code: u8 },

    /// Caller input rejected before any I/O
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Bad endpoint or engine settings
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ModbusError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn exception(function: u8, code: u8) -> Self {
        Self::Exception { function, code }
    }

    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    pub fn invalid_function(code: u8) -> Self {
        Self::InvalidFunction { code }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether a failed read may be attempted again.
    ///
    /// Socket failures, timeouts and protocol-level failures are retried.
    /// A dead connection is not: the engine never reconnects on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::Timeout { .. }
                | Self::Protocol { .. }
                | Self::Exception { .. }
                | Self::Frame { .. }
                | Self::InvalidFunction { .. }
        )
    }

    /// True for the protocol-error family (exception PDUs and malformed frames)
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Protocol { .. }
                | Self::Exception { .. }
                | Self::Frame { .. }
                | Self::InvalidFunction { .. }
        )
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected => Self::connection(err.to_string()),
            ErrorKind::TimedOut => Self::timeout("socket operation", 0),
            _ => Self::transport(err.to_string()),
        }
    }
}
