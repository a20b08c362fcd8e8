//! Error types for the RTU engine
//!
//! Every failure is local to one request/response exchange; the master and
//! slave stay usable after any of these errors.

use thiserror::Error;

/// Result alias used throughout the crate
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Errors reported by the RTU engine
#[derive(Debug, Error)]
pub enum ModbusError {
    /// No response arrived within the response timeout
    #[error("Timeout during {operation} after {timeout_ms}ms")]
    Timeout {
        operation: String,
        timeout_ms: u64,
    },

    /// A frame was received but is too short or truncated
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// The trailing CRC does not match the frame contents
    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    Crc { expected: u16, actual: u16 },

    /// The remote device answered with an exception response
    #[error("Modbus exception for function 0x{function:02X}: {message} (code 0x{code:02X})")]
    Exception {
        function: u8,
        code: u8,
        message: String,
    },

    /// A locally supplied argument is out of range
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// A function code this engine does not implement
    #[error("Invalid function code: 0x{code:02X}")]
    InvalidFunction { code: u8 },

    /// The response contradicts the request (strict validation)
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Invalid engine configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The serial link failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModbusError {
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn invalid_function(code: u8) -> Self {
        Self::InvalidFunction { code }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Build an exception error from a raw function/exception code pair.
    pub fn exception(function: u8, code: u8) -> Self {
        let message = crate::protocol::ModbusException::from_u8(code)
            .map(|e| e.description().to_string())
            .unwrap_or_else(|| format!("Unknown exception 0x{:02X}", code));
        Self::Exception {
            function,
            code,
            message,
        }
    }

    /// True for a local response timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True if the remote device rejected the request
    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception { .. })
    }

    /// The remote exception code, if this is an exception response
    pub fn exception_code(&self) -> Option<u8> {
        match self {
            Self::Exception { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_message() {
        let err = ModbusError::exception(0x03, 0x02);
        assert!(err.is_exception());
        assert_eq!(err.exception_code(), Some(0x02));
        assert!(err.to_string().contains("Illegal Data Address"));

        let unknown = ModbusError::exception(0x03, 0x0B);
        assert!(unknown.to_string().contains("Unknown exception 0x0B"));
    }

    #[test]
    fn test_timeout_predicate() {
        let err = ModbusError::timeout("read response", 1000);
        assert!(err.is_timeout());
        assert_eq!(err.exception_code(), None);
        assert_eq!(err.to_string(), "Timeout during read response after 1000ms");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: ModbusError = io.into();
        assert!(matches!(err, ModbusError::Io(_)));
    }
}
