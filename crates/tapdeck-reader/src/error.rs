//! Error types for reader operations.

/// Result type alias for reader operations.
pub type ReaderResult<T> = std::result::Result<T, ReaderError>;

/// Errors that can occur while talking to the NFC reader.
///
/// The poll loop cares about exactly one distinction: [`is_fatal`] failures
/// mean the bus is gone and the device must be reopened; everything else is
/// transient and survivable within the current connection.
///
/// [`is_fatal`]: ReaderError::is_fatal
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// The device could not be opened.
    #[error("could not open reader: {message}")]
    Open { message: String },

    /// The bus is gone (device unplugged, serial port dead). Triggers the
    /// reconnect path.
    #[error("fatal reader IO: {message}")]
    Fatal { message: String },

    /// Malformed frame or checksum mismatch from the device.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The device reported a command error status.
    #[error("command failed with status 0x{code:02x}")]
    Status { code: u8 },

    /// Mifare sector authentication failed with every candidate key.
    #[error("authentication failed at block {block}: card must be NDEF-formatted first")]
    AuthFailed { block: u8 },

    /// No response within the command deadline.
    #[error("reader timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Operation does not apply to the detected card type.
    #[error("unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// The tag layout rejected the operation (capacity, capability
    /// container, payload size).
    #[error("tag layout error: {0}")]
    Layout(#[from] tapdeck_core::Error),
}

impl ReaderError {
    /// Create a new open error.
    pub fn open(message: impl Into<String>) -> Self {
        Self::Open {
            message: message.into(),
        }
    }

    /// Create a new fatal IO error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Create a new protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Whether this failure requires reopening the device.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ReaderError::fatal("unplugged").is_fatal());
        assert!(!ReaderError::timeout(300).is_fatal());
        assert!(!ReaderError::protocol("bad checksum").is_fatal());
        assert!(!ReaderError::Status { code: 0x14 }.is_fatal());
    }

    #[test]
    fn test_auth_error_carries_format_hint() {
        let error = ReaderError::AuthFailed { block: 4 };
        assert!(error.to_string().contains("NDEF-formatted"));
    }
}
