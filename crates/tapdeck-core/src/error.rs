use thiserror::Error;

/// Result type alias for tapdeck operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors shared across the tapdeck crates.
///
/// Device-level failures have their own error type in `tapdeck-reader`;
/// everything else (codec, mappings, launching, configuration) reports
/// through this enum.
#[derive(Debug, Error)]
pub enum Error {
    // Tag / codec errors
    #[error("invalid tag UID: {message}")]
    InvalidUid { message: String },

    #[error("text payload too long: {len} bytes exceeds maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("tag capacity exceeded: message needs {need} bytes, card holds {capacity}")]
    CapacityExceeded { need: usize, capacity: usize },

    #[error("invalid capability container: {message}")]
    InvalidCapabilityContainer { message: String },

    #[error("unsupported card type: {0}")]
    UnsupportedCardType(String),

    // Mappings database errors
    #[error("mappings parse error at line {line}: {message}")]
    MappingsParse { line: usize, message: String },

    #[error("watcher error: {0}")]
    Watcher(String),

    // Launcher errors
    #[error("unknown launch command: {0}")]
    UnknownCommand(String),

    #[error("unknown system: {0}")]
    UnknownSystem(String),

    #[error("no indexed games for system: {0}")]
    EmptyLibrary(String),

    #[error("launch failed: {message}")]
    LaunchFailed { message: String },

    // Service errors
    #[error("service error: {0}")]
    Service(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new invalid-UID error.
    pub fn invalid_uid(message: impl Into<String>) -> Self {
        Self::InvalidUid {
            message: message.into(),
        }
    }

    /// Create a new launch-failed error.
    pub fn launch_failed(message: impl Into<String>) -> Self {
        Self::LaunchFailed {
            message: message.into(),
        }
    }

    /// Create a new service error.
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service(message.into())
    }

    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::invalid_uid("too short");
        assert_eq!(error.to_string(), "invalid tag UID: too short");

        let error = Error::CapacityExceeded {
            need: 900,
            capacity: 720,
        };
        assert_eq!(
            error.to_string(),
            "tag capacity exceeded: message needs 900 bytes, card holds 720"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error: Error = io.into();
        assert!(matches!(error, Error::Io(_)));
    }
}
