//! Error types for cache-intent.

use thiserror::Error;

/// Errors raised while declaring or executing cached operations.
///
/// Configuration-class errors (see [`Error::is_configuration_error`]) are
/// raised when an operation is declared, so broken templates and unknown
/// backends never reach live traffic. Backend errors are forwarded exactly
/// as the backend produced them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Invalid operation or policy configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A backend with this name is already registered.
    #[error("Cache '{0}' is already registered")]
    DuplicateBackend(String),

    /// No backend is registered under this name.
    #[error("Cache '{0}' not configured")]
    UnconfiguredBackend(String),

    /// Key template is malformed or a value can't be used in a key.
    #[error("Key format error: {0}")]
    KeyFormatError(String),

    /// Explicit namespace is unusable (e.g. empty).
    #[error("Namespace error: {0}")]
    NamespaceError(String),

    /// Failure reported by a cache backend.
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Value could not be encoded for storage.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Stored payload could not be decoded.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// Stored bytes are not a cache-intent envelope.
    #[error("Invalid cache entry: {0}")]
    InvalidCacheEntry(String),

    /// Envelope was written by a different schema version.
    #[error("Cache entry version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

impl Error {
    /// True for errors that belong to declaration time rather than call time.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::ConfigError(_)
                | Error::DuplicateBackend(_)
                | Error::UnconfiguredBackend(_)
                | Error::KeyFormatError(_)
                | Error::NamespaceError(_)
        )
    }
}

/// Result type for cache-intent operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(Error::DuplicateBackend("default".into()).is_configuration_error());
        assert!(Error::UnconfiguredBackend("x".into()).is_configuration_error());
        assert!(Error::KeyFormatError("bad".into()).is_configuration_error());
        assert!(!Error::BackendError("down".into()).is_configuration_error());
        assert!(!Error::VersionMismatch {
            expected: 1,
            found: 2
        }
        .is_configuration_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Error::UnconfiguredBackend("other".into()).to_string(),
            "Cache 'other' not configured"
        );
    }
}
