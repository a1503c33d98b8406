//! Error types for StashDB
//!
//! This module defines the common error type used throughout the system.

use thiserror::Error;

/// Common result type for StashDB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for StashDB
#[derive(Debug, Error)]
pub enum Error {
    // Storage errors
    #[error("disk I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt document: {0}")]
    CorruptDocument(String),

    // Codec errors
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown value type: {0}")]
    UnknownType(String),

    // Host errors
    #[error("invalid store name: {0}")]
    InvalidStoreName(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a corrupt document error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptDocument(msg.into())
    }

    /// Check if this error came from decoding stored data
    #[must_use]
    pub const fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::Json(_) | Self::UnknownType(_) | Self::CorruptDocument(_)
        )
    }

    /// Check if this is an I/O error
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_decode() {
        assert!(Error::UnknownType("com.acme.Gone".into()).is_decode_error());
        assert!(Error::corrupt("empty").is_decode_error());
        assert!(!Error::configuration("bad").is_decode_error());
    }

    #[test]
    fn test_error_io() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(err.is_io_error());
        assert!(!err.is_decode_error());
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.is_decode_error());
        assert!(err.to_string().starts_with("json error"));
    }
}
