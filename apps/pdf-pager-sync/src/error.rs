//! Error types for the annotation sync engine

use thiserror::Error;

/// Engine-wide result type
pub type Result<T> = std::result::Result<T, SyncError>;

/// Engine error type
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Session closed for document {0}")]
    SessionClosed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised while encoding or decoding a page blob
#[derive(Error, Debug)]
pub enum CodecError {
    /// Persisted blob is not JSON, or is JSON but not an array of descriptors
    #[error("Malformed annotation blob: {0}")]
    MalformedBlob(String),

    #[error("Failed to encode annotations: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Host document store errors
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Update rejected: {0}")]
    Rejected(String),

    #[error("Invalid property path: {0}")]
    InvalidPath(String),
}

impl CodecError {
    /// Whether the caller should treat this as "page has no annotations"
    pub fn is_malformed(&self) -> bool {
        matches!(self, CodecError::MalformedBlob(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_conversions() {
        let err: SyncError = HostError::Rejected("locked".to_string()).into();
        assert_eq!(err.to_string(), "Host error: Update rejected: locked");

        let err: SyncError = CodecError::MalformedBlob("not an array".to_string()).into();
        assert!(matches!(err, SyncError::Codec(ref e) if e.is_malformed()));
    }
}
