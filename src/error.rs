//! Error types for the fetch pipeline and blob store.

use std::time::Duration;

/// Result type alias for fetch and storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while fetching or storing image content.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Blob not present in the store.
    #[error("blob not found: {digest}")]
    NotFound { digest: String },

    /// Content disagrees with the digest it is stored or requested under.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Digest string is not `sha256:` followed by 64 lowercase hex characters.
    #[error("invalid digest '{digest}': {reason}")]
    InvalidDigest { digest: String, reason: String },

    // =========================================================================
    // Reference / Manifest Errors
    // =========================================================================
    /// Neither a usable digest nor a permitted tag was supplied.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Manifest media type is neither an index nor an image manifest.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// An index listed another index as a child.
    #[error("nested image index {digest} is not supported")]
    NestedIndexUnsupported { digest: String },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// External fetch tool exited unsuccessfully.
    #[error("fetch tool failed (exit code {code:?}): {stderr}")]
    SubprocessFailure { code: Option<i32>, stderr: String },

    /// Every mirror was tried and none produced the object.
    #[error("all mirrors failed for {target}: {}", attempts.join("; "))]
    NetworkFailure {
        target: String,
        attempts: Vec<String>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Filesystem failure unrelated to integrity.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    /// JSON decode/encode error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the error means the blob is simply absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for integrity failures.
    pub fn is_digest_mismatch(&self) -> bool {
        matches!(self, Self::DigestMismatch { .. })
    }
}

/// Unwraps errors that travelled through an `io::Error`, such as a digest
/// mismatch reported by [`crate::storage::VerifyingReader`] at end of stream.
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if e.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            if let Some(Ok(err)) = e.into_inner().map(|inner| inner.downcast::<Error>()) {
                return *err;
            }
            return Self::Internal("wrapped error lost during unwrap".to_string());
        }
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
