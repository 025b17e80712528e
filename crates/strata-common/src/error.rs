//! Error types for the strata storage core.

use thiserror::Error;

/// Result type alias using StrataError.
pub type Result<T> = std::result::Result<T, StrataError>;

/// Errors that can occur in strata operations.
///
/// Ordinary not-found and busy conditions are reported through `bool` and
/// `Option` returns, not through this type.
#[derive(Debug, Error)]
pub enum StrataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Resource exhaustion
    #[error("Buffer pool full, every frame is pinned")]
    BufferPoolFull,

    #[error("Block store out of space, no allocatable page id")]
    OutOfSpace,

    // Storage errors
    #[error("Page not found: {page_id}")]
    PageNotFound { page_id: u32 },

    #[error("Page corrupted: {page_id}, reason: {reason}")]
    PageCorrupted { page_id: u32, reason: String },

    // B+ tree errors
    #[error("B+ tree corrupted: {0}")]
    BTreeCorrupted(String),

    #[error("Key size mismatch: expected {expected} bytes, got {actual}")]
    KeySizeMismatch { expected: usize, actual: usize },

    #[error("Index cursor is exhausted")]
    CursorExhausted,

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StrataError {
    /// Returns true for errors signalling that a structure on disk cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StrataError::PageCorrupted { .. } | StrataError::BTreeCorrupted(_)
        )
    }

    /// Returns true for recoverable resource exhaustion.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, StrataError::BufferPoolFull | StrataError::OutOfSpace)
    }
}
