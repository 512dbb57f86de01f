//! Error types for wfm-sync
//!
//! Transport failures (channel drop, fetch failure) are caught at the boundary
//! and surface as flags on cache entries or as client events. Only explicit
//! user actions (mutations) return these errors to their caller.

use thiserror::Error;

/// Synchronization core error type
#[derive(Debug, Error)]
pub enum SyncError {
    /// Session channel could not be opened (degrade to polling)
    #[error("Connection error: {0}")]
    Connection(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Some deletions of a batch undo failed
    #[error("Batch undo incomplete: {succeeded} deleted, {failed} failed")]
    PartialBatchFailure { succeeded: usize, failed: usize },

    /// wfm-common error (malformed event, config, ...)
    #[error(transparent)]
    Common(#[from] wfm_common::Error),
}

/// Result type for wfm-sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
