//! Error types for the document engine

use thiserror::Error;

/// Result alias for document operations
pub type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Document not found: {0}")]
    NotFound(String),

    /// A lifecycle rule was violated (sign before view, double sign, ...)
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Confidence too low to assign automatically; route to manual selection
    #[error("Classification of {file_name} needs manual review ({} candidates)", candidates.len())]
    ClassificationAmbiguous {
        file_name: String,
        candidates: Vec<String>,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Some records of a batch could not be deleted
    #[error("Batch partially failed: {succeeded} succeeded, {failed} failed")]
    PartialBatchFailure { succeeded: usize, failed: usize },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored row could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Common(#[from] wfm_common::Error),
}
