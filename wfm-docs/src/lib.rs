//! # WFM Documents
//!
//! Document classification and distribution:
//! - Filename classification against the employee roster (`classify`)
//! - Upload planning with manual overrides (`upload`)
//! - Circular fan-out with independent per-recipient status (`store`, `recipient`)
//! - Content-addressed artifact storage (`storage`)

pub mod classify;
pub mod db;
pub mod error;
pub mod recipient;
pub mod storage;
pub mod store;
pub mod upload;

pub use classify::{classify, ClassificationResult, Confidence, DocumentType};
pub use error::{DocumentError, Result};
pub use recipient::RecipientStatus;
pub use storage::{ArtifactStorage, FsArtifactStorage};
pub use store::{BatchProgress, BatchResult, BatchUndoReport, CircularUpload, Document, DocumentStore};
pub use upload::{plan_upload, ManualOverride, PlannedUpload, UploadPlan};
