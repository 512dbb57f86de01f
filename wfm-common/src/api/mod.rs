//! API module for shared HTTP API functionality
//!
//! This module contains ONLY:
//! - Pure functions (no HTTP framework or client dependencies)
//! - Shared wire types
//!
//! The REST client lives in `wfm-sync`; the server is an external collaborator.

pub mod signed_url;
pub mod types;

pub use signed_url::SignedViewUrl;
pub use types::{
    BreakPeriod, CompanySettings, DashboardSummary, DocumentRequest, Employee, MessageSummary,
    UnreadCounts, VacationRequest, WorkSession,
};
