//! # WFM Common Library
//!
//! Shared code for the workforce-management client crates:
//! - Domain event model received over the session channel
//! - Client event bus (notifications, connection status, toasts)
//! - REST data shapes and signed view URLs
//! - Configuration loading and signing secret resolution
//! - Utility functions

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{DomainEvent, EventKind, Role};
