//! # WFM Sync
//!
//! Real-time cache synchronization core for the workforce-management client:
//! - Cache entry registry with per-entry refresh policies
//! - Static invalidation map from server events to cache entries
//! - Event dispatcher and notification synthesis
//! - Session channel (WebSocket) with reconnect backoff
//! - REST client used for cache fetchers and mutations
//! - `SyncSession`, which ties them together for one logged-in user

pub mod backoff;
pub mod channel;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod expiring;
pub mod invalidation;
pub mod keys;
pub mod notify;
pub mod registry;
pub mod session;

pub use channel::SessionChannel;
pub use client::ApiClient;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{Result, SyncError};
pub use expiring::ExpiringValue;
pub use keys::CacheKey;
pub use registry::{CacheRegistry, EntryHandle, EntrySnapshot, RefreshPolicy};
pub use session::{Credentials, SessionSettings, SyncSession};
