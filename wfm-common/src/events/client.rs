//! Client-side events for the UI layer
//!
//! Whatever renders the application (TUI, webview, test harness) subscribes
//! to [`EventBus`] and turns these into toasts, banners and status icons.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Session channel lifecycle
///
/// `Connecting → Open → {Closed | Reconnecting → Connecting}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// Transient user-facing notification (presentation only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub level: NotificationLevel,
    /// Wire tag of the event that produced it, if any
    pub source_event: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            level: NotificationLevel::Info,
            source_event: None,
            created_at: Utc::now(),
        }
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            ..Self::info(title, body)
        }
    }

    pub fn success(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            ..Self::info(title, body)
        }
    }

    pub fn with_source(mut self, tag: impl Into<String>) -> Self {
        self.source_event = Some(tag.into());
        self
    }
}

/// Events emitted towards the UI layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Notification synthesized from a server event
    Notification { notification: Notification },

    /// Session channel changed state
    ConnectionStateChanged {
        state: ConnectionState,
        /// Reconnect attempt number (0 when not reconnecting)
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    /// A user mutation failed (clock-in/out, break start/end, send request)
    MutationFailed {
        action: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A circular batch undo finished
    BatchUndoCompleted {
        succeeded: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Uploaded file could not be classified confidently; manual selection needed
    ClassificationNeedsReview {
        file_name: String,
        timestamp: DateTime<Utc>,
    },
}

impl ClientEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            ClientEvent::Notification { .. } => "Notification",
            ClientEvent::ConnectionStateChanged { .. } => "ConnectionStateChanged",
            ClientEvent::MutationFailed { .. } => "MutationFailed",
            ClientEvent::BatchUndoCompleted { .. } => "BatchUndoCompleted",
            ClientEvent::ClassificationNeedsReview { .. } => "ClassificationNeedsReview",
        }
    }
}

/// Fan-out of client events to every interested view
///
/// Backed by a `tokio::sync::broadcast` channel. A receiver that falls more
/// than `capacity` events behind sees `RecvError::Lagged` and skips ahead;
/// the dispatcher is never blocked by it.
///
/// ```
/// use wfm_common::events::{ClientEvent, EventBus, Notification};
///
/// let bus = EventBus::new(16);
/// let mut inbox = bus.subscribe();
/// bus.emit_lossy(ClientEvent::Notification {
///     notification: Notification::info("Mensaje", "Ana te ha enviado un mensaje"),
/// });
/// assert_eq!(inbox.try_recv().unwrap().event_type(), "Notification");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Deliver to current receivers; fails when nobody is listening
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ClientEvent,
    ) -> Result<usize, broadcast::error::SendError<ClientEvent>> {
        self.tx.send(event)
    }

    /// Deliver to current receivers, dropping the event when there are none
    pub fn emit_lossy(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("client event dropped, no receivers");
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_with_no_receivers_reports_error() {
        let bus = EventBus::new(10);
        let result = bus.emit(ClientEvent::BatchUndoCompleted {
            succeeded: 1,
            failed: 0,
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_connection_change_reaches_every_view() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        let delivered = bus
            .emit(ClientEvent::ConnectionStateChanged {
                state: ConnectionState::Open,
                attempt: 0,
                timestamp: Utc::now(),
            })
            .expect("subscribers present");
        assert_eq!(delivered, 2);

        assert_eq!(rx1.try_recv().unwrap().event_type(), "ConnectionStateChanged");
        assert_eq!(rx2.try_recv().unwrap().event_type(), "ConnectionStateChanged");
    }

    #[test]
    fn test_notification_constructors() {
        let n = Notification::error("Fichaje", "No se pudo fichar").with_source("clock_in");
        assert_eq!(n.level, NotificationLevel::Error);
        assert_eq!(n.source_event.as_deref(), Some("clock_in"));

        let json = serde_json::to_value(&n).unwrap();
        assert!(json.get("sourceEvent").is_some());
        assert!(json.get("createdAt").is_some());
    }
}
