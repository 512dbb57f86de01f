//! Event types for the WFM event system
//!
//! Two families of events live here:
//! - [`DomainEvent`]: server-pushed frames received on the session channel.
//!   They are routed (never stored) and only ever drive cache invalidation
//!   and notification text.
//! - [`ClientEvent`]: what the client tells its own UI layer (notifications,
//!   connection status, toasts), distributed through [`EventBus`].

mod client;

pub use client::{ClientEvent, ConnectionState, EventBus, Notification, NotificationLevel};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Caller role for an authenticated session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Employee,
}

impl Role {
    /// Roles that receive dashboard-class events
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Employee => "employee",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "employee" => Ok(Role::Employee),
            other => Err(Error::InvalidInput(format!("Unknown role: {}", other))),
        }
    }
}

/// Server event tag
///
/// Every tag the server is known to emit has its own variant so the
/// invalidation table in `wfm-sync` is matched exhaustively. Tags this build
/// does not know about parse to [`EventKind::Unrecognized`] instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    WorkSessionCreated,
    WorkSessionUpdated,
    WorkSessionDeleted,
    VacationRequestCreated,
    VacationRequestUpdated,
    VacationRequestDeleted,
    ModificationRequestCreated,
    ModificationRequestUpdated,
    MessageReceived,
    DocumentUploaded,
    DocumentViewed,
    DocumentSigned,
    WorkReportCreated,
    ReminderAllCompleted,
    CompanySettingsUpdated,
    /// Tag not known to this build (kept verbatim for logging)
    Unrecognized(String),
}

impl EventKind {
    /// All tags known to this build, in wire order
    pub const KNOWN: [EventKind; 15] = [
        EventKind::WorkSessionCreated,
        EventKind::WorkSessionUpdated,
        EventKind::WorkSessionDeleted,
        EventKind::VacationRequestCreated,
        EventKind::VacationRequestUpdated,
        EventKind::VacationRequestDeleted,
        EventKind::ModificationRequestCreated,
        EventKind::ModificationRequestUpdated,
        EventKind::MessageReceived,
        EventKind::DocumentUploaded,
        EventKind::DocumentViewed,
        EventKind::DocumentSigned,
        EventKind::WorkReportCreated,
        EventKind::ReminderAllCompleted,
        EventKind::CompanySettingsUpdated,
    ];

    /// Parse a wire tag
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "work_session_created" => EventKind::WorkSessionCreated,
            "work_session_updated" => EventKind::WorkSessionUpdated,
            "work_session_deleted" => EventKind::WorkSessionDeleted,
            "vacation_request_created" => EventKind::VacationRequestCreated,
            "vacation_request_updated" => EventKind::VacationRequestUpdated,
            "vacation_request_deleted" => EventKind::VacationRequestDeleted,
            "modification_request_created" => EventKind::ModificationRequestCreated,
            "modification_request_updated" => EventKind::ModificationRequestUpdated,
            "message_received" => EventKind::MessageReceived,
            "document_uploaded" => EventKind::DocumentUploaded,
            "document_viewed" => EventKind::DocumentViewed,
            "document_signed" => EventKind::DocumentSigned,
            "work_report_created" => EventKind::WorkReportCreated,
            "reminder_all_completed" => EventKind::ReminderAllCompleted,
            "company_settings_updated" => EventKind::CompanySettingsUpdated,
            other => EventKind::Unrecognized(other.to_string()),
        }
    }

    /// Wire tag for this kind
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::WorkSessionCreated => "work_session_created",
            EventKind::WorkSessionUpdated => "work_session_updated",
            EventKind::WorkSessionDeleted => "work_session_deleted",
            EventKind::VacationRequestCreated => "vacation_request_created",
            EventKind::VacationRequestUpdated => "vacation_request_updated",
            EventKind::VacationRequestDeleted => "vacation_request_deleted",
            EventKind::ModificationRequestCreated => "modification_request_created",
            EventKind::ModificationRequestUpdated => "modification_request_updated",
            EventKind::MessageReceived => "message_received",
            EventKind::DocumentUploaded => "document_uploaded",
            EventKind::DocumentViewed => "document_viewed",
            EventKind::DocumentSigned => "document_signed",
            EventKind::WorkReportCreated => "work_report_created",
            EventKind::ReminderAllCompleted => "reminder_all_completed",
            EventKind::CompanySettingsUpdated => "company_settings_updated",
            EventKind::Unrecognized(tag) => tag,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape of a channel frame: `{ "type": string, "data"?: object }`
#[derive(Debug, Deserialize, Serialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Inbound server event
///
/// `data` is only ever read to build notification text. It is never applied
/// to cached data directly.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    pub kind: EventKind,
    pub data: Option<Value>,
}

impl DomainEvent {
    pub fn new(kind: EventKind, data: Option<Value>) -> Self {
        Self { kind, data }
    }

    /// Parse a text frame
    ///
    /// Fails with [`Error::MalformedEvent`] on invalid JSON, a missing or
    /// empty `type`, or a non-object `data`.
    pub fn parse(raw: &str) -> Result<Self> {
        let frame: Frame = serde_json::from_str(raw)
            .map_err(|e| Error::MalformedEvent(format!("{} (frame: {:.120})", e, raw)))?;

        if frame.kind.trim().is_empty() {
            return Err(Error::MalformedEvent("empty event type".to_string()));
        }

        let data = match frame.data {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(Value::Object(map)),
            Some(other) => {
                return Err(Error::MalformedEvent(format!(
                    "data must be an object, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            kind: EventKind::from_tag(frame.kind.trim()),
            data,
        })
    }

    /// Serialize back to the wire shape
    pub fn to_frame(&self) -> String {
        let frame = Frame {
            kind: self.kind.as_str().to_string(),
            data: self.data.clone(),
        };
        serde_json::to_string(&frame).unwrap_or_else(|_| format!("{{\"type\":\"{}\"}}", self.kind))
    }

    /// String field from the payload, if present and non-blank
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.get(field))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
