//! Shared REST data shapes
//!
//! Only the shapes matter here; the business rules behind them (payroll,
//! vacation entitlement, working hours) are computed by the server.
//! Unknown fields are ignored and missing collections default to empty so a
//! newer server never breaks an older client.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::events::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: i64,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSession {
    pub id: i64,
    pub user_id: i64,
    pub clock_in: DateTime<Utc>,
    #[serde(default)]
    pub clock_out: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_hours: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl WorkSession {
    pub fn is_active(&self) -> bool {
        self.clock_out.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakPeriod {
    pub id: i64,
    pub work_session_id: i64,
    pub break_start: DateTime<Utc>,
    #[serde(default)]
    pub break_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySettings {
    /// Expected daily working hours
    pub working_hours_per_day: f64,
    #[serde(default)]
    pub default_start_time: Option<String>,
    #[serde(default)]
    pub default_end_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: i64,
    pub sender_id: i64,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    pub content: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VacationRequest {
    pub id: i64,
    pub user_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// pending | approved | rejected
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequest {
    pub id: i64,
    pub user_id: i64,
    pub document_type: String,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCounts {
    #[serde(default)]
    pub messages: u32,
    #[serde(default)]
    pub documents: u32,
    #[serde(default)]
    pub vacation_requests: u32,
}

/// Consolidated admin dashboard summary (one request instead of per-widget polling)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    #[serde(default)]
    pub employees: Vec<Employee>,
    #[serde(default)]
    pub recent_sessions: Vec<WorkSession>,
    #[serde(default)]
    pub messages: Vec<MessageSummary>,
    #[serde(default)]
    pub vacation_requests: Vec<VacationRequest>,
    #[serde(default)]
    pub document_requests: Vec<DocumentRequest>,
    #[serde(default)]
    pub unread_counts: UnreadCounts,
}
