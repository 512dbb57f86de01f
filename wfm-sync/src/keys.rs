//! Named cache entries

use serde::{Deserialize, Serialize};

/// Stable identifier of a cached query result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKey {
    /// Consolidated admin dashboard summary
    AdminDashboard,
    /// Caller's open work session (clock-in state)
    ActiveSession,
    /// Caller's open break period
    ActiveBreak,
    /// Recent work sessions (needs company working hours)
    RecentSessions,
    CompanySettings,
    Messages,
    UnreadMessages,
    Documents,
    DocumentNotifications,
    VacationRequests,
    ModificationRequests,
    WorkReports,
    Reminders,
}

impl CacheKey {
    pub const ALL: [CacheKey; 13] = [
        CacheKey::AdminDashboard,
        CacheKey::ActiveSession,
        CacheKey::ActiveBreak,
        CacheKey::RecentSessions,
        CacheKey::CompanySettings,
        CacheKey::Messages,
        CacheKey::UnreadMessages,
        CacheKey::Documents,
        CacheKey::DocumentNotifications,
        CacheKey::VacationRequests,
        CacheKey::ModificationRequests,
        CacheKey::WorkReports,
        CacheKey::Reminders,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::AdminDashboard => "admin_dashboard",
            CacheKey::ActiveSession => "active_session",
            CacheKey::ActiveBreak => "active_break",
            CacheKey::RecentSessions => "recent_sessions",
            CacheKey::CompanySettings => "company_settings",
            CacheKey::Messages => "messages",
            CacheKey::UnreadMessages => "unread_messages",
            CacheKey::Documents => "documents",
            CacheKey::DocumentNotifications => "document_notifications",
            CacheKey::VacationRequests => "vacation_requests",
            CacheKey::ModificationRequests => "modification_requests",
            CacheKey::WorkReports => "work_reports",
            CacheKey::Reminders => "reminders",
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
