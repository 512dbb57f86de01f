//! Invalidation Map
//!
//! Static table from server event tag to the cache entries it makes stale.
//! The match is exhaustive over [`EventKind`] so adding a tag in wfm-common
//! fails the build here until it is routed.

use wfm_common::events::EventKind;

use crate::keys::CacheKey;

/// What an inbound event does to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Mark these entries stale
    Invalidate(&'static [CacheKey]),
    /// Event only produces a notification
    NotificationOnly,
    /// Tag not known to this build
    Ignore,
}

impl Routing {
    pub fn keys(&self) -> &'static [CacheKey] {
        match self {
            Routing::Invalidate(keys) => keys,
            Routing::NotificationOnly | Routing::Ignore => &[],
        }
    }
}

const WORK_SESSION: &[CacheKey] = &[
    CacheKey::AdminDashboard,
    CacheKey::RecentSessions,
    CacheKey::ActiveSession,
    CacheKey::ActiveBreak,
];

const VACATION: &[CacheKey] = &[CacheKey::AdminDashboard, CacheKey::VacationRequests];

const MODIFICATION: &[CacheKey] = &[CacheKey::AdminDashboard, CacheKey::ModificationRequests];

const MESSAGE: &[CacheKey] = &[
    CacheKey::AdminDashboard,
    CacheKey::Messages,
    CacheKey::UnreadMessages,
];

const DOCUMENT_UPLOAD: &[CacheKey] = &[
    CacheKey::AdminDashboard,
    CacheKey::Documents,
    CacheKey::DocumentNotifications,
];

const DOCUMENT_STATUS: &[CacheKey] = &[CacheKey::AdminDashboard, CacheKey::Documents];

const WORK_REPORT: &[CacheKey] = &[CacheKey::AdminDashboard, CacheKey::WorkReports];

/// Recent sessions derive overtime from the configured working hours
const COMPANY_SETTINGS: &[CacheKey] = &[CacheKey::CompanySettings, CacheKey::RecentSessions];

/// Route an event kind
pub fn route(kind: &EventKind) -> Routing {
    match kind {
        EventKind::WorkSessionCreated
        | EventKind::WorkSessionUpdated
        | EventKind::WorkSessionDeleted => Routing::Invalidate(WORK_SESSION),

        EventKind::VacationRequestCreated
        | EventKind::VacationRequestUpdated
        | EventKind::VacationRequestDeleted => Routing::Invalidate(VACATION),

        EventKind::ModificationRequestCreated | EventKind::ModificationRequestUpdated => {
            Routing::Invalidate(MODIFICATION)
        }

        EventKind::MessageReceived => Routing::Invalidate(MESSAGE),
        EventKind::DocumentUploaded => Routing::Invalidate(DOCUMENT_UPLOAD),
        EventKind::DocumentViewed | EventKind::DocumentSigned => Routing::Invalidate(DOCUMENT_STATUS),
        EventKind::WorkReportCreated => Routing::Invalidate(WORK_REPORT),
        EventKind::CompanySettingsUpdated => Routing::Invalidate(COMPANY_SETTINGS),
        EventKind::ReminderAllCompleted => Routing::NotificationOnly,
        EventKind::Unrecognized(_) => Routing::Ignore,
    }
}

/// Cache entries made stale by an event kind (empty for notification-only and unknown tags)
pub fn invalidation_targets(kind: &EventKind) -> &'static [CacheKey] {
    route(kind).keys()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_session_tags_share_targets() {
        for kind in [
            EventKind::WorkSessionCreated,
            EventKind::WorkSessionUpdated,
            EventKind::WorkSessionDeleted,
        ] {
            let keys = route(&kind).keys();
            assert!(keys.contains(&CacheKey::ActiveSession));
            assert!(keys.contains(&CacheKey::ActiveBreak));
            assert!(keys.contains(&CacheKey::RecentSessions));
            assert!(keys.contains(&CacheKey::AdminDashboard));
        }
    }

    #[test]
    fn test_message_received_targets() {
        assert_eq!(route(&EventKind::MessageReceived), Routing::Invalidate(MESSAGE));
        assert_eq!(
            invalidation_targets(&EventKind::MessageReceived),
            &[CacheKey::AdminDashboard, CacheKey::Messages, CacheKey::UnreadMessages]
        );
    }

    #[test]
    fn test_reminder_is_notification_only() {
        assert_eq!(route(&EventKind::ReminderAllCompleted), Routing::NotificationOnly);
        assert!(route(&EventKind::ReminderAllCompleted).keys().is_empty());
    }

    #[test]
    fn test_unknown_tag_touches_nothing() {
        let routing = route(&EventKind::Unrecognized("shift_swapped".into()));
        assert_eq!(routing, Routing::Ignore);
        assert!(routing.keys().is_empty());
    }

    #[test]
    fn test_every_known_tag_is_routed() {
        for kind in EventKind::KNOWN.iter() {
            assert_ne!(route(kind), Routing::Ignore, "{} is not routed", kind);
        }
    }

    #[test]
    fn test_company_settings_refreshes_recent_sessions() {
        let keys = route(&EventKind::CompanySettingsUpdated).keys();
        assert!(keys.contains(&CacheKey::CompanySettings));
        assert!(keys.contains(&CacheKey::RecentSessions));
        assert!(!keys.contains(&CacheKey::AdminDashboard));
    }
}
