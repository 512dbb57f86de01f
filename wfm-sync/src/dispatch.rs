//! Event dispatcher
//!
//! Parses inbound frames, looks up the invalidation targets and marks them
//! stale, then emits the synthesized notification (if any) on the client bus.
//! Frames are handled strictly in arrival order by the channel reader.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use wfm_common::events::{ClientEvent, DomainEvent, EventBus, EventKind, Notification};

use crate::error::Result;
use crate::invalidation::{route, Routing};
use crate::keys::CacheKey;
use crate::notify::notification_for;
use crate::registry::CacheRegistry;

/// What dispatching one frame did
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub kind: EventKind,
    /// Registered entries that were marked stale
    pub invalidated: Vec<CacheKey>,
    pub notification: Option<Notification>,
}

/// Counters for diagnostics
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub dispatched: AtomicU64,
    pub malformed: AtomicU64,
    pub unrecognized: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchCounts {
    pub dispatched: u64,
    pub malformed: u64,
    pub unrecognized: u64,
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: CacheRegistry,
    bus: EventBus,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new(registry: CacheRegistry, bus: EventBus) -> Self {
        Self {
            registry,
            bus,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Handle one raw text frame
    ///
    /// A malformed frame is counted and returned as an error; the caller logs
    /// it and keeps reading.
    pub async fn dispatch(&self, raw: &str) -> Result<DispatchOutcome> {
        let event = match DomainEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
        };
        Ok(self.dispatch_event(event).await)
    }

    /// Handle an already parsed event
    pub async fn dispatch_event(&self, event: DomainEvent) -> DispatchOutcome {
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);

        let invalidated = match route(&event.kind) {
            Routing::Invalidate(keys) => self.registry.invalidate_many(keys).await,
            Routing::NotificationOnly => Vec::new(),
            Routing::Ignore => {
                self.stats.unrecognized.fetch_add(1, Ordering::Relaxed);
                debug!(event_type = %event.kind, "Ignoring unrecognized event type");
                Vec::new()
            }
        };

        let notification = notification_for(&event);
        if let Some(n) = &notification {
            info!(event_type = %event.kind, "{}", n.body);
            self.bus.emit_lossy(ClientEvent::Notification {
                notification: n.clone(),
            });
        }

        debug!(
            event_type = %event.kind,
            invalidated = invalidated.len(),
            "Dispatched event"
        );

        DispatchOutcome {
            kind: event.kind,
            invalidated,
            notification,
        }
    }

    pub fn counts(&self) -> DispatchCounts {
        DispatchCounts {
            dispatched: self.stats.dispatched.load(Ordering::Relaxed),
            malformed: self.stats.malformed.load(Ordering::Relaxed),
            unrecognized: self.stats.unrecognized.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{fetcher, RefreshPolicy};
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;

    async fn primed_registry() -> CacheRegistry {
        let registry = CacheRegistry::new();
        for key in CacheKey::ALL {
            registry
                .register(
                    key,
                    fetcher(|| async { Ok(json!(null)) }),
                    RefreshPolicy::stale_after(Duration::from_secs(3600)),
                )
                .await;
            registry.prime(key, json!({})).await;
        }
        registry
    }

    #[tokio::test]
    async fn test_work_session_event_marks_targets_stale() {
        let registry = primed_registry().await;
        let dispatcher = Dispatcher::new(registry.clone(), EventBus::new(16));

        let outcome = dispatcher
            .dispatch(r#"{"type":"work_session_created","data":{"employeeId":3}}"#)
            .await
            .unwrap();

        let expected: HashSet<CacheKey> = [
            CacheKey::AdminDashboard,
            CacheKey::RecentSessions,
            CacheKey::ActiveSession,
            CacheKey::ActiveBreak,
        ]
        .into_iter()
        .collect();
        assert_eq!(registry.stale_keys().await, expected);
        assert_eq!(outcome.invalidated.len(), 4);
        assert!(outcome.notification.is_none());
    }

    #[tokio::test]
    async fn test_each_known_event_marks_exactly_its_targets() {
        for kind in EventKind::KNOWN.iter() {
            let registry = primed_registry().await;
            let dispatcher = Dispatcher::new(registry.clone(), EventBus::new(16));
            let frame = json!({ "type": kind.as_str(), "data": {} }).to_string();

            let outcome = dispatcher.dispatch(&frame).await.unwrap();

            let expected: HashSet<CacheKey> =
                crate::invalidation::invalidation_targets(kind).iter().copied().collect();
            let mut stale = HashSet::new();
            for key in CacheKey::ALL {
                if registry.peek(key).await.is_stale {
                    stale.insert(key);
                }
            }
            assert_eq!(stale, expected, "{}", kind);
            assert_eq!(
                outcome.invalidated.iter().copied().collect::<HashSet<_>>(),
                expected,
                "{}",
                kind
            );
        }
    }

    #[tokio::test]
    async fn test_same_event_twice_is_idempotent() {
        let registry = primed_registry().await;
        let dispatcher = Dispatcher::new(registry.clone(), EventBus::new(16));
        let frame = r#"{"type":"vacation_request_updated"}"#;

        dispatcher.dispatch(frame).await.unwrap();
        let once = registry.stale_keys().await;
        dispatcher.dispatch(frame).await.unwrap();
        assert_eq!(registry.stale_keys().await, once);
    }

    #[tokio::test]
    async fn test_message_event_emits_notification() {
        let registry = primed_registry().await;
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let dispatcher = Dispatcher::new(registry.clone(), bus);

        let outcome = dispatcher
            .dispatch(r#"{"type":"message_received","data":{"senderName":"Ana"}}"#)
            .await
            .unwrap();

        assert_eq!(
            outcome.notification.map(|n| n.body).as_deref(),
            Some("Ana te ha enviado un mensaje")
        );
        match rx.try_recv().unwrap() {
            ClientEvent::Notification { notification } => {
                assert_eq!(notification.body, "Ana te ha enviado un mensaje")
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(registry.stale_keys().await.contains(&CacheKey::UnreadMessages));
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_frames_leave_cache_untouched() {
        let registry = primed_registry().await;
        let dispatcher = Dispatcher::new(registry.clone(), EventBus::new(16));

        assert!(dispatcher.dispatch("{not json").await.is_err());
        let outcome = dispatcher
            .dispatch(r#"{"type":"shift_swapped","data":{}}"#)
            .await
            .unwrap();
        assert!(outcome.invalidated.is_empty());
        assert!(registry.stale_keys().await.is_empty());

        let counts = dispatcher.counts();
        assert_eq!(counts.malformed, 1);
        assert_eq!(counts.unrecognized, 1);
        assert_eq!(counts.dispatched, 1);
    }

    #[tokio::test]
    async fn test_unregistered_targets_are_skipped() {
        let registry = CacheRegistry::new();
        registry
            .register(
                CacheKey::WorkReports,
                fetcher(|| async { Ok(json!([])) }),
                RefreshPolicy::default(),
            )
            .await;
        let dispatcher = Dispatcher::new(registry.clone(), EventBus::new(4));

        let outcome = dispatcher
            .dispatch(r#"{"type":"work_report_created"}"#)
            .await
            .unwrap();
        assert_eq!(outcome.invalidated, vec![CacheKey::WorkReports]);
    }
}
