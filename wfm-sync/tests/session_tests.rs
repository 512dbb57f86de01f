//! SyncSession integration tests: channel ownership, mutations and batch undo
//!
//! Runs against an in-process axum server that fakes both the REST endpoints
//! and the session channel.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wfm_common::config::ChannelConfig;
use wfm_common::events::{ClientEvent, ConnectionState, EventBus, NotificationLevel, Role};
use wfm_sync::{CacheKey, CacheRegistry, Credentials, SessionSettings, SyncError, SyncSession};

#[derive(Clone, Default)]
struct Fake {
    opened: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    auth_headers: Arc<Mutex<Vec<String>>>,
    deleted: Arc<Mutex<Vec<String>>>,
}

async fn ws_handler(ws: WebSocketUpgrade, State(fake): State<Fake>) -> Response {
    fake.opened.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(move |socket| hold_socket(socket, fake))
}

async fn hold_socket(mut socket: WebSocket, fake: Fake) {
    fake.live.fetch_add(1, Ordering::SeqCst);
    while let Some(Ok(message)) = socket.recv().await {
        if matches!(message, Message::Close(_)) {
            break;
        }
    }
    fake.live.fetch_sub(1, Ordering::SeqCst);
}

async fn empty_list() -> Json<serde_json::Value> {
    Json(json!([]))
}

async fn clock_in(State(fake): State<Fake>, headers: HeaderMap) -> Json<serde_json::Value> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    fake.auth_headers.lock().unwrap().push(auth);
    Json(json!({"id": 77, "userId": 5, "clockIn": "2025-03-03T08:00:00Z"}))
}

async fn start_break() -> Response {
    (
        StatusCode::CONFLICT,
        Json(json!({"message": "Ya hay una pausa activa"})),
    )
        .into_response()
}

async fn delete_document(State(fake): State<Fake>, Path(id): Path<String>) -> StatusCode {
    if id == "missing" {
        return StatusCode::NOT_FOUND;
    }
    fake.deleted.lock().unwrap().push(id);
    StatusCode::NO_CONTENT
}

async fn spawn_fake(fake: Fake) -> String {
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/admin/dashboard/summary", get(|| async { Json(json!({})) }))
        .route("/api/settings/company", get(|| async { Json(json!({"workingHoursPerDay": 8.0})) }))
        .route("/api/work-sessions/recent", get(empty_list))
        .route("/api/work-sessions/clock-in", post(clock_in))
        .route("/api/breaks/start", post(start_break))
        .route("/api/documents/:id", delete(delete_document))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn session(url: &str, role: Role, bus: EventBus) -> SyncSession {
    let settings = SessionSettings {
        server_url: url.to_string(),
        channel: ChannelConfig {
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            ..ChannelConfig::default()
        },
        banner_ttl: Duration::from_secs(5),
    };
    SyncSession::new(
        settings,
        Credentials {
            user_id: 5,
            role,
            token: "tok-session".to_string(),
        },
        CacheRegistry::new(),
        bus,
    )
    .unwrap()
}

async fn wait_for(check: impl Fn() -> bool) -> bool {
    for _ in 0..300 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_remount_never_leaves_two_channels() {
    let fake = Fake::default();
    let url = spawn_fake(fake.clone()).await;
    let session = session(&url, Role::Admin, EventBus::new(64));

    session.login().await.unwrap();
    assert!(wait_for(|| fake.live.load(Ordering::SeqCst) == 1).await);

    session.remount().await.unwrap();
    session.remount().await.unwrap();
    assert!(wait_for(|| fake.opened.load(Ordering::SeqCst) == 3).await);
    assert!(wait_for(|| fake.live.load(Ordering::SeqCst) == 1).await);

    // login on an active session also replaces the channel
    session.login().await.unwrap();
    assert!(wait_for(|| fake.opened.load(Ordering::SeqCst) == 4).await);
    assert!(wait_for(|| fake.live.load(Ordering::SeqCst) == 1).await);

    session.logout().await;
    assert_eq!(session.connection_state().await, ConnectionState::Closed);
    assert!(wait_for(|| fake.live.load(Ordering::SeqCst) == 0).await);
}

#[tokio::test]
async fn test_employee_session_polls_without_channel() {
    let fake = Fake::default();
    let url = spawn_fake(fake.clone()).await;
    let session = session(&url, Role::Employee, EventBus::new(64));

    session.login().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fake.opened.load(Ordering::SeqCst), 0);
    assert_eq!(session.connection_state().await, ConnectionState::Closed);
    assert!(session.registry().poller_count().await > 0);
    session.logout().await;
}

#[tokio::test]
async fn test_clock_in_invalidates_time_tracking_entries() {
    let fake = Fake::default();
    let url = spawn_fake(fake.clone()).await;
    let session = session(&url, Role::Admin, EventBus::new(64));
    session.login().await.unwrap();

    for key in CacheKey::ALL {
        session.registry().prime(key, json!({})).await;
    }

    let work_session = session.clock_in().await.unwrap();
    assert_eq!(work_session.id, 77);
    assert!(work_session.is_active());

    let stale = session.registry().stale_keys().await;
    for key in [
        CacheKey::ActiveSession,
        CacheKey::ActiveBreak,
        CacheKey::AdminDashboard,
        CacheKey::RecentSessions,
    ] {
        assert!(stale.contains(&key), "{} should be stale", key);
    }
    assert!(!stale.contains(&CacheKey::Messages));
    assert_eq!(
        *fake.auth_headers.lock().unwrap(),
        vec!["Bearer tok-session".to_string()]
    );
    session.logout().await;
}

#[tokio::test]
async fn test_failed_mutation_emits_toast_and_banner() {
    let fake = Fake::default();
    let url = spawn_fake(fake.clone()).await;
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let session = session(&url, Role::Admin, bus);
    session.login().await.unwrap();
    session.registry().prime(CacheKey::ActiveBreak, json!(null)).await;

    let err = session.start_break().await.unwrap_err();
    match err {
        SyncError::Server { status, message } => {
            assert_eq!(status, 409);
            assert_eq!(message, "Ya hay una pausa activa");
        }
        other => panic!("unexpected error {:?}", other),
    }

    // Nothing was invalidated by the failed mutation
    assert!(!session
        .registry()
        .stale_keys()
        .await
        .contains(&CacheKey::ActiveBreak));

    let mut saw_failure = false;
    while let Ok(event) = rx.try_recv() {
        if let ClientEvent::MutationFailed { action, .. } = event {
            assert_eq!(action, "start_break");
            saw_failure = true;
        }
    }
    assert!(saw_failure);

    assert!(
        wait_for(|| session
            .banner()
            .map_or(false, |b| b.level == NotificationLevel::Error))
        .await
    );
    session.logout().await;
    assert!(session.banner().is_none());
}

#[tokio::test]
async fn test_batch_undo_reports_partial_failure() {
    let fake = Fake::default();
    let url = spawn_fake(fake.clone()).await;
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let session = session(&url, Role::Admin, bus);

    let ids = vec!["d1".to_string(), "missing".to_string(), "d3".to_string()];
    let err = session.undo_document_batch(&ids).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::PartialBatchFailure {
            succeeded: 2,
            failed: 1
        }
    ));
    assert_eq!(*fake.deleted.lock().unwrap(), vec!["d1", "d3"]);

    let mut reported = None;
    while let Ok(event) = rx.try_recv() {
        if let ClientEvent::BatchUndoCompleted {
            succeeded, failed, ..
        } = event
        {
            reported = Some((succeeded, failed));
        }
    }
    assert_eq!(reported, Some((2, 1)));

    let all_ok = session
        .undo_document_batch(&["d4".to_string()])
        .await
        .unwrap();
    assert_eq!(all_ok, 1);
}
