//! Sync session
//!
//! Owns everything one logged-in user needs: the cache registry with its
//! standard entries, the dispatcher, at most one session channel, the REST
//! client and the temporary banner. Mutations go through here so the right
//! entries are invalidated and failures reach the UI as toasts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wfm_common::api::{BreakPeriod, WorkSession};
use wfm_common::config::{ChannelConfig, TomlConfig};
use wfm_common::events::{ClientEvent, ConnectionState, EventBus, Notification, Role};

use crate::channel::SessionChannel;
use crate::client::{ApiClient, CircularReceipt, CircularRequest, UploadRequest, UploadedDocument};
use crate::dispatch::Dispatcher;
use crate::error::{Result, SyncError};
use crate::expiring::ExpiringValue;
use crate::keys::CacheKey;
use crate::registry::{fetcher, CacheRegistry, RefreshPolicy};

const DEFAULT_BANNER_TTL: Duration = Duration::from_secs(5);

/// Entries touched by any clock or break mutation
const TIME_TRACKING_KEYS: &[CacheKey] = &[
    CacheKey::ActiveSession,
    CacheKey::ActiveBreak,
    CacheKey::AdminDashboard,
    CacheKey::RecentSessions,
];

const DOCUMENT_KEYS: &[CacheKey] = &[
    CacheKey::Documents,
    CacheKey::DocumentNotifications,
    CacheKey::AdminDashboard,
];

/// Who is logged in
#[derive(Clone)]
pub struct Credentials {
    pub user_id: i64,
    pub role: Role,
    pub token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub server_url: String,
    pub channel: ChannelConfig,
    /// How long a banner stays visible
    pub banner_ttl: Duration,
}

impl SessionSettings {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            channel: ChannelConfig::default(),
            banner_ttl: DEFAULT_BANNER_TTL,
        }
    }

    /// Resolve from the bootstrap config (CLI > ENV > TOML > default)
    pub fn from_config(config: &TomlConfig, cli_server_url: Option<&str>) -> Self {
        Self {
            server_url: config.resolve_server_url(cli_server_url),
            channel: config.channel.clone(),
            banner_ttl: DEFAULT_BANNER_TTL,
        }
    }
}

/// Refresh policy of each standard entry
pub fn standard_policy(key: CacheKey) -> RefreshPolicy {
    match key {
        CacheKey::AdminDashboard => RefreshPolicy::stale_after(Duration::from_secs(30))
            .with_refetch_interval(Duration::from_secs(60)),
        CacheKey::ActiveSession | CacheKey::ActiveBreak => RefreshPolicy::default()
            .with_refetch_interval(Duration::from_secs(30))
            .with_background_refetch(),
        CacheKey::CompanySettings => RefreshPolicy::stale_after(Duration::from_secs(600)),
        CacheKey::RecentSessions => RefreshPolicy::stale_after(Duration::from_secs(30))
            .depends_on(CacheKey::CompanySettings),
        CacheKey::Messages => RefreshPolicy::stale_after(Duration::from_secs(30)),
        CacheKey::UnreadMessages => RefreshPolicy::stale_after(Duration::from_secs(30))
            .with_refetch_interval(Duration::from_secs(60)),
        CacheKey::Documents
        | CacheKey::DocumentNotifications
        | CacheKey::VacationRequests
        | CacheKey::ModificationRequests
        | CacheKey::WorkReports
        | CacheKey::Reminders => RefreshPolicy::stale_after(Duration::from_secs(60)),
    }
}

/// Register the standard entries backed by `client`
///
/// Employees do not get the admin dashboard.
pub async fn register_standard_entries(registry: &CacheRegistry, client: &ApiClient, role: Role) {
    for key in CacheKey::ALL {
        if key == CacheKey::AdminDashboard && !role.is_privileged() {
            continue;
        }
        let client = client.clone();
        registry
            .register(
                key,
                fetcher(move || {
                    let client = client.clone();
                    async move { client.fetch_entry(key).await.map_err(|e| e.to_string()) }
                }),
                standard_policy(key),
            )
            .await;
    }
}

/// Logged-in session façade
pub struct SyncSession {
    settings: SessionSettings,
    credentials: Credentials,
    registry: CacheRegistry,
    dispatcher: Dispatcher,
    bus: EventBus,
    client: ApiClient,
    channel: Mutex<Option<SessionChannel>>,
    banner: Arc<ExpiringValue<Notification>>,
    banner_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncSession {
    /// Build a session around an existing registry and bus
    pub fn new(
        settings: SessionSettings,
        credentials: Credentials,
        registry: CacheRegistry,
        bus: EventBus,
    ) -> Result<Self> {
        let client = ApiClient::new(&settings.server_url, &credentials.token)?;
        let dispatcher = Dispatcher::new(registry.clone(), bus.clone());
        Ok(Self {
            settings,
            credentials,
            registry,
            dispatcher,
            bus,
            client,
            channel: Mutex::new(None),
            banner: Arc::new(ExpiringValue::new()),
            banner_task: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Register entries, open the channel and start polling
    ///
    /// Calling `login` again tears the previous channel down first.
    pub async fn login(&self) -> Result<()> {
        info!(
            user_id = self.credentials.user_id,
            role = self.credentials.role.as_str(),
            "Starting sync session"
        );
        register_standard_entries(&self.registry, &self.client, self.credentials.role).await;
        self.start_banner_listener().await;
        self.open_channel().await?;
        self.registry.start_polling().await;
        Ok(())
    }

    /// Re-open the channel (e.g. after the view was re-mounted)
    pub async fn remount(&self) -> Result<()> {
        debug!("Remounting session channel");
        self.open_channel().await
    }

    /// Tear everything down
    pub async fn logout(&self) {
        self.close_channel().await;
        self.registry.shutdown().await;
        if let Some(task) = self.banner_task.lock().await.take() {
            task.abort();
        }
        self.banner.clear();
        info!(user_id = self.credentials.user_id, "Sync session closed");
    }

    async fn open_channel(&self) -> Result<()> {
        let mut slot = self.channel.lock().await;
        if let Some(mut previous) = slot.take() {
            previous.teardown().await;
        }
        let channel = SessionChannel::open(
            &self.settings.server_url,
            &self.credentials.token,
            self.credentials.role,
            &self.settings.channel,
            self.dispatcher.clone(),
        )?;
        *slot = Some(channel);
        Ok(())
    }

    async fn close_channel(&self) {
        if let Some(mut channel) = self.channel.lock().await.take() {
            channel.teardown().await;
        }
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.channel
            .lock()
            .await
            .as_ref()
            .map_or(ConnectionState::Closed, |c| c.state())
    }

    /// Currently visible banner, if any
    pub fn banner(&self) -> Option<Notification> {
        self.banner.get()
    }

    /// Show a temporary banner
    pub fn show_banner(&self, notification: Notification) {
        self.banner.set(notification, self.settings.banner_ttl);
    }

    async fn start_banner_listener(&self) {
        let mut slot = self.banner_task.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let mut rx = self.bus.subscribe();
        let banner = self.banner.clone();
        let ttl = self.settings.banner_ttl;
        *slot = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(notification) = banner_for(&event) {
                            banner.set(notification, ttl);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Banner listener lagged behind client events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    async fn mutate<T, F>(&self, action: &str, keys: &[CacheKey], call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match call.await {
            Ok(value) => {
                let invalidated = self.registry.invalidate_many(keys).await;
                debug!(action, invalidated = invalidated.len(), "Mutation succeeded");
                Ok(value)
            }
            Err(e) => {
                warn!(action, error = %e, "Mutation failed");
                self.bus.emit_lossy(ClientEvent::MutationFailed {
                    action: action.to_string(),
                    message: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                Err(e)
            }
        }
    }

    pub async fn clock_in(&self) -> Result<WorkSession> {
        self.mutate("clock_in", TIME_TRACKING_KEYS, self.client.clock_in())
            .await
    }

    pub async fn clock_out(&self) -> Result<WorkSession> {
        self.mutate("clock_out", TIME_TRACKING_KEYS, self.client.clock_out())
            .await
    }

    pub async fn start_break(&self) -> Result<BreakPeriod> {
        self.mutate("start_break", TIME_TRACKING_KEYS, self.client.start_break())
            .await
    }

    pub async fn end_break(&self) -> Result<BreakPeriod> {
        self.mutate("end_break", TIME_TRACKING_KEYS, self.client.end_break())
            .await
    }

    pub async fn upload_document(&self, upload: UploadRequest) -> Result<UploadedDocument> {
        self.mutate("upload_document", DOCUMENT_KEYS, self.client.upload_document(upload))
            .await
    }

    pub async fn send_circular(&self, circular: CircularRequest) -> Result<CircularReceipt> {
        self.mutate("send_circular", DOCUMENT_KEYS, self.client.send_circular(circular))
            .await
    }

    /// Delete every document of a circular batch
    ///
    /// Each deletion is attempted independently. The outcome is reported on
    /// the bus; `PartialBatchFailure` is returned if any deletion failed.
    pub async fn undo_document_batch(&self, document_ids: &[String]) -> Result<usize> {
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        for id in document_ids {
            match self.client.delete_document(id).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    warn!(document_id = %id, error = %e, "Could not delete document of batch");
                    failed += 1;
                }
            }
        }

        info!(succeeded, failed, "Batch undo finished");
        self.bus.emit_lossy(ClientEvent::BatchUndoCompleted {
            succeeded,
            failed,
            timestamp: chrono::Utc::now(),
        });
        self.registry.invalidate_many(DOCUMENT_KEYS).await;

        if failed > 0 {
            return Err(SyncError::PartialBatchFailure { succeeded, failed });
        }
        Ok(succeeded)
    }
}

/// Banner text for client events that deserve one
fn banner_for(event: &ClientEvent) -> Option<Notification> {
    match event {
        ClientEvent::Notification { notification } => Some(notification.clone()),
        ClientEvent::MutationFailed { action, message, .. } => Some(
            Notification::error("No se pudo completar la acción", message.clone())
                .with_source(action.clone()),
        ),
        ClientEvent::BatchUndoCompleted {
            succeeded, failed, ..
        } => Some(if *failed == 0 {
            Notification::success(
                "Envío deshecho",
                format!("Se han eliminado {} documentos", succeeded),
            )
        } else {
            Notification::error(
                "Envío deshecho parcialmente",
                format!(
                    "Se han eliminado {} documentos, {} no se pudieron eliminar",
                    succeeded, failed
                ),
            )
        }),
        ClientEvent::ConnectionStateChanged { .. }
        | ClientEvent::ClassificationNeedsReview { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_sessions_wait_for_settings() {
        assert_eq!(
            standard_policy(CacheKey::RecentSessions).depends_on,
            Some(CacheKey::CompanySettings)
        );
    }

    #[test]
    fn test_only_clock_state_polls_in_background() {
        for key in CacheKey::ALL {
            let policy = standard_policy(key);
            let expected = matches!(key, CacheKey::ActiveSession | CacheKey::ActiveBreak);
            assert_eq!(policy.background_refetch_allowed, expected, "{}", key);
        }
    }

    #[test]
    fn test_batch_undo_banner_reports_counts() {
        let banner = banner_for(&ClientEvent::BatchUndoCompleted {
            succeeded: 2,
            failed: 1,
            timestamp: chrono::Utc::now(),
        })
        .unwrap();
        assert!(banner.body.contains("2"));
        assert!(banner.body.contains("1 no se pudieron"));
    }

    #[test]
    fn test_credentials_debug_hides_token() {
        let credentials = Credentials {
            user_id: 1,
            role: Role::Admin,
            token: "super-secret".into(),
        };
        assert!(!format!("{:?}", credentials).contains("super-secret"));
    }

    #[tokio::test]
    async fn test_employee_registration_skips_dashboard() {
        let registry = CacheRegistry::new();
        let client = ApiClient::new("http://127.0.0.1:9", "t").unwrap();
        register_standard_entries(&registry, &client, Role::Employee).await;
        assert!(!registry.is_registered(CacheKey::AdminDashboard).await);
        assert!(registry.is_registered(CacheKey::ActiveSession).await);
    }
}
