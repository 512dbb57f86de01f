//! wfm-sync - Dashboard synchronization agent
//!
//! Logs in as the given user, keeps the standard cache entries fresh through
//! the session channel and interval polling, and logs every client event
//! until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wfm_common::config::{TomlConfig, ENV_SERVER_URL};
use wfm_common::events::{ClientEvent, EventBus, Role};
use wfm_sync::{CacheRegistry, Credentials, SessionSettings, SyncSession};

#[derive(Parser, Debug)]
#[command(name = "wfm-sync")]
#[command(about = "Real-time dashboard synchronization agent")]
#[command(version)]
struct Args {
    /// REST server base URL
    #[arg(short, long, env = ENV_SERVER_URL)]
    server: Option<String>,

    /// Session token
    #[arg(short, long, env = "WFM_TOKEN", hide_env_values = true)]
    token: String,

    /// Role of the logged-in user (admin, manager, employee)
    #[arg(short, long, default_value = "admin")]
    role: Role,

    /// Id of the logged-in user
    #[arg(short, long, default_value_t = 0)]
    user_id: i64,

    /// Bootstrap TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load(args.config.as_deref());

    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    info!(
        "Starting WFM sync agent (wfm-sync) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = config.context("Failed to load configuration")?;
    let settings = SessionSettings::from_config(&config, args.server.as_deref());
    info!("Server: {}", settings.server_url);

    let bus = EventBus::default();
    let events = bus.subscribe();
    let logger = tokio::spawn(log_client_events(events));

    let session = SyncSession::new(
        settings,
        Credentials {
            user_id: args.user_id,
            role: args.role,
            token: args.token,
        },
        CacheRegistry::new(),
        bus,
    )
    .context("Failed to create sync session")?;

    if let Err(e) = session.login().await {
        error!("Failed to start session: {}", e);
        return Err(e.into());
    }

    shutdown_signal().await;

    session.logout().await;
    logger.abort();
    info!("Shutdown complete");
    Ok(())
}

async fn log_client_events(mut rx: broadcast::Receiver<ClientEvent>) {
    loop {
        match rx.recv().await {
            Ok(ClientEvent::Notification { notification }) => {
                info!(source = ?notification.source_event, "{}: {}", notification.title, notification.body)
            }
            Ok(ClientEvent::ConnectionStateChanged { state, attempt, .. }) => {
                info!(attempt, "Channel {}", state.as_str())
            }
            Ok(ClientEvent::MutationFailed { action, message, .. }) => {
                warn!(action = %action, "Mutation failed: {}", message)
            }
            Ok(ClientEvent::BatchUndoCompleted {
                succeeded, failed, ..
            }) => info!(succeeded, failed, "Batch undo completed"),
            Ok(ClientEvent::ClassificationNeedsReview { file_name, .. }) => {
                info!(file = %file_name, "Classification needs review")
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event log lagged")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
