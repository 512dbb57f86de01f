//! Session channel
//!
//! One long-lived WebSocket per authenticated session. A single reader task
//! owns the socket: it connects, feeds frames to the [`Dispatcher`] in arrival
//! order, and reconnects with exponential backoff after a drop. Because
//! reconnects happen inside that one task, a drop can never leave two live
//! sockets behind.
//!
//! Lifecycle: `Connecting → Open → {Closed | Reconnecting → Connecting}`.
//! A failed connect is not fatal: interval polling in the registry keeps data
//! fresh until the channel comes back.

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wfm_common::config::ChannelConfig;
use wfm_common::events::{ClientEvent, ConnectionState, EventBus, Role};

use crate::backoff::Backoff;
use crate::dispatch::Dispatcher;
use crate::error::{Result, SyncError};

/// Build the channel URL from the REST base URL
///
/// `http` maps to `ws`, `https` to `wss`; the token travels as a query
/// parameter.
pub fn channel_url(server_url: &str, path: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(server_url)
        .map_err(|e| SyncError::Connection(format!("invalid server URL '{}': {}", server_url, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(SyncError::Connection(format!(
                "unsupported URL scheme '{}'",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| SyncError::Connection(format!("cannot switch '{}' to {}", server_url, scheme)))?;

    let base = url.path().trim_end_matches('/').to_string();
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    url.set_path(&format!("{}{}", base, path));
    url.query_pairs_mut().clear().append_pair("token", token);
    Ok(url)
}

/// Whether a session should open a channel at all
pub fn is_eligible(token: &str, role: Role, config: &ChannelConfig) -> bool {
    !token.trim().is_empty() && (role.is_privileged() || config.allow_employee_channel)
}

/// Handle to the session channel task
pub struct SessionChannel {
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionChannel {
    /// Open the channel (or a no-op channel for ineligible sessions)
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        server_url: &str,
        token: &str,
        role: Role,
        config: &ChannelConfig,
        dispatcher: Dispatcher,
    ) -> Result<Self> {
        if !is_eligible(token, role, config) {
            debug!(role = role.as_str(), "Session not eligible for a channel, polling only");
            return Ok(Self::noop());
        }

        let url = channel_url(server_url, &config.path, token)?;
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let cancel = CancellationToken::new();

        publish_state(&state_tx, dispatcher.bus(), ConnectionState::Connecting, 0, true);

        let task = tokio::spawn(run_channel(
            url,
            config.clone(),
            dispatcher,
            state_tx,
            cancel.clone(),
        ));

        Ok(Self {
            state_rx,
            cancel,
            task: Some(task),
        })
    }

    /// Channel that never connects
    pub fn noop() -> Self {
        let (_, state_rx) = watch::channel(ConnectionState::Closed);
        Self {
            state_rx,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.task.is_none()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Close the channel and wait for the reader task to finish
    ///
    /// Idempotent. No frame is dispatched after this returns.
    pub async fn teardown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Session channel task ended abnormally");
                }
            }
        }
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn publish_state(
    state_tx: &watch::Sender<ConnectionState>,
    bus: &EventBus,
    state: ConnectionState,
    attempt: u32,
    force: bool,
) {
    let previous = state_tx.send_replace(state);
    if force || previous != state {
        debug!(state = state.as_str(), attempt, "Session channel state changed");
        bus.emit_lossy(ClientEvent::ConnectionStateChanged {
            state,
            attempt,
            timestamp: chrono::Utc::now(),
        });
    }
}

/// URL without the token, for logs
fn redacted(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

enum StreamEnd {
    Cancelled,
    Lost(String),
}

async fn run_channel(
    url: Url,
    config: ChannelConfig,
    dispatcher: Dispatcher,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::from_config(&config);
    let bus = dispatcher.bus().clone();
    let target = redacted(&url);

    loop {
        publish_state(&state_tx, &bus, ConnectionState::Connecting, backoff.attempt(), false);

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((stream, _response)) => {
                backoff.reset();
                publish_state(&state_tx, &bus, ConnectionState::Open, 0, false);
                info!(url = %target, "Session channel open");

                match read_frames(stream, &dispatcher, &cancel).await {
                    StreamEnd::Cancelled => break,
                    StreamEnd::Lost(reason) => {
                        warn!(url = %target, reason = %reason, "Session channel lost")
                    }
                }
            }
            Err(e) => {
                warn!(
                    url = %target,
                    attempt = backoff.attempt(),
                    error = %e,
                    "Session channel connect failed, polling continues"
                );
            }
        }

        if !config.reconnect {
            info!("Reconnect disabled, session channel stays closed");
            break;
        }

        let Some(delay) = backoff.next_delay() else {
            warn!(
                attempts = backoff.attempt(),
                "Giving up on session channel, relying on polling"
            );
            break;
        };

        publish_state(&state_tx, &bus, ConnectionState::Reconnecting, backoff.attempt(), false);
        debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    publish_state(&state_tx, &bus, ConnectionState::Closed, 0, false);
    debug!("Session channel task finished");
}

async fn read_frames(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    dispatcher: &Dispatcher,
    cancel: &CancellationToken,
) -> StreamEnd {
    let (mut sink, mut source) = stream.split();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!(error = %e, "Close frame not delivered");
                }
                return StreamEnd::Cancelled;
            }
            next = source.next() => next,
        };

        match next {
            None => return StreamEnd::Lost("stream ended".to_string()),
            Some(Err(e)) => return StreamEnd::Lost(e.to_string()),
            Some(Ok(Message::Text(text))) => handle_frame(dispatcher, &text).await,
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => handle_frame(dispatcher, &text).await,
                Err(_) => warn!("Discarding non UTF-8 binary frame"),
            },
            Some(Ok(Message::Ping(payload))) => {
                if let Err(e) = sink.send(Message::Pong(payload)).await {
                    return StreamEnd::Lost(e.to_string());
                }
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .map(|f| format!("closed by server ({}): {}", u16::from(f.code), f.reason))
                    .unwrap_or_else(|| "closed by server".to_string());
                return StreamEnd::Lost(reason);
            }
            Some(Ok(_)) => {}
        }
    }
}

async fn handle_frame(dispatcher: &Dispatcher, text: &str) {
    if let Err(e) = dispatcher.dispatch(text).await {
        warn!(error = %e, "Discarding malformed event frame");
    }
}
