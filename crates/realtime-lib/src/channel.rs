// ==================
// crates/realtime-lib/src/channel.rs
// ==================
//! Realtime channel manager.
//!
//! A [`RealtimeChannel`] owns at most one WebSocket to the gym backend and
//! fans every parsed inbound frame out to its subscribers. It provides:
//! - Lazy connect once a gym identifier is known
//! - A `{}` heartbeat on a fixed cadence while the socket is open
//! - Reconnection after unexpected closes, paced by a [`ReconnectPolicy`]
//! - Teardown that stops the heartbeat and closes the socket
//!
//! The socket, the heartbeat interval and the reconnect loop all live in a
//! single worker task. The public handle talks to it over a control channel
//! and observes it through a `watch` channel carrying [`ConnectionState`].
//!
//! Subscribers are never told about reconnects; they just stop receiving
//! frames during a gap. Callers that need to show connectivity can watch the
//! state instead.

use crate::error::RealtimeError;
use crate::identity::ChannelIdentity;
use crate::metrics::{
    CONNECTIONS_OPEN, FRAMES_MALFORMED, FRAMES_RECEIVED, HEARTBEATS_SENT, RECONNECT_ATTEMPTS,
};
use crate::reconnect::ReconnectPolicy;
use crate::registry::{SubscriberRegistry, Subscription};
use crate::tls;
use futures_util::{SinkExt, StreamExt};
use gympulse_common::{ChannelRoute, InboundMessage, KEEPALIVE_FRAME};
use metrics::{counter, gauge};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, info_span, warn, Instrument};
use url::Url;

/// Default heartbeat cadence
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// Upper bound on waiting for the close frame to flush during teardown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection settings shared by every channel built from one configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// REST base URL; its scheme is replaced by `ws`/`wss`
    pub api_base_url: String,
    /// Use `wss` (the default) instead of plain `ws`
    pub secure: bool,
    pub keepalive_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl ChannelConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            secure: true,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Lifecycle of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No gym identifier yet
    Idle,
    /// First connection attempt in flight
    Connecting,
    Open,
    /// Socket dropped; waiting for or performing retry `attempt`
    Reconnecting { attempt: u32 },
    /// Retry budget spent; stays here until stopped
    Exhausted,
    /// Stopped by the owning scope; terminal
    TornDown,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => f.write_str("idle"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Open => f.write_str("open"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            ConnectionState::Exhausted => f.write_str("exhausted"),
            ConnectionState::TornDown => f.write_str("torn down"),
        }
    }
}

/// Commands that can be sent to the connection worker
#[derive(Debug, Clone, Copy)]
enum ControlCommand {
    /// Graceful shutdown
    Shutdown,
}

struct WorkerHandle {
    cmd_tx: mpsc::Sender<ControlCommand>,
    task: JoinHandle<()>,
}

/// One shared, reconnecting socket plus its subscriber registry.
pub struct RealtimeChannel {
    config: ChannelConfig,
    route: ChannelRoute,
    registry: Arc<SubscriberRegistry>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    identity: Option<ChannelIdentity>,
    url: Option<Url>,
    worker: Option<WorkerHandle>,
}

impl RealtimeChannel {
    /// Create an idle channel for `route`. Nothing connects until [`start`](Self::start).
    pub fn new(config: ChannelConfig, route: ChannelRoute) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            config,
            route,
            registry: SubscriberRegistry::new(),
            state_tx: Arc::new(state_tx),
            identity: None,
            url: None,
            worker: None,
        }
    }

    /// Register a callback for every inbound message on this channel.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.registry.subscribe(callback)
    }

    /// Subscribe through an unbounded queue, for async consumers.
    ///
    /// Dropping the receiver unsubscribes at the next inbound message.
    pub fn listen(&self) -> (Subscription, mpsc::UnboundedReceiver<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = tx.clone();
        let subscription = self.registry.subscribe_until(
            move |msg: &InboundMessage| {
                let _ = tx.send(msg.clone());
            },
            move || watcher.is_closed(),
        );
        (subscription, rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Scope became active.
    ///
    /// With no usable gym id the channel stays idle and `Ok(false)` is
    /// returned; call again once the id is known. Must be called from within
    /// a tokio runtime.
    pub fn start(&mut self, gym_id: Option<&str>) -> Result<bool, RealtimeError> {
        if self.worker.is_some() {
            return Err(RealtimeError::AlreadyStarted);
        }
        let Some(identity) = ChannelIdentity::resolve(gym_id, &self.route) else {
            debug!(route = %self.route, "no gym id yet, channel stays idle");
            return Ok(false);
        };
        let url = identity.url(&self.config.api_base_url, self.config.secure)?;
        if self.config.secure {
            tls::install_default_provider();
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        self.state_tx.send_replace(ConnectionState::Connecting);

        let worker = ConnectionWorker {
            url: url.clone(),
            keepalive_interval: self.config.keepalive_interval,
            reconnect: self.config.reconnect,
            registry: Arc::clone(&self.registry),
            state_tx: Arc::clone(&self.state_tx),
            cmd_rx,
        };
        let span = info_span!("realtime", gym_id = %identity.gym_id, route = %identity.route);
        let task = tokio::spawn(worker.run().instrument(span));

        info!(%url, "realtime channel started");
        self.identity = Some(identity);
        self.url = Some(url);
        self.worker = Some(WorkerHandle { cmd_tx, task });
        Ok(true)
    }

    /// Scope became inactive: stop the heartbeat, close the socket, drop all
    /// subscribers. The channel cannot be restarted afterwards.
    pub async fn stop(mut self) {
        if let Some(worker) = self.worker.take() {
            // a send error only means the worker already exited
            let _ = worker.cmd_tx.send(ControlCommand::Shutdown).await;
            if let Err(e) = worker.task.await {
                if e.is_panic() {
                    error!(error = %e, "realtime worker panicked");
                }
            }
        }
        self.registry.clear();
        self.state_tx.send_replace(ConnectionState::TornDown);
        info!(url = ?self.url.as_ref().map(Url::as_str), "realtime channel torn down");
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions; the receiver sees `TornDown` last.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// URL computed by `start`
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn identity(&self) -> Option<&ChannelIdentity> {
        self.identity.as_ref()
    }

    pub fn route(&self) -> &ChannelRoute {
        &self.route
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.task.abort();
            self.state_tx.send_replace(ConnectionState::TornDown);
        }
    }
}

/// One slot of the open-connections gauge, released on drop. Aborting the
/// worker drops it too.
struct OpenConnection;

impl OpenConnection {
    fn acquire() -> Self {
        gauge!(CONNECTIONS_OPEN).increment(1.0);
        Self
    }
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        gauge!(CONNECTIONS_OPEN).decrement(1.0);
    }
}

/// Why the open-connection loop returned
enum Exit {
    Shutdown,
    Dropped(RealtimeError),
}

struct ConnectionWorker {
    url: Url,
    keepalive_interval: Duration,
    reconnect: ReconnectPolicy,
    registry: Arc<SubscriberRegistry>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    cmd_rx: mpsc::Receiver<ControlCommand>,
}

impl ConnectionWorker {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            debug!(url = %self.url, attempt, "connecting");
            let connected = tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => {
                    debug!(?cmd, "shutdown while connecting");
                    return;
                }
                res = connect_async(self.url.as_str()) => res,
            };

            match connected {
                Ok((stream, response)) => {
                    debug!(status = ?response.status(), "handshake complete");
                    attempt = 0;
                    let open = OpenConnection::acquire();
                    self.state_tx.send_replace(ConnectionState::Open);
                    info!(url = %self.url, "realtime socket open");

                    let exit = self.pump(stream).await;
                    drop(open);
                    match exit {
                        Exit::Shutdown => return,
                        Exit::Dropped(e) => warn!(error = %e, "realtime socket dropped"),
                    }
                },
                Err(e) => warn!(error = %e, "realtime connect failed"),
            }

            attempt = attempt.saturating_add(1);
            let Some(delay) = self.reconnect.delay_for(attempt) else {
                error!(attempts = attempt - 1, url = %self.url, "giving up on realtime socket");
                self.state_tx.send_replace(ConnectionState::Exhausted);
                return;
            };
            counter!(RECONNECT_ATTEMPTS).increment(1);
            self.state_tx.send_replace(ConnectionState::Reconnecting { attempt });
            debug!(?delay, attempt, "waiting before reconnect");

            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => {
                    debug!(?cmd, "shutdown while waiting to reconnect");
                    return;
                }
                () = time::sleep(delay) => {}
            }
        }
    }

    /// Drive one open socket until it drops or shutdown is requested.
    async fn pump(&mut self, mut stream: WsStream) -> Exit {
        let period = self.keepalive_interval;
        let mut keepalive = time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => {
                    // a closed control channel means the handle is gone
                    debug!(?cmd, "closing realtime socket");
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "scope deactivated".into(),
                    };
                    if time::timeout(CLOSE_TIMEOUT, stream.close(Some(frame))).await.is_err() {
                        debug!("close frame not flushed in time");
                    }
                    return Exit::Shutdown;
                }
                _ = keepalive.tick() => {
                    if let Err(e) = stream.send(Message::Text(KEEPALIVE_FRAME.into())).await {
                        return Exit::Dropped(e.into());
                    }
                    counter!(HEARTBEATS_SENT).increment(1);
                    debug!("heartbeat sent");
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()),
                    Some(Ok(Message::Binary(data))) => {
                        debug!(len = data.len(), "ignoring binary frame");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "server closed realtime socket");
                        // send the close reply tungstenite queued
                        if time::timeout(CLOSE_TIMEOUT, stream.flush()).await.is_err() {
                            debug!("close reply not flushed in time");
                        }
                        return Exit::Dropped(RealtimeError::ConnectionClosed);
                    }
                    // tungstenite queues pongs for pings on its own
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Err(e)) => return Exit::Dropped(e.into()),
                    None => return Exit::Dropped(RealtimeError::ConnectionClosed),
                },
            }
        }
    }

    fn dispatch(&self, text: &str) {
        counter!(FRAMES_RECEIVED).increment(1);
        match InboundMessage::parse(text) {
            Ok(message) => {
                let delivered = self.registry.dispatch(&message);
                debug!(action = ?message.action_str(), delivered, "frame dispatched");
            },
            Err(e) => {
                counter!(FRAMES_MALFORMED).increment(1);
                warn!(error = %e, len = text.len(), "dropping malformed frame");
            },
        }
    }
}
