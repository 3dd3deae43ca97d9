//! Test utilities for realtime channel tests
//!
//! Spins up a local axum WebSocket server that mimics the gym backend's
//! `/<primary>/ws/<secondary>/<gym_id>` endpoints. Tests push frames to
//! connected clients and observe what the client sends back.

#![allow(dead_code)]

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use realtime_lib::{ChannelConfig, ConnectionState, RealtimeChannel, ReconnectPolicy};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

/// Instructions for every connected socket
#[derive(Debug, Clone)]
pub enum ServerCmd {
    /// Send a text frame
    Text(String),
    /// Send a binary frame
    Binary(Vec<u8>),
    /// Start a close handshake and wait for the client's reply
    CloseFrame,
    /// Drop the socket without a close handshake
    Kick,
}

/// What the server observed
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Connected { path: String },
    Frame(String),
    Closed,
    /// The client answered our close frame
    CloseAcknowledged,
}

#[derive(Clone)]
struct ServerState {
    cmds: broadcast::Sender<ServerCmd>,
    events: mpsc::UnboundedSender<ServerEvent>,
}

pub struct TestServer {
    pub addr: SocketAddr,
    cmds: broadcast::Sender<ServerCmd>,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl TestServer {
    pub async fn start() -> Self {
        let (cmds, _) = broadcast::channel(64);
        let (events_tx, events) = mpsc::unbounded_channel();
        let state = ServerState {
            cmds: cmds.clone(),
            events: events_tx,
        };

        let app = Router::new()
            .route("/{primary}/ws/{secondary}/{gym_id}", get(ws_handler))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, cmds, events }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Channel config pointing at this server with fast timers
    pub fn config(&self, keepalive: Duration) -> ChannelConfig {
        let mut config = ChannelConfig::new(self.base_url());
        config.secure = false;
        config.keepalive_interval = keepalive;
        config.reconnect = ReconnectPolicy::fixed(Duration::from_millis(50));
        config
    }

    pub fn send_text(&self, text: &str) {
        self.cmds.send(ServerCmd::Text(text.to_string())).unwrap();
    }

    pub fn send_binary(&self, data: &[u8]) {
        self.cmds.send(ServerCmd::Binary(data.to_vec())).unwrap();
    }

    pub fn kick(&self) {
        self.cmds.send(ServerCmd::Kick).unwrap();
    }

    pub fn close(&self) {
        self.cmds.send(ServerCmd::CloseFrame).unwrap();
    }

    /// Next event, failing the test after `secs` seconds
    pub async fn next_event(&mut self, secs: u64, what: &str) -> ServerEvent {
        timeout(Duration::from_secs(secs), self.events.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
            .expect("server event channel closed")
    }

    /// Skip events until the next connection and return its path
    pub async fn next_connection(&mut self) -> String {
        loop {
            if let ServerEvent::Connected { path } = self.next_event(5, "connection").await {
                return path;
            }
        }
    }

    /// Skip events until the next text frame from the client
    pub async fn next_frame(&mut self) -> String {
        loop {
            if let ServerEvent::Frame(text) = self.next_event(5, "client frame").await {
                return text;
            }
        }
    }

    /// Assert nothing at all arrives for `millis`
    pub async fn assert_quiet(&mut self, millis: u64) {
        if let Ok(event) = timeout(Duration::from_millis(millis), self.events.recv()).await {
            panic!("expected no server events, got {event:?}");
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((primary, secondary, gym_id)): Path<(String, String, String)>,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    let path = format!("/{primary}/ws/{secondary}/{gym_id}");
    ws.on_upgrade(move |socket| handle_socket(socket, state, path))
}

async fn handle_socket(mut socket: WebSocket, state: ServerState, path: String) {
    let mut cmds = state.cmds.subscribe();
    let _ = state.events.send(ServerEvent::Connected { path });

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = state.events.send(ServerEvent::Frame(text.as_str().to_string()));
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    let _ = state.events.send(ServerEvent::Closed);
                    return;
                }
                Some(Ok(_)) => {}
            },
            cmd = cmds.recv() => match cmd {
                Ok(ServerCmd::Text(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        let _ = state.events.send(ServerEvent::Closed);
                        return;
                    }
                }
                Ok(ServerCmd::Binary(data)) => {
                    if socket.send(Message::Binary(data.into())).await.is_err() {
                        let _ = state.events.send(ServerEvent::Closed);
                        return;
                    }
                }
                Ok(ServerCmd::CloseFrame) => {
                    let event = close_handshake(&mut socket).await;
                    let _ = state.events.send(event);
                    return;
                }
                Ok(ServerCmd::Kick) | Err(_) => {
                    let _ = state.events.send(ServerEvent::Closed);
                    return;
                }
            },
        }
    }
}

async fn close_handshake(socket: &mut WebSocket) -> ServerEvent {
    let frame = CloseFrame {
        code: close_code::NORMAL,
        reason: "server restart".into(),
    };
    if socket.send(Message::Close(Some(frame))).await.is_err() {
        return ServerEvent::Closed;
    }
    loop {
        match timeout(Duration::from_secs(2), socket.recv()).await {
            Ok(Some(Ok(Message::Close(_)))) => return ServerEvent::CloseAcknowledged,
            Ok(Some(Ok(_))) => continue,
            _ => return ServerEvent::Closed,
        }
    }
}

/// Wait until the channel reports `wanted`
pub async fn wait_for_state(channel: &RealtimeChannel, wanted: ConnectionState) {
    let mut rx = channel.watch_state();
    timeout(Duration::from_secs(5), rx.wait_for(|s| *s == wanted))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {wanted}"))
        .expect("state channel closed");
}
