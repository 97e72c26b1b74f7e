use crate::location::LocationPatch;
use crate::protocol::{self, InboundMessage};
use crate::status::{ConnectionState, StatusPublisher};
use crate::store::EntityStore;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

mod backoff;

use backoff::ReconnectState;

/// Connection settings for the streaming socket.
#[derive(Clone, Debug, Deserialize)]
pub struct ConnectionConfig {
    /// WebSocket endpoint
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Base reconnect delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum automatic reconnect attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_ws_url() -> String {
    "ws://localhost:8080/api/tracking/ws".to_string()
}

fn default_base_delay_ms() -> u64 {
    3000
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Why a command could not be sent.
#[derive(Debug, Clone, PartialEq)]
pub enum SendError {
    /// No live connection; nothing was written
    NotConnected,
    /// Patch carries an out-of-bounds coordinate; nothing was written
    InvalidCoordinates,
    /// Command failed to serialize
    Encode(String),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::NotConnected => write!(f, "no live connection"),
            SendError::InvalidCoordinates => {
                write!(f, "patch coordinates outside WGS84 bounds")
            }
            SendError::Encode(e) => write!(f, "failed to encode command: {}", e),
        }
    }
}

impl std::error::Error for SendError {}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owns the lifecycle of the streaming socket: connect, frame dispatch,
/// close detection, and reconnection with exponential backoff.
///
/// All socket I/O runs on a single supervisor task; the store and status
/// publisher are the only state it shares, and both are exposed read-only.
pub struct ConnectionManager {
    config: ConnectionConfig,
    store: Arc<EntityStore>,
    status: StatusPublisher,
    reconnect: Mutex<ReconnectState>,

    /// Writer-half handle, present only while a socket is open
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,

    /// Supervisor task; aborting it cancels any pending backoff sleep and
    /// drops the socket
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, store: Arc<EntityStore>) -> Self {
        let reconnect = ReconnectState::new(
            Duration::from_millis(config.base_delay_ms),
            config.max_attempts,
        );

        Self {
            config,
            store,
            status: StatusPublisher::new(),
            reconnect: Mutex::new(reconnect),
            outbound: Mutex::new(None),
            supervisor: Mutex::new(None),
        }
    }

    pub fn status(&self) -> &StatusPublisher {
        &self.status
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// Open the streaming connection.
    ///
    /// No-op while a supervisor task is already alive (connecting or
    /// connected). After reconnect exhaustion the supervisor has exited, so
    /// calling this again starts a fresh manual attempt; the attempt counter
    /// is only reset by a successful connection.
    pub fn connect(self: &Arc<Self>) {
        let mut guard = self.supervisor.lock().unwrap();
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                debug!("connect() ignored: connection already active");
                return;
            }
        }

        let manager = Arc::clone(self);
        *guard = Some(tokio::spawn(manager.run()));
    }

    /// Explicit close: cancels any pending reconnect attempt, drops the
    /// socket, and publishes `Disconnected`.
    pub fn disconnect(&self) {
        // Reached from session Drop, where the locks may be poisoned by an
        // unwinding panic; recover the guards instead of double-panicking
        let handle = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.status.publish(ConnectionState::Disconnected);
        info!("Streaming connection closed by caller");
    }

    /// Serialize and transmit a command over the live socket.
    ///
    /// Returns `SendError::NotConnected` without writing anything when no
    /// connection exists; never panics and never drops silently.
    pub fn send(&self, patch: &LocationPatch) -> Result<(), SendError> {
        if !patch.coordinates_valid() {
            return Err(SendError::InvalidCoordinates);
        }

        let guard = self.outbound.lock().unwrap();
        let tx = guard.as_ref().ok_or(SendError::NotConnected)?;

        let json =
            serde_json::to_string(patch).map_err(|e| SendError::Encode(e.to_string()))?;

        tx.send(json).map_err(|_| SendError::NotConnected)
    }

    /// Supervisor loop: connect, pump frames until the socket dies, then
    /// back off and retry until the attempt ceiling is hit.
    async fn run(self: Arc<Self>) {
        loop {
            self.status.publish(ConnectionState::Connecting);
            info!(url = %self.config.ws_url, "Opening streaming connection");

            match connect_async(self.config.ws_url.as_str()).await {
                Ok((socket, _response)) => {
                    self.status.publish(ConnectionState::Connected);
                    self.reconnect.lock().unwrap().reset();
                    info!("Streaming connection established");

                    self.pump(socket).await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to open streaming connection");
                }
            }

            *self.outbound.lock().unwrap() = None;
            self.status.publish(ConnectionState::Disconnected);

            let delay = self.reconnect.lock().unwrap().next_delay();
            match delay {
                Some(delay) => {
                    let attempt = self.reconnect.lock().unwrap().attempts();
                    info!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Scheduling reconnect"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(
                        max_attempts = self.config.max_attempts,
                        "Reconnect attempts exhausted; call connect() to retry"
                    );
                    break;
                }
            }
        }
    }

    /// Frame pump for one live socket: dispatches inbound frames and drains
    /// queued outbound commands until error or close.
    async fn pump(&self, socket: WsStream) {
        let (mut write, mut read) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        *self.outbound.lock().unwrap() = Some(tx);

        loop {
            tokio::select! {
                inbound = read.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                warn!(error = %e, "Failed to send pong");
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("Server closed the streaming connection");
                            break;
                        }
                        Some(Ok(_)) => {
                            // Binary and pong frames carry nothing for us
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Transport error");
                            break;
                        }
                        None => {
                            info!("Streaming connection ended");
                            break;
                        }
                    }
                }

                command = rx.recv() => {
                    match command {
                        Some(json) => {
                            if let Err(e) = write.send(Message::Text(json)).await {
                                warn!(error = %e, "Failed to send command");
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    }

    /// Decode one frame and apply it to the store.
    ///
    /// A malformed frame or a server error frame is logged and dropped; it
    /// never tears down the connection.
    fn handle_frame(&self, raw: &str) {
        match protocol::decode(raw) {
            Ok(InboundMessage::Initial { locations }) => {
                info!(count = locations.len(), "Applying initial snapshot");
                self.store.replace_all(locations);
            }
            Ok(InboundMessage::Update { location }) => {
                debug!(entity_id = %location.entity_id, "Applying location update");
                self.store.upsert(location);
            }
            Ok(InboundMessage::Error { message }) => {
                warn!(message = %message, "Server reported an error");
            }
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
            }
        }
    }
}
