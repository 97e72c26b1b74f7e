use crate::animation::{MarkerAnimator, Position, RenderFrame};
use crate::api::TrackingApi;
use crate::config::FleetpulseConfig;
use crate::connection::{ConnectionManager, SendError};
use crate::location::{LocationPatch, LocationRecord};
use crate::status::{ConnectionState, StatusPublisher};
use crate::store::EntityStore;
use anyhow::Result;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};


/// One active tracking session: owns the entity store, the streaming
/// connection, the marker animator, and the HTTP API client.
///
/// Constructed once per session and passed by reference to consumers —
/// there is no ambient global state. `start` opens the stream and wires
/// store updates into the animator; `stop` tears everything down.
pub struct TrackingSession {
    config: FleetpulseConfig,
    store: Arc<EntityStore>,
    connection: Arc<ConnectionManager>,
    animator: Arc<MarkerAnimator>,
    api: TrackingApi,

    /// Task feeding store updates into the animator
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl TrackingSession {
    pub fn new(config: FleetpulseConfig) -> Self {
        let store = Arc::new(EntityStore::new());
        let connection = Arc::new(ConnectionManager::new(
            config.connection.clone(),
            Arc::clone(&store),
        ));
        let animator = Arc::new(MarkerAnimator::new(
            Duration::from_millis(config.animation.duration_ms),
            config.animation.steps,
        ));
        let api = TrackingApi::new(&config.api);

        Self {
            config,
            store,
            connection,
            animator,
            api,
            pump: Mutex::new(None),
        }
    }

    /// Open the streaming connection and start animating incoming updates.
    /// No-op if already started.
    pub fn start(&self) {
        let mut guard = self.pump.lock().unwrap();
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                debug!("start() ignored: session already running");
                return;
            }
        }

        info!("Starting tracking session");
        self.connection.connect();

        let mut updates = self.store.subscribe_updates();
        let animator = Arc::clone(&self.animator);
        *guard = Some(tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(record) => {
                        let position = Position::new(record.latitude, record.longitude);
                        animator.animate(&record.entity_id, position);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Animation pump lagged, skipped updates");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Tear the session down: close the socket (suppressing any pending
    /// reconnect), halt all pending animation steps, and stop the pump.
    pub fn stop(&self) {
        self.connection.disconnect();
        self.animator.shutdown();
        // Also runs from Drop, possibly during an unwind that poisoned the
        // lock; recover the guard rather than panic inside a panic
        let mut pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = pump.take() {
            handle.abort();
        }
        info!("Tracking session stopped");
    }

    /// HTTP fallback ingestion: fetch the full snapshot and write it through
    /// the store, exactly as an `initial` frame would. Returns the number of
    /// entities loaded.
    pub async fn refresh_snapshot(&self) -> Result<usize> {
        let locations = self.api.get_locations().await?;
        let count = locations.len();
        self.store.replace_all(locations);
        info!(count = count, "Loaded snapshot over HTTP");
        Ok(count)
    }

    /// Report this client's own position over the live socket.
    pub fn send_location(&self, patch: &LocationPatch) -> Result<(), SendError> {
        self.connection.send(patch)
    }

    /// Report this client's own position over HTTP (works while the socket
    /// is down).
    pub async fn post_location(&self, patch: &LocationPatch) -> Result<()> {
        self.api.post_update(patch).await
    }

    /// Staleness of a record against the configured threshold.
    pub fn is_stale(&self, record: &LocationRecord) -> bool {
        record.is_stale(
            chrono::Utc::now(),
            chrono::Duration::seconds(self.config.staleness.threshold_seconds),
        )
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn status(&self) -> &StatusPublisher {
        self.connection.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionState> {
        self.connection.status().subscribe()
    }

    /// Per-step marker positions for the map renderer.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<RenderFrame> {
        self.animator.subscribe_frames()
    }

    pub fn api(&self) -> &TrackingApi {
        &self.api
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        self.stop();
    }
}
