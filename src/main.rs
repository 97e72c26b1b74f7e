use anyhow::Result;
use fleetpulse::config::{self, FleetpulseConfig};
use fleetpulse::session::TrackingSession;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetpulse=info".into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => config::load_config(&path)?,
        None => {
            info!("No config file given, using defaults");
            FleetpulseConfig::default()
        }
    };

    info!(ws_url = %config.connection.ws_url, "Fleetpulse starting...");

    let session = TrackingSession::new(config);
    let mut status_rx = session.subscribe_status();
    let mut updates = session.store().subscribe_updates();

    session.start();

    // Log connection transitions
    let status_task = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = *status_rx.borrow();
            info!(status = %status, "Connection status changed");
        }
    });

    // Log applied location updates
    let update_task = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(record) => {
                    info!(
                        entity_id = %record.entity_id,
                        entity_type = %record.entity_type,
                        latitude = record.latitude,
                        longitude = record.longitude,
                        "Location update"
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Update logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    session.stop();
    status_task.abort();
    update_task.abort();

    Ok(())
}
