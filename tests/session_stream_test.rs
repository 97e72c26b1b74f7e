// Integration tests for the streaming path, against an in-test loopback
// WebSocket server (tokio-tungstenite accept_async on an ephemeral port).
//
// The server side scripts the frames the real tracking backend would send:
// an initial snapshot on connect, then incremental updates. Tests assert
// the client-observable contract — store contents, status transitions,
// command delivery — not transport internals.

use fleetpulse::config::FleetpulseConfig;
use fleetpulse::session::TrackingSession;
use fleetpulse::status::ConnectionState;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

const INITIAL_FRAME: &str = r#"{
    "type": "initial",
    "locations": [
        {"entityId": "bike-001", "entityType": "bike", "latitude": 51.50,
         "longitude": -0.10, "timestamp": "2025-06-01T12:00:00Z"},
        {"entityId": "rider-002", "entityType": "rider", "latitude": 53.48,
         "longitude": -2.24, "timestamp": "2025-06-01T12:00:00Z"}
    ]
}"#;

const UPDATE_FRAME: &str = r#"{
    "type": "update",
    "location": {"entityId": "bike-001", "entityType": "bike", "latitude": 51.51,
                 "longitude": -0.11, "timestamp": "2025-06-01T12:01:00Z"}
}"#;

fn session_config(port: u16) -> FleetpulseConfig {
    let mut config = FleetpulseConfig::default();
    config.connection.ws_url = format!("ws://127.0.0.1:{}", port);
    config.connection.base_delay_ms = 50;
    config
}

async fn wait_for_status(
    rx: &mut watch::Receiver<ConnectionState>,
    wanted: ConnectionState,
) {
    let deadline = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *rx.borrow_and_update() == wanted {
                return;
            }
            rx.changed().await.expect("status channel closed");
        }
    });
    deadline.await.unwrap_or_else(|_| panic!("never reached {:?}", wanted));
}

async fn recv_update(
    rx: &mut tokio::sync::broadcast::Receiver<fleetpulse::location::LocationRecord>,
) -> fleetpulse::location::LocationRecord {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no update within 5s")
        .expect("update channel closed")
}

// ── snapshot + incremental flow ───────────────────────────────────────────────

#[tokio::test]
async fn test_snapshot_then_update_flow() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Server: send snapshot, a malformed frame, a server error frame, then
    // one real update; echo any received command to the test over a channel.
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        ws.send(Message::Text(INITIAL_FRAME.to_string())).await.unwrap();
        ws.send(Message::Text(r#"{"type":"bogus"}"#.to_string())).await.unwrap();
        ws.send(Message::Text(r#"{"type":"error","message":"hiccup"}"#.to_string()))
            .await
            .unwrap();
        ws.send(Message::Text(UPDATE_FRAME.to_string())).await.unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let _ = command_tx.send(text);
            }
        }
    });

    let session = TrackingSession::new(session_config(port));
    let mut status_rx = session.subscribe_status();
    let mut updates = session.store().subscribe_updates();

    session.start();
    wait_for_status(&mut status_rx, ConnectionState::Connected).await;

    // Snapshot applies each record individually, in listed order, then the
    // update replaces bike-001 only
    let first = recv_update(&mut updates).await;
    let second = recv_update(&mut updates).await;
    let third = recv_update(&mut updates).await;
    assert_eq!(first.entity_id, "bike-001");
    assert_eq!(second.entity_id, "rider-002");
    assert_eq!(third.entity_id, "bike-001");
    assert_eq!(third.latitude, 51.51);

    let store = session.store();
    assert_eq!(store.len(), 2);
    let ids: Vec<String> = store.all().into_iter().map(|r| r.entity_id).collect();
    assert_eq!(ids, vec!["bike-001", "rider-002"]);
    assert_eq!(store.get("bike-001").unwrap().latitude, 51.51);
    assert_eq!(store.get("rider-002").unwrap().latitude, 53.48);

    // The malformed and error frames were dropped without touching the
    // connection
    assert_eq!(session.status().current(), ConnectionState::Connected);

    // Outbound command path: serialized patch reaches the server
    let patch = fleetpulse::location::LocationPatch::new("rider-002")
        .with_position(53.49, -2.25);
    session.send_location(&patch).unwrap();

    let wire = tokio::time::timeout(Duration::from_secs(5), command_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(wire.contains("\"entityId\":\"rider-002\""));
    assert!(wire.contains("\"latitude\":53.49"));

    session.stop();
    assert_eq!(session.status().current(), ConnectionState::Disconnected);
}

// ── reconnection after server close ───────────────────────────────────────────

#[tokio::test]
async fn test_client_reconnects_and_rebuilds_from_new_snapshot() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        // First connection: snapshot, then hang up
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text(INITIAL_FRAME.to_string())).await.unwrap();
        ws.close(None).await.unwrap();
        drop(ws);

        // Second connection: a different world
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let replacement = r#"{
            "type": "initial",
            "locations": [
                {"entityId": "bike-777", "entityType": "bike", "latitude": 55.95,
                 "longitude": -3.19, "timestamp": "2025-06-01T13:00:00Z"}
            ]
        }"#;
        ws.send(Message::Text(replacement.to_string())).await.unwrap();

        // Keep the second connection open until the client leaves
        while ws.next().await.is_some() {}
    });

    let session = TrackingSession::new(session_config(port));
    let mut snapshots = session.store().subscribe_snapshots();

    session.start();

    // First snapshot arrives, then the server closes
    let first = tokio::time::timeout(Duration::from_secs(5), snapshots.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.len(), 2);

    // Backoff fires, the client reconnects and rebuilds from the new
    // snapshot. The snapshot itself is the sync point — the intermediate
    // Disconnected/Connecting states can be coalesced by the watch channel.
    let second = tokio::time::timeout(Duration::from_secs(5), snapshots.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].entity_id, "bike-777");

    let store = session.store();
    assert_eq!(store.len(), 1);
    assert!(store.get("bike-001").is_none());
    assert_eq!(store.get("bike-777").unwrap().latitude, 55.95);

    session.stop();
}

// ── exhaustion is terminal until a manual connect ─────────────────────────────

#[tokio::test]
async fn test_reconnect_exhaustion_stops_trying() {
    // No server at all; with a tiny base delay the schedule burns through
    // quickly: 10+20+40+80+160 ms of backoff, then the supervisor exits.
    let mut config = FleetpulseConfig::default();
    config.connection.ws_url = "ws://127.0.0.1:9".to_string();
    config.connection.base_delay_ms = 10;
    config.connection.max_attempts = 5;

    let session = TrackingSession::new(config);
    let mut status_rx = session.subscribe_status();
    session.start();

    // Drain transitions until they stop: the whole schedule is ~320 ms of
    // backoff plus instant connection refusals, so 500 ms of silence means
    // the supervisor has given up
    while tokio::time::timeout(Duration::from_millis(500), status_rx.changed())
        .await
        .is_ok()
    {}

    assert_eq!(session.status().current(), ConnectionState::Disconnected);

    // And it stays down: no further attempt is ever scheduled
    assert!(
        tokio::time::timeout(Duration::from_secs(1), status_rx.changed())
            .await
            .is_err()
    );

    let patch = fleetpulse::location::LocationPatch::new("bike-001");
    assert_eq!(
        session.send_location(&patch).unwrap_err(),
        fleetpulse::connection::SendError::NotConnected
    );

    session.stop();
}
