use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Health of the streaming connection. Written only by the connection
/// manager; read by anyone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Broadcast-only publisher of the current connection state.
///
/// Backed by a watch channel: late subscribers read the last published
/// value immediately, and publication never blocks on slow readers.
pub struct StatusPublisher {
    tx: watch::Sender<ConnectionState>,
}

impl StatusPublisher {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    /// Publish a new state. Suppressed when unchanged so subscribers only
    /// wake on real transitions.
    pub fn publish(&self, state: ConnectionState) {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Current state, readable without subscribing.
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_disconnected() {
        let publisher = StatusPublisher::new();
        assert_eq!(publisher.current(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_late_subscriber_reads_current_value() {
        let publisher = StatusPublisher::new();
        publisher.publish(ConnectionState::Connecting);
        publisher.publish(ConnectionState::Connected);

        // Subscribed after the transitions, still sees the latest state
        let rx = publisher.subscribe();
        assert_eq!(*rx.borrow(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_observe_transition() {
        let publisher = StatusPublisher::new();
        let mut rx1 = publisher.subscribe();
        let mut rx2 = publisher.subscribe();

        publisher.publish(ConnectionState::Connecting);

        rx1.changed().await.unwrap();
        rx2.changed().await.unwrap();
        assert_eq!(*rx1.borrow(), ConnectionState::Connecting);
        assert_eq!(*rx2.borrow(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_republishing_same_state_does_not_wake_subscribers() {
        let publisher = StatusPublisher::new();
        let mut rx = publisher.subscribe();
        let _ = rx.borrow_and_update();

        publisher.publish(ConnectionState::Disconnected);
        assert!(!rx.has_changed().unwrap());
    }
}
