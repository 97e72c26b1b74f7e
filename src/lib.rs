// Location data model and staleness evaluation
pub mod location;

// Inbound frame codec
pub mod protocol;

// In-memory entity store
pub mod store;

// Connection status publishing
pub mod status;

// WebSocket connection lifecycle and reconnection
pub mod connection;

// Marker movement animation
pub mod animation;

// HTTP snapshot/command API client
pub mod api;

// Tracking session lifecycle
pub mod session;

// Configuration
pub mod config;
