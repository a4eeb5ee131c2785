//! WebSocket signaling listeners
//!
//! One [`SignalServer`] per role. Each accepted connection runs in its own
//! task; the [`SessionHandler`] (a registry) decides whether the connection
//! gets a session.

pub mod config;
pub mod connection;
pub mod handler;
pub mod listener;
pub mod relay;

pub use config::{RelayConfig, ServerConfig, DEFAULT_SINK_PORT, DEFAULT_SOURCE_PORT};
pub use handler::SessionHandler;
pub use listener::SignalServer;
pub use relay::Relay;
