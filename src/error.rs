//! Crate-level error type

use tokio_tungstenite::tungstenite;

use crate::media::MediaError;
use crate::protocol::ProtocolError;
use crate::registry::RegistryError;

/// Result type alias using the relay [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by listeners, connections and relay startup
///
/// Per-session failures (bad messages, engine operation failures) never reach
/// this type; they are logged where they happen and the session continues.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket bind/accept failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket handshake or framing failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Media engine failure (fatal only at startup)
    #[error("Media engine error: {0}")]
    Media(#[from] MediaError),

    /// Session registration failure
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Wire message failure
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
}
