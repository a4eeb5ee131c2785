//! Signaling wire protocol
//!
//! JSON text frames exchanged with each peer over its WebSocket.

pub mod error;
pub mod message;

pub use error::ProtocolError;
pub use message::{IceCandidate, SdpType, SessionDescription, SignalMessage, SignalSender};
