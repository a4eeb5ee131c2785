//! WebRTC signaling relay
//!
//! Accepts one source peer and any number of sink peers over WebSocket
//! signaling, negotiates a WebRTC session with each using the
//! perfect-negotiation pattern, and fans the source's media out to every sink.
//!
//! # Architecture
//!
//! ```text
//!   source peer                                              sink peers
//!       │ ws :9002                                   ws :9003  │ │ │
//!       ▼                                                      ▼ ▼ ▼
//!  SignalServer<SourceRegistry>                 SignalServer<SinkRegistry>
//!       │                                                      │
//!       ▼                                                      ▼
//!  SourceRegistry ──── on_track: switch_track(track) ────► SinkRegistry
//!   (0 or 1 Session)                                   (N Sessions)
//!       │                                                      │
//!       ▼                                                      ▼
//!  Session ─ Negotiator ─ MediaSession          Session ─ Negotiator ─ MediaSession
//! ```
//!
//! # Example
//!
//! ```no_run
//! use webrtc_relay::{Relay, RelayConfig};
//!
//! #[tokio::main]
//! async fn main() -> webrtc_relay::Result<()> {
//!     let relay = Relay::bind_webrtc(RelayConfig::default()).await?;
//!     relay
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use media::{IceServer, MediaConfig, MediaFactory, MediaSession, WebRtcEngine};
pub use protocol::{IceCandidate, SessionDescription, SignalMessage};
pub use registry::{RegistryError, SinkRegistry, SourceRegistry};
pub use server::{Relay, RelayConfig, ServerConfig, SessionHandler, SignalServer};
pub use session::{ConnectionId, Role, Session};
