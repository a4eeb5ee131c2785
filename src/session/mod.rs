//! Signaling sessions
//!
//! One session per transport connection. A session owns its media session,
//! negotiates with the peer using the perfect-negotiation pattern, and swaps
//! the track it sends when the relay's source changes.
//!
//! ```text
//!   connection task                       media event task
//!   ───────────────                       ────────────────
//!   text frame ──► Session::handle_message     MediaEvent
//!                        │                         │
//!                        └──────► Negotiator ◄─────┘
//!                                     │
//!                                SignalSender ──► connection task ──► peer
//! ```

pub mod context;
pub mod entry;
pub mod negotiation;
pub mod state;

pub use context::{ConnectionId, Role, SessionContext};
pub use entry::{Session, SessionHooks, TrackHook};
pub use negotiation::Negotiator;
pub use state::NegotiationState;
