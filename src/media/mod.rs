//! Media engine boundary
//!
//! The relay never touches RTP itself except to mirror a source track. All
//! negotiation state lives in the engine; the relay drives it through the
//! [`MediaSession`] capability interface and listens to [`MediaEvent`]s.
//!
//! ```text
//!   MediaFactory ──create_session──► (Arc<dyn MediaSession>, MediaEvents)
//!                                          ▲                   │
//!                            set/add/remove│                   │ NegotiationNeeded(id)
//!                                          │                   │ IceCandidate
//!                                     Negotiator ◄─────────────┘ Track / SignalingChange
//! ```
//!
//! Events for one session are drained by exactly one task, so everything a
//! session does in response to its engine is serialized.

pub mod config;
pub mod engine;
pub mod track;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::protocol::{IceCandidate, SessionDescription};
use crate::session::SessionContext;

pub use config::{IceServer, MediaConfig};
pub use engine::{WebRtcEngine, WebRtcSession};
pub use track::{SenderHandle, TrackHandle};

/// Signaling state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    /// No offer/answer exchange in progress
    Stable,
    /// Local offer applied, waiting for an answer
    HaveLocalOffer,
    /// Remote offer applied, local answer pending
    HaveRemoteOffer,
    /// Local provisional answer applied
    HaveLocalPranswer,
    /// Remote provisional answer applied
    HaveRemotePranswer,
    /// Engine closed
    Closed,
}

impl std::fmt::Display for SignalingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SignalingState::Stable => "stable",
            SignalingState::HaveLocalOffer => "have-local-offer",
            SignalingState::HaveRemoteOffer => "have-remote-offer",
            SignalingState::HaveLocalPranswer => "have-local-pranswer",
            SignalingState::HaveRemotePranswer => "have-remote-pranswer",
            SignalingState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Notification from a media session
#[derive(Debug, Clone)]
pub enum MediaEvent {
    /// Local state changed in a way that needs an offer; ids increase monotonically
    NegotiationNeeded(u32),
    /// A locally gathered candidate to trickle to the peer
    IceCandidate(IceCandidate),
    /// The peer started sending a new media stream
    Track(TrackHandle),
    /// Signaling state transition (informational)
    SignalingChange(SignalingState),
}

/// Receiving half of a session's event stream
pub type MediaEvents = mpsc::UnboundedReceiver<MediaEvent>;

/// Media engine operation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    /// Engine or session could not be created
    #[error("engine error: {0}")]
    Engine(String),

    /// Local or remote description rejected
    #[error("description error: {0}")]
    Description(String),

    /// Candidate rejected
    #[error("candidate error: {0}")]
    Candidate(String),

    /// Track could not be attached or detached
    #[error("track error: {0}")]
    Track(String),

    /// No sender is attached under this handle
    #[error("no sender attached for {0}")]
    SenderNotFound(SenderHandle),

    /// Session already closed
    #[error("media session closed")]
    Closed,
}

/// Capability interface of one engine peer
#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Apply a description received from the peer
    async fn set_remote_description(&self, description: SessionDescription)
        -> Result<(), MediaError>;

    /// Generate and apply a local description
    ///
    /// The engine picks offer or answer from its current signaling state and
    /// returns what it applied.
    async fn set_local_description(&self) -> Result<SessionDescription, MediaError>;

    /// Apply a candidate received from the peer
    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), MediaError>;

    /// Attach an outbound track
    async fn add_track(&self, track: &TrackHandle) -> Result<SenderHandle, MediaError>;

    /// Detach a previously attached sender
    async fn remove_track(&self, sender: SenderHandle) -> Result<(), MediaError>;

    /// Current signaling state
    fn signaling_state(&self) -> SignalingState;

    /// Whether `id` is still the latest negotiation-needed request and
    /// signaling is stable
    fn should_fire_negotiation_needed(&self, id: u32) -> bool;

    /// Tear the peer down
    async fn close(&self) -> Result<(), MediaError>;
}

/// Creates one media session per relay session
#[async_trait]
pub trait MediaFactory: Send + Sync {
    /// Create a peer and the event stream it reports on
    async fn create_session(
        &self,
        ctx: &SessionContext,
    ) -> Result<(Arc<dyn MediaSession>, MediaEvents), MediaError>;
}
