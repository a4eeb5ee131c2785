//! Perfect-negotiation engine
//!
//! Drives one media session from the signaling messages of its peer and from
//! the engine's own negotiation-needed and candidate events.
//!
//! Two tasks feed a [`Negotiator`]: the connection task (inbound frames, in
//! order) and the session's media event task (engine callbacks, in order).
//! They may interleave with each other, which is what lets an incoming offer
//! observe `making_offer` while a local offer is still being generated.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::media::{MediaSession, SignalingState};
use crate::protocol::{IceCandidate, SessionDescription, SignalMessage, SignalSender};
use crate::stats::SignalingStats;

use super::context::{ConnectionId, Role, SessionContext};
use super::state::NegotiationState;

/// Negotiation engine for one session
pub struct Negotiator {
    connection: ConnectionId,
    role: Role,
    media: Arc<dyn MediaSession>,
    state: NegotiationState,
    outbound: SignalSender,
    /// Held across remote-description application and track switches
    signaling: Mutex<()>,
    stats: SignalingStats,
}

impl Negotiator {
    /// Create an engine for `media`, replying over `outbound`
    pub fn new(ctx: &SessionContext, media: Arc<dyn MediaSession>, outbound: SignalSender) -> Self {
        Self {
            connection: ctx.connection,
            role: ctx.role,
            media,
            state: NegotiationState::new(ctx.role.is_polite()),
            outbound,
            signaling: Mutex::new(()),
            stats: SignalingStats::new(),
        }
    }

    /// Negotiation flags
    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    /// Signaling counters
    pub fn stats(&self) -> &SignalingStats {
        &self.stats
    }

    /// Serialize an engine operation against remote-description application
    pub(crate) async fn lock_signaling(&self) -> MutexGuard<'_, ()> {
        self.signaling.lock().await
    }

    /// Handle one inbound text frame
    pub async fn handle_message(&self, text: &str) {
        self.stats.message_received();

        let message = match SignalMessage::decode(text) {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::debug!(connection = %self.connection, "Ignoring message without a known key");
                return;
            }
            Err(e) => {
                self.stats.failure();
                tracing::warn!(
                    connection = %self.connection,
                    role = %self.role,
                    error = %e,
                    "Dropping malformed signaling message"
                );
                return;
            }
        };

        tracing::debug!(connection = %self.connection, kind = message.kind(), "Signaling message received");

        match message {
            SignalMessage::Description(description) => self.on_remote_description(description).await,
            SignalMessage::Candidate(candidate) => self.on_remote_candidate(candidate).await,
        }
    }

    /// Handle a negotiation-needed event from the engine
    ///
    /// Only the latest outstanding id produces an offer, so a burst of events
    /// collapses into one negotiation. Events arriving outside `stable` are
    /// dropped too; the engine raises a fresh one once signaling settles.
    pub async fn on_negotiation_needed(&self, id: u32) {
        if !self.media.should_fire_negotiation_needed(id) {
            self.stats.negotiation_stale();
            tracing::debug!(connection = %self.connection, id = id, "Dropping stale negotiation-needed event");
            return;
        }

        self.stats.negotiation_started();
        self.state.set_making_offer(true);
        let result = self.media.set_local_description().await;
        self.state.set_making_offer(false);

        match result {
            Ok(description) => {
                tracing::info!(
                    connection = %self.connection,
                    role = %self.role,
                    id = id,
                    kind = %description.kind,
                    "Sending local description"
                );
                self.send(SignalMessage::Description(description));
            }
            Err(e) => {
                self.stats.failure();
                tracing::warn!(
                    connection = %self.connection,
                    role = %self.role,
                    id = id,
                    error = %e,
                    "Failed to create local offer"
                );
            }
        }
    }

    /// Trickle a locally gathered candidate to the peer
    pub fn on_local_candidate(&self, candidate: IceCandidate) {
        self.send(SignalMessage::Candidate(candidate));
    }

    async fn on_remote_description(&self, description: SessionDescription) {
        let is_offer = description.is_offer();

        // The collision check must see any offer a track switch produced while we waited
        let _signaling = self.lock_signaling().await;
        let signaling_state = self.media.signaling_state();

        if self
            .state
            .evaluate_incoming(is_offer, signaling_state == SignalingState::Stable)
        {
            self.stats.offer_ignored();
            tracing::debug!(
                connection = %self.connection,
                making_offer = self.state.making_offer(),
                signaling_state = %signaling_state,
                "Ignoring colliding offer"
            );
            return;
        }

        if let Err(e) = self.media.set_remote_description(description).await {
            self.stats.failure();
            tracing::warn!(
                connection = %self.connection,
                role = %self.role,
                error = %e,
                "Failed to apply remote description"
            );
            return;
        }

        if !is_offer {
            return;
        }

        match self.media.set_local_description().await {
            Ok(answer) => {
                tracing::info!(connection = %self.connection, role = %self.role, "Sending answer");
                self.send(SignalMessage::Description(answer));
            }
            Err(e) => {
                self.stats.failure();
                tracing::warn!(
                    connection = %self.connection,
                    role = %self.role,
                    error = %e,
                    "Failed to create answer"
                );
            }
        }
    }

    async fn on_remote_candidate(&self, candidate: IceCandidate) {
        match self.media.add_candidate(candidate).await {
            Ok(()) => self.stats.candidate_applied(),
            // Candidates of an ignored offer are expected to fail
            Err(e) if self.state.ignore_offer() => {
                tracing::debug!(connection = %self.connection, error = %e, "Candidate for ignored offer rejected");
            }
            Err(e) => {
                self.stats.failure();
                tracing::warn!(
                    connection = %self.connection,
                    role = %self.role,
                    error = %e,
                    "Failed to apply remote candidate"
                );
            }
        }
    }

    fn send(&self, message: SignalMessage) {
        match self.outbound.send(&message) {
            Ok(()) => self.stats.message_sent(),
            Err(e) => {
                tracing::debug!(
                    connection = %self.connection,
                    kind = message.kind(),
                    error = %e,
                    "Signaling message not delivered"
                );
            }
        }
    }
}
