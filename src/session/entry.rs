//! Relay session
//!
//! A [`Session`] binds one transport connection to one media session. It owns
//! the media event task, the negotiation engine and the sender of the track
//! currently attached to the peer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::media::{MediaError, MediaEvent, MediaEvents, MediaSession, SenderHandle, TrackHandle};
use crate::protocol::SignalSender;

use super::context::{ConnectionId, Role, SessionContext};
use super::negotiation::Negotiator;

/// Callback invoked for every remote track the peer starts sending
pub type TrackHook = Arc<dyn Fn(ConnectionId, TrackHandle) -> BoxFuture<'static, ()> + Send + Sync>;

/// Optional callbacks installed when a session starts
#[derive(Clone, Default)]
pub struct SessionHooks {
    /// Remote track handler; sessions without one ignore incoming tracks
    pub on_track: Option<TrackHook>,
}

impl SessionHooks {
    /// Hooks with a track handler
    pub fn with_track_hook(on_track: TrackHook) -> Self {
        Self {
            on_track: Some(on_track),
        }
    }
}

/// One signaling session
pub struct Session {
    ctx: SessionContext,
    media: Arc<dyn MediaSession>,
    negotiator: Arc<Negotiator>,
    sender: Mutex<Option<SenderHandle>>,
    events: StdMutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Session {
    /// Start a session and its media event task
    pub fn start(
        ctx: SessionContext,
        media: Arc<dyn MediaSession>,
        events: MediaEvents,
        outbound: SignalSender,
        hooks: SessionHooks,
    ) -> Arc<Self> {
        let negotiator = Arc::new(Negotiator::new(&ctx, Arc::clone(&media), outbound));

        let task = tokio::spawn(dispatch_events(
            ctx.connection,
            Arc::clone(&negotiator),
            events,
            hooks,
        ));

        tracing::info!(
            connection = %ctx.connection,
            role = %ctx.role,
            peer_addr = %ctx.peer_addr,
            "Session started"
        );

        Arc::new(Self {
            ctx,
            media,
            negotiator,
            sender: Mutex::new(None),
            events: StdMutex::new(Some(task)),
            closed: AtomicBool::new(false),
        })
    }

    /// Connection this session belongs to
    pub fn connection(&self) -> ConnectionId {
        self.ctx.connection
    }

    /// Listener role the session was opened under
    pub fn role(&self) -> Role {
        self.ctx.role
    }

    /// Connection metadata
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Negotiation engine driving this session
    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    /// Whether [`Session::close`] has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sender of the currently attached track, if any
    pub async fn current_sender(&self) -> Option<SenderHandle> {
        *self.sender.lock().await
    }

    /// Feed one inbound text frame to the negotiation engine
    pub async fn handle_message(&self, text: &str) {
        if self.is_closed() {
            tracing::debug!(connection = %self.ctx.connection, "Dropping message for closed session");
            return;
        }
        self.negotiator.handle_message(text).await;
    }

    /// Replace the outgoing track with `track`
    ///
    /// Removes the previous sender, then attaches `track`. Runs under the
    /// signaling lock so it never interleaves with remote-description
    /// application. The engine raises negotiation-needed on its own.
    pub async fn switch_track(&self, track: &TrackHandle) -> Result<SenderHandle, MediaError> {
        if self.is_closed() {
            return Err(MediaError::Closed);
        }

        let _signaling = self.negotiator.lock_signaling().await;
        let mut current = self.sender.lock().await;

        if let Some(previous) = current.take() {
            match self.media.remove_track(previous).await {
                Ok(()) => {}
                Err(MediaError::SenderNotFound(_)) => {
                    tracing::debug!(connection = %self.ctx.connection, sender = %previous, "Previous sender already gone");
                }
                Err(e) => {
                    tracing::warn!(
                        connection = %self.ctx.connection,
                        sender = %previous,
                        error = %e,
                        "Failed to remove previous track"
                    );
                    *current = Some(previous);
                    return Err(e);
                }
            }
        }

        let sender = self.media.add_track(track).await?;
        *current = Some(sender);

        tracing::info!(
            connection = %self.ctx.connection,
            track_id = track.id(),
            sender = %sender,
            "Track attached"
        );

        Ok(sender)
    }

    /// Tear the session down
    ///
    /// Stops event processing and closes the media session. Safe to call more
    /// than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(task) = self.events.lock().ok().and_then(|mut guard| guard.take()) {
            task.abort();
        }

        if let Err(e) = self.media.close().await {
            tracing::warn!(connection = %self.ctx.connection, error = %e, "Failed to close media session");
        }

        let stats = self.negotiator.stats().snapshot();
        tracing::info!(
            connection = %self.ctx.connection,
            role = %self.ctx.role,
            duration_secs = stats.duration.as_secs(),
            messages_received = stats.messages_received,
            messages_sent = stats.messages_sent,
            negotiations = stats.negotiations,
            offers_ignored = stats.offers_ignored,
            failures = stats.failures,
            "Session closed"
        );
    }
}

/// Process engine events in order until the engine drops its sender
async fn dispatch_events(
    connection: ConnectionId,
    negotiator: Arc<Negotiator>,
    mut events: MediaEvents,
    hooks: SessionHooks,
) {
    while let Some(event) = events.recv().await {
        match event {
            MediaEvent::NegotiationNeeded(id) => negotiator.on_negotiation_needed(id).await,
            MediaEvent::IceCandidate(candidate) => negotiator.on_local_candidate(candidate),
            MediaEvent::Track(track) => match &hooks.on_track {
                Some(hook) => hook(connection, track).await,
                None => {
                    tracing::debug!(connection = %connection, track_id = track.id(), "Ignoring remote track");
                }
            },
            MediaEvent::SignalingChange(state) => {
                tracing::debug!(connection = %connection, state = %state, "Signaling state changed");
            }
        }
    }

    tracing::debug!(connection = %connection, "Media events ended");
}
