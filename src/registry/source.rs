//! Source registry
//!
//! Holds at most one source session and the track it is currently sending.
//! Tracks reported by the source are handed to the [`SinkRegistry`], which is
//! the only coupling between the two registries.
//!
//! The sink fan-out runs on a publisher task owned by the registry, not on the
//! source session's event task, so source candidates and renegotiation keep
//! flowing while every sink switches. Tracks are published in the order the
//! source reported them.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, Mutex};

use crate::media::{MediaFactory, TrackHandle};
use crate::protocol::SignalSender;
use crate::server::SessionHandler;
use crate::session::{ConnectionId, Role, Session, SessionContext, SessionHooks, TrackHook};

use super::error::RegistryError;
use super::sink::SinkRegistry;

struct SourceSlot {
    session: Arc<Session>,
    track: Option<TrackHandle>,
}

/// Registry of the single source session
///
/// Lock order is source slot, then sink registry.
pub struct SourceRegistry {
    factory: Arc<dyn MediaFactory>,
    sinks: Arc<SinkRegistry>,
    slot: Mutex<Option<SourceSlot>>,
    /// Queue drained by the publisher task
    published: mpsc::UnboundedSender<(ConnectionId, TrackHandle)>,
    /// Handle given to track hooks so a session never keeps its registry alive
    this: Weak<SourceRegistry>,
}

impl SourceRegistry {
    /// Create an empty registry feeding `sinks`
    ///
    /// Must be called from within a tokio runtime; the publisher task stops
    /// when the registry is dropped.
    pub fn new(factory: Arc<dyn MediaFactory>, sinks: Arc<SinkRegistry>) -> Arc<Self> {
        Arc::new_cyclic(|this| {
            let (published, queue) = mpsc::unbounded_channel();
            tokio::spawn(run_publisher(this.clone(), queue));

            Self {
                factory,
                sinks,
                slot: Mutex::new(None),
                published,
                this: this.clone(),
            }
        })
    }

    /// The sink registry tracks are relayed to
    pub fn sinks(&self) -> &Arc<SinkRegistry> {
        &self.sinks
    }

    /// Connection of the live source, if any
    pub async fn current_connection(&self) -> Option<ConnectionId> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|slot| slot.session.connection())
    }

    /// Latest track reported by the live source
    pub async fn current_track(&self) -> Option<TrackHandle> {
        self.slot
            .lock()
            .await
            .as_ref()
            .and_then(|slot| slot.track.clone())
    }

    /// Record a track reported by `connection` and relay it to every sink
    ///
    /// Ignored unless `connection` is the live source.
    pub async fn publish_track(&self, connection: ConnectionId, track: TrackHandle) {
        let mut slot = self.slot.lock().await;

        match slot.as_mut() {
            Some(current) if current.session.connection() == connection => {
                current.track = Some(track.clone());
            }
            _ => {
                tracing::debug!(
                    connection = %connection,
                    track_id = track.id(),
                    "Ignoring track from inactive source"
                );
                return;
            }
        }

        tracing::info!(
            connection = %connection,
            track_id = track.id(),
            kind = %track.kind(),
            "Source track received"
        );

        self.sinks.switch_track(track).await;
    }

    fn track_hook(&self) -> TrackHook {
        let registry = self.this.clone();
        Arc::new(
            move |connection: ConnectionId, track: TrackHandle| -> BoxFuture<'static, ()> {
                let registry = registry.clone();
                Box::pin(async move {
                    if let Some(registry) = registry.upgrade() {
                        let _ = registry.published.send((connection, track));
                    }
                })
            },
        )
    }
}

/// Relay queued source tracks to the sinks, one at a time
async fn run_publisher(
    registry: Weak<SourceRegistry>,
    mut queue: mpsc::UnboundedReceiver<(ConnectionId, TrackHandle)>,
) {
    while let Some((connection, track)) = queue.recv().await {
        let Some(registry) = registry.upgrade() else {
            break;
        };
        registry.publish_track(connection, track).await;
    }

    tracing::debug!("Track publisher stopped");
}

#[async_trait]
impl SessionHandler for SourceRegistry {
    fn role(&self) -> Role {
        Role::Source
    }

    async fn open(
        &self,
        ctx: SessionContext,
        outbound: SignalSender,
    ) -> Result<Arc<Session>, RegistryError> {
        let mut slot = self.slot.lock().await;

        if let Some(current) = slot.as_ref() {
            return Err(RegistryError::SourceOccupied(current.session.connection()));
        }

        let (media, events) = self
            .factory
            .create_session(&ctx)
            .await
            .map_err(RegistryError::SessionSetup)?;

        let session = Session::start(
            ctx,
            media,
            events,
            outbound,
            SessionHooks::with_track_hook(self.track_hook()),
        );

        *slot = Some(SourceSlot {
            session: Arc::clone(&session),
            track: None,
        });

        tracing::info!(connection = %session.connection(), "Source registered");
        Ok(session)
    }

    async fn close(&self, connection: ConnectionId) {
        let session = {
            let mut slot = self.slot.lock().await;
            match slot.take() {
                Some(current) if current.session.connection() == connection => {
                    self.sinks.clear_track().await;
                    current.session
                }
                other => {
                    *slot = other;
                    return;
                }
            }
        };

        tracing::info!(connection = %connection, "Source unregistered");
        session.close().await;
    }
}
