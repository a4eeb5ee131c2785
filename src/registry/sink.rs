//! Sink registry
//!
//! Holds every live sink session and the track currently relayed to them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::Mutex;

use crate::media::{MediaFactory, TrackHandle};
use crate::protocol::SignalSender;
use crate::server::SessionHandler;
use crate::session::{ConnectionId, Role, Session, SessionContext, SessionHooks};

use super::error::RegistryError;

#[derive(Default)]
struct SinkState {
    /// Track attached to new sinks; absent until the source reports one
    current_track: Option<TrackHandle>,
    sessions: HashMap<ConnectionId, Arc<Session>>,
}

/// Registry of sink sessions
///
/// The lock is held across every read-modify-write of the map and the
/// current track, including the attach performed for a new sink and the
/// whole fan-out of a switch. A sink that registers during a switch therefore
/// either takes part in the switch or sees the new track on registration.
pub struct SinkRegistry {
    factory: Arc<dyn MediaFactory>,
    state: Mutex<SinkState>,
}

impl SinkRegistry {
    /// Create an empty registry opening media sessions from `factory`
    pub fn new(factory: Arc<dyn MediaFactory>) -> Self {
        Self {
            factory,
            state: Mutex::new(SinkState::default()),
        }
    }

    /// Add a session, attaching the current track first if there is one
    pub async fn register(&self, session: Arc<Session>) {
        let mut state = self.state.lock().await;

        if let Some(track) = state.current_track.clone() {
            if let Err(e) = session.switch_track(&track).await {
                tracing::warn!(
                    connection = %session.connection(),
                    track_id = track.id(),
                    error = %e,
                    "Failed to attach current track to new sink"
                );
            }
        }

        state.sessions.insert(session.connection(), Arc::clone(&session));

        tracing::info!(
            connection = %session.connection(),
            sinks = state.sessions.len(),
            "Sink registered"
        );
    }

    /// Remove a session; returns it if it was registered
    pub async fn unregister(&self, connection: ConnectionId) -> Option<Arc<Session>> {
        let mut state = self.state.lock().await;
        let session = state.sessions.remove(&connection);

        if session.is_some() {
            tracing::info!(
                connection = %connection,
                sinks = state.sessions.len(),
                "Sink unregistered"
            );
        }

        session
    }

    /// Make `track` current and switch every sink to it
    ///
    /// Each sink is switched independently and concurrently; a failure on one
    /// sink is logged and does not affect the others. Returns the number of
    /// sinks that now carry `track`.
    pub async fn switch_track(&self, track: TrackHandle) -> usize {
        let mut state = self.state.lock().await;
        state.current_track = Some(track.clone());

        let sessions: Vec<Arc<Session>> = state.sessions.values().cloned().collect();
        let results = join_all(sessions.iter().map(|session| session.switch_track(&track))).await;

        let mut attached = 0;
        for (session, result) in sessions.iter().zip(results) {
            match result {
                Ok(_) => attached += 1,
                Err(e) => {
                    tracing::warn!(
                        connection = %session.connection(),
                        track_id = track.id(),
                        error = %e,
                        "Failed to switch sink track"
                    );
                }
            }
        }

        tracing::info!(
            track_id = track.id(),
            sinks = sessions.len(),
            attached = attached,
            "Switched sinks to new track"
        );

        attached
    }

    /// Forget the current track
    pub async fn clear_track(&self) {
        let mut state = self.state.lock().await;
        if state.current_track.take().is_some() {
            tracing::debug!("Cleared current sink track");
        }
    }

    /// Track attached to new sinks
    pub async fn current_track(&self) -> Option<TrackHandle> {
        self.state.lock().await.current_track.clone()
    }

    /// Number of registered sinks
    pub async fn len(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Whether no sinks are registered
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionHandler for SinkRegistry {
    fn role(&self) -> Role {
        Role::Sink
    }

    async fn open(
        &self,
        ctx: SessionContext,
        outbound: SignalSender,
    ) -> Result<Arc<Session>, RegistryError> {
        let (media, events) = self
            .factory
            .create_session(&ctx)
            .await
            .map_err(RegistryError::SessionSetup)?;

        let session = Session::start(ctx, media, events, outbound, SessionHooks::default());
        self.register(Arc::clone(&session)).await;
        Ok(session)
    }

    async fn close(&self, connection: ConnectionId) {
        if let Some(session) = self.unregister(connection).await {
            session.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::media::testing::{video_track, MediaCall, MockFactory, MOCK_OFFER};
    use crate::media::MediaEvent;
    use crate::protocol::{SessionDescription, SignalMessage};

    fn ctx(id: u64) -> SessionContext {
        SessionContext::new(
            ConnectionId::new(id),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 50000 + id as u16),
            Role::Sink,
        )
    }

    async fn open(registry: &SinkRegistry, id: u64) -> Arc<Session> {
        let (outbound, _rx) = SignalSender::channel();
        registry.open(ctx(id), outbound).await.unwrap()
    }

    fn setup() -> (SinkRegistry, Arc<MockFactory>) {
        let factory = MockFactory::new();
        let registry = SinkRegistry::new(Arc::clone(&factory) as Arc<dyn MediaFactory>);
        (registry, factory)
    }

    #[tokio::test]
    async fn test_sink_before_track_gets_no_attach() {
        let (registry, factory) = setup();

        open(&registry, 1).await;

        assert_eq!(registry.len().await, 1);
        assert!(factory.session(ConnectionId::new(1)).calls().is_empty());
    }

    #[tokio::test]
    async fn test_sink_after_track_is_attached_on_open() {
        let (registry, factory) = setup();

        assert_eq!(registry.switch_track(video_track("v1")).await, 0);
        let session = open(&registry, 1).await;

        assert_eq!(
            factory.session(ConnectionId::new(1)).calls(),
            vec![MediaCall::AddTrack("v1".into())]
        );
        assert!(session.current_sender().await.is_some());
    }

    #[tokio::test]
    async fn test_two_sinks_then_switch() {
        let (registry, factory) = setup();
        registry.switch_track(video_track("v1")).await;

        open(&registry, 1).await;
        open(&registry, 2).await;

        assert_eq!(registry.switch_track(video_track("v2")).await, 2);

        for id in [1, 2] {
            let calls = factory.session(ConnectionId::new(id)).calls();
            assert_eq!(calls.len(), 3);
            assert_eq!(calls[0], MediaCall::AddTrack("v1".into()));
            assert!(matches!(calls[1], MediaCall::RemoveTrack(_)));
            assert_eq!(calls[2], MediaCall::AddTrack("v2".into()));
        }
    }

    #[tokio::test]
    async fn test_switch_renegotiates_each_sink() {
        let (registry, factory) = setup();
        let (first_tx, mut first_rx) = SignalSender::channel();
        let (second_tx, mut second_rx) = SignalSender::channel();
        registry.open(ctx(1), first_tx).await.unwrap();
        let second = registry.open(ctx(2), second_tx).await.unwrap();

        // Sink 2 cannot produce an offer
        factory
            .session(ConnectionId::new(2))
            .fail_local
            .store(true, Ordering::SeqCst);

        assert_eq!(registry.switch_track(video_track("v1")).await, 2);

        // Each engine reports negotiation-needed for its own added track
        for id in [1, 2] {
            let connection = ConnectionId::new(id);
            let negotiation = factory.session(connection).raise_negotiation_needed();
            factory
                .events(connection)
                .send(MediaEvent::NegotiationNeeded(negotiation))
                .unwrap();
        }

        let offer = tokio::time::timeout(Duration::from_secs(1), first_rx.recv())
            .await
            .expect("sink 1 sent no offer")
            .unwrap();
        assert_eq!(
            SignalMessage::decode(&offer).unwrap(),
            Some(SignalMessage::Description(SessionDescription::offer(MOCK_OFFER)))
        );
        assert!(first_rx.try_recv().is_err());

        tokio::time::timeout(Duration::from_secs(1), async {
            while second.negotiator().stats().snapshot().failures == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("sink 2 never attempted an offer");
        assert!(second_rx.try_recv().is_err());
        assert!(!second.negotiator().state().making_offer());
    }

    #[tokio::test]
    async fn test_switch_failure_is_isolated() {
        let (registry, factory) = setup();
        for id in 1..=3 {
            open(&registry, id).await;
        }
        factory
            .session(ConnectionId::new(2))
            .fail_add_track
            .store(true, Ordering::SeqCst);

        assert_eq!(registry.switch_track(video_track("v1")).await, 2);

        for id in 1..=3 {
            let media = factory.session(ConnectionId::new(id));
            assert_eq!(media.count(|c| matches!(c, MediaCall::AddTrack(_))), 1);
        }

        // The failed sink recovers on the next switch
        factory
            .session(ConnectionId::new(2))
            .fail_add_track
            .store(false, Ordering::SeqCst);
        assert_eq!(registry.switch_track(video_track("v2")).await, 3);
    }

    #[tokio::test]
    async fn test_close_removes_once() {
        let (registry, factory) = setup();
        let session = open(&registry, 1).await;

        registry.close(ConnectionId::new(1)).await;
        registry.close(ConnectionId::new(1)).await;

        assert!(registry.is_empty().await);
        assert!(session.is_closed());
        assert_eq!(
            factory
                .session(ConnectionId::new(1))
                .count(|c| *c == MediaCall::Close),
            1
        );
    }

    #[tokio::test]
    async fn test_cleared_track_is_not_attached() {
        let (registry, factory) = setup();
        registry.switch_track(video_track("v1")).await;
        registry.clear_track().await;

        open(&registry, 1).await;

        assert!(registry.current_track().await.is_none());
        assert!(factory.session(ConnectionId::new(1)).calls().is_empty());
    }

    #[tokio::test]
    async fn test_factory_failure() {
        let (registry, factory) = setup();
        factory.fail.store(true, Ordering::SeqCst);

        let (outbound, _rx) = SignalSender::channel();
        let result = registry.open(ctx(1), outbound).await;

        let err = result.err().unwrap();
        assert!(matches!(err, RegistryError::SessionSetup(_)));
        assert!(!err.is_capacity_violation());
        assert!(registry.is_empty().await);
    }
}
