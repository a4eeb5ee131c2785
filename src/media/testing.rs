//! In-memory media engine for unit tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::api::media_engine::MIME_TYPE_VP8;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

use crate::protocol::{IceCandidate, SessionDescription};
use crate::session::{ConnectionId, SessionContext};

use super::track::{SenderHandle, TrackHandle};
use super::{MediaError, MediaEvent, MediaEvents, MediaFactory, MediaSession, SignalingState};

pub(crate) const MOCK_OFFER: &str = "mock-offer";
pub(crate) const MOCK_ANSWER: &str = "mock-answer";

/// A VP8 track that never carries packets
pub(crate) fn video_track(id: &str) -> TrackHandle {
    TrackHandle::mirror(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        id,
        "mirrored_stream",
    )
}

/// Operations the relay performed on a mock session
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MediaCall {
    SetRemote(SessionDescription),
    SetLocal,
    AddCandidate(IceCandidate),
    AddTrack(String),
    RemoveTrack(SenderHandle),
    Close,
}

#[derive(Default)]
pub(crate) struct MockMediaSession {
    calls: Mutex<Vec<MediaCall>>,
    state: Mutex<Option<SignalingState>>,
    latest_negotiation: AtomicU32,
    next_sender: AtomicU64,
    senders: Mutex<HashSet<SenderHandle>>,
    pub(crate) fail_remote: AtomicBool,
    pub(crate) fail_local: AtomicBool,
    pub(crate) fail_candidate: AtomicBool,
    pub(crate) fail_add_track: AtomicBool,
}

impl MockMediaSession {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&MediaCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub(crate) fn set_state(&self, state: SignalingState) {
        *self.state.lock().unwrap() = Some(state);
    }

    /// Simulate the engine raising negotiation-needed; returns the new id
    pub(crate) fn raise_negotiation_needed(&self) -> u32 {
        self.latest_negotiation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record(&self, call: MediaCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MediaSession for MockMediaSession {
    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), MediaError> {
        let is_offer = description.is_offer();
        self.record(MediaCall::SetRemote(description));

        if self.fail_remote.load(Ordering::SeqCst) {
            return Err(MediaError::Description("rejected by mock".into()));
        }

        self.set_state(if is_offer {
            SignalingState::HaveRemoteOffer
        } else {
            SignalingState::Stable
        });
        Ok(())
    }

    async fn set_local_description(&self) -> Result<SessionDescription, MediaError> {
        self.record(MediaCall::SetLocal);

        if self.fail_local.load(Ordering::SeqCst) {
            return Err(MediaError::Description("rejected by mock".into()));
        }

        if self.signaling_state() == SignalingState::HaveRemoteOffer {
            self.set_state(SignalingState::Stable);
            Ok(SessionDescription::answer(MOCK_ANSWER))
        } else {
            self.set_state(SignalingState::HaveLocalOffer);
            Ok(SessionDescription::offer(MOCK_OFFER))
        }
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), MediaError> {
        self.record(MediaCall::AddCandidate(candidate));

        if self.fail_candidate.load(Ordering::SeqCst) {
            return Err(MediaError::Candidate("rejected by mock".into()));
        }
        Ok(())
    }

    async fn add_track(&self, track: &TrackHandle) -> Result<SenderHandle, MediaError> {
        self.record(MediaCall::AddTrack(track.id().to_owned()));

        if self.fail_add_track.load(Ordering::SeqCst) {
            return Err(MediaError::Track("rejected by mock".into()));
        }

        let sender = SenderHandle::new(self.next_sender.fetch_add(1, Ordering::SeqCst));
        self.senders.lock().unwrap().insert(sender);
        Ok(sender)
    }

    async fn remove_track(&self, sender: SenderHandle) -> Result<(), MediaError> {
        self.record(MediaCall::RemoveTrack(sender));

        if self.senders.lock().unwrap().remove(&sender) {
            Ok(())
        } else {
            Err(MediaError::SenderNotFound(sender))
        }
    }

    fn signaling_state(&self) -> SignalingState {
        self.state.lock().unwrap().unwrap_or(SignalingState::Stable)
    }

    fn should_fire_negotiation_needed(&self, id: u32) -> bool {
        id == self.latest_negotiation.load(Ordering::SeqCst)
            && self.signaling_state() == SignalingState::Stable
    }

    async fn close(&self) -> Result<(), MediaError> {
        self.record(MediaCall::Close);
        self.set_state(SignalingState::Closed);
        Ok(())
    }
}

struct MockPeer {
    connection: ConnectionId,
    session: Arc<MockMediaSession>,
    events: mpsc::UnboundedSender<MediaEvent>,
}

/// Factory handing out [`MockMediaSession`]s and keeping a handle on each
#[derive(Default)]
pub(crate) struct MockFactory {
    peers: Mutex<Vec<MockPeer>>,
    pub(crate) fail: AtomicBool,
}

impl MockFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn created(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub(crate) fn session(&self, connection: ConnectionId) -> Arc<MockMediaSession> {
        let peers = self.peers.lock().unwrap();
        let peer = peers
            .iter()
            .find(|p| p.connection == connection)
            .expect("no mock session for connection");
        Arc::clone(&peer.session)
    }

    pub(crate) fn events(&self, connection: ConnectionId) -> mpsc::UnboundedSender<MediaEvent> {
        let peers = self.peers.lock().unwrap();
        let peer = peers
            .iter()
            .find(|p| p.connection == connection)
            .expect("no mock session for connection");
        peer.events.clone()
    }
}

#[async_trait]
impl MediaFactory for MockFactory {
    async fn create_session(
        &self,
        ctx: &SessionContext,
    ) -> Result<(Arc<dyn MediaSession>, MediaEvents), MediaError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MediaError::Engine("mock factory failure".into()));
        }

        let session = MockMediaSession::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.lock().unwrap().push(MockPeer {
            connection: ctx.connection,
            session: Arc::clone(&session),
            events: tx,
        });

        Ok((session as Arc<dyn MediaSession>, rx))
    }
}
