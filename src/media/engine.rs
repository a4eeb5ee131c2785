//! webrtc-rs backed media sessions
//!
//! One [`WebRtcEngine`] is built at startup and shared by both listeners; it
//! owns the codec and interceptor setup. Each relay session gets its own
//! [`WebRtcSession`] wrapping an `RTCPeerConnection`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use crate::protocol::{IceCandidate, SdpType, SessionDescription};
use crate::session::{ConnectionId, SessionContext};

use super::config::MediaConfig;
use super::track::{SenderHandle, TrackHandle};
use super::{MediaError, MediaEvent, MediaEvents, MediaFactory, MediaSession, SignalingState};

/// Shared peer factory
///
/// Every peer in the process is created from the same API instance, so codec
/// and interceptor registration happens once.
pub struct WebRtcEngine {
    api: API,
    config: MediaConfig,
}

impl WebRtcEngine {
    /// Build the engine
    ///
    /// Failure here is fatal for the relay: no session could ever be serviced.
    pub fn new(config: MediaConfig) -> Result<Self, MediaError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| MediaError::Engine(format!("failed to register codecs: {}", e)))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| MediaError::Engine(format!("failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        tracing::info!(
            ice_servers = config.ice_servers.len(),
            stream_label = %config.stream_label,
            "Media engine ready"
        );

        Ok(Self { api, config })
    }

    /// Engine configuration
    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers = self
            .config
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone(),
                credential: server.credential.clone(),
                ..Default::default()
            })
            .collect();

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

#[async_trait]
impl MediaFactory for WebRtcEngine {
    async fn create_session(
        &self,
        ctx: &SessionContext,
    ) -> Result<(Arc<dyn MediaSession>, MediaEvents), MediaError> {
        let pc = self
            .api
            .new_peer_connection(self.rtc_configuration())
            .await
            .map_err(|e| MediaError::Engine(format!("failed to create peer connection: {}", e)))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = WebRtcSession::new(ctx.connection, Arc::new(pc));
        session.install_handlers(events_tx, &self.config);

        tracing::debug!(connection = %ctx.connection, role = %ctx.role, "Peer connection created");

        Ok((Arc::new(session) as Arc<dyn MediaSession>, events_rx))
    }
}

/// One peer connection
pub struct WebRtcSession {
    connection: ConnectionId,
    pc: Arc<RTCPeerConnection>,
    negotiation_id: Arc<AtomicU32>,
    next_sender: AtomicU64,
    senders: Mutex<HashMap<SenderHandle, Arc<RTCRtpSender>>>,
}

impl WebRtcSession {
    fn new(connection: ConnectionId, pc: Arc<RTCPeerConnection>) -> Self {
        Self {
            connection,
            pc,
            negotiation_id: Arc::new(AtomicU32::new(0)),
            next_sender: AtomicU64::new(1),
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Route engine callbacks into the session's event channel
    fn install_handlers(&self, events: mpsc::UnboundedSender<MediaEvent>, config: &MediaConfig) {
        let connection = self.connection;

        {
            let events = events.clone();
            let counter = Arc::clone(&self.negotiation_id);
            self.pc.on_negotiation_needed(Box::new(move || {
                let id = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = events.send(MediaEvent::NegotiationNeeded(id));
                Box::pin(async {})
            }));
        }

        {
            let events = events.clone();
            self.pc
                .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                    let events = events.clone();
                    Box::pin(async move {
                        // None marks the end of gathering
                        let Some(candidate) = candidate else {
                            return;
                        };

                        match candidate.to_json() {
                            Ok(init) => {
                                let _ = events.send(MediaEvent::IceCandidate(IceCandidate {
                                    candidate: init.candidate,
                                    sdp_mid: init.sdp_mid,
                                    sdp_mline_index: init.sdp_mline_index,
                                    username_fragment: init.username_fragment,
                                }));
                            }
                            Err(e) => {
                                tracing::warn!(
                                    connection = %connection,
                                    error = %e,
                                    "Failed to serialize local candidate"
                                );
                            }
                        }
                    })
                }));
        }

        {
            let events = events.clone();
            self.pc
                .on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
                    let _ = events.send(MediaEvent::SignalingChange(signaling_state(state)));
                    Box::pin(async {})
                }));
        }

        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                tracing::debug!(connection = %connection, state = %state, "Peer connection state");
                Box::pin(async {})
            }));

        let pc = Arc::downgrade(&self.pc);
        let stream_label = config.stream_label.clone();
        let pli_interval = config.pli_interval;
        self.pc.on_track(Box::new(
            move |remote: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let events = events.clone();
                let pc = Weak::clone(&pc);
                let stream_label = stream_label.clone();

                Box::pin(async move {
                    let track = TrackHandle::mirror(
                        remote.codec().capability,
                        remote.id(),
                        stream_label,
                    );

                    tracing::info!(
                        connection = %connection,
                        track = track.id(),
                        kind = %remote.kind(),
                        ssrc = remote.ssrc(),
                        "Remote track received"
                    );

                    if remote.kind() == RTPCodecType::Video && !pli_interval.is_zero() {
                        tokio::spawn(request_keyframes(pc, remote.ssrc(), pli_interval));
                    }

                    let forward = track.clone();
                    tokio::spawn(async move { forward.forward_from(remote).await });

                    let _ = events.send(MediaEvent::Track(track));
                })
            },
        ));
    }
}

#[async_trait]
impl MediaSession for WebRtcSession {
    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), MediaError> {
        let remote = match description.kind {
            SdpType::Offer => RTCSessionDescription::offer(description.sdp),
            SdpType::Answer => RTCSessionDescription::answer(description.sdp),
        }
        .map_err(|e| MediaError::Description(e.to_string()))?;

        self.pc
            .set_remote_description(remote)
            .await
            .map_err(|e| MediaError::Description(e.to_string()))
    }

    async fn set_local_description(&self) -> Result<SessionDescription, MediaError> {
        let description = match self.pc.signaling_state() {
            RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveLocalPranswer => {
                self.pc.create_answer(None).await
            }
            _ => self.pc.create_offer(None).await,
        }
        .map_err(|e| MediaError::Description(e.to_string()))?;

        self.pc
            .set_local_description(description)
            .await
            .map_err(|e| MediaError::Description(e.to_string()))?;

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| MediaError::Description("no local description after apply".into()))?;

        let kind = match local.sdp_type {
            RTCSdpType::Offer => SdpType::Offer,
            RTCSdpType::Answer => SdpType::Answer,
            other => {
                return Err(MediaError::Description(format!(
                    "unexpected local description type {}",
                    other
                )))
            }
        };

        Ok(SessionDescription {
            kind,
            sdp: local.sdp,
        })
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), MediaError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| MediaError::Candidate(e.to_string()))
    }

    async fn add_track(&self, track: &TrackHandle) -> Result<SenderHandle, MediaError> {
        let sender = self
            .pc
            .add_track(track.local())
            .await
            .map_err(|e| MediaError::Track(e.to_string()))?;

        // Drain incoming RTCP so interceptors (NACK, reports) keep running
        let rtcp = Arc::clone(&sender);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while rtcp.read(&mut buf).await.is_ok() {}
        });

        let handle = SenderHandle::new(self.next_sender.fetch_add(1, Ordering::Relaxed));
        self.senders.lock().await.insert(handle, sender);

        Ok(handle)
    }

    async fn remove_track(&self, sender: SenderHandle) -> Result<(), MediaError> {
        let rtp_sender = self
            .senders
            .lock()
            .await
            .remove(&sender)
            .ok_or(MediaError::SenderNotFound(sender))?;

        self.pc
            .remove_track(&rtp_sender)
            .await
            .map_err(|e| MediaError::Track(e.to_string()))
    }

    fn signaling_state(&self) -> SignalingState {
        signaling_state(self.pc.signaling_state())
    }

    fn should_fire_negotiation_needed(&self, id: u32) -> bool {
        id == self.negotiation_id.load(Ordering::SeqCst)
            && self.pc.signaling_state() == RTCSignalingState::Stable
    }

    async fn close(&self) -> Result<(), MediaError> {
        self.senders.lock().await.clear();
        self.pc
            .close()
            .await
            .map_err(|e| MediaError::Engine(format!("failed to close peer connection: {}", e)))
    }
}

fn signaling_state(state: RTCSignalingState) -> SignalingState {
    match state {
        RTCSignalingState::Unspecified | RTCSignalingState::Stable => SignalingState::Stable,
        RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
        RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
        RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
        RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
        RTCSignalingState::Closed => SignalingState::Closed,
    }
}

/// Ask the source for a keyframe periodically so late sinks can start decoding
async fn request_keyframes(pc: Weak<RTCPeerConnection>, media_ssrc: u32, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        let Some(pc) = pc.upgrade() else {
            break;
        };
        if pc.connection_state() == RTCPeerConnectionState::Closed {
            break;
        }

        if let Err(e) = pc
            .write_rtcp(&[Box::new(PictureLossIndication {
                sender_ssrc: 0,
                media_ssrc,
            })])
            .await
        {
            tracing::trace!(ssrc = media_ssrc, error = %e, "Keyframe request failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use super::*;
    use crate::media::testing::video_track;
    use crate::session::Role;

    fn ctx() -> SessionContext {
        SessionContext::new(
            ConnectionId::new(1),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9002),
            Role::Source,
        )
    }

    #[test]
    fn test_signaling_state_mapping() {
        assert_eq!(signaling_state(RTCSignalingState::Stable), SignalingState::Stable);
        assert_eq!(
            signaling_state(RTCSignalingState::HaveRemoteOffer),
            SignalingState::HaveRemoteOffer
        );
        assert_eq!(signaling_state(RTCSignalingState::Closed), SignalingState::Closed);
    }

    #[tokio::test]
    async fn test_new_session_is_stable() {
        let engine = WebRtcEngine::new(MediaConfig::default().ice_servers(Vec::new())).unwrap();
        let (session, _events) = engine.create_session(&ctx()).await.unwrap();

        assert_eq!(session.signaling_state(), SignalingState::Stable);
        assert!(!session.should_fire_negotiation_needed(1));

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_track_raises_negotiation_needed() {
        let engine = WebRtcEngine::new(MediaConfig::default().ice_servers(Vec::new())).unwrap();
        let (session, mut events) = engine.create_session(&ctx()).await.unwrap();

        let sender = session.add_track(&video_track("v1")).await.unwrap();

        let id = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match events.recv().await {
                    Some(MediaEvent::NegotiationNeeded(id)) => break id,
                    Some(_) => continue,
                    None => panic!("event stream ended"),
                }
            }
        })
        .await
        .expect("no negotiation-needed event");
        assert!(session.should_fire_negotiation_needed(id));

        let offer = session.set_local_description().await.unwrap();
        assert!(offer.is_offer());
        assert!(offer.sdp.contains("m=video"));
        assert_eq!(session.signaling_state(), SignalingState::HaveLocalOffer);

        // Still the latest id, but an offer is already outstanding
        assert!(!session.should_fire_negotiation_needed(id));

        session.remove_track(sender).await.unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_unknown_sender() {
        let engine = WebRtcEngine::new(MediaConfig::default().ice_servers(Vec::new())).unwrap();
        let (session, _events) = engine.create_session(&ctx()).await.unwrap();

        let result = session.remove_track(SenderHandle::new(42)).await;
        assert_eq!(result, Err(MediaError::SenderNotFound(SenderHandle::new(42))));

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_garbage_offer() {
        let engine = WebRtcEngine::new(MediaConfig::default().ice_servers(Vec::new())).unwrap();
        let (session, _events) = engine.create_session(&ctx()).await.unwrap();

        let result = session
            .set_remote_description(SessionDescription::offer("not sdp"))
            .await;
        assert!(matches!(result, Err(MediaError::Description(_))));
        assert_eq!(session.signaling_state(), SignalingState::Stable);

        session.close().await.unwrap();
    }
}
