//! Relayed track handles
//!
//! A remote track cannot be attached to another peer directly, so the source
//! session mirrors it into a local RTP track and forwards every packet. The
//! local track is what sinks attach; since `TrackLocalStaticRTP` writes to all
//! of its bindings, one forwarding task serves every sink.

use std::sync::Arc;

use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

/// Shared, read-only reference to the stream currently received from the source
#[derive(Clone)]
pub struct TrackHandle {
    local: Arc<TrackLocalStaticRTP>,
}

impl TrackHandle {
    /// Wrap an existing local track
    pub fn new(local: Arc<TrackLocalStaticRTP>) -> Self {
        Self { local }
    }

    /// Create an empty local track with the given codec
    pub fn mirror(
        capability: RTCRtpCodecCapability,
        id: impl Into<String>,
        stream_label: impl Into<String>,
    ) -> Self {
        Self::new(Arc::new(TrackLocalStaticRTP::new(
            capability,
            id.into(),
            stream_label.into(),
        )))
    }

    /// Track id
    pub fn id(&self) -> &str {
        self.local.id()
    }

    /// Stream label the track is advertised under
    pub fn stream_id(&self) -> &str {
        self.local.stream_id()
    }

    /// Audio or video
    pub fn kind(&self) -> RTPCodecType {
        self.local.kind()
    }

    /// The track as the engine attaches it
    pub fn local(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        Arc::clone(&self.local) as Arc<dyn TrackLocal + Send + Sync>
    }

    /// Whether both handles refer to the same stream
    pub fn same_track(&self, other: &TrackHandle) -> bool {
        Arc::ptr_eq(&self.local, &other.local)
    }

    /// Copy packets from `remote` into this track until the remote ends
    pub(crate) async fn forward_from(&self, remote: Arc<TrackRemote>) {
        let mut forwarded: u64 = 0;

        loop {
            match remote.read_rtp().await {
                Ok((packet, _)) => {
                    // A write error means one binding went away; the rest still get the packet
                    if let Err(e) = self.local.write_rtp(&packet).await {
                        tracing::trace!(track = self.id(), error = %e, "RTP write failed");
                    }
                    forwarded += 1;
                }
                Err(e) => {
                    tracing::debug!(
                        track = self.id(),
                        packets = forwarded,
                        reason = %e,
                        "Source track ended"
                    );
                    break;
                }
            }
        }
    }
}

impl std::fmt::Debug for TrackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackHandle")
            .field("id", &self.id())
            .field("stream_id", &self.stream_id())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Opaque reference to one attached outbound sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderHandle(u64);

impl SenderHandle {
    /// Create a handle from an engine-assigned id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Engine-assigned id
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SenderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sender-{}", self.0)
    }
}
