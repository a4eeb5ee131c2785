//! Signaling message schema
//!
//! Every text frame carries one JSON object with exactly one meaningful
//! top-level key:
//!
//! ```text
//! { "description": { "type": "offer" | "answer", "sdp": "..." } }
//! { "candidate":   { "candidate": "...", "sdpMid": "0", "sdpMLineIndex": 0 } }
//! ```
//!
//! Objects without a recognized key are ignored so newer peers can add
//! message kinds without breaking the relay.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use super::error::ProtocolError;

/// Session description type carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Proposes session parameters
    Offer,
    /// Accepts an offer
    Answer,
}

impl std::fmt::Display for SdpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Answer => write!(f, "answer"),
        }
    }
}

/// A session description (`{type, sdp}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub kind: SdpType,
    /// SDP body
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Whether this description is an offer
    pub fn is_offer(&self) -> bool {
        self.kind == SdpType::Offer
    }
}

/// A connectivity candidate, opaque to the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,

    /// Media stream identification tag
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Index of the media description the candidate belongs to
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,

    /// ICE username fragment, when the peer provides one
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    /// Create a candidate bound to a media line
    pub fn new(candidate: impl Into<String>, sdp_mid: impl Into<String>, sdp_mline_index: u16) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some(sdp_mid.into()),
            sdp_mline_index: Some(sdp_mline_index),
            username_fragment: None,
        }
    }
}

/// One signaling message
///
/// Serializes externally tagged, which is exactly the wire shape:
/// `{"description": {...}}` or `{"candidate": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalMessage {
    /// Offer/answer exchange
    Description(SessionDescription),
    /// Trickled connectivity candidate
    Candidate(IceCandidate),
}

impl SignalMessage {
    /// Decode a text frame
    ///
    /// Returns `Ok(None)` for objects without a recognized key. When both keys
    /// are present the description wins.
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::MalformedJson)?;
        let Value::Object(mut fields) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        if let Some(description) = fields.remove("description") {
            let description =
                serde_json::from_value(description).map_err(ProtocolError::InvalidDescription)?;
            return Ok(Some(SignalMessage::Description(description)));
        }

        if let Some(candidate) = fields.remove("candidate") {
            let candidate =
                serde_json::from_value(candidate).map_err(ProtocolError::InvalidCandidate)?;
            return Ok(Some(SignalMessage::Candidate(candidate)));
        }

        Ok(None)
    }

    /// Encode as a text frame
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Description(d) if d.is_offer() => "offer",
            SignalMessage::Description(_) => "answer",
            SignalMessage::Candidate(_) => "candidate",
        }
    }
}

/// Outgoing half of a connection, as seen by a session
///
/// Frames are queued unbounded: signaling volume is a handful of messages per
/// negotiation, and the connection task that drains the queue is the same task
/// that feeds inbound messages to the session.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<String>,
}

impl SignalSender {
    /// Create a sender and the receiver the connection drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Encode and queue a message
    pub fn send(&self, message: &SignalMessage) -> Result<(), ProtocolError> {
        let text = message.encode()?;
        self.tx
            .send(text)
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Whether the connection side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
