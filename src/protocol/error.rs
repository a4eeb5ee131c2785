//! Wire protocol error types

/// Failure to decode a signaling frame
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Payload is not JSON
    #[error("malformed JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),

    /// Payload is JSON but not an object
    #[error("signaling message must be a JSON object")]
    NotAnObject,

    /// `description` payload does not match `{type, sdp}`
    #[error("invalid description: {0}")]
    InvalidDescription(#[source] serde_json::Error),

    /// `candidate` payload does not match `{candidate, sdpMid, sdpMLineIndex}`
    #[error("invalid candidate: {0}")]
    InvalidCandidate(#[source] serde_json::Error),

    /// Outgoing message could not be encoded
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The connection that would carry the message is gone
    #[error("connection closed")]
    ConnectionClosed,
}
