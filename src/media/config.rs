//! Media engine configuration

use std::time::Duration;

/// Default stream label relayed tracks are advertised under
pub const DEFAULT_STREAM_LABEL: &str = "mirrored_stream";

/// A STUN or TURN server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    /// Server URLs (`stun:` / `turn:` / `turns:`)
    pub urls: Vec<String>,
    /// TURN username (empty for STUN)
    pub username: String,
    /// TURN credential (empty for STUN)
    pub credential: String,
}

impl IceServer {
    /// A STUN server
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: String::new(),
            credential: String::new(),
        }
    }

    /// A TURN server with long-term credentials
    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: username.into(),
            credential: credential.into(),
        }
    }
}

/// Media engine configuration options
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// ICE servers handed to every peer
    pub ice_servers: Vec<IceServer>,

    /// Stream label relayed tracks are advertised under
    pub stream_label: String,

    /// Keyframe request period for relayed video (zero disables)
    pub pli_interval: Duration,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::stun("stun:stun.l.google.com:19302")],
            stream_label: DEFAULT_STREAM_LABEL.to_owned(),
            pli_interval: Duration::from_secs(3),
        }
    }
}

impl MediaConfig {
    /// Add an ICE server
    pub fn ice_server(mut self, server: IceServer) -> Self {
        self.ice_servers.push(server);
        self
    }

    /// Replace the ICE server list
    pub fn ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.ice_servers = servers;
        self
    }

    /// Set the relayed stream label
    pub fn stream_label(mut self, label: impl Into<String>) -> Self {
        self.stream_label = label.into();
        self
    }

    /// Set the keyframe request period
    pub fn pli_interval(mut self, interval: Duration) -> Self {
        self.pli_interval = interval;
        self
    }

    /// Disable periodic keyframe requests
    pub fn disable_pli(mut self) -> Self {
        self.pli_interval = Duration::ZERO;
        self
    }
}
