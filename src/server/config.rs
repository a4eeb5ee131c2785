//! Server configuration

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use crate::media::MediaConfig;

/// Default port for the source listener
pub const DEFAULT_SOURCE_PORT: u16 = 9002;

/// Default port for the sink listener
pub const DEFAULT_SINK_PORT: u16 = 9003;

/// Listener configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Connection timeout (WebSocket handshake must complete within this time)
    pub connection_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::with_addr(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            DEFAULT_SOURCE_PORT,
        )))
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            max_connections: 0, // Unlimited
            tcp_nodelay: true,  // Signaling frames are small and latency bound
            connection_timeout: Duration::from_secs(10),
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Set connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

/// Configuration of a whole relay: both listeners plus the media engine
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listener accepting the source connection
    pub source: ServerConfig,

    /// Listener accepting sink connections
    pub sink: ServerConfig,

    /// Media engine settings
    pub media: MediaConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            source: ServerConfig::with_addr(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::UNSPECIFIED,
                DEFAULT_SOURCE_PORT,
            ))),
            sink: ServerConfig::with_addr(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::UNSPECIFIED,
                DEFAULT_SINK_PORT,
            ))),
            media: MediaConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Set the source listener address
    pub fn source_addr(mut self, addr: SocketAddr) -> Self {
        self.source.bind_addr = addr;
        self
    }

    /// Set the sink listener address
    pub fn sink_addr(mut self, addr: SocketAddr) -> Self {
        self.sink.bind_addr = addr;
        self
    }

    /// Set the connection limit of both listeners
    pub fn max_connections(mut self, max: usize) -> Self {
        self.source.max_connections = max;
        self.sink.max_connections = max;
        self
    }

    /// Set the handshake timeout of both listeners
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.source.connection_timeout = timeout;
        self.sink.connection_timeout = timeout;
        self
    }

    /// Set the media engine settings
    pub fn media(mut self, media: MediaConfig) -> Self {
        self.media = media;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_SOURCE_PORT);
        assert_eq!(config.max_connections, 0);
        assert!(config.tcp_nodelay);
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .tcp_nodelay(false)
            .connection_timeout(Duration::from_secs(5));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert!(!config.tcp_nodelay);
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_relay_default_ports() {
        let config = RelayConfig::default();

        assert_eq!(config.source.bind_addr.port(), 9002);
        assert_eq!(config.sink.bind_addr.port(), 9003);
    }

    #[test]
    fn test_relay_builder() {
        let source: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let sink: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let config = RelayConfig::default()
            .source_addr(source)
            .sink_addr(sink)
            .max_connections(10)
            .connection_timeout(Duration::from_millis(500))
            .media(MediaConfig::default().stream_label("cam"));

        assert_eq!(config.source.bind_addr, source);
        assert_eq!(config.sink.bind_addr, sink);
        assert_eq!(config.sink.max_connections, 10);
        assert_eq!(config.source.connection_timeout, Duration::from_millis(500));
        assert_eq!(config.media.stream_label, "cam");
    }
}
