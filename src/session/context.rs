//! Session identity
//!
//! Read-only information about the connection a session is bound to, passed to
//! registries and the media factory when the session is created.

use std::net::SocketAddr;
use std::time::Instant;

/// Identifier of one live transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create an id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which side of the relay a session serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The single publisher whose stream is relayed
    Source,
    /// One of many receivers
    Sink,
}

impl Role {
    /// Whether sessions of this role yield to colliding offers
    ///
    /// The relay never yields: both roles are impolite.
    pub fn is_polite(&self) -> bool {
        match self {
            Role::Source | Role::Sink => false,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Source => write!(f, "source"),
            Role::Sink => write!(f, "sink"),
        }
    }
}

/// Context passed when a session is created
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Connection the session is bound to
    pub connection: ConnectionId,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Source or sink
    pub role: Role,

    /// When the transport connection opened
    pub connected_at: Instant,
}

impl SessionContext {
    /// Create a new context
    pub fn new(connection: ConnectionId, peer_addr: SocketAddr, role: Role) -> Self {
        Self {
            connection,
            peer_addr,
            role,
            connected_at: Instant::now(),
        }
    }

    /// Time since the connection opened
    pub fn age(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
