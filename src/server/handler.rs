//! Session handler trait
//!
//! Implemented by the registries. A listener calls `open` once per accepted
//! connection and `close` once when that connection ends.

use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::SignalSender;
use crate::registry::RegistryError;
use crate::session::{ConnectionId, Role, Session, SessionContext};

/// Creates and tears down the sessions of one listener
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Role of every session this handler opens
    fn role(&self) -> Role;

    /// Create and register a session for a new connection
    ///
    /// `outbound` delivers frames to the connection. An error rejects the
    /// connection without changing any registry state.
    async fn open(
        &self,
        ctx: SessionContext,
        outbound: SignalSender,
    ) -> Result<Arc<Session>, RegistryError>;

    /// Unregister and close the session of `connection`, if any
    async fn close(&self, connection: ConnectionId);
}
