//! Signaling listener
//!
//! Handles the TCP accept loop and spawns one connection task per socket.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;

use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::handler::SessionHandler;
use crate::session::ConnectionId;

/// WebSocket signaling server for one role
pub struct SignalServer<H: SessionHandler> {
    config: ServerConfig,
    handler: Arc<H>,
    listener: TcpListener,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<H: SessionHandler> SignalServer<H> {
    /// Bind the listening socket
    pub async fn bind(config: ServerConfig, handler: Arc<H>) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        tracing::info!(
            addr = %listener.local_addr()?,
            role = %handler.role(),
            "Signaling server listening"
        );

        Ok(Self {
            config,
            handler,
            listener,
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The handler sessions are opened with
    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Accept connections until `shutdown` resolves
    ///
    /// On shutdown every open connection is sent a close frame and its
    /// session torn down; this returns once all connection tasks have ended.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (close_tx, _) = broadcast::channel(1);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(role = %self.handler.role(), "Shutdown signal received");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => {
                        self.handle_connection(&mut connections, &close_tx, socket, peer_addr);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    log_join(joined);
                }
            }
        }

        drop(self.listener);
        let _ = close_tx.send(());

        let open = connections.len();
        while let Some(joined) = connections.join_next().await {
            log_join(joined);
        }

        tracing::info!(
            role = %self.handler.role(),
            connections = open,
            "Signaling server stopped"
        );
        Ok(())
    }

    fn handle_connection(
        &self,
        connections: &mut JoinSet<()>,
        close_tx: &broadcast::Sender<()>,
        socket: TcpStream,
        peer_addr: SocketAddr,
    ) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let id = ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::Relaxed));

        tracing::debug!(
            connection = %id,
            role = %self.handler.role(),
            peer = %peer_addr,
            "New connection"
        );

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let connection = Connection::new(
            id,
            socket,
            peer_addr,
            Arc::clone(&self.handler),
            self.config.connection_timeout,
            close_tx.subscribe(),
        );

        connections.spawn(async move {
            let _permit = permit;

            if let Err(e) = connection.run().await {
                tracing::debug!(connection = %id, error = %e, "Connection error");
            }

            tracing::debug!(connection = %id, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "Connection task panicked");
        }
    }
}
