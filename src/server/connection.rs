//! Per-connection handler
//!
//! Upgrades an accepted socket to a WebSocket, opens a session for it and
//! pumps frames between the socket and the session until either side closes.
//! Inbound frames are handled one at a time, which serializes everything the
//! peer asks of its session.

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use crate::error::Result;
use crate::protocol::SignalSender;
use crate::server::handler::SessionHandler;
use crate::session::{ConnectionId, Session, SessionContext};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// One accepted transport connection
pub struct Connection<H: SessionHandler> {
    id: ConnectionId,
    socket: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    handshake_timeout: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl<H: SessionHandler> Connection<H> {
    /// Create a handler for an accepted socket
    pub fn new(
        id: ConnectionId,
        socket: TcpStream,
        peer_addr: SocketAddr,
        handler: Arc<H>,
        handshake_timeout: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            id,
            socket,
            peer_addr,
            handler,
            handshake_timeout,
            shutdown,
        }
    }

    /// Run the connection to completion
    pub async fn run(self) -> Result<()> {
        let Connection {
            id,
            socket,
            peer_addr,
            handler,
            handshake_timeout,
            mut shutdown,
        } = self;

        let ws_stream = tokio::select! {
            handshake = tokio::time::timeout(handshake_timeout, accept_async(socket)) => match handshake {
                Ok(ws_stream) => ws_stream?,
                Err(_) => {
                    tracing::warn!(connection = %id, peer = %peer_addr, "WebSocket handshake timed out");
                    return Ok(());
                }
            },
            _ = shutdown.recv() => {
                tracing::debug!(connection = %id, "Dropping connection mid-handshake for shutdown");
                return Ok(());
            }
        };
        let (mut ws_tx, ws_rx) = ws_stream.split();

        let ctx = SessionContext::new(id, peer_addr, handler.role());
        let (outbound, outbound_rx) = SignalSender::channel();

        let session = match handler.open(ctx, outbound).await {
            Ok(session) => session,
            Err(e) => {
                let code = if e.is_capacity_violation() {
                    CloseCode::Policy
                } else {
                    CloseCode::Error
                };
                tracing::warn!(
                    connection = %id,
                    role = %handler.role(),
                    peer = %peer_addr,
                    error = %e,
                    "Connection rejected"
                );
                ws_tx.send(close_message(code, e.to_string())).await?;
                return Ok(());
            }
        };

        let result = pump(&session, &mut ws_tx, ws_rx, outbound_rx, &mut shutdown).await;

        handler.close(id).await;
        result
    }
}

/// Move frames until the peer closes, the socket fails or the listener stops
async fn pump(
    session: &Session,
    ws_tx: &mut WsSink,
    mut ws_rx: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<()> {
    let id = session.connection();

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => match outgoing {
                Some(text) => ws_tx.send(Message::Text(text)).await?,
                None => break,
            },

            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => session.handle_message(&text).await,
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(connection = %id, frame = ?frame, "Peer closed connection");
                    break;
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(connection = %id, "Keepalive frame");
                }
                Some(Ok(other)) => {
                    tracing::warn!(
                        connection = %id,
                        len = other.len(),
                        "Dropping non-text frame"
                    );
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },

            _ = shutdown.recv() => {
                tracing::debug!(connection = %id, "Closing connection for shutdown");
                ws_tx
                    .send(close_message(CloseCode::Away, "relay shutting down"))
                    .await?;
                break;
            }
        }
    }

    Ok(())
}

fn close_message(code: CloseCode, reason: impl Into<Cow<'static, str>>) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}
