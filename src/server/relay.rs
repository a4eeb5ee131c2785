//! Relay runner
//!
//! Wires the media factory, both registries and both listeners together.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::media::{MediaFactory, WebRtcEngine};
use crate::registry::{SinkRegistry, SourceRegistry};
use crate::server::config::RelayConfig;
use crate::server::listener::SignalServer;

/// A bound relay: one source listener, one sink listener
pub struct Relay {
    source: SignalServer<SourceRegistry>,
    sink: SignalServer<SinkRegistry>,
    factory: Arc<dyn MediaFactory>,
}

impl Relay {
    /// Bind both listeners, opening media sessions from `factory`
    pub async fn bind(config: RelayConfig, factory: Arc<dyn MediaFactory>) -> Result<Self> {
        if config.source.bind_addr == config.sink.bind_addr && config.source.bind_addr.port() != 0 {
            return Err(Error::Config(format!(
                "source and sink listeners share {}",
                config.source.bind_addr
            )));
        }

        let sinks = Arc::new(SinkRegistry::new(Arc::clone(&factory)));
        let sources = SourceRegistry::new(Arc::clone(&factory), Arc::clone(&sinks));

        let source = SignalServer::bind(config.source, sources).await?;
        let sink = SignalServer::bind(config.sink, sinks).await?;

        Ok(Self {
            source,
            sink,
            factory,
        })
    }

    /// Build the WebRTC engine from `config.media` and bind both listeners
    pub async fn bind_webrtc(config: RelayConfig) -> Result<Self> {
        let engine = WebRtcEngine::new(config.media.clone())?;
        Self::bind(config, Arc::new(engine)).await
    }

    /// Address of the source listener
    pub fn source_addr(&self) -> Result<SocketAddr> {
        self.source.local_addr()
    }

    /// Address of the sink listener
    pub fn sink_addr(&self) -> Result<SocketAddr> {
        self.sink.local_addr()
    }

    pub fn sources(&self) -> &Arc<SourceRegistry> {
        self.source.handler()
    }

    pub fn sinks(&self) -> &Arc<SinkRegistry> {
        self.sink.handler()
    }

    /// Serve until `shutdown` resolves
    ///
    /// Both listeners are stopped and joined, with every session torn down,
    /// before the media factory is released.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Relay {
            source,
            sink,
            factory,
        } = self;

        let (stop_tx, _) = broadcast::channel::<()>(1);
        let source_task = tokio::spawn(source.run_until(stopped(stop_tx.subscribe())));
        let sink_task = tokio::spawn(sink.run_until(stopped(stop_tx.subscribe())));

        shutdown.await;
        tracing::info!("Relay shutting down");
        let _ = stop_tx.send(());

        let (source_result, sink_result) = tokio::join!(source_task, sink_task);

        drop(factory);
        tracing::info!("Relay stopped");

        for result in [source_result, sink_result] {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => {
                    tracing::error!(error = %e, "Listener task failed");
                }
            }
        }
        Ok(())
    }
}

async fn stopped(mut rx: broadcast::Receiver<()>) {
    let _ = rx.recv().await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    use super::*;
    use crate::media::testing::MockFactory;
    use crate::server::config::ServerConfig;

    fn local_config() -> RelayConfig {
        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
        RelayConfig {
            source: ServerConfig::with_addr(any),
            sink: ServerConfig::with_addr(any),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_bind_distinct_ports() {
        let relay = Relay::bind(local_config(), MockFactory::new())
            .await
            .unwrap();

        let source = relay.source_addr().unwrap();
        let sink = relay.sink_addr().unwrap();
        assert_ne!(source.port(), 0);
        assert_ne!(source.port(), sink.port());
    }

    #[tokio::test]
    async fn test_run_until_stops() {
        let relay = Relay::bind(local_config(), MockFactory::new())
            .await
            .unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            relay.run_until(tokio::time::sleep(Duration::from_millis(20))),
        )
        .await
        .expect("relay did not stop");

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_with_stalled_handshake() {
        let relay = Relay::bind(local_config(), MockFactory::new())
            .await
            .unwrap();

        // Connects but never sends the HTTP upgrade
        let _idle = TcpStream::connect(relay.source_addr().unwrap())
            .await
            .unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            relay.run_until(tokio::time::sleep(Duration::from_millis(50))),
        )
        .await
        .expect("relay did not stop");

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_stalled_handshake_times_out() {
        let config = local_config().connection_timeout(Duration::from_millis(100));
        let relay = Relay::bind(config, MockFactory::new()).await.unwrap();

        let mut idle = TcpStream::connect(relay.sink_addr().unwrap())
            .await
            .unwrap();

        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(relay.run_until(async {
            let _ = stopped.await;
        }));

        // The server drops the socket, which reads as EOF
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(2), idle.read(&mut buf))
            .await
            .expect("handshake was not timed out");
        assert!(matches!(read, Ok(0) | Err(_)));

        let _ = stop.send(());
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_port_in_use() {
        let relay = Relay::bind(local_config(), MockFactory::new())
            .await
            .unwrap();
        let taken = relay.source_addr().unwrap();

        let config = local_config().source_addr(taken);
        let result = Relay::bind(config, MockFactory::new()).await;

        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_shared_address_rejected() {
        let addr: SocketAddr = "127.0.0.1:9100".parse().unwrap();
        let config = local_config().source_addr(addr).sink_addr(addr);

        let result = Relay::bind(config, MockFactory::new()).await;

        assert!(matches!(result, Err(Error::Config(_))));
    }
}
