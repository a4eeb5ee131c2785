//! Relay binary
//!
//! ```bash
//! # Defaults: source on :9002, sink on :9003, Google STUN
//! webrtc-relay
//!
//! # Custom ports and a TURN server
//! webrtc-relay \
//!   --source-addr 0.0.0.0:7000 \
//!   --sink-addr 0.0.0.0:7001 \
//!   --ice-server turn:turn.example.com:3478 \
//!   --turn-username relay --turn-credential secret
//! ```
//!
//! Type `exit` (or close stdin, or press Ctrl-C) to stop.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use webrtc_relay::{IceServer, MediaConfig, Relay, RelayConfig, WebRtcEngine};

/// WebRTC signaling relay: one source, many sinks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen address for the source peer
    #[arg(long, default_value = "0.0.0.0:9002", env = "RELAY_SOURCE_ADDR")]
    source_addr: SocketAddr,

    /// Listen address for sink peers
    #[arg(long, default_value = "0.0.0.0:9003", env = "RELAY_SINK_ADDR")]
    sink_addr: SocketAddr,

    /// ICE server URLs (comma-separated); `turn:` URLs use the TURN credentials
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302",
        env = "RELAY_ICE_SERVERS"
    )]
    ice_server: Vec<String>,

    /// TURN username
    #[arg(long, env = "RELAY_TURN_USERNAME")]
    turn_username: Option<String>,

    /// TURN credential
    #[arg(long, env = "RELAY_TURN_CREDENTIAL")]
    turn_credential: Option<String>,

    /// Stream label relayed tracks are advertised under
    #[arg(long, default_value = "mirrored_stream", env = "RELAY_STREAM_LABEL")]
    stream_label: String,

    /// Maximum concurrent connections per listener (0 = unlimited)
    #[arg(long, default_value_t = 0, env = "RELAY_MAX_CONNECTIONS")]
    max_connections: usize,

    /// WebSocket handshake timeout in milliseconds
    #[arg(long, default_value_t = 10_000, env = "RELAY_CONNECTION_TIMEOUT_MS")]
    connection_timeout_ms: u64,

    /// Keyframe request interval for relayed video in milliseconds (0 disables)
    #[arg(long, default_value_t = 3000, env = "RELAY_PLI_INTERVAL_MS")]
    pli_interval_ms: u64,
}

impl Args {
    fn media_config(&self) -> MediaConfig {
        let ice_servers = self
            .ice_server
            .iter()
            .filter(|url| !url.is_empty())
            .map(|url| {
                if url.starts_with("turn:") || url.starts_with("turns:") {
                    IceServer::turn(
                        url.clone(),
                        self.turn_username.clone().unwrap_or_default(),
                        self.turn_credential.clone().unwrap_or_default(),
                    )
                } else {
                    IceServer::stun(url.clone())
                }
            })
            .collect();

        MediaConfig::default()
            .ice_servers(ice_servers)
            .stream_label(self.stream_label.clone())
            .pli_interval(Duration::from_millis(self.pli_interval_ms))
    }

    fn relay_config(&self) -> RelayConfig {
        RelayConfig::default()
            .source_addr(self.source_addr)
            .sink_addr(self.sink_addr)
            .max_connections(self.max_connections)
            .connection_timeout(Duration::from_millis(self.connection_timeout_ms))
            .media(self.media_config())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    let config = args.relay_config();

    let engine = match WebRtcEngine::new(config.media.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create media engine");
            return ExitCode::FAILURE;
        }
    };

    let relay = match Relay::bind(config, Arc::new(engine)).await {
        Ok(relay) => relay,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start listeners");
            return ExitCode::FAILURE;
        }
    };

    if let (Ok(source), Ok(sink)) = (relay.source_addr(), relay.sink_addr()) {
        tracing::info!(source = %source, sink = %sink, "Relay running, type 'exit' to stop");
    }

    match relay.run_until(operator_exit()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Relay failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("webrtc_relay=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on an `exit` line, stdin EOF, or Ctrl-C
async fn operator_exit() {
    let stdin = async {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim() == "exit" => break,
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        tracing::info!(input = %line.trim(), "Unknown command, type 'exit' to stop");
                    }
                }
                Ok(None) => {
                    tracing::info!("Operator input closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read operator input");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = stdin => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received");
        }
    }
}
