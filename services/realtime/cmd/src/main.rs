//! WorkWise realtime service binary.
//!
//! Runs the WebSocket push server, an outbound client consuming another
//! node's updates, or both at once. Most deployments run the server
//! only; the client mode exists for monitoring and for bridging updates
//! into other services.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

use realtime_client::{Endpoint, RealtimeClient};
use realtime_server::{RealtimeServer, ServerConfig};
use realtime_wire::kind;

mod config;
mod logging;

use config::RealtimeConfig;

/// WorkWise realtime push service
#[derive(Parser, Debug)]
#[command(name = "workwise-realtime", version, about = "Realtime update channel for WorkWise SA")]
struct Args {
    /// Listen address for the push server, e.g. 0.0.0.0:8080
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Connect to a realtime server at this host, e.g. app.workwise.example
    #[arg(long)]
    connect_host: Option<String>,

    /// Use wss:// for the outbound connection
    #[arg(long)]
    secure: bool,

    /// Identity to authenticate the outbound connection as
    #[arg(long)]
    identity: Option<String>,

    /// Liveness sweep interval, e.g. 30s
    #[arg(long, default_value = "30s")]
    ping_interval: humantime::Duration,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logging::init(&args.log_level)?;

    info!("Starting WorkWise Realtime Service v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => RealtimeConfig::load_from_file(path)?,
        None => {
            let mut config = RealtimeConfig::default();
            config.apply_environment_overrides();
            config
        }
    };

    // command line flags win over file and environment
    if let Some(listen) = args.listen {
        config.listen = Some(listen.to_string());
    }
    if args.ping_interval.as_secs() != 30 {
        config.ping_interval_secs = args.ping_interval.as_secs();
    }
    if let Some(host) = &args.connect_host {
        config.client = Some(config::ClientSection {
            host: host.clone(),
            secure: args.secure,
            identity: args.identity.clone().or_else(|| {
                config.client.as_ref().and_then(|c| c.identity.clone())
            }),
        });
    }

    if config.listen.is_none() && config.client.is_none() {
        anyhow::bail!("Must specify either --listen or --connect-host (or both)");
    }

    if let Some(listen) = &config.listen {
        let server_config = ServerConfig {
            ping_interval: Duration::from_secs(config.ping_interval_secs),
        };
        let listener = TcpListener::bind(listen).await?;
        let server = RealtimeServer::new(server_config);
        tokio::spawn(async move {
            if let Err(e) = server.run(listener).await {
                warn!("realtime server stopped: {:#}", e);
            }
        });
    }

    let client = if let Some(section) = &config.client {
        let identity = section
            .identity
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--connect-host requires --identity"))?;

        let client = RealtimeClient::new(Endpoint::new(&section.host, section.secure));

        client.on(kind::SYSTEM, |frame| {
            info!(
                "system notice: {}",
                frame.field_str("message").unwrap_or("(no message)")
            );
        });
        client.on(kind::JOB, |frame| {
            info!(
                "job update: {}",
                frame.field_str("message").unwrap_or("(no message)")
            );
        });
        client.on(kind::SKILL, |frame| {
            info!(
                "skill update: {}",
                frame.field_str("message").unwrap_or("(no message)")
            );
        });
        client.on(kind::MARKET, |frame| {
            info!(
                "market update: {}",
                frame.field_str("message").unwrap_or("(no message)")
            );
        });

        if !client.connect(&identity).await {
            // keeps retrying in the background per the reconnection policy
            warn!("initial connection failed, retrying in the background");
        }
        Some(client)
    } else {
        None
    };

    info!("Realtime service started. Waiting for shutdown signal...");
    tokio::signal::ctrl_c().await?;

    info!("Realtime service shutting down");
    if let Some(client) = client {
        client.disconnect();
    }
    Ok(())
}
