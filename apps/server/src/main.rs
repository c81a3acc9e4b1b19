//! ChannelCast Server - standalone headless server for the ChannelCast
//! multi-channel media broadcaster.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use channelcast_core::{bootstrap_services, start_server, AppState, NetworkContext, ServerLifecycle, SystemNicResolver};
use clap::Parser;
use tokio::signal;

use crate::config::ServerConfig;

/// ChannelCast Server - headless multi-channel media broadcaster.
#[derive(Parser, Debug)]
#[command(name = "channelcast-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (JSON).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "CHANNELCAST_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "CHANNELCAST_BIND_PORT")]
    port: Option<u16>,

    /// Advertise IP address (overrides config file and NIC resolution).
    #[arg(short = 'a', long, env = "CHANNELCAST_ADVERTISE_IP")]
    advertise_ip: Option<std::net::IpAddr>,

    /// Name of the NIC to advertise instead of an explicit IP.
    #[arg(long, env = "CHANNELCAST_ADVERTISE_NIC")]
    advertise_nic: Option<String>,

    /// Data directory for the persisted state file.
    #[arg(short = 'd', long, env = "CHANNELCAST_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("ChannelCast Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ServerConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.core.server.port = port;
    }
    if let Some(ip) = args.advertise_ip {
        config.advertise_ip = Some(ip);
    }
    if let Some(nic) = args.advertise_nic {
        config.advertise_nic = Some(nic);
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }

    let bind_port = config.core.server.port;
    let network = resolve_network(bind_port, config.advertise_ip, config.advertise_nic.as_deref())
        .context("failed to resolve the address to advertise to clients")?;
    log::info!("configuration: bind_port={bind_port}, advertise_ip={}", network.get_local_ip());

    let data_dir = config.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&data_dir).with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let services = bootstrap_services(&config.core, &data_dir, network).context("failed to bootstrap services")?;
    log::info!("services bootstrapped successfully");

    let app_state = AppState::builder()
        .from_services(&services)
        .lifecycle(Arc::new(ServerLifecycle))
        .build();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("server error: {e}");
        }
    });

    log::info!("HTTP server started on port {bind_port}");

    shutdown_signal().await;
    log::info!("shutdown signal received, cleaning up...");

    services.shutdown();
    server_handle.abort();

    log::info!("shutdown complete");
    Ok(())
}

/// Resolves the network context: an explicit IP wins, then a named NIC, then
/// auto-detection of the host's local address.
fn resolve_network(bind_port: u16, advertise_ip: Option<std::net::IpAddr>, advertise_nic: Option<&str>) -> Result<NetworkContext> {
    if let Some(ip) = advertise_ip {
        return Ok(NetworkContext::explicit(bind_port, ip));
    }
    if let Some(nic) = advertise_nic {
        let resolver = SystemNicResolver::new();
        let addr = channelcast_core::context::NicResolver::resolve(&resolver, nic)
            .with_context(|| format!("failed to resolve NIC {nic}"))?
            .with_context(|| format!("NIC {nic} has no IPv4 address"))?;
        return Ok(NetworkContext::explicit(bind_port, std::net::IpAddr::V4(addr)));
    }
    NetworkContext::auto_detect(bind_port).context(
        "failed to auto-detect local IP address; \
         specify --advertise-ip or --advertise-nic",
    )
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
