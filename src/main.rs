use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

use viaduct::config::Config;
use viaduct::logger::AccessLogger;
use viaduct::server::ProxyServer;

#[derive(Parser)]
#[command(name = "viaduct")]
#[command(about = "An HTTP/1.1 forwarding proxy with CONNECT tunnelling")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address; overrides the configuration file
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("viaduct={}", level))
        .init();

    info!("Starting viaduct proxy");

    // Load configuration
    let mut config = match args.config {
        Some(ref path) => {
            let config = Config::from_file(path).await?;
            info!("Loaded configuration from {}", path);
            config
        }
        None => Config::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let mut access_log = AccessLogger::new(config.logging.clone());
    access_log.initialize().await?;

    let server = ProxyServer::new(config, access_log);

    // Setup graceful shutdown
    let shutdown_signal = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        warn!("Received CTRL+C, shutting down...");
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                tracing::error!("Proxy server error: {}", e);
            }
        }
        _ = shutdown_signal => {
            info!("Shutdown signal received");
        }
    }

    info!("viaduct shutdown complete");
    Ok(())
}
