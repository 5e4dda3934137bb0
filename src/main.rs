//! mount-proxy
//!
//! Fronts several loopback-only HTTP services under one listener, each
//! mounted at `/<service>`.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ routing (registry + sub-path)
//!                                          │
//!                                          ▼
//!                                     http::forwarder ──▶ security::headers
//!                                          │                 (hop-by-hop, X-Forwarded-*)
//!                                          ▼
//!                                    127.0.0.1:<port> backend
//!                                          │
//!     Client Response                      ▼
//!     ◀────────────── http::response (HTML + Location rewrite, Content-Length)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use mount_proxy::config::{load_config, validation::validate_config, ConfigError, ProxyConfig};
use mount_proxy::http::HttpServer;
use mount_proxy::lifecycle::{signals, Shutdown};
use mount_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "mount-proxy")]
#[command(about = "Path-prefix reverse proxy for local HTTP services", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

fn resolve_config(cli: &Cli) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mount-proxy starting");

    for service in &config.services.entries {
        tracing::info!(
            service = %service.name,
            host = %service.host,
            port = service.port,
            port_env = %service.port_env_var(),
            rewrite_urls = service.rewrite_urls,
            "Service mounted"
        );
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::trigger_on_signal(&shutdown).await;
    });

    HttpServer::new(config).run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
