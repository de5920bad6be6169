//! pwned-range-proxy
//!
//! k-anonymity front end for the Pwned Passwords range API.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                 PWNED RANGE PROXY                 │
//!                        │                                                   │
//!   POST /api/v1/        │  ┌────────┐   ┌──────────┐   ┌────────────────┐   │
//!   pwned-range ─────────┼─▶│  http  │──▶│  prefix  │──▶│  range cache   │   │
//!   {"prefix":"abcde"}   │  │ server │   │ validate │   │ (24h TTL store)│   │
//!                        │  └────────┘   └──────────┘   └───────┬────────┘   │
//!                        │                                 miss │            │
//!                        │                                      ▼            │
//!                        │                             ┌────────────────┐   │      api.pwned
//!                        │                             │ range fetcher  │───┼────▶ passwords.com
//!                        │                             │ 429 → backoff  │   │      /range/ABCDE
//!                        │                             └────────────────┘   │
//!                        │                                                   │
//!                        │  config · observability · resilience · lifecycle  │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use pwned_range_proxy::config::{load_config, PwnedConfig};
use pwned_range_proxy::lifecycle::{shutdown_signal, Shutdown};
use pwned_range_proxy::observability::{logging, metrics};
use pwned_range_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "pwned-range-proxy")]
#[command(about = "k-anonymity password breach lookup proxy", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => PwnedConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);

    tracing::info!("pwned-range-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        cache_ttl_secs = config.cache.ttl_secs,
        max_attempts = config.retries.max_attempts,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
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
    let server = HttpServer::new(config)?;
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
