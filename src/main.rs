//! Inference gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────┐
//!                  │                 INFERENCE GATEWAY                │
//!                  │                                                  │
//!   Client ───────▶│  http ──▶ dispatch ──▶ catalog ──▶ load_balancer │
//!                  │   │          │            │              │       │
//!                  │   │          │            ▼              │       │
//!   Client ◀───────│◀──┘◀── relay ◀────── health monitor      │       │──▶ Backends
//!                  │                                          │       │
//!                  │  ┌────────────────────────────────────────┐      │
//!                  │  │ config (+ watcher) │ observability │ lifecycle│
//!                  │  └────────────────────────────────────────┘      │
//!                  └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use inference_gateway::config::{load_config, watcher::ConfigWatcher};
use inference_gateway::lifecycle::{signals::shutdown_on_signal, Shutdown};
use inference_gateway::observability::{logging, metrics};
use inference_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "inference-gateway")]
#[command(about = "Model-aware gateway for OpenAI-compatible inference servers", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "inference-gateway starting");

    tracing::info!(
        bind_address = %config.server.bind_address,
        endpoints = config.endpoints.len(),
        health_interval_ms = config.health_check.interval_ms,
        cache_ttl_ms = config.cache.effective_ttl(config.health_check.interval_ms).as_millis() as u64,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // The watcher stops when dropped, so it lives until main returns.
    let (watcher, config_updates) = ConfigWatcher::new(&args.config);
    let _watcher = match watcher.run() {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
