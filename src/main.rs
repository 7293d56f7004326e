//! Advance API server.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml ──▶ config ──▶ lifecycle::startup
//!                                   │
//!        ┌──────────────────────────┼───────────────────────────┐
//!        ▼                          ▼                           ▼
//!    context (db,           scanner (resolve → compile      http::builtin
//!    http client)           → load → validate)                  │
//!        │                          │                           │
//!        └──────────────▶ http::mount ◀─────────────────────────┘
//!                               │
//!                               ▼
//!                        http::server (CORS, request id,
//!                        timeout, body limit, logging)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use advance_api::config::{load_config, ApiConfig};
use advance_api::lifecycle::{build_application, Shutdown};
use advance_api::observability::{init_logging, init_metrics};

#[derive(Parser)]
#[command(name = "advance-api")]
#[command(about = "Serve routes discovered from router scripts", long_about = None)]
struct Args {
    /// Configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory relative scan paths are resolved against.
    #[arg(short, long)]
    root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ApiConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!("advance-api v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        prefix = %config.prefix,
        strategy = ?config.compiler.strategy,
        modules = config.modules.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let root = match args.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let bind_address = config.listener.bind_address.clone();
    let app = build_application(config, &root).await?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        routes = app.routes.len(),
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    app.server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
