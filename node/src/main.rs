// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use clap::Parser;
use reservoir_node::config::{CliArgs, NodeConfig};
use reservoir_node::server::{build_router, flush_once, open_writer, shutdown_signal, spawn_flusher, SharedWriter};
use reservoir_node::telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() {
    telemetry::init_telemetry();

    let args = CliArgs::parse();
    let cfg = NodeConfig::from(&args);

    tracing::info!("Initializing reservoir node with config: {:?}", cfg);

    let writer = match open_writer(&cfg) {
        Ok(writer) => writer,
        Err(e) => {
            tracing::error!("Failed to open reservoir: {}", e);
            std::process::exit(1);
        }
    };
    if writer.pending() > 0 {
        tracing::info!("{} records pending from a previous run", writer.pending());
    }
    let shared: SharedWriter = Arc::new(Mutex::new(writer));

    let flusher = cfg
        .flush_interval_secs
        .map(|secs| spawn_flusher(shared.clone(), Duration::from_secs(secs)));

    let app = build_router(shared.clone(), &cfg);

    let listener = match TcpListener::bind(cfg.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", cfg.bind_addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Server is running on {}", cfg.bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
    }

    if let Some(flusher) = flusher {
        flusher.abort();
    }

    let remaining = flush_once(&shared).await;
    if remaining > 0 {
        if cfg.reservoir_snapshot_path.is_some() {
            tracing::warn!("{} records left in the reservoir snapshot", remaining);
        } else {
            tracing::error!("{} buffered records lost on shutdown", remaining);
        }
    }
    tracing::info!("Server shut down");
}
