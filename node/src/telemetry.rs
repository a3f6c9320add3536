// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const SUBMISSIONS_TOTAL: &str = "reservoir_submissions_total";
pub const RECORDS_PERSISTED_TOTAL: &str = "reservoir_records_persisted_total";
pub const RECORDS_BUFFERED_TOTAL: &str = "reservoir_records_buffered_total";
pub const RECORDS_FLUSHED_TOTAL: &str = "reservoir_records_flushed_total";
pub const BUFFER_DEPTH: &str = "reservoir_buffer_depth";

/// Initialize telemetry (logs + metrics)
pub fn init_telemetry() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "reservoir_node=debug,reservoir_kernel=info,tower_http=debug".into()
            }),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if PROM_HANDLE.set(handle).is_err() {
        tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
    }

    metrics::describe_counter!(SUBMISSIONS_TOTAL, "Submissions accepted by the ingress handler");
    metrics::describe_counter!(RECORDS_PERSISTED_TOTAL, "Records written straight to the Log File");
    metrics::describe_counter!(RECORDS_BUFFERED_TOTAL, "Records diverted to the overflow reservoir");
    metrics::describe_counter!(RECORDS_FLUSHED_TOTAL, "Buffered records later written to the Log File");
    metrics::describe_gauge!(BUFFER_DEPTH, "Records currently waiting in the reservoir");

    metrics::gauge!("reservoir_node_up", 1.0);
    metrics::gauge!(BUFFER_DEPTH, 0.0);
}

/// Get the Prometheus handle to render metrics
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
