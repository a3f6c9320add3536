// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use reservoir_kernel::{
    AppendOutcome, DurableLogWriter, FileTarget, Reservoir, ReservoirError, Submission,
};

use crate::config::NodeConfig;
use crate::errors::IngestError;
use crate::telemetry;

/// Fixed acknowledgment body, sent whether the record was written or buffered.
pub const ACK_BODY: &str = "Data received and saved successfully";

/// One writer per process; the mutex serializes every append and flush.
pub type SharedWriter = Arc<Mutex<DurableLogWriter<FileTarget>>>;

#[derive(Clone)]
pub struct AppState {
    writer: SharedWriter,
    max_payload_bytes: usize,
}

/// Build the writer described by `cfg`, reloading a reservoir snapshot if configured.
pub fn open_writer(cfg: &NodeConfig) -> Result<DurableLogWriter<FileTarget>, ReservoirError> {
    let target = FileTarget::new(&cfg.log_path).with_sync(cfg.sync_writes);

    let mut reservoir = Reservoir::new();
    if let Some(capacity) = cfg.max_buffered_records {
        reservoir = reservoir.with_capacity_limit(capacity);
    }
    if let Some(path) = &cfg.reservoir_snapshot_path {
        reservoir = reservoir.with_snapshot(path)?;
    }

    Ok(DurableLogWriter::with_reservoir(target, reservoir))
}

pub fn build_router(writer: SharedWriter, cfg: &NodeConfig) -> Router {
    let state = AppState {
        writer,
        max_payload_bytes: cfg.max_payload_bytes,
    };

    Router::new()
        .route("/", post(ingest))
        .route("/metrics", get(metrics_handler).post(ingest))
        // Submissions are accepted on any path.
        .fallback(ingest_any_path)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ingest_any_path(
    method: Method,
    state: State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, IngestError> {
    if method != Method::POST {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }
    ingest(state, headers, body).await
}

async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, IngestError> {
    let declared = declared_length(&headers)?;
    if declared > state.max_payload_bytes {
        return Err(IngestError::PayloadTooLarge {
            declared,
            limit: state.max_payload_bytes,
        });
    }

    let payload = axum::body::to_bytes(body, state.max_payload_bytes)
        .await
        .map_err(|e| {
            tracing::warn!("Failed to read submission body: {}", e);
            IngestError::BodyUnreadable
        })?;
    if payload.len() != declared {
        return Err(IngestError::LengthMismatch {
            declared,
            received: payload.len(),
        });
    }

    tracing::debug!("Received data: {}", String::from_utf8_lossy(&payload));
    let record = Submission::received_now(payload.to_vec()).format();
    metrics::increment_counter!(telemetry::SUBMISSIONS_TOTAL);

    let (outcome, depth) = {
        let mut writer = state.writer.lock().await;
        let outcome = writer.append(record);
        (outcome, writer.pending())
    };
    metrics::gauge!(telemetry::BUFFER_DEPTH, depth as f64);

    match outcome {
        Ok(AppendOutcome::Persisted { flushed }) => {
            metrics::increment_counter!(telemetry::RECORDS_PERSISTED_TOTAL);
            if flushed > 0 {
                metrics::counter!(telemetry::RECORDS_FLUSHED_TOTAL, flushed as u64);
            }
        }
        Ok(AppendOutcome::Buffered { pending }) => {
            metrics::increment_counter!(telemetry::RECORDS_BUFFERED_TOTAL);
            tracing::debug!("Submission buffered, {} records pending", pending);
        }
        Err(e) => {
            tracing::error!("Submission could not be kept: {}", e);
            return Err(e.into());
        }
    }

    Ok(acknowledge())
}

fn declared_length(headers: &HeaderMap) -> Result<usize, IngestError> {
    let value = headers
        .get(header::CONTENT_LENGTH)
        .ok_or(IngestError::LengthRequired)?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .ok_or(IngestError::InvalidLength)
}

fn acknowledge() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        ACK_BODY,
    )
        .into_response()
}

async fn metrics_handler() -> String {
    telemetry::get_metrics()
}

/// Retry the reservoir every `interval` so buffered records do not wait for the next submission.
pub fn spawn_flusher(writer: SharedWriter, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            flush_once(&writer).await;
        }
    })
}

/// Drain the reservoir once, recording what happened. Returns the records still pending.
pub async fn flush_once(writer: &SharedWriter) -> usize {
    let mut writer = writer.lock().await;
    match writer.flush_pending() {
        Ok(outcome) => {
            if outcome.flushed > 0 {
                metrics::counter!(telemetry::RECORDS_FLUSHED_TOTAL, outcome.flushed as u64);
            }
            metrics::gauge!(telemetry::BUFFER_DEPTH, outcome.pending as f64);
            outcome.pending
        }
        Err(e) => {
            tracing::error!("Reservoir flush failed: {}", e);
            writer.pending()
        }
    }
}

/// Listen for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
