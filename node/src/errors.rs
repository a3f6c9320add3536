// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use reservoir_kernel::Unrecoverable;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Content-Length header is required")]
    LengthRequired,
    #[error("Content-Length header is not a valid length")]
    InvalidLength,
    #[error("Declared {declared} bytes but received {received}")]
    LengthMismatch { declared: usize, received: usize },
    #[error("Payload of {declared} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { declared: usize, limit: usize },
    #[error("Failed to read request body")]
    BodyUnreadable,
    #[error("Writer error: {0}")]
    Writer(#[from] Unrecoverable),
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = match &self {
            IngestError::LengthRequired => StatusCode::LENGTH_REQUIRED,
            IngestError::InvalidLength
            | IngestError::LengthMismatch { .. }
            | IngestError::BodyUnreadable => StatusCode::BAD_REQUEST,
            IngestError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::Writer(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
