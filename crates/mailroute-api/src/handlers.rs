//! HTTP request handlers

pub mod health;
pub mod send;
pub mod track;

use axum::http::StatusCode;
use axum::Json;
use mailroute_common::Error;
use serde::{Deserialize, Serialize};

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub error: String,
    /// Human-readable message
    pub message: String,
}

/// Map a service error to its HTTP representation
pub fn error_response(err: &Error) -> (StatusCode, Json<ErrorResponse>) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: err.code().to_string(),
            message: err.to_string(),
        }),
    )
}
