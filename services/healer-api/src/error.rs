//! Service error types
//!
//! Startup errors (`Error`) abort the process via anyhow in `main`.
//! Handler errors (`ApiError`) render directly as JSON HTTP responses and
//! never propagate further.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors raised while loading and validating configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias for startup/config paths.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors a handler turns into an HTTP response.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No eligible credential for the requested provider/model
    #[error("{0}")]
    NoCredential(String),

    /// Token not present in the pool
    #[error("{0}")]
    Unauthorized(String),

    /// Payload rejected before entering queue state
    #[error("{0}")]
    InvalidPayload(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NoCredential(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidPayload(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<retry_queue::Error> for ApiError {
    fn from(error: retry_queue::Error) -> Self {
        ApiError::InvalidPayload(error.to_string())
    }
}
