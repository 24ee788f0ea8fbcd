//! Error types for queue operations

/// Errors surfaced to enqueue callers.
///
/// Replay failures are not errors: they are encoded in record status and
/// handled by the backoff schedule.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid replay payload: {0}")]
    InvalidPayload(String),
}

/// Result alias for queue operations.
pub type Result<T> = std::result::Result<T, Error>;
