//! Outbound replay boundary
//!
//! The queue replays through this minimal contract and nothing else, so
//! tests substitute scripted transports and the production wiring plugs in a
//! reqwest client. Receiving any HTTP response is success from the queue's
//! point of view; only transport-level failures feed the retry schedule.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;

/// Failures below the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("transport failure: {0}")]
    Other(String),
}

/// Status and body text of a delivered replay.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Minimal send contract the queue depends on.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        method: &'a str,
        url: &'a str,
        headers: &'a HashMap<String, String>,
        body: Option<&'a Value>,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>>;
}

/// Production transport backed by a shared reqwest client.
///
/// Every request carries the same fixed timeout, so no replay can block the
/// worker indefinitely.
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        method: &'a str,
        url: &'a str,
        headers: &'a HashMap<String, String>,
        body: Option<&'a Value>,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(method.as_bytes())
                .map_err(|e| TransportError::Other(format!("invalid method: {e}")))?;

            let mut request = self.client.request(method, url).timeout(self.timeout);
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if let Some(body) = body {
                request = match body {
                    // Structured bodies go as JSON, scalars as raw content
                    Value::Object(_) | Value::Array(_) => request.json(body),
                    Value::String(text) => request.body(text.clone()),
                    other => request.body(other.to_string()),
                };
            }

            let response = request.send().await.map_err(classify_reqwest_error)?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(classify_reqwest_error)?;
            Ok(TransportResponse { status, body })
        })
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connection(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}
