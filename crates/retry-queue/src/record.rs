//! Replay payloads and queue records

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

/// Header names stripped before a payload enters the queue
/// (case-insensitive).
const SENSITIVE_HEADERS: &[&str] = &["authorization", "proxy-authorization", "cookie"];

/// Drop credential-bearing headers from a replay header map.
pub fn sanitize_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| !SENSITIVE_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// The failed request as reported by the caller, replayed verbatim.
///
/// Provenance fields (`request_id`, `correlation_id`, endpoint/provider/
/// region, the originating error) travel with the record for log
/// correlation; only method, url, headers, and body go over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayPayload {
    pub request_id: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub endpoint: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_status: Option<u16>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

/// Where a record sits in its lifecycle.
///
/// `Queued` and `Running` are the only states reachable from the active map;
/// `Completed` and `Dead` imply immediate eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Queued,
    Running,
    Completed,
    Dead,
}

impl RecordStatus {
    pub fn label(self) -> &'static str {
        match self {
            RecordStatus::Queued => "queued",
            RecordStatus::Running => "running",
            RecordStatus::Completed => "completed",
            RecordStatus::Dead => "dead",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RecordStatus::Completed | RecordStatus::Dead)
    }
}

/// One enqueued replay with its scheduling state.
#[derive(Debug, Clone)]
pub struct QueueRecord {
    pub id: String,
    pub payload: ReplayPayload,
    pub status: RecordStatus,
    pub created_at: Instant,
    pub updated_at: Instant,
    pub next_retry_at: Instant,
    pub last_response_status: Option<u16>,
    pub last_response_excerpt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_credential_headers() {
        let headers = HashMap::from([
            ("Authorization".to_string(), "Bearer secret".to_string()),
            ("Proxy-Authorization".to_string(), "Basic xyz".to_string()),
            ("COOKIE".to_string(), "session=1".to_string()),
            ("x-request-id".to_string(), "req-1".to_string()),
        ]);
        let sanitized = sanitize_headers(&headers);
        assert_eq!(sanitized.len(), 1);
        assert_eq!(sanitized.get("x-request-id").unwrap(), "req-1");
    }

    #[test]
    fn payload_deserializes_with_defaults() {
        let payload: ReplayPayload = serde_json::from_str(
            r#"{
                "request_id": "req-1",
                "endpoint": "external-api",
                "method": "GET",
                "url": "http://localhost:8000/external-api"
            }"#,
        )
        .unwrap();
        assert!(payload.correlation_id.is_none());
        assert!(payload.headers.is_empty());
        assert!(payload.body.is_none());
        assert_eq!(payload.retry_count, 0);
    }

    #[test]
    fn payload_missing_required_field_is_rejected() {
        let result: std::result::Result<ReplayPayload, _> =
            serde_json::from_str(r#"{"endpoint": "missing-fields"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!RecordStatus::Queued.is_terminal());
        assert!(!RecordStatus::Running.is_terminal());
        assert!(RecordStatus::Completed.is_terminal());
        assert!(RecordStatus::Dead.is_terminal());
    }
}
