//! Retry queue state machine, backoff scheduling, and dead-letter accounting
//!
//! One mutex guards the active-record map. Status flips (queued → running,
//! terminal eviction) happen under it; replay I/O never does, so enqueues
//! from request handlers proceed while a tick's replays are in flight. Due
//! records within a tick are replayed sequentially.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::record::{QueueRecord, RecordStatus, ReplayPayload, sanitize_headers};
use crate::transport::Transport;

/// Dead-letter history ring capacity.
const DEAD_HISTORY_CAP: usize = 1000;
/// Window for the `dead_recent` count reported by `snapshot`.
const SNAPSHOT_DEAD_WINDOW: Duration = Duration::from_secs(600);
/// Truncation applied to stored response bodies and error text.
const EXCERPT_LEN: usize = 200;

/// Tuning knobs for the queue and its worker.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub poll_interval: Duration,
    pub max_retries: u32,
    /// Active-map size above which enqueues emit an overflow signal.
    pub overflow_threshold: usize,
    /// Dead transitions within the alert window that trigger an alert.
    pub dead_alert_threshold: usize,
    pub dead_alert_window: Duration,
    /// Ceiling on the exponential retry delay.
    pub backoff_cap: Duration,
    pub worker_enabled: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_retries: 5,
            overflow_threshold: 200,
            dead_alert_threshold: 20,
            dead_alert_window: Duration::from_secs(300),
            backoff_cap: Duration::from_secs(60),
            worker_enabled: true,
        }
    }
}

/// Point-in-time queue counts for status reporting.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueSnapshot {
    pub queued: usize,
    pub running: usize,
    pub dead_recent: usize,
}

/// In-memory retry queue with a pluggable transport.
pub struct RetryQueue {
    entries: Mutex<HashMap<String, QueueRecord>>,
    dead_history: Mutex<VecDeque<Instant>>,
    transport: Arc<dyn Transport>,
    config: QueueConfig,
}

impl RetryQueue {
    pub fn new(config: QueueConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            dead_history: Mutex::new(VecDeque::new()),
            transport,
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Accept a failed request for queued recovery.
    ///
    /// Validation failures are rejected here and never enter queue state.
    /// Credential-bearing headers are stripped, `correlation_id` defaults to
    /// `request_id`, and the record is scheduled for an immediate first
    /// attempt. Growth past the overflow threshold is signalled but never
    /// blocks the enqueue.
    pub async fn enqueue(&self, payload: ReplayPayload) -> Result<QueueRecord> {
        validate(&payload)?;

        let mut payload = payload;
        payload.headers = sanitize_headers(&payload.headers);
        if payload.correlation_id.is_none() {
            payload.correlation_id = Some(payload.request_id.clone());
        }

        let now = Instant::now();
        let record = QueueRecord {
            id: Uuid::new_v4().to_string(),
            payload,
            status: RecordStatus::Queued,
            created_at: now,
            updated_at: now,
            next_retry_at: now,
            last_response_status: None,
            last_response_excerpt: None,
        };

        let depth = {
            let mut entries = self.entries.lock().await;
            entries.insert(record.id.clone(), record.clone());
            entries.len()
        };

        info!(
            queue_id = %record.id,
            correlation_id = record.payload.correlation_id.as_deref().unwrap_or(""),
            endpoint = %record.payload.endpoint,
            "replay enqueued"
        );
        metrics::counter!("queue_enqueued_total").increment(1);

        if depth > self.config.overflow_threshold {
            warn!(
                depth,
                threshold = self.config.overflow_threshold,
                "retry queue above overflow threshold"
            );
            metrics::counter!("queue_overflow_total").increment(1);
        }

        Ok(record)
    }

    /// Counts by status, plus dead transitions in the last ten minutes.
    pub async fn snapshot(&self) -> QueueSnapshot {
        let (queued, running) = {
            let entries = self.entries.lock().await;
            (
                entries
                    .values()
                    .filter(|r| r.status == RecordStatus::Queued)
                    .count(),
                entries
                    .values()
                    .filter(|r| r.status == RecordStatus::Running)
                    .count(),
            )
        };
        let now = Instant::now();
        let dead_recent = self
            .dead_history
            .lock()
            .await
            .iter()
            .filter(|&&ts| now.duration_since(ts) <= SNAPSHOT_DEAD_WINDOW)
            .count();
        QueueSnapshot {
            queued,
            running,
            dead_recent,
        }
    }

    /// One worker pass.
    ///
    /// Collects due records under the lock, flipping them to running, then
    /// replays each sequentially with the lock released. Terminal records
    /// are evicted; rescheduled ones are written back.
    pub async fn tick(&self) {
        let now = Instant::now();
        let due: Vec<QueueRecord> = {
            let mut entries = self.entries.lock().await;
            entries
                .values_mut()
                .filter(|record| {
                    record.status == RecordStatus::Queued && record.next_retry_at <= now
                })
                .map(|record| {
                    record.status = RecordStatus::Running;
                    record.updated_at = now;
                    record.clone()
                })
                .collect()
        };

        for mut record in due {
            self.replay(&mut record).await;
            let mut entries = self.entries.lock().await;
            if record.status.is_terminal() {
                entries.remove(&record.id);
            } else {
                entries.insert(record.id.clone(), record);
            }
        }
    }

    /// Attempt one replay and apply the outcome to the record.
    async fn replay(&self, record: &mut QueueRecord) {
        let outcome = self
            .transport
            .send(
                &record.payload.method,
                &record.payload.url,
                &record.payload.headers,
                record.payload.body.as_ref(),
            )
            .await;
        record.updated_at = Instant::now();

        match outcome {
            Ok(response) => {
                record.last_response_status = Some(response.status);
                record.last_response_excerpt = Some(excerpt(&response.body));
                record.status = RecordStatus::Completed;
                info!(
                    queue_id = %record.id,
                    correlation_id = record.payload.correlation_id.as_deref().unwrap_or(""),
                    status = response.status,
                    "replay succeeded"
                );
                metrics::counter!("queue_replay_success_total").increment(1);
            }
            Err(error) => {
                record.payload.retry_count += 1;
                record.last_response_excerpt = Some(excerpt(&error.to_string()));
                if record.payload.retry_count >= self.config.max_retries {
                    record.status = RecordStatus::Dead;
                    record.next_retry_at = record.updated_at;
                    warn!(
                        queue_id = %record.id,
                        correlation_id = record.payload.correlation_id.as_deref().unwrap_or(""),
                        retry_count = record.payload.retry_count,
                        error = %error,
                        "replay dead-lettered"
                    );
                    metrics::counter!("queue_replay_dead_total").increment(1);
                    self.record_dead().await;
                } else {
                    let delay = backoff_delay(record.payload.retry_count, self.config.backoff_cap);
                    record.next_retry_at = record.updated_at + delay;
                    record.status = RecordStatus::Queued;
                    debug!(
                        queue_id = %record.id,
                        retry_count = record.payload.retry_count,
                        delay_secs = delay.as_secs(),
                        "replay rescheduled"
                    );
                }
            }
        }
    }

    /// Append to the dead-letter history and evaluate the alert threshold.
    ///
    /// The rescan is linear over a ring bounded at `DEAD_HISTORY_CAP`
    /// entries.
    async fn record_dead(&self) {
        let now = Instant::now();
        let mut history = self.dead_history.lock().await;
        history.push_back(now);
        while history.len() > DEAD_HISTORY_CAP {
            history.pop_front();
        }
        let recent = history
            .iter()
            .filter(|&&ts| now.duration_since(ts) <= self.config.dead_alert_window)
            .count();
        if recent >= self.config.dead_alert_threshold {
            warn!(
                recent_dead = recent,
                window_secs = self.config.dead_alert_window.as_secs(),
                "dead-letter rate above alert threshold"
            );
            metrics::counter!("queue_dead_alert_total").increment(1);
        }
    }
}

/// Delay before the `retry_count`-th retry: `2^retry_count` seconds, capped.
pub fn backoff_delay(retry_count: u32, cap: Duration) -> Duration {
    let exponent = retry_count.min(16);
    Duration::from_secs(cap.as_secs().min(1u64 << exponent))
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_LEN).collect()
}

fn validate(payload: &ReplayPayload) -> Result<()> {
    let required = [
        ("request_id", &payload.request_id),
        ("endpoint", &payload.endpoint),
        ("method", &payload.method),
        ("url", &payload.url),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(Error::InvalidPayload(format!("{field} must not be empty")));
        }
    }
    Ok(())
}
