//! Durable retry / dead-letter queue for failed request replay
//!
//! Accepts the payloads of requests that failed elsewhere and replays them on
//! an exponential backoff schedule through a pluggable transport. Records
//! that exhaust their retry budget go dead: surfaced once through alerting,
//! then dropped from active tracking.
//!
//! Record lifecycle:
//! 1. `enqueue` validates and sanitizes the payload, schedules an immediate
//!    first attempt
//! 2. The poll worker's `tick` collects due records under the lock, then
//!    replays them sequentially with no lock held during I/O
//! 3. A transport failure reschedules with `min(cap, 2^retry_count)` seconds
//!    of delay; any HTTP response counts as a completed replay
//! 4. At `max_retries` the record transitions to dead and feeds the rolling
//!    dead-letter count used for alerting
//! 5. Completed and dead records leave the active map immediately

pub mod error;
pub mod queue;
pub mod record;
pub mod transport;
pub mod worker;

pub use error::{Error, Result};
pub use queue::{QueueConfig, QueueSnapshot, RetryQueue, backoff_delay};
pub use record::{QueueRecord, RecordStatus, ReplayPayload, sanitize_headers};
pub use transport::{HttpTransport, Transport, TransportError, TransportResponse};
pub use worker::spawn_queue_worker;
