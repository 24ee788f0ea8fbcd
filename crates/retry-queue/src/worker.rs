//! Poll-driven queue worker
//!
//! One background task drives the whole queue. Replays inside a tick run
//! sequentially, so total replay latency per tick scales with the number of
//! due records; the owner cancels the task on shutdown and awaits its exit.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::queue::RetryQueue;

/// Spawn the background task that polls the queue every `interval`.
///
/// Returns a `JoinHandle` for the spawned task. Abort it on shutdown and
/// await the handle; the resulting cancelled join error is expected.
pub fn spawn_queue_worker(
    queue: Arc<RetryQueue>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick; a fresh entry gets its first attempt
        // one interval after enqueue
        ticker.tick().await;

        loop {
            ticker.tick().await;
            debug!("queue worker tick");
            queue.tick().await;
        }
    })
}
