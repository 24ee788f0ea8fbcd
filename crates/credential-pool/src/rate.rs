//! Sliding-window call rate estimation
//!
//! Each credential carries a bounded-duration queue of call timestamps.
//! Entries older than the horizon are evicted lazily on each observation,
//! so an idle credential costs nothing.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Horizon of the per-credential call window.
pub const RATE_WINDOW: Duration = Duration::from_secs(120);

/// Bounded-duration queue of call timestamps for one credential.
#[derive(Debug, Default)]
pub struct RateWindow {
    samples: VecDeque<Instant>,
}

impl RateWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call at `now` and return the estimated calls per minute.
    ///
    /// The estimate is `(count - 1) / span_minutes` over the retained
    /// samples. With fewer than two samples, or a zero span, the raw count
    /// stands in as a degenerate rate.
    pub fn observe(&mut self, now: Instant) -> f64 {
        self.samples.push_back(now);
        while let Some(&oldest) = self.samples.front() {
            if now.duration_since(oldest) > RATE_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        let count = self.samples.len();
        if count < 2 {
            return count as f64;
        }
        let span = match (self.samples.front(), self.samples.back()) {
            (Some(&oldest), Some(&newest)) => newest.duration_since(oldest),
            _ => Duration::ZERO,
        };
        let span_minutes = span.as_secs_f64() / 60.0;
        if span_minutes <= 0.0 {
            return count as f64;
        }
        (count as f64 - 1.0) / span_minutes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn single_sample_returns_count() {
        let mut window = RateWindow::new();
        assert_eq!(window.observe(Instant::now()), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn steady_rate_is_calls_per_minute() {
        let mut window = RateWindow::new();
        window.observe(Instant::now());
        tokio::time::advance(Duration::from_secs(30)).await;
        window.observe(Instant::now());
        tokio::time::advance(Duration::from_secs(30)).await;
        // 3 samples over 60s: (3 - 1) / 1min = 2 calls/min
        let rate = window.observe(Instant::now());
        assert!((rate - 2.0).abs() < f64::EPSILON, "got {rate}");
    }

    #[tokio::test(start_paused = true)]
    async fn burst_at_same_instant_returns_count() {
        let mut window = RateWindow::new();
        let now = Instant::now();
        window.observe(now);
        window.observe(now);
        assert_eq!(window.observe(now), 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_samples_are_evicted() {
        let mut window = RateWindow::new();
        window.observe(Instant::now());
        window.observe(Instant::now());
        tokio::time::advance(RATE_WINDOW + Duration::from_secs(1)).await;
        // Both old samples fall outside the horizon
        assert_eq!(window.observe(Instant::now()), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn horizon_boundary_is_inclusive() {
        let mut window = RateWindow::new();
        window.observe(Instant::now());
        tokio::time::advance(RATE_WINDOW).await;
        // Exactly at the horizon the sample is retained: 2 samples over 2min
        let rate = window.observe(Instant::now());
        assert!((rate - 0.5).abs() < f64::EPSILON, "got {rate}");
    }
}
