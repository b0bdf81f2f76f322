//! Pacing for outbound Bandcamp calls.
//!
//! Tasks are admitted strictly in submission order. Admission waits for a
//! free concurrency slot and then for the minimum spacing since the previous
//! start. The limiter knows nothing about what a task does or whether it
//! failed; results go straight back to the caller that scheduled it.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::{Instant, sleep_until};
use tracing::debug;

#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    pub min_interval: Duration,
    pub max_concurrent: usize,
}

pub struct RateLimiter {
    /// Admission queue. Holds the start time of the most recently admitted task.
    gate: Mutex<Option<Instant>>,
    slots: Semaphore,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(cfg: RateLimitConfig) -> Self {
        Self {
            gate: Mutex::new(None),
            slots: Semaphore::new(cfg.max_concurrent.max(1)),
            min_interval: cfg.min_interval,
        }
    }

    /// Runs `task` once it is admitted and returns its output unchanged.
    ///
    /// The task is not constructed until admission, so nothing it does can
    /// start early.
    pub async fn schedule<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = {
            let mut last_start = self.gate.lock().await;

            let permit = self
                .slots
                .acquire()
                .await
                .expect("rate limiter semaphore is never closed");

            if let Some(prev) = *last_start {
                let ready_at = prev + self.min_interval;
                if ready_at > Instant::now() {
                    debug!(
                        wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                        "rate limiting: waiting before next call"
                    );
                    sleep_until(ready_at).await;
                }
            }

            *last_start = Some(Instant::now());
            permit
        };

        task().await
    }
}
