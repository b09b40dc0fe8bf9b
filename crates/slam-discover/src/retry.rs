//! Bounded retry for inventory writes under lock contention.

use std::future::Future;
use std::time::Duration;

use slam_inventory::StoreError;

/// Attempts and fixed backoff for writes that may hit a held lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with anything but `Locked`, or
    /// has been attempted `attempts` times. Each attempt is a whole unit of
    /// work; a failed attempt leaves nothing behind.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_locked() && attempt < attempts => {
                    tracing::warn!(
                        operation = what,
                        attempt,
                        max_attempts = attempts,
                        "Inventory locked, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_locked() {
                        tracing::error!(operation = what, attempts, "Max retry attempts reached");
                    } else {
                        tracing::error!(operation = what, error = %e, "Inventory write failed");
                    }
                    return Err(e);
                }
            }
        }
    }
}
