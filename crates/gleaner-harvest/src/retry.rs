//! Bounded retry with linear backoff and a job-wide failure budget.

use crate::job::RunGuard;
use crate::status::StatusUpdate;
use gleaner_core::HarvestConfig;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Retries fallible operations against execution contexts.
///
/// A call gives up after `attempts` failures, or as soon as the job-wide
/// failure count exceeds `budget`. The job-wide count returns to zero on
/// any success and whenever a call gives up, so the next operation always
/// gets its full attempts. Giving up yields `None`, which callers treat as
/// "skip and continue".
#[derive(Debug)]
pub struct Retrier {
    attempts: u32,
    budget: u32,
    base_delay: Duration,
    failures: AtomicU32,
}

impl Retrier {
    #[must_use]
    pub fn new(attempts: u32, budget: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            budget,
            base_delay,
            failures: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            config.retry_attempts,
            config.retry_failure_budget,
            config.retry_base_delay(),
        )
    }

    /// Forget failures of a previous run.
    pub fn reset(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    /// Current job-wide failure count.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Run `op` until it succeeds, the bounds are hit, or the job is
    /// cancelled.
    ///
    /// The cancellation predicate is checked before every attempt and
    /// before every backoff, so a cancelled job never sleeps here.
    pub async fn with_retry<T, E, F, Fut>(
        &self,
        guard: &RunGuard,
        label: &str,
        mut op: F,
    ) -> Option<T>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if !guard.is_live().await {
                return None;
            }

            let error = match op().await {
                Ok(value) => {
                    self.failures.store(0, Ordering::SeqCst);
                    return Some(value);
                }
                Err(e) => e,
            };

            attempt += 1;
            let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::warn!(attempt, failures, "{} failed: {}", label, error);

            if !guard.is_live().await {
                return None;
            }
            if attempt >= self.attempts || failures > self.budget {
                tracing::warn!(attempt, failures, "Giving up on {}", label);
                self.failures.store(0, Ordering::SeqCst);
                return None;
            }

            let delay = self.base_delay * attempt;
            guard
                .emit(StatusUpdate::new(format!(
                    "Operation failed. Retrying in {}s... (Attempt {})",
                    delay.as_secs(),
                    attempt
                )))
                .await;
            if guard.sleep(delay).await.is_err() {
                return None;
            }
        }
    }
}
