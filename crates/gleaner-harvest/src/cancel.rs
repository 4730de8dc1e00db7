//! Cancellable delays and the per-job registry that tracks them.
//!
//! Every settle, backoff and replay wait goes through [`DelayRegistry::delay`]
//! so that a stop request can cut all of them short at once.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a [`CancellableDelay`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayOutcome {
    Elapsed,
    Cancelled,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    pending: HashMap<u64, CancellationToken>,
    closed: bool,
}

/// Pending delays of one job, keyed by a local id.
#[derive(Debug, Default)]
pub struct DelayRegistry {
    inner: Mutex<RegistryInner>,
}

impl DelayRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a delay of `duration`.
    ///
    /// While the registry is closed the returned delay is already cancelled.
    pub fn delay(&self, duration: Duration) -> CancellableDelay<'_> {
        let mut inner = self.lock();
        let token = CancellationToken::new();
        if inner.closed {
            token.cancel();
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.pending.insert(id, token.clone());

        CancellableDelay {
            registry: self,
            id,
            token,
            duration,
        }
    }

    /// Cancel every pending delay and refuse new ones until [`reopen`].
    ///
    /// Returns the number of delays that were cut short.
    ///
    /// [`reopen`]: DelayRegistry::reopen
    pub fn cancel_all(&self) -> usize {
        let mut inner = self.lock();
        inner.closed = true;
        let drained: Vec<_> = inner.pending.drain().collect();
        for (_, token) in &drained {
            token.cancel();
        }
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "Cancelled pending delays");
        }
        drained.len()
    }

    /// Accept new delays again. Called when a job (re)starts.
    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of delays currently waiting.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    fn release(&self, id: u64) {
        self.lock().pending.remove(&id);
    }
}

/// A sleep paired with a cancellation token, registered in a [`DelayRegistry`].
///
/// Dropping the delay unregisters it.
#[derive(Debug)]
pub struct CancellableDelay<'a> {
    registry: &'a DelayRegistry,
    id: u64,
    token: CancellationToken,
    duration: Duration,
}

impl CancellableDelay<'_> {
    pub async fn wait(self) -> DelayOutcome {
        if self.token.is_cancelled() {
            return DelayOutcome::Cancelled;
        }
        tokio::select! {
            biased;
            () = self.token.cancelled() => DelayOutcome::Cancelled,
            () = tokio::time::sleep(self.duration) => DelayOutcome::Elapsed,
        }
    }
}

impl Drop for CancellableDelay<'_> {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_delay_elapses() {
        let registry = DelayRegistry::new();
        let started = Instant::now();

        let outcome = registry.delay(Duration::from_secs(2)).wait().await;

        assert_eq!(outcome, DelayOutcome::Elapsed);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(registry.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_wakes_pending_delays() {
        let registry = Arc::new(DelayRegistry::new());
        let started = Instant::now();

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.delay(Duration::from_secs(60)).wait().await })
        };
        while registry.pending() == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(registry.cancel_all(), 1);
        let outcome = waiter.await.unwrap();

        assert_eq!(outcome, DelayOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_after_cancel_returns_immediately() {
        let registry = DelayRegistry::new();
        registry.cancel_all();
        let started = Instant::now();

        let outcome = registry.delay(Duration::from_secs(5)).wait().await;

        assert_eq!(outcome, DelayOutcome::Cancelled);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_accepts_new_delays() {
        let registry = DelayRegistry::new();
        registry.cancel_all();
        assert!(registry.is_closed());

        registry.reopen();
        let outcome = registry.delay(Duration::from_millis(10)).wait().await;
        assert_eq!(outcome, DelayOutcome::Elapsed);
    }

    #[test]
    fn test_dropped_delay_is_unregistered() {
        let registry = DelayRegistry::new();
        let delay = registry.delay(Duration::from_secs(1));
        assert_eq!(registry.pending(), 1);
        drop(delay);
        assert_eq!(registry.pending(), 0);
    }
}
