//! Write-through ownership of the [`JobState`].
//!
//! [`JobCell`] keeps the state behind an async mutex and persists every
//! mutation before releasing the lock, so observers never see torn state.
//! [`RunGuard`] is the worker's view of the cell: it evaluates the
//! cancellation predicate and refuses writes from a worker that no longer
//! owns the job.

use crate::cancel::{DelayOutcome, DelayRegistry};
use crate::error::{Interrupted, Result};
use crate::state::{self, JobState, StateStore};
use crate::status::{StatusReporter, StatusSnapshot, StatusUpdate};
use gleaner_core::RunId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

pub struct JobCell {
    state: Mutex<JobState>,
    store: Arc<dyn StateStore>,
    reporter: StatusReporter,
}

impl JobCell {
    /// Load the persisted state, honouring a stop request that was pending
    /// when the process went away.
    pub async fn load(store: Arc<dyn StateStore>, reporter: StatusReporter) -> Result<Self> {
        let mut state = state::load_job_state(store.as_ref())
            .await?
            .unwrap_or_default();

        if state.normalize_stop_intent() {
            tracing::info!("Pending stop request found on load; job marked as not running");
            state::save_job_state(store.as_ref(), &state).await?;
        }

        Ok(Self {
            state: Mutex::new(state),
            store,
            reporter,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.reporter.subscribe()
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    /// Copy of the current state.
    pub async fn read(&self) -> JobState {
        self.state.lock().await.clone()
    }

    pub async fn inspect<R>(&self, f: impl FnOnce(&JobState) -> R) -> R {
        let state = self.state.lock().await;
        f(&*state)
    }

    /// Mutate and persist. A storage failure is returned to the caller.
    pub async fn try_update<R>(&self, f: impl FnOnce(&mut JobState) -> R) -> Result<R> {
        let mut state = self.state.lock().await;
        let result = f(&mut *state);
        state::save_job_state(self.store.as_ref(), &state).await?;
        Ok(result)
    }

    /// Mutate and persist. A storage failure is logged and ignored.
    pub async fn update<R>(&self, f: impl FnOnce(&mut JobState) -> R) -> R {
        let mut state = self.state.lock().await;
        let result = f(&mut *state);
        self.persist(&state).await;
        result
    }

    /// Mutate, publish a status built by `f`, and persist.
    pub async fn transition(
        &self,
        f: impl FnOnce(&mut JobState) -> StatusUpdate,
    ) -> StatusSnapshot {
        let mut state = self.state.lock().await;
        let update = f(&mut *state);
        let snapshot = self.reporter.publish(&mut state, &update);
        self.persist(&state).await;
        snapshot
    }

    /// Like [`transition`](Self::transition) but surfaces storage failures.
    pub async fn try_transition(
        &self,
        f: impl FnOnce(&mut JobState) -> StatusUpdate,
    ) -> Result<StatusSnapshot> {
        let mut state = self.state.lock().await;
        let update = f(&mut *state);
        let snapshot = self.reporter.publish(&mut state, &update);
        state::save_job_state(self.store.as_ref(), &state).await?;
        Ok(snapshot)
    }

    pub async fn emit(&self, update: StatusUpdate) -> StatusSnapshot {
        self.transition(|_| update).await
    }

    /// Mutate, optionally publish, and persist, but only while `run_id`
    /// owns the job.
    async fn apply_owned<R>(
        &self,
        run_id: &RunId,
        f: impl FnOnce(&mut JobState) -> (R, Option<StatusUpdate>),
    ) -> Option<R> {
        let mut state = self.state.lock().await;
        if !state.is_owned_by(run_id) {
            tracing::debug!(run = %run_id, "Ignoring write from a worker that no longer owns the job");
            return None;
        }
        let (result, update) = f(&mut *state);
        if let Some(update) = update {
            self.reporter.publish(&mut state, &update);
        }
        self.persist(&state).await;
        Some(result)
    }

    async fn persist(&self, state: &JobState) {
        if let Err(e) = state::save_job_state(self.store.as_ref(), state).await {
            tracing::error!("Failed to persist job state: {}", e);
        }
    }
}

/// A worker's handle on the job it was started for.
#[derive(Clone)]
pub struct RunGuard {
    cell: Arc<JobCell>,
    delays: Arc<DelayRegistry>,
    run_id: RunId,
}

impl RunGuard {
    pub fn new(cell: Arc<JobCell>, delays: Arc<DelayRegistry>, run_id: RunId) -> Self {
        Self {
            cell,
            delays,
            run_id,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn cell(&self) -> &JobCell {
        &self.cell
    }

    /// `running && !stop_requested` for this worker's run.
    pub async fn is_live(&self) -> bool {
        self.cell.inspect(|state| state.is_live(&self.run_id)).await
    }

    pub async fn checkpoint(&self) -> std::result::Result<(), Interrupted> {
        if self.is_live().await {
            Ok(())
        } else {
            Err(Interrupted::Cancelled)
        }
    }

    /// Wait for `duration` unless the job is cancelled first.
    pub async fn sleep(&self, duration: Duration) -> std::result::Result<(), Interrupted> {
        self.checkpoint().await?;
        if self.delays.delay(duration).wait().await == DelayOutcome::Cancelled {
            return Err(Interrupted::Cancelled);
        }
        self.checkpoint().await
    }

    /// Mutate the state if this worker still owns the job.
    pub async fn apply<R>(&self, f: impl FnOnce(&mut JobState) -> R) -> Option<R> {
        self.cell
            .apply_owned(&self.run_id, |state| (f(state), None))
            .await
    }

    /// Mutate the state and publish the status `f` returns, if this worker
    /// still owns the job.
    pub async fn report(&self, f: impl FnOnce(&mut JobState) -> StatusUpdate) -> bool {
        self.cell
            .apply_owned(&self.run_id, |state| ((), Some(f(state))))
            .await
            .is_some()
    }

    /// Publish `update` if this worker still owns the job.
    pub async fn emit(&self, update: StatusUpdate) -> bool {
        self.report(|_| update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;
    use gleaner_core::PageRange;

    async fn cell_with(state: JobState) -> Arc<JobCell> {
        let store = Arc::new(MemoryStateStore::new());
        state::save_job_state(store.as_ref(), &state).await.unwrap();
        Arc::new(JobCell::load(store, StatusReporter::new(16)).await.unwrap())
    }

    fn running(run_id: &RunId) -> JobState {
        let mut state = JobState::default();
        state.begin("https://www.linkedin.com/jobs/1", PageRange::default(), run_id.clone());
        state
    }

    #[tokio::test]
    async fn test_load_normalizes_pending_stop() {
        let run_id = RunId::generate();
        let mut state = running(&run_id);
        state.stop_requested = true;

        let store = Arc::new(MemoryStateStore::new());
        state::save_job_state(store.as_ref(), &state).await.unwrap();
        let cell = JobCell::load(store.clone(), StatusReporter::new(4))
            .await
            .unwrap();

        assert!(!cell.read().await.running);
        let persisted = state::load_job_state(store.as_ref()).await.unwrap().unwrap();
        assert!(!persisted.running);
        assert!(!persisted.stop_requested);
    }

    #[tokio::test]
    async fn test_update_writes_through() {
        let cell = cell_with(JobState::default()).await;
        cell.update(|state| state.counters.visited = 4).await;

        let persisted = state::load_job_state(cell.store()).await.unwrap().unwrap();
        assert_eq!(persisted.counters.visited, 4);
    }

    #[tokio::test]
    async fn test_inspect_sees_latest_update() {
        let run_id = RunId::generate();
        let cell = cell_with(running(&run_id)).await;
        cell.update(|state| state.current_page = 3).await;

        let (page, live) = cell
            .inspect(|state| (state.current_page, state.is_live(&run_id)))
            .await;
        assert_eq!(page, 3);
        assert!(live);
    }

    #[tokio::test]
    async fn test_transition_records_last_status() {
        let cell = cell_with(JobState::default()).await;
        let mut rx = cell.subscribe();

        let snapshot = cell.emit(StatusUpdate::new("Ready")).await;

        assert_eq!(rx.recv().await.unwrap(), snapshot);
        let persisted = state::load_job_state(cell.store()).await.unwrap().unwrap();
        assert_eq!(persisted.last_status, Some(snapshot));
    }

    #[tokio::test]
    async fn test_stale_worker_cannot_write() {
        let mine = RunId::generate();
        let cell = cell_with(running(&RunId::generate())).await;
        let guard = RunGuard::new(cell.clone(), Arc::new(DelayRegistry::new()), mine);

        assert!(!guard.is_live().await);
        assert!(guard.apply(|state| state.counters.downloaded += 1).await.is_none());
        assert!(!guard.emit(StatusUpdate::new("stale")).await);
        assert_eq!(cell.read().await.counters.downloaded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_cut_short_by_stop() {
        let run_id = RunId::generate();
        let cell = cell_with(running(&run_id)).await;
        let delays = Arc::new(DelayRegistry::new());
        let guard = RunGuard::new(cell.clone(), delays.clone(), run_id);
        let started = tokio::time::Instant::now();

        let sleeper = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.sleep(Duration::from_secs(30)).await })
        };
        while delays.pending() == 0 {
            tokio::task::yield_now().await;
        }
        cell.update(|state| state.stop_requested = true).await;
        delays.cancel_all();

        assert_eq!(sleeper.await.unwrap(), Err(Interrupted::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
