//! Progress snapshots and their broadcast channel.

use crate::state::{Item, JobState};
use gleaner_core::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Complete,
    Stopped,
    Failed,
}

/// Immutable projection of [`JobState`] pushed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub text: String,
    pub is_running: bool,
    pub current_page: u32,
    pub visited: u64,
    pub downloaded: u64,
    pub failed: u64,
    pub failed_items: Vec<Item>,
    pub progress_percent: f64,
    pub timestamp: Timestamp,
    /// Present only on the last snapshot of a job
    #[serde(default)]
    pub outcome: Option<JobOutcome>,
}

impl StatusSnapshot {
    /// Project `state` with the given message.
    #[must_use]
    pub fn project(state: &JobState, update: &StatusUpdate) -> Self {
        let progress = update.progress.unwrap_or_else(|| {
            state
                .last_status
                .as_ref()
                .map_or(0.0, |status| status.progress_percent)
        });

        Self {
            text: update.text.clone(),
            is_running: state.running,
            current_page: state.current_page,
            visited: state.counters.visited,
            downloaded: state.counters.downloaded,
            failed: state.counters.failed,
            failed_items: state.failed_items.iter().cloned().collect(),
            progress_percent: progress.clamp(0.0, 100.0),
            timestamp: Timestamp::now(),
            outcome: update.outcome,
        }
    }

    /// Whether this snapshot ends a job.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Message and progress for the next snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub text: String,
    /// `None` keeps the previous progress
    pub progress: Option<f64>,
    pub outcome: Option<JobOutcome>,
}

impl StatusUpdate {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            progress: None,
            outcome: None,
        }
    }

    #[must_use]
    pub fn progress(mut self, percent: f64) -> Self {
        self.progress = Some(percent);
        self
    }

    /// Progress of `processed` out of `total`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(self, processed: usize, total: usize) -> Self {
        if total == 0 {
            return self.progress(0.0);
        }
        self.progress(processed as f64 / total as f64 * 100.0)
    }

    #[must_use]
    pub fn outcome(mut self, outcome: JobOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }
}

/// Publishes snapshots to every subscriber.
///
/// Delivery is best-effort; having no subscriber is not an error.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    sender: broadcast::Sender<StatusSnapshot>,
}

impl StatusReporter {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.sender.subscribe()
    }

    /// Record `update` as the last status of `state` and broadcast it.
    pub fn publish(&self, state: &mut JobState, update: &StatusUpdate) -> StatusSnapshot {
        let snapshot = StatusSnapshot::project(state, update);
        tracing::debug!(
            page = snapshot.current_page,
            progress = snapshot.progress_percent,
            "{}",
            snapshot.text
        );
        state.last_status = Some(snapshot.clone());
        // Err only means nobody is listening.
        let _ = self.sender.send(snapshot.clone());
        snapshot
    }
}
