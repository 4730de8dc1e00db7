//! Control API of the harvest engine.
//!
//! Calls return a short acknowledgment; everything that takes time is
//! reported on the status channel.

use crate::cancel::DelayRegistry;
use crate::discovery::Discovery;
use crate::error::{HarvestError, Result};
use crate::job::{JobCell, RunGuard};
use crate::retry::Retrier;
use crate::state::{self, FormSettings, Item, StateStore};
use crate::status::{JobOutcome, StatusReporter, StatusSnapshot, StatusUpdate};
use crate::walker::Worker;
use gleaner_browser::ExecutionContexts;
use gleaner_core::{AppConfig, CoreError, HarvestConfig, PageRange, RunId};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use url::Url;

/// Check a start request, returning the page range to walk or a message
/// for the user.
pub fn validate_request(
    target_url: &str,
    start_page: u32,
    end_page: u32,
    required_host: Option<&str>,
) -> std::result::Result<PageRange, String> {
    let target_url = target_url.trim();
    if target_url.is_empty() {
        return Err("Please enter a job URL.".to_string());
    }
    let url = Url::parse(target_url).map_err(|_| "Please enter a valid job URL.".to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err("Please enter a valid job URL.".to_string());
    }
    if let Some(required) = required_host {
        let host = url.host_str().unwrap_or_default();
        let matches = host == required || host.ends_with(&format!(".{required}"));
        if !matches {
            return Err(format!("The job URL must point to {required}."));
        }
    }

    PageRange::new(start_page, end_page).map_err(|CoreError::Validation(message)| message)
}

/// Owns one job: its persisted state, its worker and the status channel.
pub struct Harvester {
    cell: Arc<JobCell>,
    delays: Arc<DelayRegistry>,
    contexts: Arc<dyn ExecutionContexts>,
    retrier: Arc<Retrier>,
    discovery: Arc<Discovery>,
    config: HarvestConfig,
    worker: Mutex<Option<JoinHandle<JobOutcome>>>,
}

impl Harvester {
    /// Load the persisted job and prepare the engine.
    ///
    /// A stop request left pending by a previous process is honoured here.
    /// Call [`resume_if_needed`](Self::resume_if_needed) to pick up a job
    /// that was still running.
    pub async fn new(
        config: &AppConfig,
        contexts: Arc<dyn ExecutionContexts>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        let discovery = Discovery::new(&config.selectors, &config.harvest)?;
        let reporter = StatusReporter::new(config.harvest.status_channel_capacity);
        let cell = JobCell::load(store, reporter).await?;

        Ok(Self {
            cell: Arc::new(cell),
            delays: Arc::new(DelayRegistry::new()),
            contexts,
            retrier: Arc::new(Retrier::from_config(&config.harvest)),
            discovery: Arc::new(discovery),
            config: config.harvest.clone(),
            worker: Mutex::new(None),
        })
    }

    /// Receive every status snapshot published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.cell.subscribe()
    }

    fn worker_for(&self, run_id: RunId) -> Worker {
        Worker::new(
            RunGuard::new(self.cell.clone(), self.delays.clone(), run_id),
            self.contexts.clone(),
            self.retrier.clone(),
            self.discovery.clone(),
            self.config.clone(),
        )
    }

    async fn prepare_run(&self) {
        self.delays.reopen();
        self.retrier.reset();
    }

    /// Start walking `target_url` from `start_page` to `end_page`.
    ///
    /// Returns `Ok(false)` when a job is already running.
    pub async fn start(&self, target_url: &str, start_page: u32, end_page: u32) -> Result<bool> {
        let range = match validate_request(
            target_url,
            start_page,
            end_page,
            self.config.required_host.as_deref(),
        ) {
            Ok(range) => range,
            Err(reason) => {
                self.cell.emit(StatusUpdate::new(reason.clone())).await;
                return Err(HarvestError::InvalidRequest(reason));
            }
        };
        let target_url = target_url.trim();

        let mut worker = self.worker.lock().await;
        let run_id = RunId::generate();
        let mut started = false;
        self.cell
            .try_transition(|state| {
                if state.running {
                    return StatusUpdate::new("Downloading already in progress.");
                }
                state.begin(target_url, range, run_id.clone());
                started = true;
                StatusUpdate::new(format!(
                    "Starting download of pages {} to {}...",
                    range.start, range.end
                ))
                .progress(0.0)
            })
            .await?;
        if !started {
            tracing::info!("Start requested while a job is running");
            return Ok(false);
        }

        let settings = FormSettings {
            target_url: target_url.to_string(),
            page_range: range,
        };
        if let Err(e) = state::save_form_settings(self.cell.store(), &settings).await {
            tracing::warn!("Failed to save form settings: {}", e);
        }

        self.prepare_run().await;
        tracing::info!(run = %run_id, url = target_url, %range, "Harvest started");
        *worker = Some(tokio::spawn(self.worker_for(run_id).run()));
        Ok(true)
    }

    /// Ask the running job to stop.
    ///
    /// Pending delays end at once. If the worker has not wound down after
    /// the stop grace period, the job is marked stopped anyway.
    pub async fn stop(&self) -> Result<bool> {
        let mut stopping = None;
        self.cell
            .try_transition(|state| {
                if state.running {
                    state.stop_requested = true;
                    stopping = state.run_id.clone();
                    StatusUpdate::new("Stopping downloading process...")
                } else {
                    StatusUpdate::new("No download is running.")
                }
            })
            .await?;
        let cancelled = self.delays.cancel_all();
        let Some(run_id) = stopping else {
            return Ok(false);
        };
        tracing::info!(run = %run_id, cancelled, "Stop requested");

        let guard = RunGuard::new(self.cell.clone(), self.delays.clone(), run_id);
        let grace = self.config.stop_grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let forced = guard
                .report(|state| {
                    state.end_run();
                    StatusUpdate::new("Downloading stopped by user.").outcome(JobOutcome::Stopped)
                })
                .await;
            if forced {
                tracing::warn!(run = %guard.run_id(), "Worker did not stop in time; job marked stopped");
            }
        });
        Ok(true)
    }

    /// Last published snapshot, or a synthesized one before the first.
    pub async fn status(&self) -> StatusSnapshot {
        self.cell
            .inspect(|state| {
                state.last_status.clone().unwrap_or_else(|| {
                    let text = if state.running {
                        "Downloading in progress..."
                    } else {
                        "Ready to start downloading."
                    };
                    StatusSnapshot::project(state, &StatusUpdate::new(text))
                })
            })
            .await
    }

    /// Failure ledger, most recent failure first.
    pub async fn failed_items(&self) -> Vec<Item> {
        self.cell
            .inspect(|state| state.failed_items.most_recent_first())
            .await
    }

    /// Empty the failure ledger and reset the failed counter.
    pub async fn clear_failed_items(&self) -> Result<()> {
        self.cell
            .try_transition(|state| {
                state.failed_items.clear();
                state.counters.failed = 0;
                StatusUpdate::new("Failed profiles list cleared.")
            })
            .await?;
        Ok(())
    }

    /// Retry every item of the failure ledger.
    ///
    /// Refused while a job is running or when the ledger is empty.
    pub async fn replay_failed_items(&self) -> Result<bool> {
        let mut worker = self.worker.lock().await;
        let refused = self
            .cell
            .inspect(|state| state.running || state.failed_items.is_empty())
            .await;
        if refused {
            return Ok(false);
        }

        let run_id = RunId::generate();
        let mut items = Vec::new();
        self.cell
            .try_transition(|state| {
                items = state.begin_replay(run_id.clone());
                StatusUpdate::new(format!("Retrying {} failed profiles...", items.len()))
                    .progress(0.0)
            })
            .await?;

        self.prepare_run().await;
        *worker = Some(tokio::spawn(self.worker_for(run_id).replay(items)));
        Ok(true)
    }

    /// Continue a job that was running when the process went away.
    ///
    /// An interrupted replay goes on with the items it had not processed.
    /// A page walk resumes at its current page if its listing context still
    /// exists; otherwise it is reset to not running.
    pub async fn resume_if_needed(&self) -> Result<bool> {
        let mut worker = self.worker.lock().await;
        let (running, replay, handle) = self
            .cell
            .inspect(|state| {
                (
                    state.running,
                    state.replay_active,
                    state.execution_context_id.clone(),
                )
            })
            .await;
        if !running {
            return Ok(false);
        }

        if replay {
            let run_id = RunId::generate();
            let mut items = Vec::new();
            self.cell
                .try_transition(|state| {
                    items = state.replaying.clone();
                    state.stop_requested = false;
                    state.run_id = Some(run_id.clone());
                    StatusUpdate::new(format!(
                        "Resuming retry of {} failed profiles...",
                        items.len()
                    ))
                })
                .await?;

            self.prepare_run().await;
            tracing::info!(run = %run_id, pending = items.len(), "Replay resumed");
            *worker = Some(tokio::spawn(self.worker_for(run_id).replay(items)));
            return Ok(true);
        }

        let alive = match &handle {
            Some(handle) => self.contexts.context_exists(handle).await,
            None => false,
        };
        if !alive {
            tracing::info!("Listing context of the interrupted job is gone; not resuming");
            self.cell.try_update(crate::state::JobState::abandon).await?;
            return Ok(false);
        }

        let run_id = RunId::generate();
        self.cell
            .try_transition(|state| {
                state.stop_requested = false;
                state.run_id = Some(run_id.clone());
                StatusUpdate::new("Resuming downloading operation...")
            })
            .await?;

        self.prepare_run().await;
        tracing::info!(run = %run_id, "Harvest resumed");
        *worker = Some(tokio::spawn(self.worker_for(run_id).run()));
        Ok(true)
    }

    /// Last URL and page range used to start a job.
    pub async fn form_settings(&self) -> Result<FormSettings> {
        Ok(state::load_form_settings(self.cell.store())
            .await?
            .unwrap_or_default())
    }

    /// Wait for the most recently started worker to finish.
    pub async fn wait(&self) -> Option<JobOutcome> {
        let handle = self.worker.lock().await.take()?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!("Harvest worker panicked: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOB: &str = "https://www.linkedin.com/hiring/jobs/42/applicants/";

    #[test]
    fn test_valid_request() {
        let range = validate_request(JOB, 1, 20, Some("linkedin.com")).unwrap();
        assert_eq!(range, PageRange::new(1, 20).unwrap());
    }

    #[test]
    fn test_empty_url_rejected() {
        assert_eq!(
            validate_request("  ", 1, 1, None).unwrap_err(),
            "Please enter a job URL."
        );
    }

    #[test]
    fn test_non_http_url_rejected() {
        assert!(validate_request("ftp://www.linkedin.com/x", 1, 1, None).is_err());
        assert!(validate_request("not a url", 1, 1, None).is_err());
    }

    #[test]
    fn test_required_host() {
        assert!(validate_request("https://linkedin.com/jobs", 1, 1, Some("linkedin.com")).is_ok());
        assert!(validate_request("https://example.com/jobs", 1, 1, Some("linkedin.com")).is_err());
        assert!(
            validate_request("https://notlinkedin.com/jobs", 1, 1, Some("linkedin.com")).is_err()
        );
        assert!(validate_request("https://example.com/jobs", 1, 1, None).is_ok());
    }

    #[test]
    fn test_page_range_messages() {
        assert_eq!(
            validate_request(JOB, 0, 3, None).unwrap_err(),
            "Start page must be at least 1"
        );
        assert_eq!(
            validate_request(JOB, 4, 3, None).unwrap_err(),
            "End page must be greater than or equal to start page"
        );
    }
}
