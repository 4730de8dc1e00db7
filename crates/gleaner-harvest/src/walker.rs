//! The page walker: one sequential worker driving a job from its first page
//! to a terminal outcome.
//!
//! Every phase returns the next phase or [`Interrupted::Cancelled`], which
//! `?` carries straight to the `Stopped` exit.

use crate::discovery::Discovery;
use crate::error::Interrupted;
use crate::job::RunGuard;
use crate::retry::Retrier;
use crate::state::Item;
use crate::status::{JobOutcome, StatusUpdate};
use gleaner_browser::{ContextHandle, ExecutionContexts};
use gleaner_core::HarvestConfig;
use std::sync::Arc;
use url::Url;

/// Listing URL of `page`, with the page offset in `param`.
///
/// Other query parameters of `target` are preserved.
pub fn page_url(
    target: &str,
    page: u32,
    page_size: u32,
    param: &str,
) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(target)?;
    let offset = u64::from(page.saturating_sub(1)) * u64::from(page_size);
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != param)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(param, &offset.to_string());
    Ok(url)
}

#[derive(Debug)]
enum Phase {
    Starting,
    PageLoading { reload: bool },
    Discovering {
        listing: ContextHandle,
        url: Url,
        reloaded: bool,
    },
    Visiting(Vec<Item>),
    Downloading(Vec<Item>),
    NextPage,
    PageEmptyRetry,
    PageEmptyAdvance,
    Complete { exhausted: bool },
    Stopped,
    Failed(String),
}

impl Phase {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Phase::Complete { .. } | Phase::Stopped | Phase::Failed(_)
        )
    }
}

/// Everything one run of a job needs. Dropped when the run ends.
pub struct Worker {
    pub(crate) guard: RunGuard,
    pub(crate) contexts: Arc<dyn ExecutionContexts>,
    pub(crate) retrier: Arc<Retrier>,
    pub(crate) discovery: Arc<Discovery>,
    pub(crate) config: HarvestConfig,
}

impl Worker {
    pub fn new(
        guard: RunGuard,
        contexts: Arc<dyn ExecutionContexts>,
        retrier: Arc<Retrier>,
        discovery: Arc<Discovery>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            guard,
            contexts,
            retrier,
            discovery,
            config,
        }
    }

    /// Walk the job's pages until it completes, stops or fails.
    pub async fn run(self) -> JobOutcome {
        tracing::info!(run = %self.guard.run_id(), "Harvest worker started");
        let mut phase = Phase::Starting;
        while !phase.is_terminal() {
            phase = self.step(phase).await.unwrap_or(Phase::Stopped);
        }
        self.finish(phase).await
    }

    async fn step(&self, phase: Phase) -> Result<Phase, Interrupted> {
        tracing::trace!(?phase, "Entering phase");
        match phase {
            Phase::Starting => {
                self.guard.checkpoint().await?;
                Ok(Phase::PageLoading { reload: false })
            }
            Phase::PageLoading { reload } => self.load_page(reload).await,
            Phase::Discovering {
                listing,
                url,
                reloaded,
            } => {
                let page = self.current_page().await;
                let items = self.discover(&listing, &url, page).await?;
                if items.is_empty() {
                    return Ok(if reloaded {
                        Phase::PageEmptyAdvance
                    } else {
                        Phase::PageEmptyRetry
                    });
                }
                self.guard
                    .emit(StatusUpdate::new(format!(
                        "Found {} profiles on page {page}. Visiting profiles...",
                        items.len()
                    )))
                    .await;
                Ok(Phase::Visiting(items))
            }
            Phase::PageEmptyRetry => {
                let page = self.current_page().await;
                tracing::info!(page, "No profiles found; reloading once");
                self.guard
                    .emit(StatusUpdate::new(format!(
                        "No profiles found on page {page}. Reloading..."
                    )))
                    .await;
                Ok(Phase::PageLoading { reload: true })
            }
            Phase::PageEmptyAdvance => {
                let (page, end) = self.position().await;
                if page < end {
                    self.guard
                        .emit(StatusUpdate::new(format!(
                            "No profiles found on page {page}."
                        )))
                        .await;
                    Ok(Phase::NextPage)
                } else {
                    Ok(Phase::Complete { exhausted: false })
                }
            }
            Phase::Visiting(items) => {
                let page = self.current_page().await;
                self.visit_pass(page, &items).await?;
                self.guard
                    .emit(StatusUpdate::new(format!(
                        "Page {page}: Downloading resumes..."
                    )))
                    .await;
                Ok(Phase::Downloading(items))
            }
            Phase::Downloading(items) => {
                let (page, end) = self.position().await;
                self.download_pass(page, &items).await?;
                if page >= end {
                    Ok(Phase::Complete { exhausted: true })
                } else {
                    Ok(Phase::NextPage)
                }
            }
            Phase::NextPage => {
                self.guard.checkpoint().await?;
                self.guard
                    .apply(|state| state.current_page += 1)
                    .await
                    .ok_or(Interrupted::Cancelled)?;
                Ok(Phase::PageLoading { reload: false })
            }
            terminal @ (Phase::Complete { .. } | Phase::Stopped | Phase::Failed(_)) => Ok(terminal),
        }
    }

    /// Bring the listing context to the current page and let it settle.
    async fn load_page(&self, reload: bool) -> Result<Phase, Interrupted> {
        let (page, target) = self
            .guard
            .cell()
            .inspect(|state| (state.current_page, state.target_url.clone()))
            .await;
        let url = match page_url(
            &target,
            page,
            self.config.page_size,
            &self.config.page_query_param,
        ) {
            Ok(url) => url,
            Err(e) => return Ok(Phase::Failed(format!("Invalid job URL: {e}"))),
        };

        self.guard
            .emit(StatusUpdate::new(format!("Processing page {page}...")).progress(0.0))
            .await;

        let owned = self
            .guard
            .cell()
            .inspect(|state| state.execution_context_id.clone())
            .await;

        let mut listing = None;
        if let Some(handle) = owned {
            if self.contexts.context_exists(&handle).await {
                if !self.navigate_listing(&handle, &url).await? {
                    tracing::warn!(page, "Listing page did not load; treating it as empty");
                    return Ok(if reload {
                        Phase::PageEmptyAdvance
                    } else {
                        Phase::PageEmptyRetry
                    });
                }
                listing = Some(handle);
            } else {
                tracing::warn!(context = %handle, "Listing context is gone; opening a new one");
                self.guard
                    .apply(|state| state.execution_context_id = None)
                    .await
                    .ok_or(Interrupted::Cancelled)?;
            }
        }

        let listing = match listing {
            Some(handle) => handle,
            None => match self.open_listing(&url).await? {
                Some(handle) => handle,
                None => return Ok(Phase::Failed("Could not open the listing page".to_string())),
            },
        };

        self.guard.sleep(self.config.page_settle()).await?;
        Ok(Phase::Discovering {
            listing,
            url,
            reloaded: reload,
        })
    }

    async fn navigate_listing(
        &self,
        handle: &ContextHandle,
        url: &Url,
    ) -> Result<bool, Interrupted> {
        let loaded = self
            .retrier
            .with_retry(&self.guard, "load listing page", || {
                self.contexts.navigate(handle, url.as_str())
            })
            .await;
        self.guard.checkpoint().await?;
        Ok(loaded.is_some())
    }

    async fn open_listing(&self, url: &Url) -> Result<Option<ContextHandle>, Interrupted> {
        let opened = self
            .retrier
            .with_retry(&self.guard, "open listing page", || {
                self.contexts.open_context(url.as_str())
            })
            .await;
        self.guard.checkpoint().await?;
        let Some(handle) = opened else {
            return Ok(None);
        };

        let stored = self
            .guard
            .apply(|state| state.execution_context_id = Some(handle.clone()))
            .await;
        if stored.is_none() {
            self.contexts.close_context(&handle).await;
            return Err(Interrupted::Cancelled);
        }
        tracing::debug!(context = %handle, "Listing context opened");
        Ok(Some(handle))
    }

    async fn current_page(&self) -> u32 {
        self.guard.cell().inspect(|state| state.current_page).await
    }

    async fn position(&self) -> (u32, u32) {
        self.guard
            .cell()
            .inspect(|state| (state.current_page, state.page_range.end))
            .await
    }

    /// Record the terminal outcome, unless another party already did.
    async fn finish(&self, phase: Phase) -> JobOutcome {
        match phase {
            Phase::Failed(reason) => {
                tracing::error!("Harvest failed: {}", reason);
                let mut listing = None;
                self.guard
                    .report(|state| {
                        listing = state.execution_context_id.take();
                        state.end_run();
                        StatusUpdate::new(format!("Error: {reason}")).outcome(JobOutcome::Failed)
                    })
                    .await;
                if let Some(handle) = listing {
                    self.contexts.close_context(&handle).await;
                }
                JobOutcome::Failed
            }
            Phase::Complete { exhausted } => {
                self.guard
                    .report(|state| {
                        state.end_run();
                        let text = if exhausted {
                            format!(
                                "Downloading complete. Downloaded {} resumes, failed {}.",
                                state.counters.downloaded, state.counters.failed
                            )
                        } else {
                            "No more profiles found. Downloading complete.".to_string()
                        };
                        StatusUpdate::new(text)
                            .progress(100.0)
                            .outcome(JobOutcome::Complete)
                    })
                    .await;
                tracing::info!("Harvest complete");
                JobOutcome::Complete
            }
            _ => {
                self.guard
                    .report(|state| {
                        state.end_run();
                        StatusUpdate::new("Downloading stopped.").outcome(JobOutcome::Stopped)
                    })
                    .await;
                tracing::info!("Harvest stopped");
                JobOutcome::Stopped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: &str = "https://www.linkedin.com/hiring/jobs/42/applicants/?sort_by=date";

    #[test]
    fn test_first_page_has_zero_offset() {
        let url = page_url(TARGET, 1, 25, "start").unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.linkedin.com/hiring/jobs/42/applicants/?sort_by=date&start=0"
        );
    }

    #[test]
    fn test_offset_replaces_existing_param() {
        let url = page_url(
            "https://www.linkedin.com/hiring/jobs/42/applicants/?start=75&sort_by=date",
            3,
            25,
            "start",
        )
        .unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("sort_by".to_string(), "date".to_string()),
                ("start".to_string(), "50".to_string())
            ]
        );
    }

    #[test]
    fn test_offset_beyond_u32() {
        let url = page_url(TARGET, 200_000_000, 25, "start").unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.linkedin.com/hiring/jobs/42/applicants/?sort_by=date&start=4999999975"
        );
        let url = page_url(TARGET, u32::MAX, u32::MAX, "start").unwrap();
        let expected = u64::from(u32::MAX - 1) * u64::from(u32::MAX);
        assert!(url.as_str().ends_with(&format!("start={expected}")));
    }

    #[test]
    fn test_invalid_target() {
        assert!(page_url("not a url", 1, 25, "start").is_err());
    }
}
