//! The two passes run over every discovered page: visit, then download.

use crate::error::{HarvestError, Interrupted};
use crate::state::Item;
use crate::status::StatusUpdate;
use crate::walker::Worker;
use gleaner_browser::{ContextHandle, Extraction};
use std::time::Duration;
use url::Url;

type Step<T> = std::result::Result<T, Interrupted>;

impl Worker {
    /// Open and close every item's page once.
    ///
    /// Items whose page cannot be opened are skipped without bookkeeping.
    pub(crate) async fn visit_pass(&self, page: u32, items: &[Item]) -> Step<()> {
        let total = items.len();
        for (index, item) in items.iter().enumerate() {
            self.guard.checkpoint().await?;
            let visited = self.visit_item(item).await?;
            if !visited {
                tracing::debug!(url = %item.url, "Visit skipped");
            }

            self.guard
                .report(|state| {
                    if visited {
                        state.counters.visited += 1;
                    }
                    StatusUpdate::new(format!(
                        "Page {page}: Visited {}/{total} profiles",
                        index + 1
                    ))
                    .fraction(index + 1, total)
                })
                .await;
        }
        Ok(())
    }

    /// Retrieve every item's document, recording failures in the ledger.
    pub(crate) async fn download_pass(&self, page: u32, items: &[Item]) -> Step<()> {
        let total = items.len();
        for (index, item) in items.iter().enumerate() {
            self.guard.checkpoint().await?;
            let downloaded = self.download_item(item, self.config.download_settle()).await?;

            self.guard
                .report(|state| {
                    record_download(state, item, downloaded);
                    StatusUpdate::new(format!(
                        "Page {page}: Downloaded {} resumes, failed {} ({}/{total})",
                        state.counters.downloaded,
                        state.counters.failed,
                        index + 1
                    ))
                    .fraction(index + 1, total)
                })
                .await;
        }
        Ok(())
    }

    async fn visit_item(&self, item: &Item) -> Step<bool> {
        let Some(handle) = self.open_item(item).await? else {
            return Ok(false);
        };
        let settled = self.guard.sleep(self.config.visit_settle()).await;
        self.contexts.close_context(&handle).await;
        settled?;
        Ok(true)
    }

    /// Open the item, trigger its document download, and close it again.
    ///
    /// `Ok(false)` means the attempt failed and the item belongs in the
    /// ledger. The item context is closed on every path.
    pub(crate) async fn download_item(&self, item: &Item, settle: Duration) -> Step<bool> {
        let Some(handle) = self.open_item(item).await? else {
            return Ok(false);
        };
        let result = self.trigger_download(&handle, item, settle).await;
        self.contexts.close_context(&handle).await;
        result
    }

    async fn open_item(&self, item: &Item) -> Step<Option<ContextHandle>> {
        let handle = self
            .retrier
            .with_retry(&self.guard, "open profile", || {
                self.contexts.open_context(&item.url)
            })
            .await;
        match handle {
            Some(handle) => Ok(Some(handle)),
            None => {
                self.guard.checkpoint().await?;
                tracing::warn!(url = %item.url, "Could not open profile");
                Ok(None)
            }
        }
    }

    async fn trigger_download(
        &self,
        handle: &ContextHandle,
        item: &Item,
        settle: Duration,
    ) -> Step<bool> {
        self.guard.sleep(settle).await?;

        let Ok(base) = Url::parse(&item.url) else {
            tracing::warn!(url = %item.url, "Profile URL is not absolute");
            return Ok(false);
        };
        let content = Extraction::PageContent;
        let link = self
            .retrier
            .with_retry(&self.guard, "locate resume", || async {
                let html = self
                    .contexts
                    .run_extraction(handle, &content)
                    .await?
                    .into_html()?;
                let link = self
                    .discovery
                    .find_document_link(&html, &base)
                    .ok_or_else(|| HarvestError::DocumentLinkNotFound(item.url.clone()))?;
                self.contexts
                    .run_extraction(handle, &Extraction::follow_link(&link))
                    .await?;
                Ok::<_, HarvestError>(link)
            })
            .await;
        self.guard.checkpoint().await?;

        let Some(link) = link else {
            tracing::warn!(url = %item.url, "Resume not retrieved");
            return Ok(false);
        };
        tracing::info!(name = %item.display_name, %link, "Resume download triggered");

        self.guard.sleep(settle).await?;
        Ok(true)
    }
}

/// Count one download attempt for `item`.
pub(crate) fn record_download(state: &mut crate::state::JobState, item: &Item, downloaded: bool) {
    if downloaded {
        state.counters.downloaded += 1;
    } else {
        state.counters.failed += 1;
        state.failed_items.insert(item.failed_now());
    }
}
