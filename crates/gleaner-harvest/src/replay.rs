use crate::error::Interrupted;
use crate::processor::record_download;
use crate::state::Item;
use crate::status::{JobOutcome, StatusUpdate};
use crate::walker::Worker;

impl Worker {
    /// Retry the download of every item taken out of the failure ledger.
    ///
    /// Items are processed one at a time with the replay settle and
    /// inter-item delays. Items that fail again go back into the ledger, as
    /// do the ones left unprocessed when the replay is stopped.
    pub async fn replay(self, items: Vec<Item>) -> JobOutcome {
        let total = items.len();
        tracing::info!(run = %self.guard.run_id(), total, "Replaying failed profiles");

        let mut recovered = 0usize;
        let mut stopped = false;
        for (index, item) in items.iter().enumerate() {
            match self.replay_item(index, item).await {
                Ok(true) => recovered += 1,
                Ok(false) => {}
                Err(Interrupted::Cancelled) => {
                    stopped = true;
                    break;
                }
            }

            self.guard
                .emit(
                    StatusUpdate::new(format!(
                        "Retrying failed profiles: {}/{total} done, {recovered} recovered",
                        index + 1
                    ))
                    .fraction(index + 1, total),
                )
                .await;
        }

        let outcome = if stopped {
            JobOutcome::Stopped
        } else {
            JobOutcome::Complete
        };
        self.guard
            .report(|state| {
                state.end_run();
                let text = if stopped {
                    format!("Retry stopped. Recovered {recovered} of {total} failed profiles.")
                } else {
                    format!(
                        "Retry complete. Recovered {recovered} of {total} failed profiles, {} still failing.",
                        state.failed_items.len()
                    )
                };
                StatusUpdate::new(text).progress(100.0).outcome(outcome)
            })
            .await;
        tracing::info!(recovered, total, ?outcome, "Replay finished");
        outcome
    }

    async fn replay_item(&self, index: usize, item: &Item) -> Result<bool, Interrupted> {
        if index > 0 {
            self.guard.sleep(self.config.replay_item_delay()).await?;
        }
        let downloaded = self
            .download_item(item, self.config.replay_settle())
            .await?;

        self.guard
            .apply(|state| {
                state.replaying.retain(|pending| pending.url != item.url);
                record_download(state, item, downloaded);
            })
            .await
            .ok_or(Interrupted::Cancelled)?;
        Ok(downloaded)
    }
}
