//! Subcommand handlers.

use anyhow::{bail, Result};
use gleaner_harvest::{Harvester, Item, JobOutcome, StatusSnapshot};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

/// One status line as printed while following a job.
pub fn format_snapshot(snapshot: &StatusSnapshot) -> String {
    format!(
        "[{:>5.1}%] {} (page {}, visited {}, downloaded {}, failed {})",
        snapshot.progress_percent,
        snapshot.text,
        snapshot.current_page,
        snapshot.visited,
        snapshot.downloaded,
        snapshot.failed
    )
}

pub fn format_item(item: &Item) -> String {
    let failed_at = item
        .failed_at
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{failed_at}  page {:<3} {}  {}",
        item.discovered_on_page, item.display_name, item.url
    )
}

pub async fn start(
    harvester: &Harvester,
    url: &str,
    start_page: u32,
    end_page: u32,
    stop_grace: Duration,
) -> Result<Option<JobOutcome>> {
    let mut status = harvester.subscribe();
    if !harvester.start(url, start_page, end_page).await? {
        bail!("Downloading already in progress.");
    }
    follow(harvester, &mut status, stop_grace).await
}

pub async fn resume(harvester: &Harvester, stop_grace: Duration) -> Result<Option<JobOutcome>> {
    let mut status = harvester.subscribe();
    if !harvester.resume_if_needed().await? {
        println!("Nothing to resume.");
        return Ok(None);
    }
    follow(harvester, &mut status, stop_grace).await
}

pub async fn retry_failed(
    harvester: &Harvester,
    stop_grace: Duration,
) -> Result<Option<JobOutcome>> {
    let mut status = harvester.subscribe();
    if !harvester.replay_failed_items().await? {
        println!("No failed profiles to retry.");
        return Ok(None);
    }
    follow(harvester, &mut status, stop_grace).await
}

pub async fn status(harvester: &Harvester, json: bool) -> Result<()> {
    let snapshot = harvester.status().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{}", format_snapshot(&snapshot));
        println!("running: {}", snapshot.is_running);
    }
    Ok(())
}

pub async fn failed(harvester: &Harvester, json: bool) -> Result<()> {
    let items = harvester.failed_items().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    if items.is_empty() {
        println!("No failed profiles.");
    }
    for item in &items {
        println!("{}", format_item(item));
    }
    Ok(())
}

pub async fn clear_failed(harvester: &Harvester) -> Result<()> {
    harvester.clear_failed_items().await?;
    println!("Failed profiles list cleared.");
    Ok(())
}

/// Print status lines until the job reaches a terminal outcome.
///
/// Ctrl-C asks the job to stop; the stop itself is reported on the channel.
async fn follow(
    harvester: &Harvester,
    status: &mut broadcast::Receiver<StatusSnapshot>,
    stop_grace: Duration,
) -> Result<Option<JobOutcome>> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stopping = false;

    let outcome = loop {
        tokio::select! {
            signal = &mut ctrl_c, if !stopping => {
                signal?;
                stopping = true;
                tracing::info!("Interrupt received; stopping");
                harvester.stop().await?;
            }
            received = status.recv() => match received {
                Ok(snapshot) => {
                    println!("{}", format_snapshot(&snapshot));
                    if let Some(outcome) = snapshot.outcome {
                        break Some(outcome);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Status output fell behind");
                }
                Err(RecvError::Closed) => break None,
            }
        }
    };

    // A worker stuck in the browser is not waited for past the stop grace.
    if tokio::time::timeout(stop_grace * 2, harvester.wait())
        .await
        .is_err()
    {
        tracing::warn!("Worker still busy after the job ended");
    }
    Ok(outcome)
}
