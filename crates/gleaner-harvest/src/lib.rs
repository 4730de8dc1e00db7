//! Gleaner Harvest - resumable applicant harvesting.
//!
//! This crate walks the paginated applicant listing of a job posting, visits
//! every profile it discovers and triggers the download of each resume. The
//! job survives restarts: its state is written through to a [`StateStore`]
//! after every change, and a job that was running when the process went away
//! can be resumed as long as its listing context is still alive.
//!
//! # Features
//!
//! - One sequential worker per job, driven as a phase machine
//! - Stop requests that cut pending delays short
//! - Bounded retries with a shared failure budget
//! - A failure ledger of profiles whose resume could not be retrieved, with
//!   a replay operation
//! - Status snapshots broadcast to any number of subscribers
//!
//! # Example
//!
//! ```rust,ignore
//! use gleaner_harvest::{Harvester, MemoryStateStore};
//! use std::sync::Arc;
//!
//! let harvester = Harvester::new(
//!     &config,
//!     Arc::new(browser_engine),
//!     Arc::new(MemoryStateStore::new()),
//! )
//! .await?;
//!
//! let mut status = harvester.subscribe();
//! harvester.start("https://www.linkedin.com/hiring/jobs/42/applicants/", 1, 3).await?;
//! while let Ok(snapshot) = status.recv().await {
//!     println!("{}", snapshot.text);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod cancel;
#[allow(missing_docs)]
pub mod discovery;
pub mod error;
pub mod harvester;
#[allow(missing_docs)]
pub mod job;
pub mod ledger;
mod processor;
mod replay;
#[allow(missing_docs)]
pub mod retry;
#[allow(missing_docs)]
pub mod state;
#[allow(missing_docs)]
pub mod status;
pub mod walker;

// Re-export commonly used types
pub use cancel::{CancellableDelay, DelayOutcome, DelayRegistry};
pub use discovery::Discovery;
pub use error::{HarvestError, Interrupted, Result};
pub use harvester::{validate_request, Harvester};
pub use job::{JobCell, RunGuard};
pub use ledger::FailureLedger;
pub use retry::Retrier;
pub use state::{
    Counters, FormSettings, Item, JobState, MemoryStateStore, SqliteStateStore, StateStore,
};
pub use status::{JobOutcome, StatusReporter, StatusSnapshot, StatusUpdate};
pub use walker::{page_url, Worker};
