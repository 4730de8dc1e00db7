//! Persisted job state and the key/value stores that hold it.

use crate::error::Result;
use crate::ledger::FailureLedger;
use crate::status::StatusSnapshot;
use async_trait::async_trait;
use gleaner_browser::ContextHandle;
use gleaner_core::{PageRange, RunId, Timestamp};
use gleaner_db::Database;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Key of the persisted [`JobState`].
pub const JOB_STATE_KEY: &str = "harvest.job_state";

/// Key of the persisted [`FormSettings`].
pub const FORM_SETTINGS_KEY: &str = "harvest.form_settings";

/// One discoverable profile on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Absolute URL of the profile; the identity of the item
    pub url: String,
    pub display_name: String,
    pub discovered_on_page: u32,
    /// Set when the item entered the failure ledger
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<Timestamp>,
}

impl Item {
    #[must_use]
    pub fn new(url: impl Into<String>, display_name: impl Into<String>, page: u32) -> Self {
        Self {
            url: url.into(),
            display_name: display_name.into(),
            discovered_on_page: page,
            failed_at: None,
        }
    }

    /// Copy of this item stamped with the current time as its failure time.
    #[must_use]
    pub fn failed_now(&self) -> Self {
        Self {
            failed_at: Some(Timestamp::now()),
            ..self.clone()
        }
    }
}

/// Progress counters of the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub visited: u64,
    pub downloaded: u64,
    pub failed: u64,
}

/// The single source of truth for a harvest job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobState {
    pub running: bool,
    pub stop_requested: bool,
    pub target_url: String,
    pub page_range: PageRange,
    pub current_page: u32,
    pub counters: Counters,
    pub failed_items: FailureLedger,
    /// Long-lived listing context owned by the job
    pub execution_context_id: Option<ContextHandle>,
    pub last_status: Option<StatusSnapshot>,
    /// Identity of the worker that owns the job
    pub run_id: Option<RunId>,
    /// Ledger items taken out for a replay that has not processed them yet
    pub replaying: Vec<Item>,
    /// Whether the running job is a replay rather than a page walk
    pub replay_active: bool,
}

impl JobState {
    /// Reset for a fresh job over `range` of `target_url`.
    ///
    /// Counters and the failure ledger start empty. The listing context
    /// survives so it can be reused.
    pub fn begin(&mut self, target_url: &str, range: PageRange, run_id: RunId) {
        self.running = true;
        self.stop_requested = false;
        self.target_url = target_url.to_string();
        self.page_range = range;
        self.current_page = range.start;
        self.counters = Counters::default();
        self.failed_items.clear();
        self.replaying.clear();
        self.replay_active = false;
        self.run_id = Some(run_id);
    }

    /// Hand the whole failure ledger to a replay run.
    pub fn begin_replay(&mut self, run_id: RunId) -> Vec<Item> {
        self.restore_replaying();
        let items = self.failed_items.take();
        self.replaying.clone_from(&items);
        self.replay_active = true;
        self.running = true;
        self.stop_requested = false;
        self.run_id = Some(run_id);
        items
    }

    /// Mark the job as no longer running.
    pub fn end_run(&mut self) {
        self.running = false;
        self.stop_requested = false;
        self.replay_active = false;
        self.restore_replaying();
    }

    /// Put items of an unfinished replay back into the ledger.
    pub fn restore_replaying(&mut self) {
        for item in self.replaying.drain(..) {
            self.failed_items.insert(item);
        }
    }

    /// Whether the worker identified by `run_id` may keep going.
    #[must_use]
    pub fn is_live(&self, run_id: &RunId) -> bool {
        self.running && !self.stop_requested && self.run_id.as_ref() == Some(run_id)
    }

    /// Whether the worker identified by `run_id` still owns the job, even if
    /// a stop has been requested.
    #[must_use]
    pub fn is_owned_by(&self, run_id: &RunId) -> bool {
        self.running && self.run_id.as_ref() == Some(run_id)
    }

    /// Honour a stop request that was pending when the process went away.
    ///
    /// Returns `true` when the state changed.
    pub fn normalize_stop_intent(&mut self) -> bool {
        if self.running && self.stop_requested {
            self.end_run();
            return true;
        }
        false
    }

    /// Drop a running job whose listing context can no longer be trusted.
    pub fn abandon(&mut self) {
        self.end_run();
        self.execution_context_id = None;
    }
}

/// Last values entered on the control surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormSettings {
    pub target_url: String,
    pub page_range: PageRange,
}

/// Schemaless key/value persistence of JSON values.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

pub async fn load_job_state(store: &dyn StateStore) -> Result<Option<JobState>> {
    match store.get(JOB_STATE_KEY).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

pub async fn save_job_state(store: &dyn StateStore, state: &JobState) -> Result<()> {
    store.set(JOB_STATE_KEY, serde_json::to_value(state)?).await
}

pub async fn load_form_settings(store: &dyn StateStore) -> Result<Option<FormSettings>> {
    match store.get(FORM_SETTINGS_KEY).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

pub async fn save_form_settings(store: &dyn StateStore, settings: &FormSettings) -> Result<()> {
    store
        .set(FORM_SETTINGS_KEY, serde_json::to_value(settings)?)
        .await
}

/// [`StateStore`] backed by the `kv_store` table.
#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    db: Database,
}

impl SqliteStateStore {
    /// Wrap a database whose migrations have been run.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(gleaner_db::kv::get_value(self.db.pool(), key).await?)
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        Ok(gleaner_db::kv::set_value(self.db.pool(), key, &value).await?)
    }
}

/// Volatile [`StateStore`] for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values().insert(key.to_string(), value);
        Ok(())
    }
}
