//! Wiring of configuration, storage and browser for one command.

use crate::detached::Detached;
use anyhow::{Context, Result};
use gleaner_browser::{BrowserEngine, ExecutionContexts};
use gleaner_core::AppConfig;
use gleaner_db::Database;
use gleaner_harvest::{Harvester, SqliteStateStore};
use std::path::Path;
use std::sync::Arc;

/// Loaded configuration plus the open state database.
pub struct App {
    config: AppConfig,
    db: Database,
}

impl App {
    /// Load the configuration and open (migrating if needed) the state
    /// database it names.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let path = config
            .database_path()
            .context("Failed to resolve the state database path")?;
        tracing::info!("State database: {}", path.display());

        let db = Database::new(&path)
            .await
            .with_context(|| format!("Failed to open state database at {}", path.display()))?;
        db.run_migrations()
            .await
            .context("Failed to migrate the state database")?;
        let version = db.schema_version().await?;
        tracing::debug!(version, "State database ready");
        Ok(Self { config, db })
    }

    /// Load the configuration from `path`, or the default location.
    pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
        AppConfig::load_with_env(path).context("Failed to load configuration")
    }

    /// A harvester driving a real browser.
    pub async fn attached(&self) -> Result<Harvester> {
        let engine = BrowserEngine::from_config(&self.config.browser)
            .await
            .context("Failed to start the browser")?;
        self.harvester(Arc::new(engine)).await
    }

    /// A harvester for commands that only touch persisted state.
    pub async fn detached(&self) -> Result<Harvester> {
        self.harvester(Arc::new(Detached)).await
    }

    async fn harvester(&self, contexts: Arc<dyn ExecutionContexts>) -> Result<Harvester> {
        let store = Arc::new(SqliteStateStore::new(self.db.clone()));
        Harvester::new(&self.config, contexts, store)
            .await
            .context("Failed to load the harvest job")
    }

    pub async fn close(self) {
        self.db.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_detached_harvester_reads_fresh_state() {
        let tmp = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.storage.database_path = Some(tmp.path().join("nested").join("state.db"));

        let app = App::open(config).await.unwrap();
        let harvester = app.detached().await.unwrap();
        let status = harvester.status().await;
        assert!(!status.is_running);
        assert_eq!(status.text, "Ready to start downloading.");
        assert!(harvester.failed_items().await.is_empty());
        app.close().await;
    }
}
