//! Database connection management.
//!
//! Provides a `StatePool` wrapper around `SQLx` that handles file creation
//! and the single-connection constraint of in-memory databases.

use crate::error::{DatabaseError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// Path understood as a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Connection pool for the harvest state database.
#[derive(Debug, Clone)]
pub struct StatePool {
    pool: Pool<Sqlite>,
}

impl StatePool {
    /// Open (creating if needed) the database at `path`.
    ///
    /// # Arguments
    /// * `path` - Path to the `SQLite` database file (or `:memory:` for in-memory)
    ///
    /// # Errors
    /// Returns `DatabaseError` if:
    /// - The path is not valid UTF-8
    /// - The parent directory cannot be created
    /// - The database file cannot be opened
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_str().ok_or_else(|| {
            DatabaseError::Open("invalid database path: not valid UTF-8".to_string())
        })?;

        if path_str == IN_MEMORY {
            // Every connection to :memory: is a distinct database, so the pool
            // must hold exactly one connection and never recycle it.
            let connect_options = SqliteConnectOptions::from_str(path_str)
                .map_err(|e| DatabaseError::Open(format!("invalid connection string: {e}")))?;
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(connect_options)
                .await
                .map_err(|e| DatabaseError::Open(format!("failed to open in-memory pool: {e}")))?;

            tracing::debug!("In-memory state database created");
            return Ok(Self { pool });
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .map_err(|e| DatabaseError::Open(format!("failed to open {path_str}: {e}")))?;

        tracing::info!("State database pool created at {}", path_str);

        Ok(Self { pool })
    }

    /// Get a reference to the underlying `SQLx` pool.
    ///
    /// This allows consumers to execute queries directly using `SQLx`.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the connection pool gracefully.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("State database pool closed");
    }

    /// Verify that the database answers queries.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_pool_creation() {
        let pool = StatePool::new(IN_MEMORY).await.expect("create pool");
        pool.ping().await.expect("ping in-memory database");
    }

    #[tokio::test]
    async fn test_file_pool_creates_parent_dirs() {
        let tmp = tempfile::TempDir::new().expect("create temp dir");
        let path = tmp.path().join("nested").join("state.db");

        let pool = StatePool::new(&path).await.expect("create file pool");
        pool.ping().await.expect("ping file database");
        assert!(path.exists());

        pool.close().await;
    }
}
