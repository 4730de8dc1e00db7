//! Gleaner Database Layer
//!
//! Provides `SQLite` key/value persistence for harvest orchestration state.
//! Uses `SQLx` with embedded, versioned migrations.
//!
//! # Example
//!
//! ```ignore
//! use gleaner_db::{kv, Database};
//!
//! let db = Database::new("gleaner.db").await?;
//! db.run_migrations().await?;
//! kv::set_value(db.pool(), "harvest.job_state", &serde_json::json!({})).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod connection;
pub mod error;
pub mod kv;
pub mod migrations;

// Re-export commonly used types
pub use connection::{StatePool, IN_MEMORY};
pub use error::{DatabaseError, Result};

use std::path::Path;

/// High-level database interface with migrations.
#[derive(Debug, Clone)]
pub struct Database {
    pool: StatePool,
}

impl Database {
    /// Open the database at `path` (or `:memory:` for in-memory).
    ///
    /// # Errors
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let pool = StatePool::new(path).await?;
        Ok(Self { pool })
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> Result<Self> {
        Self::new(IN_MEMORY).await
    }

    /// Run all pending database migrations.
    ///
    /// This should be called after creating a new database instance to ensure
    /// the schema is up to date.
    ///
    /// # Errors
    /// Returns `DatabaseError::Migration` if any migration fails.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(self.pool.pool()).await
    }

    /// Highest applied migration version.
    pub async fn schema_version(&self) -> Result<i64> {
        migrations::schema_version(self.pool.pool()).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        self.pool.pool()
    }

    /// Close the database connection gracefully.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
