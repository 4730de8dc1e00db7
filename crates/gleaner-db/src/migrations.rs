//! Embedded schema migrations for the state database.
//!
//! The SQL files under `migrations/` are compiled into the binary, so a
//! fresh data directory is brought up to date on first open.

use crate::error::{DatabaseError, Result};
use sqlx::migrate::Migrator;
use sqlx::{Pool, Sqlite};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply every migration not yet recorded in `_sqlx_migrations`.
///
/// # Errors
/// Returns `DatabaseError::Migration` if a migration fails to apply.
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    let before = schema_version(pool).await?;
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration execution failed: {e}")))?;

    let after = schema_version(pool).await?;
    if after != before {
        tracing::info!(from = before, to = after, "State database schema upgraded");
    }
    Ok(())
}

/// Version of the newest embedded migration.
#[must_use]
pub fn latest_version() -> i64 {
    MIGRATOR
        .iter()
        .map(|migration| migration.version)
        .max()
        .unwrap_or(0)
}

/// Highest successfully applied migration version; 0 on a fresh database.
pub async fn schema_version(pool: &Pool<Sqlite>) -> Result<i64> {
    let tracked: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_optional(pool)
    .await?;
    if tracked.is_none() {
        return Ok(0);
    }

    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;
    Ok(version.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{StatePool, IN_MEMORY};

    #[tokio::test]
    async fn test_creates_kv_store() {
        let pool = StatePool::new(IN_MEMORY).await.expect("create pool");
        run_migrations(pool.pool()).await.expect("run migrations");

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(pool.pool())
        .await
        .expect("query tables");
        assert_eq!(tables, vec!["kv_store"]);
    }

    #[tokio::test]
    async fn test_rerun_is_a_no_op() {
        let pool = StatePool::new(IN_MEMORY).await.expect("create pool");
        assert_eq!(schema_version(pool.pool()).await.expect("version"), 0);

        run_migrations(pool.pool()).await.expect("first run");
        run_migrations(pool.pool()).await.expect("second run");

        assert_eq!(
            schema_version(pool.pool()).await.expect("version"),
            latest_version()
        );
    }
}
