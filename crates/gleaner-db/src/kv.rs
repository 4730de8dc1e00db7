//! Key/value record storage.
//!
//! Values are stored as JSON text, so callers can persist any serializable
//! record under a fixed key without schema changes.

use crate::error::{DatabaseError, Result};
use serde_json::Value;
use sqlx::SqlitePool;

/// Insert or replace the record stored under `key`.
pub async fn set_value(pool: &SqlitePool, key: &str, value: &Value) -> Result<()> {
    let value_str = serde_json::to_string(value)
        .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

    sqlx::query(
        r"
        INSERT INTO kv_store (key, value, updated_at)
        VALUES (?, ?, datetime('now'))
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = datetime('now')
        ",
    )
    .bind(key)
    .bind(value_str)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch the record stored under `key`, if any.
pub async fn get_value(pool: &SqlitePool, key: &str) -> Result<Option<Value>> {
    let row: Option<(String,)> = sqlx::query_as(
        r"
        SELECT value
        FROM kv_store
        WHERE key = ?
        ",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    match row {
        Some((value_str,)) => {
            let value: Value = serde_json::from_str(&value_str)
                .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;

    async fn create_test_db() -> Database {
        let db = Database::in_memory().await.expect("create test database");
        db.run_migrations().await.expect("run migrations");
        db
    }

    #[tokio::test]
    async fn test_set_and_get_value() {
        let db = create_test_db().await;
        let pool = db.pool();

        let value = serde_json::json!({"running": true, "currentPage": 3});
        set_value(pool, "harvest.job_state", &value).await.unwrap();

        let retrieved = get_value(pool, "harvest.job_state").await.unwrap();
        assert_eq!(retrieved, Some(value));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let db = create_test_db().await;
        let pool = db.pool();

        set_value(pool, "k", &serde_json::json!(1)).await.unwrap();
        set_value(pool, "k", &serde_json::json!(2)).await.unwrap();

        let retrieved = get_value(pool, "k").await.unwrap();
        assert_eq!(retrieved, Some(serde_json::json!(2)));
    }

    #[tokio::test]
    async fn test_get_nonexistent_value() {
        let db = create_test_db().await;

        let result = get_value(db.pool(), "does_not_exist").await.unwrap();
        assert_eq!(result, None);
    }
}
