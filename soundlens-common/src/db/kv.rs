//! Key-value access to the local_cache table
//!
//! Whole values are serialized/deserialized on every read/write (no partial
//! updates), so a concurrent writer can at worst replace the value, never
//! corrupt it.

use crate::error::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

/// Generic value getter
///
/// Returns None when the key is absent; parse failures are surfaced as
/// configuration errors rather than silently dropped.
pub async fn get_value<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM local_cache WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse cached value for '{}': {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic value setter
///
/// Inserts or replaces the value for the key.
pub async fn set_value<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO local_cache (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}

/// Remove a key (no-op when absent)
pub async fn delete_value(db: &Pool<Sqlite>, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM local_cache WHERE key = ?")
        .bind(key)
        .execute(db)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::init_memory_database;

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let pool = init_memory_database().await.unwrap();
        let value: Option<String> = get_value(&pool, "absent").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let pool = init_memory_database().await.unwrap();
        set_value(&pool, "count", 42i64).await.unwrap();
        let value: Option<i64> = get_value(&pool, "count").await.unwrap();
        assert_eq!(value, Some(42));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let pool = init_memory_database().await.unwrap();
        set_value(&pool, "k", "first").await.unwrap();
        set_value(&pool, "k", "second").await.unwrap();
        let value: Option<String> = get_value(&pool, "k").await.unwrap();
        assert_eq!(value.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_delete() {
        let pool = init_memory_database().await.unwrap();
        set_value(&pool, "k", "v").await.unwrap();
        delete_value(&pool, "k").await.unwrap();
        let value: Option<String> = get_value(&pool, "k").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_parse_failure_is_config_error() {
        let pool = init_memory_database().await.unwrap();
        set_value(&pool, "k", "not-a-number").await.unwrap();
        let result: Result<Option<i64>> = get_value(&pool, "k").await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
