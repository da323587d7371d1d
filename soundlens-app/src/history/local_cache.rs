//! Durable per-device history cache
//!
//! The whole history log is stored as one JSON array under a single
//! well-known key in the local_cache table, serialized and deserialized on
//! every read/write (no partial updates). The anonymous sync identity
//! lives in the same table and is created lazily on first use.
//!
//! The backing store is shared between concurrently running instances with
//! no locking; callers must re-read immediately before merging.

use crate::error::Result;
use soundlens_common::db::kv;
use soundlens_common::HistoryEntry;
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

const HISTORY_KEY: &str = "soundlens_history";
const ANONYMOUS_ID_KEY: &str = "anonymous_id";

/// Key-value backed local history cache
#[derive(Clone)]
pub struct LocalCache {
    pool: SqlitePool,
}

impl LocalCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read the cached history log
    ///
    /// A missing key is an empty log. A corrupt value is logged and treated
    /// as empty rather than failing every read forever.
    pub async fn read_history(&self) -> Result<Vec<HistoryEntry>> {
        let raw: Option<String> = kv::get_value(&self.pool, HISTORY_KEY).await?;

        match raw {
            Some(json) => match serde_json::from_str(&json) {
                Ok(entries) => Ok(entries),
                Err(e) => {
                    warn!("Discarding corrupt history cache: {}", e);
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    /// Write the history log, truncated to `cap` entries
    pub async fn write_history(&self, entries: &[HistoryEntry], cap: usize) -> Result<()> {
        let capped = &entries[..entries.len().min(cap)];
        let json = serde_json::to_string(capped)
            .map_err(|e| crate::error::Error::Internal(format!("Serialize history: {}", e)))?;
        kv::set_value(&self.pool, HISTORY_KEY, json).await?;
        Ok(())
    }

    /// Remove the cached history log
    pub async fn clear_history(&self) -> Result<()> {
        kv::delete_value(&self.pool, HISTORY_KEY).await?;
        Ok(())
    }

    /// Durable anonymous identity, created lazily on first use
    pub async fn get_or_create_anonymous_id(&self) -> Result<Uuid> {
        if let Some(id) = kv::get_value::<Uuid>(&self.pool, ANONYMOUS_ID_KEY).await? {
            return Ok(id);
        }

        let id = Uuid::new_v4();
        kv::set_value(&self.pool, ANONYMOUS_ID_KEY, id).await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soundlens_common::db::init::init_memory_database;
    use soundlens_common::models::{Artist, Track};

    fn entry(title: &str) -> HistoryEntry {
        HistoryEntry::new(Track {
            title: Some(title.to_string()),
            artists: vec![Artist {
                name: "A".to_string(),
            }],
            ..Default::default()
        })
    }

    async fn cache() -> LocalCache {
        LocalCache::new(init_memory_database().await.unwrap())
    }

    #[tokio::test]
    async fn test_empty_cache_reads_empty_log() {
        let cache = cache().await;
        assert!(cache.read_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let cache = cache().await;
        let entries = vec![entry("one"), entry("two")];
        cache.write_history(&entries, 50).await.unwrap();
        assert_eq!(cache.read_history().await.unwrap(), entries);
    }

    #[tokio::test]
    async fn test_write_applies_cap() {
        let cache = cache().await;
        let entries: Vec<HistoryEntry> = (0..5).map(|i| entry(&format!("t{}", i))).collect();
        cache.write_history(&entries, 3).await.unwrap();
        assert_eq!(cache.read_history().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_clear_removes_log() {
        let cache = cache().await;
        cache.write_history(&[entry("x")], 50).await.unwrap();
        cache.clear_history().await.unwrap();
        assert!(cache.read_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_cache_degrades_to_empty() {
        let cache = cache().await;
        kv::set_value(&cache.pool, HISTORY_KEY, "{not json").await.unwrap();
        assert!(cache.read_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_id_is_stable() {
        let cache = cache().await;
        let first = cache.get_or_create_anonymous_id().await.unwrap();
        let second = cache.get_or_create_anonymous_id().await.unwrap();
        assert_eq!(first, second);
    }
}
