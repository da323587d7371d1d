//! Authoritative in-memory history log
//!
//! The store exclusively owns the in-session history log; the local cache
//! and the remote log are replicas it synchronizes with. All reads go
//! through snapshots; no component outside the store mutates the log.
//!
//! `add_entry` applies the debounce-dedup rule: a track is dropped as a
//! duplicate when an entry with the same title and the same first-artist
//! name exists within the dedup window of now. This is the tie-break for
//! noisy repeated detections of the same audio event.

use crate::config::HistoryConfig;
use crate::error::Result;
use crate::history::LocalCache;
use crate::state::SharedState;
use chrono::Utc;
use soundlens_common::events::SoundLensEvent;
use soundlens_common::{HistoryEntry, Track};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub struct HistoryStore {
    log: RwLock<Vec<HistoryEntry>>,
    cache: LocalCache,
    local_cap: usize,
    dedup_window: chrono::Duration,
    state: Arc<SharedState>,
}

impl HistoryStore {
    pub fn new(cache: LocalCache, config: &HistoryConfig, state: Arc<SharedState>) -> Self {
        Self {
            log: RwLock::new(Vec::new()),
            cache,
            local_cap: config.local_cap,
            dedup_window: chrono::Duration::seconds(config.dedup_window_secs),
            state,
        }
    }

    /// Read-only snapshot of the log, timestamp-descending
    pub async fn snapshot(&self) -> Vec<HistoryEntry> {
        self.log.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.log.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.log.read().await.is_empty()
    }

    /// Seed the in-memory log from the local cache (startup / view reset).
    /// The cache copy is immediately authoritative so the UI never shows an
    /// empty list while data is known locally.
    pub async fn seed_from_cache(&self) -> Result<()> {
        let cached = self.cache.read_history().await?;
        let mut log = self.log.write().await;
        *log = cached;
        let count = log.len();
        drop(log);
        self.notify_changed(count);
        Ok(())
    }

    /// Add a freshly matched track
    ///
    /// Returns the created entry, or None when the track was dropped as a
    /// duplicate detection. On add: fresh id, prepend, truncate to the
    /// local cap, synchronous write-through to the cache. The remote push
    /// is the caller's job (it carries the same id).
    pub async fn add_entry(&self, track: Track) -> Result<Option<HistoryEntry>> {
        let mut log = self.log.write().await;

        let now = Utc::now();
        let duplicate = log.iter().any(|existing| {
            existing.track.title == track.title
                && existing.track.first_artist_name() == track.first_artist_name()
                && (now - existing.timestamp) <= self.dedup_window
        });

        if duplicate {
            debug!(title = ?track.title, "Dropping duplicate detection inside debounce window");
            return Ok(None);
        }

        let entry = HistoryEntry::new(track);
        log.insert(0, entry.clone());
        log.truncate(self.local_cap);
        self.cache.write_history(&log, self.local_cap).await?;
        let count = log.len();
        drop(log);

        self.notify_changed(count);
        Ok(Some(entry))
    }

    /// Merge remote entries into the log
    ///
    /// Builds an identity map over the union of the current log, the
    /// re-read cache (another instance may have written it since our last
    /// look) and the incoming page, keeping first-seen-wins per id, then
    /// re-sorts by timestamp descending. Merging an id already present
    /// never changes that entry's fields or increases the count.
    pub async fn merge_entries(&self, incoming: Vec<HistoryEntry>) -> Result<()> {
        let mut log = self.log.write().await;

        // Re-read the shared cache inside the lock; the snapshot taken at
        // session start may be stale
        let cached = self.cache.read_history().await?;

        let mut by_id: HashMap<Uuid, usize> = HashMap::new();
        let mut merged: Vec<HistoryEntry> = Vec::with_capacity(log.len() + incoming.len());

        for entry in log.drain(..).chain(cached).chain(incoming) {
            if by_id.contains_key(&entry.id) {
                continue;
            }
            by_id.insert(entry.id, merged.len());
            merged.push(entry);
        }

        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        *log = merged;

        self.cache.write_history(&log, self.local_cap).await?;
        let count = log.len();
        drop(log);

        self.notify_changed(count);
        Ok(())
    }

    /// Remove one entry locally; returns whether it existed
    pub async fn delete_entry(&self, id: Uuid) -> Result<bool> {
        let mut log = self.log.write().await;
        let before = log.len();
        log.retain(|entry| entry.id != id);
        let existed = log.len() != before;

        if existed {
            self.cache.write_history(&log, self.local_cap).await?;
            let count = log.len();
            drop(log);
            self.notify_changed(count);
        }

        Ok(existed)
    }

    /// Clear the log and the cache synchronously
    ///
    /// The remote delete is the caller's job; a remote failure never rolls
    /// this back.
    pub async fn clear_local(&self) -> Result<()> {
        let mut log = self.log.write().await;
        log.clear();
        self.cache.clear_history().await?;
        drop(log);
        self.notify_changed(0);
        Ok(())
    }

    fn notify_changed(&self, entry_count: usize) {
        self.state.broadcast_event(SoundLensEvent::HistoryChanged {
            entry_count,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soundlens_common::db::init::init_memory_database;
    use soundlens_common::models::Artist;

    fn track(title: &str, artist: &str) -> Track {
        Track {
            title: Some(title.to_string()),
            artists: vec![Artist {
                name: artist.to_string(),
            }],
            ..Default::default()
        }
    }

    async fn store() -> HistoryStore {
        store_with_config(HistoryConfig::default()).await
    }

    async fn store_with_config(config: HistoryConfig) -> HistoryStore {
        let cache = LocalCache::new(init_memory_database().await.unwrap());
        HistoryStore::new(cache, &config, Arc::new(SharedState::new()))
    }

    #[tokio::test]
    async fn test_add_entry_writes_through_to_cache() {
        let store = store().await;
        let entry = store.add_entry(track("X", "Y")).await.unwrap().unwrap();

        assert_eq!(store.len().await, 1);
        let cached = store.cache.read_history().await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, entry.id);
    }

    #[tokio::test]
    async fn test_duplicate_within_window_is_dropped() {
        let store = store().await;
        assert!(store.add_entry(track("X", "Y")).await.unwrap().is_some());
        assert!(store.add_entry(track("X", "Y")).await.unwrap().is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_same_title_different_artist_is_not_a_duplicate() {
        let store = store().await;
        assert!(store.add_entry(track("X", "Y")).await.unwrap().is_some());
        assert!(store.add_entry(track("X", "Z")).await.unwrap().is_some());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_old_entry_outside_window_is_not_a_duplicate() {
        let store = store().await;
        let old = HistoryEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now() - chrono::Duration::seconds(60),
            track: track("X", "Y"),
        };
        store.merge_entries(vec![old]).await.unwrap();

        assert!(store.add_entry(track("X", "Y")).await.unwrap().is_some());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_local_cap_truncates() {
        let store = store_with_config(HistoryConfig {
            local_cap: 3,
            dedup_window_secs: 10,
        })
        .await;

        for i in 0..5 {
            store
                .add_entry(track(&format!("t{}", i), "A"))
                .await
                .unwrap();
        }
        assert_eq!(store.len().await, 3);
        // Newest first
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot[0].track.title.as_deref(), Some("t4"));
    }

    #[tokio::test]
    async fn test_merge_existing_id_changes_nothing() {
        let store = store().await;
        let entry = store.add_entry(track("X", "Y")).await.unwrap().unwrap();

        // Same id arrives from remote with diverged fields
        let mut remote_copy = entry.clone();
        remote_copy.track.title = Some("Diverged".to_string());
        store.merge_entries(vec![remote_copy]).await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        // First-seen-wins: local fields untouched
        assert_eq!(snapshot[0].track.title.as_deref(), Some("X"));
    }

    #[tokio::test]
    async fn test_merge_sorts_descending() {
        let store = store().await;
        let older = HistoryEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now() - chrono::Duration::seconds(100),
            track: track("old", "A"),
        };
        let newer = HistoryEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            track: track("new", "A"),
        };
        store.merge_entries(vec![older, newer]).await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot[0].track.title.as_deref(), Some("new"));
        assert_eq!(snapshot[1].track.title.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_merge_picks_up_concurrent_cache_writes() {
        let pool = init_memory_database().await.unwrap();
        let cache = LocalCache::new(pool.clone());
        let store = HistoryStore::new(
            cache.clone(),
            &HistoryConfig::default(),
            Arc::new(SharedState::new()),
        );

        // Another instance writes to the shared cache behind our back
        let foreign = HistoryEntry::new(track("foreign", "B"));
        cache.write_history(&[foreign.clone()], 50).await.unwrap();

        store.merge_entries(Vec::new()).await.unwrap();
        let snapshot = store.snapshot().await;
        assert!(snapshot.iter().any(|e| e.id == foreign.id));
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let store = store().await;
        let entry = store.add_entry(track("X", "Y")).await.unwrap().unwrap();

        assert!(store.delete_entry(entry.id).await.unwrap());
        assert!(!store.delete_entry(entry.id).await.unwrap());
        assert!(store.is_empty().await);
        assert!(store.cache.read_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_local_empties_log_and_cache() {
        let store = store().await;
        store.add_entry(track("X", "Y")).await.unwrap();
        store.clear_local().await.unwrap();

        assert!(store.is_empty().await);
        assert!(store.cache.read_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seed_from_cache() {
        let pool = init_memory_database().await.unwrap();
        let cache = LocalCache::new(pool.clone());
        let entry = HistoryEntry::new(track("cached", "A"));
        cache.write_history(&[entry.clone()], 50).await.unwrap();

        let store = HistoryStore::new(
            cache,
            &HistoryConfig::default(),
            Arc::new(SharedState::new()),
        );
        store.seed_from_cache().await.unwrap();
        assert_eq!(store.snapshot().await, vec![entry]);
    }
}
