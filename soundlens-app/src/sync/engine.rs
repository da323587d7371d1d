//! Local-first history synchronization
//!
//! Reconciles the in-memory history log with the remote paginated log.
//! Local state is authoritative: pushes are fire-and-forget and never
//! rolled back, pulls merge by identity, and every sync failure is
//! absorbed here as a logged warning rather than surfaced as an error.

use crate::error::{Error, Result};
use crate::history::{HistoryStore, LocalCache};
use crate::state::SharedState;
use crate::sync::remote::RemoteHistory;
use chrono::Utc;
use soundlens_common::events::SoundLensEvent;
use soundlens_common::{HistoryEntry, Identity};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Incremental pull position
///
/// The offset advances only on a successful fetch; the total is unknown
/// until the first page arrives.
#[derive(Debug, Clone, Copy, Default)]
struct PageCursor {
    offset: u32,
    total: Option<u64>,
}

impl PageCursor {
    fn has_more(&self) -> bool {
        match self.total {
            Some(total) => (self.offset as u64) < total,
            None => true,
        }
    }
}

pub struct SyncEngine {
    remote: Option<Arc<dyn RemoteHistory>>,
    store: Arc<HistoryStore>,
    cache: LocalCache,
    state: Arc<SharedState>,
    identity: RwLock<Identity>,
    /// User ids whose anonymous history was already migrated; a failed
    /// migration stays absent and is retried on the next sign-in event
    migrated: Mutex<HashSet<String>>,
    cursor: Mutex<PageCursor>,
    page_size: u32,
    /// Clear generation; a pending push for an older generation is dropped
    /// so it cannot resurrect a cleared history
    generation: AtomicU64,
}

impl SyncEngine {
    pub async fn new(
        remote: Option<Arc<dyn RemoteHistory>>,
        store: Arc<HistoryStore>,
        cache: LocalCache,
        state: Arc<SharedState>,
        page_size: u32,
    ) -> Result<Self> {
        let anonymous_id = cache.get_or_create_anonymous_id().await?;

        Ok(Self {
            remote,
            store,
            cache,
            state,
            identity: RwLock::new(Identity::Anonymous(anonymous_id)),
            migrated: Mutex::new(HashSet::new()),
            cursor: Mutex::new(PageCursor::default()),
            page_size,
            generation: AtomicU64::new(0),
        })
    }

    pub async fn identity(&self) -> Identity {
        self.identity.read().await.clone()
    }

    /// Fire-and-forget push of a newly created entry
    ///
    /// The entry keeps its client-assigned id so later reconciliation
    /// recognizes it as already present. Failures are logged and not
    /// retried; the local copy stays valid regardless.
    pub fn push(self: &Arc<Self>, entry: HistoryEntry) {
        let Some(remote) = self.remote.clone() else {
            return;
        };

        let engine = Arc::clone(self);
        let generation = self.generation.load(Ordering::Acquire);

        tokio::spawn(async move {
            // A clear that happened after this entry was created wins;
            // do not resurrect it remotely
            if engine.generation.load(Ordering::Acquire) != generation {
                return;
            }

            let owner = engine.identity().await;
            if let Err(e) = remote.insert(&owner, &entry).await {
                engine.sync_warning(format!("Push failed for {}: {}", entry.id, e));
            }
        });
    }

    /// Whether another page is believed to exist
    pub async fn has_more(&self) -> bool {
        if self.remote.is_none() {
            return false;
        }
        self.cursor.lock().await.has_more()
    }

    /// Fetch and merge the next remote page
    ///
    /// Returns whether more pages remain. Pull failures are absorbed: the
    /// cursor does not advance and local state is untouched.
    pub async fn load_more(&self) -> bool {
        let Some(remote) = self.remote.clone() else {
            return false;
        };

        let mut cursor = self.cursor.lock().await;
        if !cursor.has_more() {
            return false;
        }

        let owner = self.identity().await;
        let page = match remote.fetch_page(&owner, cursor.offset, self.page_size).await {
            Ok(page) => page,
            Err(e) => {
                self.sync_warning(format!("Pull failed at offset {}: {}", cursor.offset, e));
                return cursor.has_more();
            }
        };

        let fetched = page.entries.len() as u32;
        if let Err(e) = self.store.merge_entries(page.entries).await {
            self.sync_warning(format!("Merge failed: {}", e));
            return cursor.has_more();
        }

        cursor.offset += fetched;
        cursor.total = Some(page.total);
        cursor.has_more()
    }

    /// Full reset pull (opening the history view)
    ///
    /// Re-seeds from the local cache first for immediate responsiveness,
    /// then supersedes with the first remote page once it returns.
    pub async fn reset_and_pull(&self) -> Result<bool> {
        self.store.seed_from_cache().await?;
        *self.cursor.lock().await = PageCursor::default();
        Ok(self.load_more().await)
    }

    /// Sign-in transition: adopt the user identity and migrate the
    /// anonymous history exactly once per transition
    pub async fn sign_in(&self, user_id: String) -> Result<()> {
        let previous = self.identity().await;
        let user = Identity::User(user_id.clone());
        *self.identity.write().await = user.clone();

        if let (Some(remote), Identity::Anonymous(_)) = (self.remote.clone(), &previous) {
            let mut migrated = self.migrated.lock().await;
            if !migrated.contains(&user_id) {
                match remote.reassign(&previous, &user).await {
                    Ok(()) => {
                        info!(user = %user_id, "Migrated anonymous history");
                        migrated.insert(user_id);
                    }
                    Err(e) => {
                        // Retried on the next sign-in event, not mid-session
                        self.sync_warning(format!("Identity migration failed: {}", e));
                    }
                }
            }
        }

        self.reset_and_pull().await?;
        Ok(())
    }

    /// Sign-out: fall back to the durable anonymous identity
    pub async fn sign_out(&self) -> Result<()> {
        let anonymous_id = self.cache.get_or_create_anonymous_id().await?;
        *self.identity.write().await = Identity::Anonymous(anonymous_id);
        self.reset_and_pull().await?;
        Ok(())
    }

    /// Clear local history synchronously, then the remote copy
    ///
    /// A remote failure leaves the local state cleared (never rolled back)
    /// and is reported as a non-fatal warning.
    pub async fn clear(&self) -> Result<()> {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.store.clear_local().await?;
        *self.cursor.lock().await = PageCursor {
            offset: 0,
            total: Some(0),
        };

        if let Some(remote) = self.remote.clone() {
            let owner = self.identity().await;
            if let Err(e) = remote.delete_all(&owner).await {
                self.sync_warning(format!("Remote clear failed: {}", e));
            }
        }

        Ok(())
    }

    /// Delete one entry locally and remotely
    pub async fn delete_entry(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_entry(id).await? {
            return Err(Error::BadRequest(format!("No history entry {}", id)));
        }

        self.state.broadcast_event(SoundLensEvent::HistoryEntryDeleted {
            entry_id: id,
            timestamp: Utc::now(),
        });

        if let Some(remote) = self.remote.clone() {
            let owner = self.identity().await;
            if let Err(e) = remote.delete(&owner, id).await {
                self.sync_warning(format!("Remote delete failed for {}: {}", id, e));
            }
        }

        Ok(())
    }

    fn sync_warning(&self, message: String) {
        warn!("{}", message);
        self.state.broadcast_event(SoundLensEvent::SyncWarning {
            message,
            timestamp: Utc::now(),
        });
    }
}
