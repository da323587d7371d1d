//! Remote history datastore interface
//!
//! Rows are keyed by the client-assigned entry id with idempotent upsert
//! semantics (submitting the same id twice must not create two rows) and
//! scoped by an owner identity. The creation timestamp equals the client's
//! entry timestamp, never a server-assigned one, so merge ordering is
//! stable across replicas.

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use soundlens_common::{HistoryEntry, Identity};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// One fetched page, timestamp-descending, with the remote-reported total
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePage {
    pub entries: Vec<HistoryEntry>,
    pub total: u64,
}

/// Remote history datastore seam
#[async_trait]
pub trait RemoteHistory: Send + Sync {
    /// Idempotent upsert keyed by the entry's own id
    async fn insert(&self, owner: &Identity, entry: &HistoryEntry) -> Result<()>;

    /// Fetch one page ordered by timestamp descending
    async fn fetch_page(&self, owner: &Identity, offset: u32, limit: u32) -> Result<RemotePage>;

    /// Delete one row
    async fn delete(&self, owner: &Identity, id: Uuid) -> Result<()>;

    /// Delete every row owned by `owner`
    async fn delete_all(&self, owner: &Identity) -> Result<()>;

    /// Re-own all rows of `from` under `to` in one atomic server-side
    /// operation (identity migration on sign-in)
    async fn reassign(&self, from: &Identity, to: &Identity) -> Result<()>;
}

/// Remote history over a REST endpoint
pub struct HttpRemoteHistory {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

/// Wire representation of one history row
#[derive(Debug, Serialize, Deserialize)]
struct RemoteRow {
    id: Uuid,
    owner: String,
    /// Client-assigned creation instant
    created_at: chrono::DateTime<chrono::Utc>,
    track: soundlens_common::Track,
}

#[derive(Debug, Serialize)]
struct ReassignRequest<'a> {
    from_owner: &'a str,
    to_owner: &'a str,
}

impl HttpRemoteHistory {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder, owner: &Identity) -> reqwest::RequestBuilder {
        let builder = match &self.api_key {
            Some(key) => builder.header("apikey", key),
            None => builder,
        };
        // Anonymous histories are keyed by a client-generated header, the
        // way unauthenticated rows are scoped
        match owner {
            Identity::Anonymous(id) => builder.header("x-anonymous-id", id.to_string()),
            Identity::User(_) => builder,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(Error::Internal(format!("Remote HTTP {}", status)))
        }
    }
}

#[async_trait]
impl RemoteHistory for HttpRemoteHistory {
    async fn insert(&self, owner: &Identity, entry: &HistoryEntry) -> Result<()> {
        let row = RemoteRow {
            id: entry.id,
            owner: owner.owner_key(),
            created_at: entry.timestamp,
            track: entry.track.clone(),
        };

        let builder = self
            .http_client
            .post(format!("{}/history", self.base_url))
            .json(&row);

        let response = self
            .request(builder, owner)
            .send()
            .await
            .map_err(|e| Error::SyncPushFailed(e.to_string()))?;
        Self::check(response).await?;

        debug!(entry_id = %entry.id, "Pushed history entry");
        Ok(())
    }

    async fn fetch_page(&self, owner: &Identity, offset: u32, limit: u32) -> Result<RemotePage> {
        let builder = self.http_client.get(format!("{}/history", self.base_url)).query(&[
            ("owner", owner.owner_key()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
            ("order", "created_at.desc".to_string()),
        ]);

        let response = self
            .request(builder, owner)
            .send()
            .await
            .map_err(|e| Error::SyncPullFailed(e.to_string()))?;
        let response = Self::check(response).await?;

        #[derive(Deserialize)]
        struct PageBody {
            rows: Vec<RemoteRow>,
            total: u64,
        }

        let body: PageBody = response
            .json()
            .await
            .map_err(|e| Error::SyncPullFailed(format!("Malformed page: {}", e)))?;

        Ok(RemotePage {
            entries: body
                .rows
                .into_iter()
                .map(|row| HistoryEntry {
                    id: row.id,
                    timestamp: row.created_at,
                    track: row.track,
                })
                .collect(),
            total: body.total,
        })
    }

    async fn delete(&self, owner: &Identity, id: Uuid) -> Result<()> {
        let builder = self
            .http_client
            .delete(format!("{}/history/{}", self.base_url, id))
            .query(&[("owner", owner.owner_key())]);

        let response = self
            .request(builder, owner)
            .send()
            .await
            .map_err(|e| Error::SyncPushFailed(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_all(&self, owner: &Identity) -> Result<()> {
        let builder = self
            .http_client
            .delete(format!("{}/history", self.base_url))
            .query(&[("owner", owner.owner_key())]);

        let response = self
            .request(builder, owner)
            .send()
            .await
            .map_err(|e| Error::SyncPushFailed(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn reassign(&self, from: &Identity, to: &Identity) -> Result<()> {
        let builder = self
            .http_client
            .post(format!("{}/history/reassign", self.base_url))
            .json(&ReassignRequest {
                from_owner: &from.owner_key(),
                to_owner: &to.owner_key(),
            });

        let response = self
            .request(builder, to)
            .send()
            .await
            .map_err(|e| Error::IdentityMigrationFailed(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }
}
