//! HTTP request handlers
//!
//! Thin adapters from HTTP to the capture engine, the history store and
//! the sync engine. Handlers never hold state of their own; everything
//! observable flows back out through the SSE stream as well.

use crate::api::AppState;
use crate::error::Error;
use crate::state::SessionSnapshot;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use soundlens_common::{HistoryEntry, Identity};
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct StartCaptureResponse {
    status: String,
    session_epoch: u64,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    entries: Vec<HistoryEntry>,
    has_more: bool,
    identity: IdentityInfo,
}

#[derive(Debug, Serialize)]
pub struct LoadMoreResponse {
    loaded: bool,
    entries: Vec<HistoryEntry>,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    user_id: String,
}

#[derive(Debug, Serialize)]
pub struct IdentityInfo {
    anonymous: bool,
    owner: String,
}

impl From<Identity> for IdentityInfo {
    fn from(identity: Identity) -> Self {
        Self {
            anonymous: identity.is_anonymous(),
            owner: identity.owner_key(),
        }
    }
}

type ErrorReply = (StatusCode, Json<StatusResponse>);

fn reply(status: StatusCode, message: impl Into<String>) -> ErrorReply {
    (
        status,
        Json(StatusResponse {
            status: message.into(),
        }),
    )
}

fn map_error(e: Error) -> ErrorReply {
    let status = match &e {
        Error::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::SyncPushFailed(_) | Error::SyncPullFailed(_) | Error::IdentityMigrationFailed(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    reply(status, e.to_string())
}

// ============================================================================
// Capture Endpoints
// ============================================================================

/// POST /api/v1/capture/start - Begin a capture session
pub async fn start_capture(
    State(state): State<AppState>,
) -> Result<Json<StartCaptureResponse>, ErrorReply> {
    match state.engine.start().await {
        Ok(session_epoch) => {
            info!(session_epoch, "Capture started via API");
            Ok(Json(StartCaptureResponse {
                status: "recording".to_string(),
                session_epoch,
            }))
        }
        Err(e) => {
            error!("Failed to start capture: {}", e);
            Err(map_error(e))
        }
    }
}

/// POST /api/v1/capture/stop - Stop the live session (no-op while idle)
pub async fn stop_capture(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ErrorReply> {
    match state.engine.stop().await {
        Ok(()) => Ok(Json(StatusResponse {
            status: "stopped".to_string(),
        })),
        Err(e) => {
            error!("Failed to stop capture: {}", e);
            Err(map_error(e))
        }
    }
}

/// GET /api/v1/capture/state - Current session snapshot
pub async fn get_capture_state(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.state.get_session().await)
}

// ============================================================================
// History Endpoints
// ============================================================================

/// GET /api/v1/history - Full local history snapshot
pub async fn get_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        entries: state.store.snapshot().await,
        has_more: state.sync.has_more().await,
        identity: state.sync.identity().await.into(),
    })
}

/// POST /api/v1/history/refresh - Reset pull for the history view
///
/// Re-seeds the log from the local cache, restarts the page cursor and
/// folds in the first remote page, so a long-lived process picks up
/// entries another writer pushed since startup. Pull failures are
/// absorbed; only a cache read failure is an error.
pub async fn refresh_history(
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, ErrorReply> {
    match state.sync.reset_and_pull().await {
        Ok(_) => Ok(Json(HistoryResponse {
            entries: state.store.snapshot().await,
            has_more: state.sync.has_more().await,
            identity: state.sync.identity().await.into(),
        })),
        Err(e) => {
            error!("History refresh failed: {}", e);
            Err(map_error(e))
        }
    }
}

/// POST /api/v1/history/load_more - Fetch and merge the next remote page
///
/// Pull failures are absorbed: `loaded` is false and the local snapshot is
/// returned unchanged.
pub async fn load_more(State(state): State<AppState>) -> Json<LoadMoreResponse> {
    let loaded = state.sync.load_more().await;
    Json(LoadMoreResponse {
        loaded,
        entries: state.store.snapshot().await,
        has_more: state.sync.has_more().await,
    })
}

/// DELETE /api/v1/history - Clear local history (and best-effort remote)
pub async fn clear_history(State(state): State<AppState>) -> Result<StatusCode, ErrorReply> {
    match state.sync.clear().await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            error!("Failed to clear history: {}", e);
            Err(map_error(e))
        }
    }
}

/// DELETE /api/v1/history/:entry_id - Delete one entry
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> Result<StatusCode, ErrorReply> {
    match state.sync.delete_entry(entry_id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e @ Error::BadRequest(_)) => Err(reply(StatusCode::NOT_FOUND, e.to_string())),
        Err(e) => {
            error!("Failed to delete history entry: {}", e);
            Err(map_error(e))
        }
    }
}

// ============================================================================
// Identity Endpoints
// ============================================================================

/// POST /api/v1/auth/signin - Adopt a user identity and migrate anonymous
/// history
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<IdentityInfo>, ErrorReply> {
    if request.user_id.trim().is_empty() {
        return Err(reply(StatusCode::BAD_REQUEST, "user_id must not be empty"));
    }

    match state.sync.sign_in(request.user_id).await {
        Ok(()) => Ok(Json(state.sync.identity().await.into())),
        Err(e) => {
            error!("Sign-in failed: {}", e);
            Err(map_error(e))
        }
    }
}

/// POST /api/v1/auth/signout - Return to the stored anonymous identity
pub async fn sign_out(State(state): State<AppState>) -> Result<Json<IdentityInfo>, ErrorReply> {
    match state.sync.sign_out().await {
        Ok(()) => Ok(Json(state.sync.identity().await.into())),
        Err(e) => {
            error!("Sign-out failed: {}", e);
            Err(map_error(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{AudioInput, CaptureEngine};
    use crate::config::{CaptureConfig, HistoryConfig};
    use crate::history::{HistoryStore, LocalCache};
    use crate::recognize::Recognizer;
    use crate::state::SharedState;
    use crate::sync::remote::testing::InMemoryRemote;
    use crate::sync::{RemoteHistory, SyncEngine};
    use async_trait::async_trait;
    use soundlens_common::db::init::init_memory_database;
    use soundlens_common::models::{Artist, Track};
    use soundlens_common::RecognitionOutcome;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    struct NullInput;

    impl AudioInput for NullInput {
        fn open(
            &self,
            _sample_rate: u32,
            _tx: mpsc::UnboundedSender<Vec<f32>>,
            _cancel: CancellationToken,
        ) -> crate::error::Result<()> {
            Ok(())
        }
    }

    struct NullRecognizer;

    #[async_trait]
    impl Recognizer for NullRecognizer {
        async fn identify(&self, _sample: &[u8]) -> crate::error::Result<RecognitionOutcome> {
            Ok(RecognitionOutcome::NoMatch)
        }
    }

    fn track(title: &str) -> Track {
        Track {
            title: Some(title.to_string()),
            artists: vec![Artist {
                name: "A".to_string(),
            }],
            ..Default::default()
        }
    }

    async fn app_state(remote: Arc<InMemoryRemote>) -> AppState {
        let pool = init_memory_database().await.unwrap();
        let cache = LocalCache::new(pool);
        let shared = Arc::new(SharedState::new());
        let store = Arc::new(HistoryStore::new(
            cache.clone(),
            &HistoryConfig::default(),
            Arc::clone(&shared),
        ));
        let sync = Arc::new(
            SyncEngine::new(
                Some(remote as Arc<dyn RemoteHistory>),
                Arc::clone(&store),
                cache,
                Arc::clone(&shared),
                20,
            )
            .await
            .unwrap(),
        );
        let engine = Arc::new(CaptureEngine::new(
            CaptureConfig::default(),
            Arc::new(NullInput),
            Arc::new(NullRecognizer),
            Arc::clone(&store),
            Arc::clone(&sync),
            Arc::clone(&shared),
        ));

        AppState {
            engine,
            store,
            sync,
            state: shared,
            port: 0,
        }
    }

    #[tokio::test]
    async fn test_refresh_history_picks_up_foreign_remote_entries() {
        let remote = Arc::new(InMemoryRemote::new());
        let app = app_state(Arc::clone(&remote)).await;

        // Another writer pushed under our anonymous identity after startup
        let owner = app.sync.identity().await;
        let foreign = HistoryEntry::new(track("Foreign"));
        remote.insert(&owner, &foreign).await.unwrap();
        assert!(app.store.is_empty().await);

        let Json(body) = refresh_history(State(app.clone())).await.unwrap();
        assert_eq!(body.entries.len(), 1);
        assert_eq!(body.entries[0].id, foreign.id);
        assert!(!body.has_more);
    }

    #[tokio::test]
    async fn test_refresh_history_keeps_local_snapshot_when_remote_down() {
        let remote = Arc::new(InMemoryRemote::new());
        let app = app_state(Arc::clone(&remote)).await;

        app.store.add_entry(track("Local")).await.unwrap();
        remote
            .fail_all
            .store(true, std::sync::atomic::Ordering::Release);

        // Pull failure is absorbed; the cached copy still comes back
        let Json(body) = refresh_history(State(app.clone())).await.unwrap();
        assert_eq!(body.entries.len(), 1);
        assert_eq!(body.entries[0].track.title.as_deref(), Some("Local"));
    }

    #[test]
    fn test_error_status_mapping() {
        let (status, _) = map_error(Error::DeviceUnavailable("x".to_string()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let (status, _) = map_error(Error::InvalidState("x".to_string()));
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = map_error(Error::SyncPullFailed("x".to_string()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
