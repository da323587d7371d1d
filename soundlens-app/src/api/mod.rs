//! REST API implementation for SoundLens
//!
//! Capture control, history access, identity changes and the SSE event
//! stream, all under `/api/v1` with an unprefixed health check.

pub mod handlers;
pub mod sse;

use axum::{
    extract::State,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::capture::CaptureEngine;
use crate::history::HistoryStore;
use crate::state::SharedState;
use crate::sync::SyncEngine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Capture pipeline
    pub engine: Arc<CaptureEngine>,
    /// Authoritative history log
    pub store: Arc<HistoryStore>,
    /// Sync and identity engine
    pub sync: Arc<SyncEngine>,
    /// Session snapshot and event broadcast
    pub state: Arc<SharedState>,
    /// Server port
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(health_check))
        // API v1 routes
        .nest(
            "/api/v1",
            Router::new()
                // Capture control
                .route("/capture/start", post(handlers::start_capture))
                .route("/capture/stop", post(handlers::stop_capture))
                .route("/capture/state", get(handlers::get_capture_state))
                // History
                .route("/history", get(handlers::get_history))
                .route("/history", delete(handlers::clear_history))
                .route("/history/refresh", post(handlers::refresh_history))
                .route("/history/load_more", post(handlers::load_more))
                .route("/history/:entry_id", delete(handlers::delete_entry))
                // Identity
                .route("/auth/signin", post(handlers::sign_in))
                .route("/auth/signout", post(handlers::sign_out))
                // SSE events
                .route("/events", get(sse::event_stream)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "soundlens",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port
    }))
}
