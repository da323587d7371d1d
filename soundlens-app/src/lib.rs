//! # SoundLens Service Library (soundlens-app)
//!
//! Progressive audio recognition with local-first history sync.
//!
//! **Purpose:** Capture microphone audio, dispatch accumulated buffers to
//! a recognition provider at checkpoints, record matches in a local-first
//! history log, and reconcile that log with a remote datastore. Control
//! and observation happen over HTTP/SSE.
//!
//! **Architecture:** tokio pipeline (input thread, reader task, scheduler
//! driver) behind an axum API, with SQLite backing the local cache.

pub mod api;
pub mod capture;
pub mod config;
pub mod error;
pub mod history;
pub mod recognize;
pub mod state;
pub mod sync;

pub use error::{Error, Result};
pub use state::SharedState;
