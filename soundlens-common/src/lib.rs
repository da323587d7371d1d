//! # SoundLens Common Library
//!
//! Shared code for the SoundLens music recognition service:
//! - Data model (Track, HistoryEntry, RecognitionOutcome, Identity)
//! - Event types (SoundLensEvent enum)
//! - SQLite initialization and the key-value local cache table
//! - Common error types

pub mod db;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use models::{HistoryEntry, Identity, RecognitionOutcome, Track};
