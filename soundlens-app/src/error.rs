//! Error types for soundlens-app
//!
//! Defines service-level error types using thiserror for clear error
//! propagation. Capture and recognition errors surface to the UI layer;
//! sync errors are absorbed at the SyncEngine boundary and logged.

use thiserror::Error;

/// Main error type for the SoundLens service
#[derive(Error, Debug)]
pub enum Error {
    /// Microphone permission denied or no input device present.
    /// Fatal to the capture attempt; reported to the caller, never retried.
    #[error("Audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Transport or parse failure talking to the recognition provider.
    /// The pipeline stays retryable; the next checkpoint is the retry.
    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),

    /// Remote push failed; local state is authoritative and unaffected
    #[error("Sync push failed: {0}")]
    SyncPushFailed(String),

    /// Remote page fetch failed; the page cursor does not advance
    #[error("Sync pull failed: {0}")]
    SyncPullFailed(String),

    /// Anonymous-to-user re-owning failed; retried on the next sign-in
    #[error("Identity migration failed: {0}")]
    IdentityMigrationFailed(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<soundlens_common::Error> for Error {
    fn from(e: soundlens_common::Error) -> Self {
        match e {
            soundlens_common::Error::Database(e) => Error::Database(e),
            soundlens_common::Error::Io(e) => Error::Io(e),
            soundlens_common::Error::Config(msg) => Error::Config(msg),
            other => Error::Internal(other.to_string()),
        }
    }
}

/// Convenience Result type using the soundlens-app Error
pub type Result<T> = std::result::Result<T, Error>;
