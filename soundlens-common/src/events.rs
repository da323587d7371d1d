//! Event types for the SoundLens event system
//!
//! Events are broadcast to SSE listeners; capture and recognition state
//! surfaces to the UI layer exclusively through these.

use crate::models::Track;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a capture session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// User requested stop
    Requested,
    /// Hard wall-clock ceiling reached
    MaxDuration,
    /// A match was found; further capture is pointless
    Matched,
}

/// SoundLens event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SoundLensEvent {
    /// A capture session started
    CaptureStarted {
        session_epoch: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic capture progress (elapsed time and current loudness level)
    CaptureProgress {
        session_epoch: u64,
        elapsed_ms: u64,
        level: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The scheduler dispatched an accumulated buffer for recognition
    CheckpointDispatched {
        session_epoch: u64,
        elapsed_ms: u64,
        sample_bytes: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The provider identified a track
    RecognitionMatched {
        session_epoch: u64,
        track: Track,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The provider answered but found no match
    RecognitionNoMatch {
        session_epoch: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Transport or parse failure talking to the provider
    RecognitionFailed {
        session_epoch: u64,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A capture session ended
    CaptureStopped {
        session_epoch: u64,
        reason: StopReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The history log changed (add, merge, delete or clear)
    HistoryChanged {
        entry_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Non-fatal sync problem (push/pull/migration failure)
    SyncWarning {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A history entry was deleted
    HistoryEntryDeleted {
        entry_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SoundLensEvent {
    /// Event type string used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            SoundLensEvent::CaptureStarted { .. } => "CaptureStarted",
            SoundLensEvent::CaptureProgress { .. } => "CaptureProgress",
            SoundLensEvent::CheckpointDispatched { .. } => "CheckpointDispatched",
            SoundLensEvent::RecognitionMatched { .. } => "RecognitionMatched",
            SoundLensEvent::RecognitionNoMatch { .. } => "RecognitionNoMatch",
            SoundLensEvent::RecognitionFailed { .. } => "RecognitionFailed",
            SoundLensEvent::CaptureStopped { .. } => "CaptureStopped",
            SoundLensEvent::HistoryChanged { .. } => "HistoryChanged",
            SoundLensEvent::SyncWarning { .. } => "SyncWarning",
            SoundLensEvent::HistoryEntryDeleted { .. } => "HistoryEntryDeleted",
        }
    }
}
