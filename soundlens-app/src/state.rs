//! Shared service state
//!
//! Thread-safe state shared between the capture engine, sync engine and the
//! HTTP layer: the current capture session snapshot and the event
//! broadcaster feeding SSE listeners.

use serde::Serialize;
use soundlens_common::events::SoundLensEvent;
use tokio::sync::{broadcast, RwLock};

/// Capture session lifecycle as visible to the outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionSnapshot {
    /// No session; the device is released
    Idle,
    /// A session is recording
    Recording {
        session_epoch: u64,
        /// Last fixed checkpoint that fired, in seconds elapsed (0 = none)
        last_checkpoint_secs: u64,
    },
    /// stop() ran; the final buffer may still be in flight
    Stopping { session_epoch: u64 },
}

/// Shared state accessible by all components
///
/// Uses RwLock for concurrent read access with rare writes.
pub struct SharedState {
    /// Current capture session snapshot
    pub session: RwLock<SessionSnapshot>,

    /// Event broadcaster for SSE events
    pub event_tx: broadcast::Sender<SoundLensEvent>,
}

impl SharedState {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100); // Buffer up to 100 events
        Self {
            session: RwLock::new(SessionSnapshot::Idle),
            event_tx,
        }
    }

    /// Broadcast an event to all SSE listeners
    pub fn broadcast_event(&self, event: SoundLensEvent) {
        // Ignore send errors (no receivers is OK)
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to event stream for SSE
    pub fn subscribe_events(&self) -> broadcast::Receiver<SoundLensEvent> {
        self.event_tx.subscribe()
    }

    pub async fn get_session(&self) -> SessionSnapshot {
        *self.session.read().await
    }

    pub async fn set_session(&self, snapshot: SessionSnapshot) {
        *self.session.write().await = snapshot;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_snapshot_transitions() {
        let state = SharedState::new();
        assert_eq!(state.get_session().await, SessionSnapshot::Idle);

        state
            .set_session(SessionSnapshot::Recording {
                session_epoch: 1,
                last_checkpoint_secs: 0,
            })
            .await;
        assert!(matches!(
            state.get_session().await,
            SessionSnapshot::Recording { session_epoch: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscriber() {
        let state = SharedState::new();
        let mut rx = state.subscribe_events();

        state.broadcast_event(SoundLensEvent::HistoryChanged {
            entry_count: 3,
            timestamp: chrono::Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "HistoryChanged");
    }
}
