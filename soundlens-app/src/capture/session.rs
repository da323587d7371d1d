//! Capture session lifecycle and orchestration
//!
//! One `CaptureEngine` owns at most one live session. A session consists
//! of three cooperating tasks tied to one cancellation token:
//!
//! - the input thread delivering sample batches (see `input`)
//! - a reader task accumulating samples and feeding the amplitude monitor
//! - a driver task evaluating the chunk scheduler at every slice boundary
//!
//! Cancelling the token releases the device, the monitor and the timers
//! together, on every exit path. Sessions are numbered by a monotonically
//! increasing epoch; recognition results carry the epoch of the session
//! that dispatched them, so responses arriving after a newer session
//! started are discarded. Within one epoch the first `Matched` outcome
//! wins and implicitly stops the session.

use crate::capture::amplitude::AmplitudeMonitor;
use crate::capture::input::{to_pcm16_bytes, AudioInput};
use crate::capture::scheduler::{CheckpointPolicy, ChunkScheduler, DispatchKind, SliceDecision, SkipReason};
use crate::config::CaptureConfig;
use crate::error::{Error, Result};
use crate::history::HistoryStore;
use crate::recognize::Recognizer;
use crate::state::{SessionSnapshot, SharedState};
use crate::sync::SyncEngine;
use chrono::Utc;
use soundlens_common::events::{SoundLensEvent, StopReason};
use soundlens_common::RecognitionOutcome;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State of the live session held while recording
struct ActiveSession {
    epoch: u64,
    cancel: CancellationToken,
    buffer: Arc<StdMutex<Vec<f32>>>,
    matched: Arc<AtomicBool>,
}

/// Owner of the capture pipeline
pub struct CaptureEngine {
    config: CaptureConfig,
    input: Arc<dyn AudioInput>,
    recognizer: Arc<dyn Recognizer>,
    store: Arc<HistoryStore>,
    sync: Arc<SyncEngine>,
    state: Arc<SharedState>,
    session: Mutex<Option<ActiveSession>>,
    epoch: AtomicU64,
}

impl CaptureEngine {
    pub fn new(
        config: CaptureConfig,
        input: Arc<dyn AudioInput>,
        recognizer: Arc<dyn Recognizer>,
        store: Arc<HistoryStore>,
        sync: Arc<SyncEngine>,
        state: Arc<SharedState>,
    ) -> Self {
        Self {
            config,
            input,
            recognizer,
            store,
            sync,
            state,
            session: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    /// Start a capture session
    ///
    /// Fails with `DeviceUnavailable` when the input device cannot be
    /// acquired, and with `InvalidState` when a session is already live.
    pub async fn start(self: &Arc<Self>) -> Result<u64> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Err(Error::InvalidState("Capture already running".to_string()));
        }

        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<f32>>();

        // Device acquisition failure surfaces to the caller here
        self.input
            .open(self.config.sample_rate, tx, cancel.child_token())?;

        let buffer = Arc::new(StdMutex::new(Vec::<f32>::new()));
        let monitor = Arc::new(AmplitudeMonitor::new());
        let started_at = Instant::now();

        // Reader task: accumulate samples and track loudness
        {
            let buffer = Arc::clone(&buffer);
            let monitor = Arc::clone(&monitor);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        batch = rx.recv() => {
                            let Some(batch) = batch else { break };
                            monitor.feed(&batch);
                            buffer.lock().expect("capture buffer lock poisoned").extend(batch);
                        }
                    }
                }
            });
        }

        let mut scheduler = ChunkScheduler::new(CheckpointPolicy::from_config(&self.config));
        let matched = scheduler.matched_flag();
        let pending = scheduler.pending_flag();

        *session = Some(ActiveSession {
            epoch,
            cancel: cancel.clone(),
            buffer: Arc::clone(&buffer),
            matched: Arc::clone(&matched),
        });
        drop(session);

        self.state
            .set_session(SessionSnapshot::Recording {
                session_epoch: epoch,
                last_checkpoint_secs: 0,
            })
            .await;
        self.state.broadcast_event(SoundLensEvent::CaptureStarted {
            session_epoch: epoch,
            timestamp: Utc::now(),
        });
        info!(epoch, "Capture session started");

        // Driver task: evaluate the scheduler at every slice boundary
        let engine = Arc::clone(self);
        let slice = self.config.slice_interval();
        let max_duration = self.config.max_duration();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(started_at + slice, slice);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Buffer offset where the current slice began; advanced at every
            // slice boundary so a silence-gated dispatch carries only the
            // most recent slice and silent slices are dropped for good
            let mut slice_start = 0usize;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let elapsed = started_at.elapsed();
                        let elapsed_ms = elapsed.as_millis() as u64;

                        engine.state.broadcast_event(SoundLensEvent::CaptureProgress {
                            session_epoch: epoch,
                            elapsed_ms,
                            level: monitor.level(),
                            timestamp: Utc::now(),
                        });

                        // Hard ceiling: bound resource hold time even when
                        // nothing matched and nobody pressed stop
                        if elapsed >= max_duration {
                            debug!(epoch, elapsed_ms, "Max duration reached, forcing stop");
                            if let Err(e) = engine
                                .stop_with_reason(StopReason::MaxDuration)
                                .await
                            {
                                warn!("Auto-stop failed: {}", e);
                            }
                            break;
                        }

                        match scheduler.on_slice(elapsed, monitor.max_level()) {
                            SliceDecision::Dispatch(kind) => {
                                let samples = {
                                    let buf = buffer
                                        .lock()
                                        .expect("capture buffer lock poisoned");
                                    match kind {
                                        DispatchKind::FullBuffer => buf.clone(),
                                        DispatchKind::LatestSlice => {
                                            buf[slice_start.min(buf.len())..].to_vec()
                                        }
                                    }
                                };

                                if samples.is_empty() {
                                    // No audio accumulated yet; release the slot
                                    pending.store(false, Ordering::Release);
                                } else {
                                    engine.state.broadcast_event(
                                        SoundLensEvent::CheckpointDispatched {
                                            session_epoch: epoch,
                                            elapsed_ms,
                                            sample_bytes: samples.len() * 2,
                                            timestamp: Utc::now(),
                                        },
                                    );
                                    engine.spawn_identify(
                                        epoch,
                                        samples,
                                        Some(Arc::clone(&pending)),
                                        Arc::clone(&matched),
                                    );
                                }
                            }
                            SliceDecision::Skip(SkipReason::RequestPending) => {
                                debug!(epoch, elapsed_ms, "Checkpoint skipped, request pending");
                            }
                            SliceDecision::Skip(_) => {}
                        }

                        // Close out this slice: the next one starts at the
                        // current buffer end with a fresh loudness maximum
                        slice_start = buffer
                            .lock()
                            .expect("capture buffer lock poisoned")
                            .len();
                        monitor.reset_max();

                        engine
                            .state
                            .set_session(SessionSnapshot::Recording {
                                session_epoch: epoch,
                                last_checkpoint_secs: scheduler.last_checkpoint_secs(),
                            })
                            .await;
                    }
                }
            }
        });

        Ok(epoch)
    }

    /// Stop the live session (idempotent; a no-op while Idle)
    pub async fn stop(self: &Arc<Self>) -> Result<()> {
        self.stop_with_reason(StopReason::Requested).await
    }

    pub(crate) async fn stop_with_reason(self: &Arc<Self>, reason: StopReason) -> Result<()> {
        let mut session = self.session.lock().await;
        let Some(active) = session.take() else {
            return Ok(());
        };
        drop(session);

        self.state
            .set_session(SessionSnapshot::Stopping {
                session_epoch: active.epoch,
            })
            .await;

        // Emit the final complete buffer unless a match already ended the
        // session. This dispatch may overlap a still-pending checkpoint
        // request; the first match wins and the loser is discarded.
        if reason != StopReason::Matched && !active.matched.load(Ordering::Acquire) {
            let samples = active
                .buffer
                .lock()
                .expect("capture buffer lock poisoned")
                .clone();
            if !samples.is_empty() {
                self.spawn_identify(active.epoch, samples, None, Arc::clone(&active.matched));
            }
        }

        // Releases the device, the reader and the driver together
        active.cancel.cancel();

        self.state.set_session(SessionSnapshot::Idle).await;
        self.state.broadcast_event(SoundLensEvent::CaptureStopped {
            session_epoch: active.epoch,
            reason,
            timestamp: Utc::now(),
        });
        info!(epoch = active.epoch, ?reason, "Capture session stopped");

        Ok(())
    }

    /// Dispatch one recognition request
    ///
    /// `pending` is the scheduler's in-flight slot for checkpoint
    /// dispatches (None for the final complete-buffer dispatch); it is
    /// released only when the request settles.
    fn spawn_identify(
        self: &Arc<Self>,
        epoch: u64,
        samples: Vec<f32>,
        pending: Option<Arc<AtomicBool>>,
        matched: Arc<AtomicBool>,
    ) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let bytes = to_pcm16_bytes(&samples);
            let outcome = match engine.recognizer.identify(&bytes).await {
                Ok(outcome) => outcome,
                Err(e) => RecognitionOutcome::Failed {
                    reason: e.to_string(),
                },
            };

            engine.handle_outcome(epoch, &matched, outcome).await;

            if let Some(pending) = pending {
                pending.store(false, Ordering::Release);
            }
        });
    }

    /// Apply one settled recognition outcome
    ///
    /// Responses may arrive out of order relative to dispatch order; the
    /// first successful match for the current epoch wins, everything else
    /// is discarded.
    async fn handle_outcome(
        self: &Arc<Self>,
        epoch: u64,
        matched: &Arc<AtomicBool>,
        outcome: RecognitionOutcome,
    ) {
        if self.epoch.load(Ordering::Acquire) != epoch {
            debug!(epoch, "Discarding recognition result from a superseded session");
            return;
        }

        match outcome {
            RecognitionOutcome::Matched { track } => {
                if matched.swap(true, Ordering::AcqRel) {
                    debug!(epoch, "Discarding late result, match already recorded");
                    return;
                }

                info!(epoch, title = ?track.title, "Track matched");
                self.state.broadcast_event(SoundLensEvent::RecognitionMatched {
                    session_epoch: epoch,
                    track: track.clone(),
                    timestamp: Utc::now(),
                });

                match self.store.add_entry(track).await {
                    Ok(Some(entry)) => self.sync.push(entry),
                    Ok(None) => debug!(epoch, "Match was a duplicate detection"),
                    Err(e) => warn!("Failed to record match: {}", e),
                }

                // First match cancels all further capture and scheduling
                if let Err(e) = self.stop_with_reason(StopReason::Matched).await {
                    warn!("Stop after match failed: {}", e);
                }
            }
            RecognitionOutcome::NoMatch => {
                debug!(epoch, "Provider found no match");
                self.state.broadcast_event(SoundLensEvent::RecognitionNoMatch {
                    session_epoch: epoch,
                    timestamp: Utc::now(),
                });
            }
            RecognitionOutcome::Failed { reason } => {
                warn!(epoch, "Recognition failed: {}", reason);
                self.state.broadcast_event(SoundLensEvent::RecognitionFailed {
                    session_epoch: epoch,
                    message: reason,
                    timestamp: Utc::now(),
                });
            }
        }
    }
}
