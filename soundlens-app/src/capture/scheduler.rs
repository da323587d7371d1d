//! Chunk scheduling for recognition dispatch
//!
//! Converts elapsed time and loudness history into dispatch decisions while
//! guaranteeing at most one in-flight recognition request per session. Two
//! policies exist; exactly one is active per deployment:
//!
//! - Fixed checkpoints: the full accumulated buffer is dispatched at a
//!   small ordered set of elapsed-time checkpoints (4s/8s/12s), each firing
//!   at most once within its tolerance window.
//! - Silence-gated: only the most recent slice is dispatched, and only when
//!   the maximum loudness within that slice exceeds the silence threshold;
//!   silent slices are dropped without a network call.

use crate::config::{CaptureConfig, CheckpointPolicyKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Active checkpoint policy with its tuning
#[derive(Debug, Clone)]
pub enum CheckpointPolicy {
    Fixed {
        /// Elapsed-time checkpoints, ascending
        checkpoints: Vec<Duration>,
        /// A checkpoint fires while elapsed is within [cp, cp + tolerance)
        tolerance: Duration,
    },
    SilenceGated {
        /// Minimum running-max level (0-255) for a slice to be dispatched
        threshold: f32,
    },
}

impl CheckpointPolicy {
    pub fn from_config(config: &CaptureConfig) -> Self {
        match config.checkpoint_policy {
            CheckpointPolicyKind::FixedCheckpoints => CheckpointPolicy::Fixed {
                checkpoints: config
                    .checkpoints_secs
                    .iter()
                    .map(|s| Duration::from_secs(*s))
                    .collect(),
                tolerance: Duration::from_millis(config.checkpoint_tolerance_ms),
            },
            CheckpointPolicyKind::SilenceGated => CheckpointPolicy::SilenceGated {
                threshold: config.silence_threshold,
            },
        }
    }
}

/// Which part of the accumulated audio a dispatch carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    /// The entire accumulated buffer since recording start
    FullBuffer,
    /// Only the most recent slice
    LatestSlice,
}

/// Why a slice was not dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No checkpoint is due at this elapsed time
    NoCheckpointDue,
    /// A recognition request is already pending (skip, never queue)
    RequestPending,
    /// Slice max loudness below the silence threshold
    Silent,
    /// A match was already observed; dispatch is cancelled for the session
    AlreadyMatched,
}

/// Decision for one slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceDecision {
    Dispatch(DispatchKind),
    Skip(SkipReason),
}

/// Per-session dispatch scheduler
///
/// One instance per capture session, owned by the session driver task. The
/// pending and matched flags are shared with the recognition completion
/// path, which settles them out-of-band.
pub struct ChunkScheduler {
    policy: CheckpointPolicy,
    /// Parallel to Fixed checkpoints: has this checkpoint fired
    fired: Vec<bool>,
    pending: Arc<AtomicBool>,
    matched: Arc<AtomicBool>,
}

impl ChunkScheduler {
    pub fn new(policy: CheckpointPolicy) -> Self {
        let fired = match &policy {
            CheckpointPolicy::Fixed { checkpoints, .. } => vec![false; checkpoints.len()],
            CheckpointPolicy::SilenceGated { .. } => Vec::new(),
        };
        Self {
            policy,
            fired,
            pending: Arc::new(AtomicBool::new(false)),
            matched: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared pending flag; cleared when a request settles
    pub fn pending_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.pending)
    }

    /// Shared matched flag; once set, no further dispatch occurs
    pub fn matched_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.matched)
    }

    /// Last fixed checkpoint that fired, in seconds (0 = none yet)
    pub fn last_checkpoint_secs(&self) -> u64 {
        match &self.policy {
            CheckpointPolicy::Fixed { checkpoints, .. } => checkpoints
                .iter()
                .zip(&self.fired)
                .filter(|(_, fired)| **fired)
                .map(|(cp, _)| cp.as_secs())
                .max()
                .unwrap_or(0),
            CheckpointPolicy::SilenceGated { .. } => 0,
        }
    }

    /// Evaluate one slice boundary
    ///
    /// `slice_max_level` is the amplitude monitor's running max within the
    /// slice that just ended.
    pub fn on_slice(&mut self, elapsed: Duration, slice_max_level: f32) -> SliceDecision {
        if self.matched.load(Ordering::Acquire) {
            return SliceDecision::Skip(SkipReason::AlreadyMatched);
        }

        match &self.policy {
            CheckpointPolicy::Fixed {
                checkpoints,
                tolerance,
            } => {
                let due = checkpoints.iter().enumerate().find(|(i, cp)| {
                    !self.fired[*i] && elapsed >= **cp && elapsed < **cp + *tolerance
                });

                let Some((index, _)) = due else {
                    return SliceDecision::Skip(SkipReason::NoCheckpointDue);
                };

                if self.pending.load(Ordering::Acquire) {
                    // Skip and continue; the checkpoint stays unfired so a
                    // later slice inside the tolerance window may catch it
                    return SliceDecision::Skip(SkipReason::RequestPending);
                }

                self.fired[index] = true;
                self.pending.store(true, Ordering::Release);
                SliceDecision::Dispatch(DispatchKind::FullBuffer)
            }
            CheckpointPolicy::SilenceGated { threshold } => {
                if slice_max_level <= *threshold {
                    return SliceDecision::Skip(SkipReason::Silent);
                }
                if self.pending.load(Ordering::Acquire) {
                    return SliceDecision::Skip(SkipReason::RequestPending);
                }
                self.pending.store(true, Ordering::Release);
                SliceDecision::Dispatch(DispatchKind::LatestSlice)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_scheduler() -> ChunkScheduler {
        ChunkScheduler::new(CheckpointPolicy::Fixed {
            checkpoints: vec![
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(12),
            ],
            tolerance: Duration::from_millis(1500),
        })
    }

    fn settle(scheduler: &ChunkScheduler) {
        scheduler.pending_flag().store(false, Ordering::Release);
    }

    #[test]
    fn test_fixed_no_dispatch_before_first_checkpoint() {
        let mut s = fixed_scheduler();
        assert_eq!(
            s.on_slice(Duration::from_secs(2), 100.0),
            SliceDecision::Skip(SkipReason::NoCheckpointDue)
        );
    }

    #[test]
    fn test_fixed_checkpoint_fires_once() {
        let mut s = fixed_scheduler();
        assert_eq!(
            s.on_slice(Duration::from_secs(4), 100.0),
            SliceDecision::Dispatch(DispatchKind::FullBuffer)
        );
        settle(&s);
        // Still inside the 4s tolerance window, but already fired
        assert_eq!(
            s.on_slice(Duration::from_millis(4900), 100.0),
            SliceDecision::Skip(SkipReason::NoCheckpointDue)
        );
        assert_eq!(s.last_checkpoint_secs(), 4);
    }

    #[test]
    fn test_fixed_outside_tolerance_window_does_not_fire() {
        let mut s = fixed_scheduler();
        // 6s is past 4s + 1.5s tolerance and before 8s
        assert_eq!(
            s.on_slice(Duration::from_secs(6), 100.0),
            SliceDecision::Skip(SkipReason::NoCheckpointDue)
        );
    }

    #[test]
    fn test_fixed_pending_skips_without_queueing() {
        let mut s = fixed_scheduler();
        assert!(matches!(
            s.on_slice(Duration::from_secs(4), 100.0),
            SliceDecision::Dispatch(_)
        ));
        // Request still pending at the 8s checkpoint: skipped, not queued
        assert_eq!(
            s.on_slice(Duration::from_secs(8), 100.0),
            SliceDecision::Skip(SkipReason::RequestPending)
        );
        // After settling, the 8s checkpoint can still fire inside its window
        settle(&s);
        assert_eq!(
            s.on_slice(Duration::from_millis(9000), 100.0),
            SliceDecision::Dispatch(DispatchKind::FullBuffer)
        );
    }

    #[test]
    fn test_matched_cancels_all_further_dispatch() {
        let mut s = fixed_scheduler();
        s.matched_flag().store(true, Ordering::Release);
        assert_eq!(
            s.on_slice(Duration::from_secs(4), 100.0),
            SliceDecision::Skip(SkipReason::AlreadyMatched)
        );
        assert_eq!(
            s.on_slice(Duration::from_secs(8), 100.0),
            SliceDecision::Skip(SkipReason::AlreadyMatched)
        );
    }

    #[test]
    fn test_silence_gated_drops_silent_slices() {
        let mut s = ChunkScheduler::new(CheckpointPolicy::SilenceGated { threshold: 15.0 });
        assert_eq!(
            s.on_slice(Duration::from_secs(2), 10.0),
            SliceDecision::Skip(SkipReason::Silent)
        );
        assert_eq!(
            s.on_slice(Duration::from_secs(4), 40.0),
            SliceDecision::Dispatch(DispatchKind::LatestSlice)
        );
        // Pending blocks the next loud slice
        assert_eq!(
            s.on_slice(Duration::from_secs(6), 40.0),
            SliceDecision::Skip(SkipReason::RequestPending)
        );
        settle(&s);
        assert_eq!(
            s.on_slice(Duration::from_secs(8), 40.0),
            SliceDecision::Dispatch(DispatchKind::LatestSlice)
        );
    }
}
