//! Loudness monitoring for the capture pipeline
//!
//! Fed with every incoming sample batch (the capture callback cadence).
//! Exposes the instantaneous level and a running maximum since the last
//! checkpoint reset; the scheduler uses the running maximum to decide
//! whether a window contains signal worth sending.
//!
//! Levels are scaled to a 0-255 byte range so silence thresholds stay in
//! the familiar analyser scale (silence is typically below 10).

use std::sync::Mutex;

/// Scale factor from normalized peak (0.0-1.0) to the byte level range
const LEVEL_SCALE: f32 = 255.0;

#[derive(Debug, Default)]
struct LevelState {
    level: f32,
    max_since_reset: f32,
}

/// Running loudness estimate for one capture session
#[derive(Debug, Default)]
pub struct AmplitudeMonitor {
    state: Mutex<LevelState>,
}

impl AmplitudeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one batch of samples; updates the instantaneous level and the
    /// running maximum
    pub fn feed(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        let level = (peak * LEVEL_SCALE).min(LEVEL_SCALE);

        let mut state = self.state.lock().expect("amplitude lock poisoned");
        state.level = level;
        if level > state.max_since_reset {
            state.max_since_reset = level;
        }
    }

    /// Instantaneous level (0-255)
    pub fn level(&self) -> f32 {
        self.state.lock().expect("amplitude lock poisoned").level
    }

    /// Running maximum level since the last reset (0-255)
    pub fn max_level(&self) -> f32 {
        self.state
            .lock()
            .expect("amplitude lock poisoned")
            .max_since_reset
    }

    /// Reset the running maximum (called at each slice boundary)
    pub fn reset_max(&self) {
        self.state
            .lock()
            .expect("amplitude lock poisoned")
            .max_since_reset = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_monitor_is_silent() {
        let monitor = AmplitudeMonitor::new();
        assert_eq!(monitor.level(), 0.0);
        assert_eq!(monitor.max_level(), 0.0);
    }

    #[test]
    fn test_feed_updates_level_and_max() {
        let monitor = AmplitudeMonitor::new();
        monitor.feed(&[0.0, 0.5, -0.2]);
        assert_eq!(monitor.level(), 0.5 * 255.0);
        assert_eq!(monitor.max_level(), 0.5 * 255.0);

        // Quieter batch lowers the instantaneous level, max is retained
        monitor.feed(&[0.1, -0.1]);
        assert!((monitor.level() - 0.1 * 255.0).abs() < 1e-3);
        assert_eq!(monitor.max_level(), 0.5 * 255.0);
    }

    #[test]
    fn test_reset_max_clears_running_maximum_only() {
        let monitor = AmplitudeMonitor::new();
        monitor.feed(&[0.8]);
        monitor.reset_max();
        assert_eq!(monitor.max_level(), 0.0);
        assert_eq!(monitor.level(), 0.8 * 255.0);
    }

    #[test]
    fn test_level_is_clamped_to_byte_range() {
        let monitor = AmplitudeMonitor::new();
        monitor.feed(&[2.0]);
        assert_eq!(monitor.level(), 255.0);
    }

    #[test]
    fn test_empty_batch_is_ignored() {
        let monitor = AmplitudeMonitor::new();
        monitor.feed(&[0.4]);
        monitor.feed(&[]);
        assert_eq!(monitor.level(), 0.4 * 255.0);
    }
}
