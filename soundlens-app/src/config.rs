//! Configuration management for the SoundLens service
//!
//! Two-tier configuration:
//! 1. **TOML bootstrap**: database path, port, provider credentials, remote
//!    endpoint (static, read once at startup)
//! 2. **Capture tuning**: slice interval, checkpoint policy, thresholds,
//!    caps — all have built-in defaults and can be overridden in TOML
//!
//! Priority for bootstrap values: command-line arguments, then environment
//! variables, then the TOML file, then built-in defaults.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Checkpoint policy selection for the chunk scheduler
///
/// The two policies are alternatives; exactly one is active per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPolicyKind {
    /// Dispatch the full accumulated buffer at fixed elapsed-time
    /// checkpoints, each firing at most once
    #[default]
    FixedCheckpoints,
    /// Dispatch the most recent slice only when its maximum loudness
    /// exceeds the silence threshold
    SilenceGated,
}

/// Capture pipeline tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Accumulation slice interval in milliseconds
    pub slice_interval_ms: u64,

    /// Hard wall-clock ceiling on a capture session, in seconds
    pub max_duration_secs: u64,

    /// Active checkpoint policy
    pub checkpoint_policy: CheckpointPolicyKind,

    /// Fixed checkpoints (seconds elapsed) for the fixed policy
    pub checkpoints_secs: Vec<u64>,

    /// Tolerance window after each checkpoint in milliseconds; a checkpoint
    /// fires when elapsed time has entered [cp, cp + tolerance)
    pub checkpoint_tolerance_ms: u64,

    /// Loudness level (0-255 byte scale) below which a window is
    /// considered silent by the silence-gated policy
    pub silence_threshold: f32,

    /// Capture sample rate in Hz
    pub sample_rate: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            slice_interval_ms: 2000,
            max_duration_secs: 20,
            checkpoint_policy: CheckpointPolicyKind::FixedCheckpoints,
            checkpoints_secs: vec![4, 8, 12],
            checkpoint_tolerance_ms: 1500,
            silence_threshold: 10.0,
            sample_rate: 44100,
        }
    }
}

impl CaptureConfig {
    pub fn slice_interval(&self) -> Duration {
        Duration::from_millis(self.slice_interval_ms)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

/// Recognition provider credentials and endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Provider host, e.g. "identify-eu-west-1.acrcloud.com"
    pub host: String,

    pub access_key: String,

    pub access_secret: String,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_timeout_secs() -> u64 {
    10
}

/// Remote history datastore endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote history API
    pub base_url: String,

    /// API key sent with every request
    #[serde(default)]
    pub api_key: Option<String>,

    /// Page size for incremental pulls
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    20
}

/// History retention tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum entries retained in the local cache (the remote cap is
    /// larger and enforced server-side)
    pub local_cap: usize,

    /// Debounce window for duplicate detections, in seconds
    pub dedup_window_secs: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            local_cap: 50,
            dedup_window_secs: 10,
        }
    }
}

/// Full service configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to SQLite database file backing the local cache
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    pub provider: ProviderConfig,

    /// Remote history sync endpoint; None disables push/pull entirely
    #[serde(default)]
    pub remote: Option<RemoteConfig>,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub history: HistoryConfig,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("soundlens.db")
}

fn default_port() -> u16 {
    5760
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.provider.host.is_empty() || self.provider.access_key.is_empty() {
            return Err(Error::Config(
                "provider.host and provider.access_key must be set".to_string(),
            ));
        }
        if self.capture.slice_interval_ms == 0 {
            return Err(Error::Config(
                "capture.slice_interval_ms must be > 0".to_string(),
            ));
        }
        if self.capture.max_duration_secs == 0 {
            return Err(Error::Config(
                "capture.max_duration_secs must be > 0".to_string(),
            ));
        }
        if let Some(remote) = &self.remote {
            if remote.page_size == 0 {
                return Err(Error::Config("remote.page_size must be > 0".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
            [provider]
            host = "identify-eu-west-1.acrcloud.com"
            access_key = "key"
            access_secret = "secret"
        "#
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(config.port, 5760);
        assert_eq!(config.capture.slice_interval_ms, 2000);
        assert_eq!(config.capture.max_duration_secs, 20);
        assert_eq!(config.capture.checkpoints_secs, vec![4, 8, 12]);
        assert_eq!(
            config.capture.checkpoint_policy,
            CheckpointPolicyKind::FixedCheckpoints
        );
        assert_eq!(config.history.local_cap, 50);
        assert!(config.remote.is_none());
    }

    #[test]
    fn test_policy_selection_from_toml() {
        let toml_str = format!(
            "{}\n[capture]\ncheckpoint_policy = \"silence_gated\"\nsilence_threshold = 15.0\n",
            minimal_toml()
        );
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            config.capture.checkpoint_policy,
            CheckpointPolicyKind::SilenceGated
        );
        assert_eq!(config.capture.silence_threshold, 15.0);
    }

    #[test]
    fn test_remote_block() {
        let toml_str = format!(
            "{}\n[remote]\nbase_url = \"https://api.example.com\"\n",
            minimal_toml()
        );
        let config: Config = toml::from_str(&toml_str).unwrap();
        let remote = config.remote.unwrap();
        assert_eq!(remote.page_size, 20);
        assert!(remote.api_key.is_none());
    }

    #[test]
    fn test_zero_slice_interval_rejected() {
        let toml_str = format!("{}\n[capture]\nslice_interval_ms = 0\n", minimal_toml());
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(config.validate().is_err());
    }
}
