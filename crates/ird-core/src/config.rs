//! Daemon configuration.
//!
//! One JSON file configures the whole daemon: where the work directory
//! lives, the store's retention budgets, capture caps and worker count,
//! and the notification throttle. Everything has a sane default so a
//! missing config file means defaults, not a refusal to start.

use crate::error::{Result, ServiceError};
use ird_store::StoreLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Capture-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Per-buffer size cap in bytes.
    pub buffer_limit_bytes: usize,
    /// Idle buffers retained in the pool.
    pub max_pooled_buffers: usize,
    /// Worker threads for blocking section producers.
    pub worker_threads: usize,
    /// Timeout applied to sections that do not specify their own.
    pub default_section_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_limit_bytes: 4 * 1024 * 1024,
            max_pooled_buffers: 8,
            worker_threads: 2,
            default_section_timeout_ms: 10_000,
        }
    }
}

/// Notification throttle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Accumulated notification bytes allowed per window.
    pub size_limit_bytes: u64,
    /// Window length in milliseconds.
    pub refractory_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            size_limit_bytes: 10 * 1024 * 1024,
            refractory_ms: 60_000,
        }
    }
}

impl ThrottleConfig {
    pub fn refractory_period(&self) -> Duration {
        Duration::from_millis(self.refractory_ms)
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Directory holding the report pairs. Must exist with mode 0770.
    pub work_dir: PathBuf,

    /// URI authority used in pending-consent notifications.
    #[serde(default = "default_uri_authority")]
    pub uri_authority: String,

    /// Interval between daemon housekeeping ticks in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default)]
    pub store: StoreLimits,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub throttle: ThrottleConfig,
}

fn default_uri_authority() -> String {
    "incidentd".to_string()
}

fn default_tick_interval_ms() -> u64 {
    5_000
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/var/lib/incidentd/reports"),
            uri_authority: default_uri_authority(),
            tick_interval_ms: default_tick_interval_ms(),
            store: StoreLimits::default(),
            capture: CaptureConfig::default(),
            throttle: ThrottleConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.buffer_limit_bytes == 0 {
            return Err(ServiceError::InvalidConfig(
                "capture.buffer_limit_bytes must be non-zero".to_string(),
            ));
        }
        if self.capture.worker_threads == 0 {
            return Err(ServiceError::InvalidConfig(
                "capture.worker_threads must be non-zero".to_string(),
            ));
        }
        if self.store.max_report_count == 0 {
            return Err(ServiceError::InvalidConfig(
                "store.max_report_count must be non-zero".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ServiceError::InvalidConfig(
                "tick_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_section_timeout(&self) -> Duration {
        Duration::from_millis(self.capture.default_section_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DaemonConfig::default().validate().is_ok());
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = DaemonConfig::default();
        config.work_dir = PathBuf::from("/tmp/reports");
        config.throttle.size_limit_bytes = 1234;
        config.save(&path).unwrap();

        let loaded = DaemonConfig::load(&path).unwrap();
        assert_eq!(loaded.work_dir, PathBuf::from("/tmp/reports"));
        assert_eq!(loaded.throttle.size_limit_bytes, 1234);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"work_dir": "/data/reports"}"#).unwrap();

        let loaded = DaemonConfig::load(&path).unwrap();
        assert_eq!(loaded.work_dir, PathBuf::from("/data/reports"));
        assert_eq!(loaded.uri_authority, "incidentd");
        assert_eq!(loaded.capture.worker_threads, 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = DaemonConfig::default();
        config.capture.worker_threads = 0;
        assert!(matches!(
            config.validate(),
            Err(ServiceError::InvalidConfig(_))
        ));
    }
}
