//! Uploader configuration.
//!
//! Stored as TOML:
//! - Linux: `~/.config/mocup/uploader.toml`
//! - Windows: `%APPDATA%/mocup/uploader.toml`
//!
//! A missing file means defaults; nothing is written back.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mocup_http::HttpConfig;
use mocup_protocol::SESSION_EXPIRY_BUFFER_MS;
use mocup_transfer::ValidationConfig;
use mocup_upload::{BatchConfig, ThrottleConfig};
use serde::{Deserialize, Serialize};

/// Uploader configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    pub http: HttpConfig,
    pub queue: QueueSettings,
    pub limits: LimitSettings,
}

/// Throttled queue knobs, in plain numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_ratio: f64,
    pub delay_between_requests_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        let defaults = ThrottleConfig::default();
        Self {
            max_concurrent: defaults.max_concurrent,
            max_retries: defaults.max_retries,
            retry_delay_ms: defaults.retry_delay.as_millis() as u64,
            backoff_multiplier: defaults.backoff_multiplier,
            jitter_ratio: defaults.jitter_ratio,
            delay_between_requests_ms: defaults.delay_between_requests.as_millis() as u64,
        }
    }
}

/// Validation and session limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    pub max_file_size: u64,
    pub max_files: usize,
    /// Accept PDF only.
    pub pdf_only: bool,
    pub expiry_buffer_ms: i64,
}

impl Default for LimitSettings {
    fn default() -> Self {
        let defaults = ValidationConfig::default();
        Self {
            max_file_size: defaults.max_file_size,
            max_files: defaults.max_files,
            pdf_only: false,
            expiry_buffer_ms: SESSION_EXPIRY_BUFFER_MS,
        }
    }
}

impl UploaderConfig {
    /// Loads the config at `path`, or at the platform default location.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: UploaderConfig = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn validation(&self) -> ValidationConfig {
        let base = if self.limits.pdf_only {
            ValidationConfig::pdf_only()
        } else {
            ValidationConfig::default()
        };
        ValidationConfig {
            max_file_size: self.limits.max_file_size,
            max_files: self.limits.max_files,
            ..base
        }
    }

    pub fn throttle(&self) -> ThrottleConfig {
        let q = &self.queue;
        ThrottleConfig {
            max_concurrent: q.max_concurrent.max(1),
            max_retries: q.max_retries,
            retry_delay: Duration::from_millis(q.retry_delay_ms),
            backoff_multiplier: q.backoff_multiplier,
            jitter_ratio: q.jitter_ratio,
            delay_between_requests: Duration::from_millis(q.delay_between_requests_ms),
        }
    }

    pub fn batch(&self) -> BatchConfig {
        BatchConfig {
            throttle: self.throttle(),
            validation: self.validation(),
            expiry_buffer_ms: self.limits.expiry_buffer_ms,
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("mocup")
            .join("uploader.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("mocup").join("uploader.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/mocup/uploader.toml"))
    }
}
