//! Configuration management for followback

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::retry::RetryPolicy;

/// Largest page size the AT Protocol listing endpoints accept
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub sync: SyncConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// PDS / entryway base URL
    pub url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: "https://bsky.social".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Accounts requested per listing page
    pub page_limit: u32,
    /// Fixed delay between pages and between follows, in milliseconds
    pub delay_ms: u64,
    /// Report who would be followed without following anyone
    pub dry_run: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_limit: MAX_PAGE_LIMIT,
            delay_ms: 1000,
            dry_run: false,
        }
    }
}

impl SyncConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub rate_limit_pause_secs: u64,
    /// Unset means wait out rate limiting indefinitely
    pub max_rate_limit_waits: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            backoff_base_ms: policy.backoff_base.as_millis() as u64,
            backoff_cap_ms: policy.backoff_cap.as_millis() as u64,
            rate_limit_pause_secs: policy.rate_limit_pause.as_secs(),
            max_rate_limit_waits: policy.max_rate_limit_waits,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_cap: Duration::from_millis(self.backoff_cap_ms),
            rate_limit_pause: Duration::from_secs(self.rate_limit_pause_secs),
            max_rate_limit_waits: self.max_rate_limit_waits,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file at the XDG default location yields the built-in
    /// defaults. A path given through `FOLLOWBACK_CONFIG` must exist.
    pub fn load() -> Result<Self> {
        if let Some(path) = env_config_path() {
            return Self::load_from_path(&path);
        }

        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Check values that would otherwise fail late against the service
    pub fn validate(&self) -> Result<()> {
        if self.service.url.trim().is_empty() {
            return Err(ConfigError::MissingField("service.url".to_string()).into());
        }

        if self.sync.page_limit == 0 || self.sync.page_limit > MAX_PAGE_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "sync.page_limit".to_string(),
                reason: format!("must be between 1 and {}", MAX_PAGE_LIMIT),
            }
            .into());
        }

        if self.retry.backoff_cap_ms < self.retry.backoff_base_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry.backoff_cap_ms".to_string(),
                reason: "must not be smaller than retry.backoff_base_ms".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

fn env_config_path() -> Option<PathBuf> {
    std::env::var("FOLLOWBACK_CONFIG")
        .ok()
        .filter(|p| !p.is_empty())
        .map(|p| PathBuf::from(shellexpand::tilde(&p).to_string()))
}

/// Resolve the configuration file path (XDG config dir, or `FOLLOWBACK_CONFIG`)
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Some(path) = env_config_path() {
        return Ok(path);
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("followback").join("config.toml"))
}
