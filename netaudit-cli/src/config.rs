//! CLI configuration management
//!
//! Settings come from, in increasing priority: built-in defaults, the TOML
//! file at `~/.config/netaudit/cli.toml`, and command-line flags.

use crate::cache::DEFAULT_CACHE_DIR;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the OCM credentials file (overridden by `OCM_CONFIG`)
    pub ocm_config: Option<PathBuf>,
    pub cache_dir: PathBuf,
    /// Seconds before a cached response is refetched; unset means never
    pub cache_expire_after: Option<u64>,
    /// Seconds to wait before retrying a cluster after a connectivity failure
    pub retry_delay: u64,
    pub request_timeout: u64,
    /// Compare the on-cluster version with the version OCM reports
    pub check_version: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ocm_config: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cache_expire_after: None,
            retry_delay: 5,
            request_timeout: 30,
            check_version: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        Ok(config)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    pub fn cache_expire_after(&self) -> Option<Duration> {
        self.cache_expire_after.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    fn config_path() -> Option<PathBuf> {
        let home = std::env::var("HOME").ok()?;
        Some(PathBuf::from(home).join(".config/netaudit/cli.toml"))
    }
}

/// Credentials and endpoints for the OCM API, as written by `ocm login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcmCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub client_id: String,
    pub token_url: String,
    pub url: String,
}

impl OcmCredentials {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read OCM config {}", path.display()))?;
        let credentials = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse OCM config {}", path.display()))?;
        Ok(credentials)
    }
}
