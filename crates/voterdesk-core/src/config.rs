//! Client configuration management.
//!
//! Holds the backend base URL, timeout and retry settings, the client
//! platform and which credential store backend to use.
//!
//! Configuration is stored at `~/.config/voterdesk/config.json`. The
//! `VOTERDESK_API_URL` environment variable overrides the stored base URL.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "voterdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_url`
pub const API_URL_ENV: &str = "VOTERDESK_API_URL";

/// Default request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default maximum number of retries for 5xx responses.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff unit; the nth retry waits `n * DEFAULT_RETRY_DELAY_MS`.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Platform marker sent as `X-Client-Platform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientPlatform {
    Web,
    #[default]
    Mobile,
}

impl ClientPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientPlatform::Web => "web",
            ClientPlatform::Mobile => "mobile",
        }
    }

    /// Storage used when the config does not name one.
    pub fn default_storage(&self) -> StorageBackend {
        match self {
            ClientPlatform::Web => StorageBackend::File,
            ClientPlatform::Mobile => StorageBackend::Keyring,
        }
    }
}

/// Where the session token and user profile are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// OS keychain via `keyring`
    Keyring,
    /// Encrypted JSON file in the cache directory
    File,
    /// Process memory only; nothing survives a restart
    Memory,
}

/// Which methods are retried after a 5xx response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Retry every method, including POST and PATCH.
    AllMethods,
    /// Retry GET, PUT and DELETE; POST and PATCH only with an idempotency key.
    #[default]
    Idempotent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: Option<String>,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub retry_policy: RetryPolicy,
    pub platform: ClientPlatform,
    pub storage: Option<StorageBackend>,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            retry_policy: RetryPolicy::default(),
            platform: ClientPlatform::default(),
            storage: None,
            last_email: None,
        }
    }
}

impl Config {
    /// Config pointing at `api_url` with every other setting defaulted.
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: Some(api_url.into()),
            ..Self::default()
        }
    }

    /// Load the config file, falling back to defaults when it does not exist.
    /// The environment override is applied afterwards.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_url = Some(url);
            }
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Base URL with any trailing slash removed.
    pub fn base_url(&self) -> Result<String> {
        let url = self
            .api_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("No API URL configured; set {} or api_url in config", API_URL_ENV)
            })?;
        Ok(url.trim_end_matches('/').to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.storage.unwrap_or_else(|| self.platform.default_storage())
    }
}
