//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: backend
//! URL, request timeout, session store backend, renewal timing, and the last
//! e-mail used to sign in.
//!
//! Configuration is stored at `~/.config/techspace/config.json`. The
//! `TECHSPACE_API_URL` and `TECHSPACE_STORE` environment variables override
//! the file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::client::{DEFAULT_BASE_URL, REQUEST_TIMEOUT_SECS};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "techspace";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_API_URL: &str = "TECHSPACE_API_URL";
const ENV_STORE: &str = "TECHSPACE_STORE";

/// Renew this many seconds before the access credential expires.
const DEFAULT_REFRESH_AHEAD_SECS: u64 = 300;

/// Silent background renewal interval (15 minutes).
const DEFAULT_PERIODIC_REFRESH_SECS: u64 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Keyring,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StoreBackend::File),
            "keyring" | "keychain" => Ok(StoreBackend::Keyring),
            other => Err(anyhow::anyhow!("Unknown session store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub store: StoreBackend,
    pub refresh_ahead_secs: u64,
    pub periodic_refresh_secs: u64,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            store: StoreBackend::default(),
            refresh_ahead_secs: DEFAULT_REFRESH_AHEAD_SECS,
            periodic_refresh_secs: DEFAULT_PERIODIC_REFRESH_SECS,
            last_email: None,
        }
    }
}

impl Config {
    /// Load from disk (defaults when absent), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
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

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(store) = var(ENV_STORE) {
            match store.parse() {
                Ok(backend) => self.store = backend,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_STORE),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn refresh_ahead(&self) -> Duration {
        Duration::from_secs(self.refresh_ahead_secs)
    }

    /// `None` when periodic renewal is disabled.
    pub fn periodic_refresh(&self) -> Option<Duration> {
        (self.periodic_refresh_secs > 0).then(|| Duration::from_secs(self.periodic_refresh_secs))
    }
}
