//! Client configuration.
//!
//! Loaded from `<config_dir>/glossa/config.toml`; a missing file yields the
//! defaults so a fresh install works without any setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use glossa_core::{GlossaError, Result};
use serde::{Deserialize, Serialize};

/// Where the coach API listens by default (local development server).
pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 120;

/// Settings for the HTTP collaborator and stream handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the coach API.
    pub api_base: String,
    /// Timeout for plain request/response calls. Does not apply to the
    /// reply stream, which is event-driven.
    pub request_timeout_secs: u64,
    /// Maximum silence between reply stream events before the send cycle
    /// is failed.
    pub stream_idle_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            stream_idle_timeout_secs: DEFAULT_STREAM_IDLE_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Loads the configuration from the user's config directory.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Loads the configuration from an explicit path. A missing file is not
    /// an error; it yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        tracing::debug!(path = %path.display(), api_base = %config.api_base, "config loaded");
        Ok(config)
    }

    /// `<config_dir>/glossa/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| GlossaError::config("no config directory on this platform"))?;
        Ok(base.join("glossa").join("config.toml"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}
