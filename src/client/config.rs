// Configuration module for the BlindMatch client

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::constants::{POLL_INTERVAL, TICK_INTERVAL};

// =============================================================================
// CONFIGURATION STRUCTURES
// =============================================================================

/// How event-state updates reach the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Poll `get-event-state` on a fixed interval
    #[default]
    Poll,
    /// Subscribe to server-pushed event state
    Websocket,
}

/// Backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Base URL of the event site, e.g. "https://blindmatch.example"
    #[serde(default = "default_server_url")]
    pub url: String,

    #[serde(default)]
    pub transport: Transport,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Countdown recompute interval
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Per-request timeout. Not set = requests may hang indefinitely.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_poll_interval_ms() -> u64 {
    POLL_INTERVAL.as_millis() as u64
}
fn default_tick_interval_ms() -> u64 {
    TICK_INTERVAL.as_millis() as u64
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            transport: Transport::default(),
            poll_interval_ms: default_poll_interval_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            request_timeout_secs: None,
        }
    }
}

impl ServerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(100))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Persistent storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// JSON file holding tokens, timer backup and lockout state
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    "blindmatch_store.json".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingSettings {
    /// Mirror logs to stderr
    #[serde(default)]
    pub console: bool,
    /// Log file path (relative to the config file or absolute). Empty = no file logging.
    #[serde(default)]
    pub log_file: String,
}

/// Contact form relay
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContactSettings {
    #[serde(default)]
    pub formspree_url: String,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub contact: ContactSettings,
}

// =============================================================================
// CONFIG LOADING
// =============================================================================

#[derive(Debug)]
pub enum ConfigError {
    ReadError(std::io::Error),
    ParseError(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::ParseError(e) => write!(f, "Failed to parse config file: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub const CONFIG_FILENAME: &'static str = "blindmatch.toml";

    /// Load configuration; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "[config] Looking for config");

        if !path.exists() {
            debug!("[config] No config found, using defaults");
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&contents).map_err(ConfigError::ParseError)?;
        info!(path = %path.display(), "[config] Loaded config");
        Ok(config)
    }

    /// Resolve a configured path against the config file's directory
    pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
        let candidate = PathBuf::from(value);
        if candidate.is_absolute() {
            return candidate;
        }
        config_path
            .parent()
            .map(|dir| dir.join(&candidate))
            .unwrap_or(candidate)
    }

    pub fn storage_path(&self, config_path: &Path) -> PathBuf {
        Self::resolve_path(config_path, &self.storage.path)
    }

    /// `None` when file logging is disabled
    pub fn log_file_path(&self, config_path: &Path) -> Option<PathBuf> {
        if self.logging.log_file.trim().is_empty() {
            return None;
        }
        Some(Self::resolve_path(config_path, &self.logging.log_file))
    }
}
