//! Configuration management for Shelf.
//!
//! Configuration is read from `~/.config/shelf/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

pub const DEFAULT_CONCURRENCY: usize = 5;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
}

/// Download queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum downloads running at once (default: 5)
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Remote content source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the content API
    pub base_url: String,

    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,

    /// User agent string to use
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/".to_string(),
            timeout_secs: 30,
            user_agent: format!("shelf/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Local storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database path (default: `<data dir>/shelf/shelf.db`)
    pub db_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        Self::load_from(config_path)
    }

    pub fn load_from(config_path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path,
            source: e,
        })?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.remote.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.remote.base_url.clone(),
            source: e,
        })?;
        Ok(())
    }

    /// Get the default config file path: `~/.config/shelf/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("shelf").join("config.toml"))
    }

    /// Concurrency limit, never below one.
    pub fn concurrency(&self) -> usize {
        self.queue.concurrency.max(1)
    }

    fn create_default_config(path: &PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> String {
        r##"# Shelf Configuration

[queue]
# Maximum number of downloads running at the same time
concurrency = 5

[remote]
# Base URL of the content API. Collections are read from
# {base_url}/collections/{id} and items from
# {base_url}/collections/{id}/items/{number}
base_url = "http://localhost:8080/"

# Request timeout in seconds
timeout_secs = 30

[storage]
# Database path. Defaults to the platform data directory.
# db_path = "/home/me/.local/share/shelf/shelf.db"
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid remote base_url {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
}
