//! Configuration management for Y-Share.
//!
//! This module handles loading, saving, and managing Y-Share configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/yshare/config.toml` |
//! | macOS | `~/Library/Application Support/com.yshare.Y-Share/config.toml` |
//! | Windows | `%APPDATA%\yshare\Y-Share\config\config.toml` |
//!
//! ## Environment Overrides
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `PORT` | `server.port` |
//! | `YSHARE_STORAGE_URL` | `storage.base_url` (switches the backend to `http`) |
//! | `YSHARE_STORAGE_TOKEN` | `storage.token` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use yshare_core::config::Config;
//!
//! let config = Config::load()?.with_env_overrides()?;
//! println!("Listening on port {}", config.server.port);
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::delivery::ArchiveOptions;
use crate::error::{Error, Result};
use crate::registry::RegistryConfig;

/// Main configuration struct for Y-Share.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Share session settings
    pub session: SessionConfig,
    /// Download settings
    pub delivery: DeliveryConfig,
    /// Remote storage settings
    pub storage: StorageConfig,
}

/// HTTP server configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind to localhost only
    pub localhost_only: bool,
    /// Largest accepted upload request, in bytes
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            localhost_only: false,
            max_upload_size: crate::DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

impl ServerConfig {
    /// Get the bind address for the server.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        if self.localhost_only {
            SocketAddr::from(([127, 0, 0, 1], self.port))
        } else {
            SocketAddr::from(([0, 0, 0, 0], self.port))
        }
    }
}

/// Share session configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a code stays valid
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Random draws before code generation reports exhaustion
    pub max_code_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(crate::DEFAULT_SESSION_TTL_SECS),
            max_code_attempts: crate::DEFAULT_MAX_CODE_ATTEMPTS,
        }
    }
}

impl From<&SessionConfig> for RegistryConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            ttl: config.ttl,
            max_code_attempts: config.max_code_attempts,
        }
    }
}

/// Download configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Deflate level for multi-file archives (0-9)
    pub compression_level: i64,
    /// Archive chunks buffered ahead of a slow receiver
    pub channel_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        let defaults = ArchiveOptions::default();
        Self {
            compression_level: defaults.compression_level,
            channel_capacity: defaults.channel_capacity,
        }
    }
}

impl From<&DeliveryConfig> for ArchiveOptions {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            compression_level: config.compression_level,
            channel_capacity: config.channel_capacity,
        }
    }
}

/// Which blob store holds uploaded files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Keep uploads in process memory
    #[default]
    Memory,
    /// Plain HTTP `PUT`/`GET` endpoint
    Http,
}

/// Remote storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend
    pub backend: StorageBackend,
    /// Root URL for the http backend
    pub base_url: Option<String>,
    /// Bearer token for the http backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Key prefix for uploaded objects
    pub folder: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            base_url: None,
            token: None,
            folder: crate::DEFAULT_STORAGE_FOLDER.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// Creates the configuration directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Apply `PORT`, `YSHARE_STORAGE_URL` and `YSHARE_STORAGE_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` is not a valid port number.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(port) = var("PORT") {
            self.server.port = port.trim().parse().map_err(|_| Error::InvalidConfig {
                key: "PORT".into(),
                reason: format!("'{port}' is not a port number"),
            })?;
        }
        if let Some(url) = var("YSHARE_STORAGE_URL") {
            self.storage.backend = StorageBackend::Http;
            self.storage.base_url = Some(url);
        }
        if let Some(token) = var("YSHARE_STORAGE_TOKEN") {
            self.storage.token = Some(token);
        }
        Ok(self)
    }

    /// Check values that would only fail later at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.session.ttl.is_zero() {
            return Err(Error::InvalidConfig {
                key: "session.ttl".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.session.ttl > Duration::from_secs(crate::MAX_SESSION_TTL_SECS) {
            return Err(Error::InvalidConfig {
                key: "session.ttl".into(),
                reason: format!(
                    "must be at most {}h",
                    crate::MAX_SESSION_TTL_SECS / 3600
                ),
            });
        }
        if self.session.max_code_attempts == 0 {
            return Err(Error::InvalidConfig {
                key: "session.max_code_attempts".into(),
                reason: "must be at least 1".into(),
            });
        }
        if !(0..=9).contains(&self.delivery.compression_level) {
            return Err(Error::InvalidConfig {
                key: "delivery.compression_level".into(),
                reason: format!("{} is outside 0-9", self.delivery.compression_level),
            });
        }
        if self.storage.backend == StorageBackend::Http && self.storage.base_url.is_none() {
            return Err(Error::InvalidConfig {
                key: "storage.base_url".into(),
                reason: "required for the http backend".into(),
            });
        }
        Ok(())
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "yshare", "Y-Share")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let secs = duration.as_secs();
        if secs % 60 == 0 && secs > 0 {
            serializer.serialize_str(&format!("{}m", secs / 60))
        } else {
            serializer.serialize_str(&format!("{secs}s"))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.strip_suffix('s')
            .map(|secs| {
                secs.parse()
                    .map(Duration::from_secs)
                    .map_err(serde::de::Error::custom)
            })
            .or_else(|| {
                s.strip_suffix('m').map(|mins| {
                    mins.parse::<u64>()
                        .map_err(<D::Error as serde::de::Error>::custom)?
                        .checked_mul(60)
                        .map(Duration::from_secs)
                        .ok_or_else(|| serde::de::Error::custom("duration is too large"))
                })
            })
            .unwrap_or_else(|| Err(serde::de::Error::custom("invalid duration format")))
    }
}
