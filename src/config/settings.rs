//! Application settings

use crate::core::device::{DeviceIdentity, DeviceRole};
use crate::core::transport::SerialConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No platform config directory
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// File could not be read or written
    #[error("Config file {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be rendered
    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Device identities
    pub devices: DevicesConfig,
    /// Serial line parameters
    pub serial: SerialConfig,
    /// Poll loop timing
    pub poll: PollConfig,
    /// Where completed records go
    pub sink: SinkConfig,
    /// Where alerts go
    pub notify: NotifyConfig,
    /// Application logging
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        super::config_dir()
            .map(|dir| dir.join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from `path`, or from the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
                path: config_path.clone(),
                source,
            })?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Save config to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, content).map_err(io_err)?;
        Ok(())
    }
}

/// USB identities of the two rig devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// USB-serial converter wired to the PLC's TX1/RX1
    pub controllino: DeviceIdentity,
    /// Current-logging microcontroller
    pub current_logger: DeviceIdentity,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            controllino: DeviceIdentity::new(1659, 8963),
            current_logger: DeviceIdentity::new(1027, 24577),
        }
    }
}

impl DevicesConfig {
    /// Identity configured for `role`
    pub fn identity(&self, role: DeviceRole) -> DeviceIdentity {
        match role {
            DeviceRole::Controllino => self.controllino,
            DeviceRole::CurrentLogger => self.current_logger,
        }
    }
}

/// Poll loop timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Cadence of the poll loop (milliseconds)
    pub interval_ms: u64,
    /// Pause after a failed poll cycle (milliseconds)
    pub fault_backoff_ms: u64,
    /// Upper bound of lines drained per device per poll
    pub max_lines_per_poll: usize,
    /// Pause after the startup port listing (milliseconds)
    pub startup_delay_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            fault_backoff_ms: 3000,
            max_lines_per_poll: 32,
            startup_delay_ms: 3000,
        }
    }
}

impl PollConfig {
    /// Poll cadence
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// Pause after a failed poll cycle
    pub fn fault_backoff(&self) -> Duration {
        Duration::from_millis(self.fault_backoff_ms)
    }

    /// Pause after startup listing
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

/// Upload sink selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkBackend {
    /// Local JSON-lines store
    File {
        /// Store path; defaults to the data directory
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// Realtime database REST endpoint
    RealtimeDb {
        /// Database base URL
        url: String,
        /// Collection path below the base URL
        #[serde(default = "default_collection")]
        path: String,
        /// Database auth token
        #[serde(default)]
        auth_token: Option<String>,
    },
    /// Discard records
    None,
}

fn default_collection() -> String {
    "logs".to_string()
}

/// Upload sink settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Sink implementation
    pub backend: SinkBackend,
    /// Upper bound for one upload (seconds)
    pub timeout_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            backend: SinkBackend::File { path: None },
            timeout_secs: 10,
        }
    }
}

/// Notifier selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierBackend {
    /// Write alerts to the application log only
    Log,
    /// POST alerts to a webhook
    Webhook {
        /// Webhook URL
        url: String,
    },
}

/// Notifier settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Notifier implementation
    pub backend: NotifierBackend,
    /// Upper bound for one delivery (seconds)
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            backend: NotifierBackend::Log,
            timeout_secs: 10,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    pub level: String,
    /// Emit JSON instead of human-readable lines
    pub json: bool,
    /// Also write a daily-rolling log file into this directory
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}
