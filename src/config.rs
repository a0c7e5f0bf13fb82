//! Configuration for the companion agent.

use crate::core::movement::MovementSettings;
use crate::error::{ConfigError, TunnelError};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Port the forwarded service listens on by default, on both ends.
pub const DEFAULT_PORT: u16 = 8080;

/// Display name used when none was chosen.
pub const DEFAULT_DAEMON_NAME: &str = "daemon";

const APP_DIR: &str = "companion-agent";

/// Main configuration for the companion agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Name the companion uses in its messages
    #[serde(default = "default_daemon_name")]
    pub daemon_name: String,

    /// Tunnel parameters, absent until the first successful setup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<TunnelConfig>,

    /// Movement thresholds
    #[serde(default)]
    pub movement: MovementSettings,

    /// Path for storing the journey log
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_name: default_daemon_name(),
            tunnel: None,
            movement: MovementSettings::default(),
            data_path: default_data_path(),
        }
    }
}

impl Config {
    /// Path of the persisted journey log.
    pub fn journal_path(&self) -> PathBuf {
        self.data_path.join("journey.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }
}

fn default_daemon_name() -> String {
    DEFAULT_DAEMON_NAME.to_string()
}

fn default_data_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Connection parameters captured by setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Remote host, e.g. `user@10.0.0.2`
    pub host: String,

    /// SSH identity file; empty means "use the client default"
    #[serde(
        default,
        deserialize_with = "empty_path_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub identity_file_path: Option<PathBuf>,

    /// Port of the service on the remote host
    #[serde(default = "default_port")]
    pub remote_port: u16,

    /// Port bound on this device
    #[serde(default = "default_port")]
    pub local_port: u16,
}

impl TunnelConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            identity_file_path: None,
            remote_port: DEFAULT_PORT,
            local_port: DEFAULT_PORT,
        }
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.identity_file_path = if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        };
        self
    }

    pub fn with_remote_port(mut self, port: u16) -> Self {
        self.remote_port = port;
        self
    }

    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    /// Reject configs that cannot describe a tunnel.
    pub fn validate(&self) -> Result<(), TunnelError> {
        if self.host.trim().is_empty() {
            return Err(TunnelError::InvalidConfig("host is empty".to_string()));
        }
        if self.remote_port == 0 || self.local_port == 0 {
            return Err(TunnelError::InvalidConfig("port 0 is not forwardable".to_string()));
        }
        Ok(())
    }
}

fn empty_path_as_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()).map(PathBuf::from))
}

/// Reads and writes `Config` as JSON at a fixed path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform config location.
    pub fn default_location() -> Self {
        Self::new(
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("config.json"),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config, falling back to defaults when nothing is stored.
    pub fn load(&self) -> Result<Config, ConfigError> {
        if !self.path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Write the config, replacing the previous file atomically.
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Validate and store tunnel parameters, keeping everything else.
    ///
    /// An invalid submission leaves the stored config untouched.
    pub fn save_tunnel(&self, tunnel: TunnelConfig) -> Result<Config, ConfigError> {
        tunnel
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        let mut config = self.load()?;
        config.tunnel = Some(tunnel);
        self.save(&config)?;
        Ok(config)
    }

    /// Store a new display name.
    pub fn save_daemon_name(&self, name: &str) -> Result<Config, ConfigError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidConfig("name is empty".to_string()));
        }

        let mut config = self.load()?;
        config.daemon_name = name.to_string();
        self.save(&config)?;
        Ok(config)
    }
}
