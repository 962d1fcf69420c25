use crate::telemetry::ServerConfig;
use serde::{Deserialize, Serialize};
use stats::Tags;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    /// Overrides the telemetry listener's default `host:port`.
    pub listen_addr: Option<String>,
    pub flush_interval_secs: u64,
    pub heartbeat_metric: String,
    pub heartbeat_tags: Tags,
    pub log_level: String,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            listen_addr: None,
            flush_interval_secs: 10,
            heartbeat_metric: "extension.heartbeat".to_string(),
            heartbeat_tags: Tags::new(),
            log_level: "info".to_string(),
        }
    }
}

impl ExtensionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(raw: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_toml_str(&raw, &display)
    }

    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    pub fn with_flush_interval_secs(mut self, secs: u64) -> Self {
        self.flush_interval_secs = secs;
        self
    }

    pub fn with_heartbeat_metric(mut self, metric: impl Into<String>) -> Self {
        self.heartbeat_metric = metric.into();
        self
    }

    pub fn with_heartbeat_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.heartbeat_tags.push(key, value);
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            custom_addr: self.listen_addr.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "Flush interval must be greater than 0".to_string(),
            });
        }

        if self.heartbeat_metric.is_empty() {
            return Err(ConfigError::Invalid {
                message: "Heartbeat metric name cannot be empty".to_string(),
            });
        }

        if let Some(addr) = &self.listen_addr {
            match addr.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
                _ => {
                    return Err(ConfigError::Invalid {
                        message: format!("Listen address must be host:port, got '{}'", addr),
                    })
                }
            }
        }

        Ok(())
    }
}
