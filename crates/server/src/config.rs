//! Server configuration: bind address/port, device export filters, and log
//! level, loadable from and saveable to a TOML file.
//!
//! Structure and validation style follow the same default/load/save/validate
//! shape as the rest of this codebase's configuration handling, with an
//! XDG-aware default path.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default USB/IP TCP port.
pub const DEFAULT_PORT: u16 = 3240;

/// Errors raised while validating a loaded [`ServerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid log level '{level}', must be one of: {valid}")]
    InvalidLogLevel { level: String, valid: String },

    #[error("invalid bind_addr '{addr}': {source}")]
    InvalidBindAddr { addr: String, #[source] source: std::net::AddrParseError },

    #[error("invalid USB filter '{filter}': {source}")]
    InvalidFilter { filter: String, #[source] source: Box<ConfigError> },

    #[error("expected VID:PID (e.g. '0x1234:0x5678' or '0x1234:*'), got '{0}'")]
    MalformedFilterSyntax(String),

    #[error("{name} '{id}' must start with '0x'")]
    MissingHexPrefix { name: &'static str, id: String },

    #[error("{name} '{id}' hex part must be 1-4 digits")]
    InvalidHexLength { name: &'static str, id: String },

    #[error("{name} '{id}' is not a valid hex number")]
    InvalidHexDigits { name: &'static str, id: String, #[source] source: std::num::ParseIntError },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub usb: UsbSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub log_level: String,
    /// Run detached from the controlling terminal: fork, redirect standard
    /// streams, and drop the PID into `pid_file` if set.
    pub daemonize: bool,
    pub pid_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbSettings {
    /// VID:PID filters restricting which locally attached devices this
    /// server will export. Empty means "export everything".
    pub filters: Vec<String>,
}

/// Parsed form of `usb.filters`, used by the handshake module to decide
/// whether a device is exportable without re-parsing strings per lookup.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilters {
    entries: Vec<(Option<u16>, Option<u16>)>,
}

impl DeviceFilters {
    pub fn allows(&self, vendor_id: u16, product_id: u16) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        self.entries.iter().any(|(vid, pid)| {
            vid.is_none_or(|v| v == vendor_id) && pid.is_none_or(|p| p == product_id)
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
                log_level: "info".to_string(),
                daemonize: false,
                pid_file: None,
            },
            usb: UsbSettings { filters: Vec::new() },
        }
    }
}

impl ServerConfig {
    /// Load configuration from the specified path, or the first of the
    /// standard locations that exists.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = [Self::default_path(), PathBuf::from("/etc/usbip-stub/server.toml")];
            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("no configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read config file: {}", config_path.display()))?;

        let config: ServerConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or fall back to defaults, logging the reason.
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("failed to load config: {e}, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize configuration")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config directory: {}", parent.display()))?;
        }
        fs::write(path, content)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        tracing::info!("saved configuration to: {}", path.display());
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usbip-stub").join("server.toml")
        } else {
            PathBuf::from(".config/usbip-stub/server.toml")
        }
    }

    pub fn device_filters(&self) -> DeviceFilters {
        DeviceFilters {
            entries: self
                .usb
                .filters
                .iter()
                .filter_map(|f| Self::parse_filter(f).ok())
                .collect(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.server.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel {
                level: self.server.log_level.clone(),
                valid: valid_levels.join(", "),
            });
        }

        self.server
            .bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|source| ConfigError::InvalidBindAddr { addr: self.server.bind_addr.clone(), source })?;

        for filter in &self.usb.filters {
            Self::parse_filter(filter).map_err(|source| ConfigError::InvalidFilter {
                filter: filter.clone(),
                source: Box::new(source),
            })?;
        }

        Ok(())
    }

    /// Parse one `VID:PID` filter entry, where either half may be `*`.
    fn parse_filter(filter: &str) -> Result<(Option<u16>, Option<u16>), ConfigError> {
        let parts: Vec<&str> = filter.split(':').collect();
        if parts.len() != 2 {
            return Err(ConfigError::MalformedFilterSyntax(filter.to_string()));
        }
        let vid = Self::parse_hex_id(parts[0], "VID")?;
        let pid = Self::parse_hex_id(parts[1], "PID")?;
        Ok((vid, pid))
    }

    fn parse_hex_id(id: &str, name: &'static str) -> Result<Option<u16>, ConfigError> {
        if id == "*" {
            return Ok(None);
        }
        if !id.starts_with("0x") && !id.starts_with("0X") {
            return Err(ConfigError::MissingHexPrefix { name, id: id.to_string() });
        }
        let hex_part = &id[2..];
        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(ConfigError::InvalidHexLength { name, id: id.to_string() });
        }
        u16::from_str_radix(hex_part, 16)
            .map(Some)
            .map_err(|source| ConfigError::InvalidHexDigits { name, id: id.to_string(), source })
    }
}
