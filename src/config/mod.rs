//! Configuration management for docshift
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration file (TOML format, `~/.docshift/config.toml` by default)
//! - Environment variables (`DOCSHIFT_SOURCE_URI`, `DOCSHIFT_TARGET_URI`, ...)
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// URI schemes accepted for datasources
pub const MONGODB_SCHEMES: &[&str] = &["mongodb://", "mongodb+srv://"];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Migration run configuration
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Inventory configuration
    #[serde(default)]
    pub inventory: InventoryConfig,

    /// Display configuration
    #[serde(default)]
    pub display: DisplayConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connect timeout in seconds (applies to open + ping)
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Application name reported to the server
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Datasource used as source when none is given on the command line
    #[serde(default)]
    pub default_source: Option<String>,

    /// Datasource used as target when none is given on the command line
    #[serde(default)]
    pub default_target: Option<String>,

    /// Named datasources
    #[serde(default)]
    pub datasources: BTreeMap<String, DatasourceConfig>,
}

/// A named endpoint in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceConfig {
    /// Connection URI
    pub uri: String,

    /// Database name; falls back to the database in the URI path
    #[serde(default)]
    pub database: Option<String>,
}

/// Migration run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Per-call timeout in seconds for reads and bulk inserts
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout: u64,

    /// Show a progress bar across collections
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

/// Inventory configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Include `admin`, `local` and `config` when listing all databases
    #[serde(default)]
    pub include_system_databases: bool,
}

/// Display and output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Enable colored output
    #[serde(default = "default_color_output")]
    pub color_output: bool,

    /// Show execution time in summaries
    #[serde(default = "default_show_timing")]
    pub show_timing: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_timeout() -> u64 {
    30
}

fn default_app_name() -> String {
    "docshift".to_string()
}

fn default_operation_timeout() -> u64 {
    600
}

fn default_show_progress() -> bool {
    true
}

fn default_color_output() -> bool {
    true
}

fn default_show_timing() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            app_name: default_app_name(),
            default_source: None,
            default_target: None,
            datasources: BTreeMap::new(),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            operation_timeout: default_operation_timeout(),
            show_progress: default_show_progress(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color_output: default_color_output(),
            show_timing: default_show_timing(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Load configuration from a file, or defaults when no file exists
    ///
    /// An explicitly given path must exist; the default path is optional.
    ///
    /// # Arguments
    /// * `path` - Explicit config path, if any
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_config_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigError::FileNotFound(path.display().to_string()).into());
            }
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docshift")
            .join("config.toml")
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.connection.timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connection.timeout".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        if self.migration.operation_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "migration.operation_timeout".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        for (name, ds) in &self.connection.datasources {
            validate_uri(&format!("connection.datasources.{name}.uri"), &ds.uri)?;
        }

        for (field, name) in [
            ("connection.default_source", &self.connection.default_source),
            ("connection.default_target", &self.connection.default_target),
        ] {
            if let Some(name) = name {
                if !self.connection.datasources.contains_key(name) {
                    return Err(ConfigError::InvalidValue {
                        field: field.to_string(),
                        value: name.clone(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    /// Get connection timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.timeout)
    }

    /// Get per-call operation timeout as Duration
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.migration.operation_timeout)
    }
}

impl ConnectionConfig {
    /// Look up a named datasource
    pub fn get_datasource(&self, name: &str) -> Result<&DatasourceConfig> {
        self.datasources.get(name).ok_or_else(|| {
            ConfigError::UnknownDatasource {
                name: name.to_string(),
                available: self.list_datasources(),
            }
            .into()
        })
    }

    /// Names of all configured datasources, sorted
    pub fn list_datasources(&self) -> Vec<String> {
        self.datasources.keys().cloned().collect()
    }
}

/// Check that a URI is a MongoDB connection string
pub fn validate_uri(field: &str, uri: &str) -> Result<()> {
    validate_uri_scheme(field, uri, MONGODB_SCHEMES)
}

/// Check that a URI uses one of `schemes` and names a host after it
pub fn validate_uri_scheme(field: &str, uri: &str, schemes: &[&str]) -> Result<()> {
    if let Some(rest) = schemes.iter().find_map(|s| uri.strip_prefix(s)) {
        if !rest.is_empty() {
            return Ok(());
        }
    }
    Err(ConfigError::InvalidValue {
        field: field.to_string(),
        value: uri.to_string(),
    }
    .into())
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
