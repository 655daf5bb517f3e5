//! Application configuration structures.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::relay::RelayIdentity;
use crate::schema::SchemaTable;

use super::validation::{expand_env_vars, ConfigError};

// =============================================================================
// Constants
// =============================================================================

/// Default poll period (60 seconds).
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(60);

fn default_job_name() -> String {
    "p2p".to_string()
}

fn default_log_filename() -> String {
    "stdout".to_string()
}

fn default_log_directory() -> String {
    "logs".to_string()
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 9105).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 9105,
        }
    }
}

// =============================================================================
// Output Configuration
// =============================================================================

/// Which metric backends to feed, and where they live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputsConfig {
    /// Serve a Prometheus pull endpoint (default: true).
    pub prometheus: bool,

    /// Push line protocol to a Telegraf socket (default: false).
    pub telegraf: bool,

    /// Telegraf socket address, `tcp://host:port`.
    pub telegraf_addr: String,

    /// Push registry snapshots to a PushGateway (default: false).
    pub push_gateway: bool,

    /// PushGateway base URL, e.g. `http://127.0.0.1:9091`.
    pub push_gateway_addr: String,

    /// Grouping job name for PushGateway pushes (default: "p2p").
    pub job_name: String,

    /// Optional grouping instance label for PushGateway pushes.
    pub instance: Option<String>,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            prometheus: true,
            telegraf: false,
            telegraf_addr: "tcp://127.0.0.1:8094".to_string(),
            push_gateway: false,
            push_gateway_addr: "http://127.0.0.1:9091".to_string(),
            job_name: default_job_name(),
            instance: None,
        }
    }
}

impl OutputsConfig {
    /// The Telegraf `host:port` target, with the `tcp://` scheme stripped.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if the address is not of the
    /// form `tcp://host:port`.
    pub fn telegraf_target(&self) -> Result<String, ConfigError> {
        match self.telegraf_addr.split_once("://") {
            Some(("tcp", target)) if !target.is_empty() => Ok(target.to_string()),
            _ => Err(ConfigError::ValidationError(format!(
                "invalid telegraf_addr '{}': expected tcp://host:port",
                self.telegraf_addr
            ))),
        }
    }
}

// =============================================================================
// Poll / Logging Configuration
// =============================================================================

/// Poll loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Period between poll cycles (default: 60s).
    #[serde(with = "humantime_serde")]
    pub period: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_POLL_PERIOD,
        }
    }
}

/// Log output configuration.
///
/// `filename: stdout` logs to the console; any other value selects a daily
/// rotated file of that name under `directory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filename: String,
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filename: default_log_filename(),
            directory: default_log_directory(),
        }
    }
}

impl LoggingConfig {
    /// True when logs go to the console instead of a rotated file.
    pub fn is_stdout(&self) -> bool {
        self.filename == "stdout"
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Metrics endpoint settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Output backend selection.
    #[serde(default)]
    pub outputs: OutputsConfig,

    /// Poll loop settings.
    #[serde(default)]
    pub poll: PollConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Monitored sources: schema name → flag-file path.
    pub sources: BTreeMap<String, PathBuf>,

    /// Expected relay fleet, as `<ip>|<id>` entries.
    #[serde(default)]
    pub relay_fleet: Vec<String>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// Environment variables (`${VAR}` / `${VAR:-default}`) are expanded in
    /// the raw file before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&expand_env_vars(&content))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.poll.period.is_zero() {
            return Err(ConfigError::ValidationError(
                "poll period must be non-zero".to_string(),
            ));
        }

        if !self.outputs.prometheus && !self.outputs.telegraf && !self.outputs.push_gateway {
            return Err(ConfigError::ValidationError(
                "at least one output must be enabled".to_string(),
            ));
        }

        if self.outputs.telegraf {
            self.outputs.telegraf_target()?;
        }

        if self.outputs.push_gateway {
            if !self.outputs.push_gateway_addr.starts_with("http://")
                && !self.outputs.push_gateway_addr.starts_with("https://")
            {
                return Err(ConfigError::ValidationError(format!(
                    "invalid push_gateway_addr '{}': expected an http(s) URL",
                    self.outputs.push_gateway_addr
                )));
            }
            if self.outputs.job_name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "job_name cannot be empty".to_string(),
                ));
            }
        }

        if self.sources.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one source must be configured".to_string(),
            ));
        }
        for name in self.sources.keys() {
            SchemaTable::get(name)
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }

        for entry in &self.relay_fleet {
            entry
                .parse::<RelayIdentity>()
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }

        Ok(())
    }

    /// Parsed relay fleet membership.
    ///
    /// Callers should validate first; entries that fail to parse are skipped
    /// here.
    pub fn relay_identities(&self) -> Vec<RelayIdentity> {
        self.relay_fleet
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}
