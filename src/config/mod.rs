//! Configuration module for the exporter gateway.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (bind address, port)
//! - Output selection (Prometheus endpoint, Telegraf socket, PushGateway)
//! - Poll period and logging
//! - Monitored sources (flag-file path per schema name)
//! - Relay fleet membership

mod app;
mod validation;

pub use app::{
    AppConfig, LoggingConfig, OutputsConfig, PollConfig, ServerConfig, DEFAULT_POLL_PERIOD,
};
pub use validation::{expand_env_vars, ConfigError};
