//! Configuration system for the game host channel
//!
//! Only `[connection]` is mandatory. Retry, timeout and SDK metadata
//! sections fall back to the control plane's documented defaults.

use crate::channel::backoff::BackoffPolicy;
use crate::channel::connector::ConnectorSettings;
use crate::channel::params::ConnectionParameters;
use crate::channel::{ChannelSettings, DisconnectSettings, ReadyGateSettings, RetrySettings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main channel configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    pub connection: ConnectionSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
    #[serde(default)]
    pub sdk: SdkSection,
}

/// Identity of this process and where the control plane lives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSection {
    /// Websocket endpoint (`ws://` or `wss://`)
    pub endpoint: String,
    pub process_id: String,
    pub host_id: String,
    pub fleet_id: String,
    /// Environment variable holding the auth token
    pub auth_token_env: Option<String>,
}

/// Retry orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    /// Retries after the first attempt (default: 7, so 8 attempts total)
    #[serde(default = "default_max_connect_retries")]
    pub max_connect_retries: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u32,
    /// Exponent used for the first delay (default: 2, so 4 seconds)
    #[serde(default = "default_initial_power")]
    pub initial_power: u32,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_connect_retries: default_max_connect_retries(),
            backoff_base: default_backoff_base(),
            initial_power: default_initial_power(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

/// Timeouts and polling budgets, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutSection {
    #[serde(default = "default_socket_connect_timeout_ms")]
    pub socket_connect_timeout_ms: u64,
    /// How long a failed attempt waits for the close callback's reason
    #[serde(default = "default_close_signal_timeout_ms")]
    pub close_signal_timeout_ms: u64,
    /// How long closing a socket waits for the close frame to be written
    #[serde(default = "default_close_frame_timeout_ms")]
    pub close_frame_timeout_ms: u64,
    #[serde(default = "default_ready_poll_interval_ms")]
    pub ready_poll_interval_ms: u64,
    #[serde(default = "default_ready_max_polls")]
    pub ready_max_polls: u32,
    #[serde(default = "default_disconnect_wait_retries")]
    pub disconnect_wait_retries: u32,
    #[serde(default = "default_disconnect_wait_interval_ms")]
    pub disconnect_wait_interval_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            socket_connect_timeout_ms: default_socket_connect_timeout_ms(),
            close_signal_timeout_ms: default_close_signal_timeout_ms(),
            close_frame_timeout_ms: default_close_frame_timeout_ms(),
            ready_poll_interval_ms: default_ready_poll_interval_ms(),
            ready_max_polls: default_ready_max_polls(),
            disconnect_wait_retries: default_disconnect_wait_retries(),
            disconnect_wait_interval_ms: default_disconnect_wait_interval_ms(),
        }
    }
}

/// Protocol metadata sent on every handshake
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SdkSection {
    #[serde(default = "default_sdk_version")]
    pub version: String,
    #[serde(default = "default_sdk_language")]
    pub language: String,
}

impl Default for SdkSection {
    fn default() -> Self {
        Self {
            version: default_sdk_version(),
            language: default_sdk_language(),
        }
    }
}

fn default_max_connect_retries() -> u32 {
    7
}

fn default_backoff_base() -> u32 {
    2
}

fn default_initial_power() -> u32 {
    2
}

fn default_max_delay_secs() -> u64 {
    32
}

fn default_socket_connect_timeout_ms() -> u64 {
    2000
}

fn default_close_signal_timeout_ms() -> u64 {
    1000
}

fn default_close_frame_timeout_ms() -> u64 {
    1000
}

fn default_ready_poll_interval_ms() -> u64 {
    2000
}

fn default_ready_max_polls() -> u32 {
    155
}

fn default_disconnect_wait_retries() -> u32 {
    5
}

fn default_disconnect_wait_interval_ms() -> u64 {
    200
}

fn default_sdk_version() -> String {
    "5.1.2".to_string()
}

fn default_sdk_language() -> String {
    "Rust".to_string()
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ChannelConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ChannelConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field formats and non-zero budgets
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint(&self.connection.endpoint)?;

        for (name, value) in [
            ("process_id", &self.connection.process_id),
            ("host_id", &self.connection.host_id),
            ("fleet_id", &self.connection.fleet_id),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "connection.{name} must not be empty"
                )));
            }
        }

        if self.retry.backoff_base == 0 {
            return Err(ConfigError::InvalidConfig(
                "retry.backoff_base must be greater than 0".to_string(),
            ));
        }
        if self.timeouts.socket_connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "timeouts.socket_connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.timeouts.ready_poll_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "timeouts.ready_poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the auth token from its environment variable, if one is named
    pub fn auth_token(&self) -> Result<String, ConfigError> {
        match &self.connection.auth_token_env {
            Some(name) => {
                std::env::var(name).map_err(|_| ConfigError::EnvVarNotFound(name.clone()))
            }
            None => Ok(String::new()),
        }
    }

    /// Build the parameters for a `Channel::connect` call
    pub fn connection_parameters(&self) -> Result<ConnectionParameters, ConfigError> {
        Ok(ConnectionParameters {
            endpoint: self.connection.endpoint.clone(),
            process_id: self.connection.process_id.clone(),
            host_id: self.connection.host_id.clone(),
            fleet_id: self.connection.fleet_id.clone(),
            auth_token: self.auth_token()?,
        })
    }

    /// Runtime settings for the channel core
    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            retry: RetrySettings {
                max_connect_retries: self.retry.max_connect_retries,
                backoff: BackoffPolicy::new(
                    self.retry.backoff_base,
                    self.retry.initial_power,
                    Duration::from_secs(self.retry.max_delay_secs),
                ),
            },
            ready: ReadyGateSettings {
                poll_interval: Duration::from_millis(self.timeouts.ready_poll_interval_ms),
                max_polls: self.timeouts.ready_max_polls,
            },
            disconnect: DisconnectSettings {
                wait_retries: self.timeouts.disconnect_wait_retries,
                wait_interval: Duration::from_millis(self.timeouts.disconnect_wait_interval_ms),
            },
        }
    }

    /// Runtime settings for a single connection attempt
    pub fn connector_settings(&self) -> ConnectorSettings {
        ConnectorSettings {
            connect_timeout: Duration::from_millis(self.timeouts.socket_connect_timeout_ms),
            close_signal_timeout: Duration::from_millis(self.timeouts.close_signal_timeout_ms),
            sdk: self.sdk.clone(),
        }
    }

    /// Bound on writing the close frame when a websocket is shut down
    pub fn close_frame_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.close_frame_timeout_ms)
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let url = Url::parse(endpoint)
        .map_err(|e| ConfigError::InvalidConfig(format!("invalid endpoint {endpoint}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ConfigError::InvalidConfig(format!(
            "endpoint scheme must be ws or wss, got {other}"
        ))),
    }
}
