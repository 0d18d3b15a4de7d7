//! TOML Configuration File Support
//!
//! Client configuration loaded from `~/.config/realtime-chat/client.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller)
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [transport]
//! endpoint = "wss://chat.example.com/ws/chat"
//! connect_timeout_ms = 5000
//! write_timeout_ms = 10000
//! reconnect_delay_ms = 2000
//! reconnect_max_delay_ms = 30000
//! reconnect_backoff_factor = 2     # 1 = fixed delay
//! reconnect_max_attempts = 0        # 0 = keep trying
//! outbound_capacity = 50
//! overflow_policy = "drop_newest"
//!
//! [client]
//! title_reveal_interval_ms = 50
//! response_mode = "text_stream"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::ResponseMode;
use crate::title_reveal::DEFAULT_REVEAL_INTERVAL;
use crate::transport::config::env_parse;
use crate::transport::{OverflowPolicy, TransportConfig};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Transport section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// WebSocket endpoint (`ws://` or `wss://`)
    pub endpoint: Option<String>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Frame write timeout in milliseconds
    pub write_timeout_ms: Option<u64>,

    /// Delay before reconnecting in milliseconds
    pub reconnect_delay_ms: Option<u64>,

    /// Backoff ceiling in milliseconds
    pub reconnect_max_delay_ms: Option<u64>,

    /// Backoff multiplier (1 = fixed delay)
    pub reconnect_backoff_factor: Option<u32>,

    /// Attempts before giving up (0 = unlimited)
    pub reconnect_max_attempts: Option<u32>,

    /// Outbound buffer size
    pub outbound_capacity: Option<usize>,

    /// Overflow policy for the outbound buffer
    pub overflow_policy: Option<OverflowPolicy>,
}

/// Client section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Delay between revealed title characters in milliseconds
    pub title_reveal_interval_ms: Option<u64>,

    /// Response mode requested from the server
    pub response_mode: Option<ResponseMode>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// Transport configuration section
    pub transport: TransportToml,

    /// Client configuration section
    pub client: ClientToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Transport configuration
    pub transport: TransportConfig,

    /// Delay between revealed title characters (zero = instant)
    pub title_reveal_interval: Duration,

    /// Response mode requested from the server
    pub response_mode: ResponseMode,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            title_reveal_interval: DEFAULT_REVEAL_INTERVAL,
            response_mode: ResponseMode::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Reject values the client cannot run with
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = url::Url::parse(&self.transport.endpoint).map_err(|e| {
            ConfigError::ValidationError(format!("endpoint '{}': {e}", self.transport.endpoint))
        })?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(ConfigError::ValidationError(format!(
                "endpoint must use ws or wss, got '{}'",
                endpoint.scheme()
            )));
        }
        if self.transport.outbound_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "outbound_capacity must be at least 1".to_string(),
            ));
        }
        if self.transport.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.transport.write_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "write_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/realtime-chat/client.toml` or
/// `~/.config/realtime-chat/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("realtime-chat").join("client.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then apply the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    let mut config = load_file_config(path.as_deref())?;
    apply_env_config(&mut config);
    Ok(config)
}

/// Defaults overlaid with the file at `path`, if it exists
fn load_file_config(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    let Some(config_path) = path else {
        return Ok(config);
    };

    if !config_path.exists() {
        tracing::debug!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return Ok(config);
    }

    let toml_content =
        std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
            path: config_path.to_path_buf(),
            source: e,
        })?;

    let toml_config: ClientConfigToml = toml::from_str(&toml_content)?;
    apply_toml_config(&mut config, &toml_config);
    config.config_file_path = Some(config_path.to_path_buf());
    config.source = ConfigSource::File;

    tracing::info!(
        path = %config_path.display(),
        "Loaded configuration from file"
    );

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientConfigToml) {
    let transport = &toml.transport;
    if let Some(endpoint) = &transport.endpoint {
        config.transport.endpoint.clone_from(endpoint);
    }
    if let Some(timeout) = transport.connect_timeout_ms {
        config.transport.connect_timeout_ms = timeout;
    }
    if let Some(timeout) = transport.write_timeout_ms {
        config.transport.write_timeout_ms = timeout;
    }
    if let Some(delay) = transport.reconnect_delay_ms {
        config.transport.reconnect.delay_ms = delay;
    }
    if let Some(delay) = transport.reconnect_max_delay_ms {
        config.transport.reconnect.max_delay_ms = delay;
    }
    if let Some(factor) = transport.reconnect_backoff_factor {
        config.transport.reconnect.backoff_factor = factor;
    }
    if let Some(attempts) = transport.reconnect_max_attempts {
        config.transport.reconnect.max_attempts = (attempts > 0).then_some(attempts);
    }
    if let Some(capacity) = transport.outbound_capacity {
        config.transport.outbound_capacity = capacity;
    }
    if let Some(policy) = transport.overflow_policy {
        config.transport.overflow_policy = policy;
    }

    if let Some(ms) = toml.client.title_reveal_interval_ms {
        config.title_reveal_interval = Duration::from_millis(ms);
    }
    if let Some(mode) = toml.client.response_mode {
        config.response_mode = mode;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut ClientConfig) {
    if config.transport.apply_env() {
        config.source = ConfigSource::Env;
    }

    if let Some(ms) = env_parse::<u64>("CHAT_TITLE_REVEAL_MS") {
        config.title_reveal_interval = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
}
