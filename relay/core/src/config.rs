//! TOML Configuration File Support
//!
//! Configuration for the relay daemon, read from
//! `$XDG_CONFIG_HOME/prompt-hub/relay.toml` when present.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 5555
//!
//! [relay]
//! heartbeat_on_start = true
//! keepalive_interval_secs = 15
//! demo_token_delay_ms = 150
//! channel_capacity = 64
//!
//! [registry]
//! run_ttl_secs = 600
//! sweep_interval_secs = 60
//!
//! [lmstudio]
//! base_url = "http://localhost:8000"
//! connect_timeout_ms = 5000
//!
//! [openai]
//! api_key = "sk-..."
//! base_url = "https://api.openai.com"
//! models = ["gpt-4o-mini"]
//! connect_timeout_ms = 5000
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{LmStudioConfig, OpenAiConfig};
use crate::registry::DEFAULT_RUN_TTL;
use crate::relay::RelaySettings;

/// Default listen address
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 5555;

/// Default interval between registry sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

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

/// Where the highest-priority configuration value came from
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

/// `[server]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Listen address
    pub host: Option<String>,
    /// Listen port
    pub port: Option<u16>,
}

/// `[relay]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayToml {
    /// Send a heartbeat frame as soon as streaming starts
    pub heartbeat_on_start: Option<bool>,
    /// Idle keep-alive interval in seconds
    pub keepalive_interval_secs: Option<u64>,
    /// Delay between demo tokens in milliseconds
    pub demo_token_delay_ms: Option<u64>,
    /// Frame channel capacity per session
    pub channel_capacity: Option<usize>,
}

/// `[registry]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryToml {
    /// Lifetime of unclaimed runs in seconds
    pub run_ttl_secs: Option<u64>,
    /// Interval between expiry sweeps in seconds
    pub sweep_interval_secs: Option<u64>,
}

/// `[lmstudio]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LmStudioToml {
    /// Server base URL
    pub base_url: Option<String>,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// `[openai]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiToml {
    /// API key
    pub api_key: Option<String>,
    /// API base URL
    pub base_url: Option<String>,
    /// Models offered for discovery
    pub models: Option<Vec<String>>,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigToml {
    /// Listener section
    pub server: ServerToml,
    /// Relay section
    pub relay: RelayToml,
    /// Registry section
    pub registry: RegistryToml,
    /// LM Studio section
    pub lmstudio: LmStudioToml,
    /// OpenAI section
    pub openai: OpenAiToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved relay daemon configuration
///
/// Use [`load_config`] to load it with priority handling, then apply
/// [`ConfigOverrides`] and call [`RelayConfig::validate`].
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Listen address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Per-session relay behaviour
    pub relay: RelaySettings,

    /// Lifetime of unclaimed runs
    pub run_ttl: Duration,

    /// Interval between registry expiry sweeps
    pub sweep_interval: Duration,

    /// LM Studio connection
    pub lmstudio: LmStudioConfig,

    /// OpenAI connection; an empty key disables the provider
    pub openai: OpenAiConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            relay: RelaySettings::default(),
            run_ttl: DEFAULT_RUN_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            lmstudio: LmStudioConfig::default(),
            openai: OpenAiConfig::new(""),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl RelayConfig {
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

    /// `host:port` to bind the HTTP listener to
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject values the daemon cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ValidationError("port must not be 0".into()));
        }
        if self.relay.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "relay.channel_capacity must be at least 1".into(),
            ));
        }
        if self.run_ttl < Duration::from_secs(1) {
            return Err(ConfigError::ValidationError(
                "registry.run_ttl_secs must be at least 1".into(),
            ));
        }
        if self.sweep_interval < Duration::from_secs(1) {
            return Err(ConfigError::ValidationError(
                "registry.sweep_interval_secs must be at least 1".into(),
            ));
        }
        if self.relay.keepalive_interval < Duration::from_secs(1) {
            return Err(ConfigError::ValidationError(
                "relay.keepalive_interval_secs must be at least 1".into(),
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
/// Returns `$XDG_CONFIG_HOME/prompt-hub/relay.toml` or
/// `~/.config/prompt-hub/relay.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("prompt-hub").join("relay.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<RelayConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<RelayConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration, reading environment variables through `env`
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<RelayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = RelayConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ConfigToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut RelayConfig, toml: &ConfigToml) {
    // Listener
    if let Some(ref host) = toml.server.host {
        config.host.clone_from(host);
    }
    if let Some(port) = toml.server.port {
        config.port = port;
    }

    // Relay sessions
    if let Some(enabled) = toml.relay.heartbeat_on_start {
        config.relay.heartbeat_on_start = enabled;
    }
    if let Some(secs) = toml.relay.keepalive_interval_secs {
        config.relay.keepalive_interval = Duration::from_secs(secs);
    }
    if let Some(ms) = toml.relay.demo_token_delay_ms {
        config.relay.demo_token_delay = Duration::from_millis(ms);
    }
    if let Some(capacity) = toml.relay.channel_capacity {
        config.relay.channel_capacity = capacity;
    }

    // Registry
    if let Some(secs) = toml.registry.run_ttl_secs {
        config.run_ttl = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.registry.sweep_interval_secs {
        config.sweep_interval = Duration::from_secs(secs);
    }

    // LM Studio
    if let Some(ref base_url) = toml.lmstudio.base_url {
        config.lmstudio.base_url.clone_from(base_url);
    }
    if let Some(ms) = toml.lmstudio.connect_timeout_ms {
        config.lmstudio.connect_timeout = Duration::from_millis(ms);
    }

    // OpenAI
    if let Some(ref key) = toml.openai.api_key {
        config.openai.api_key.clone_from(key);
    }
    if let Some(ref base_url) = toml.openai.base_url {
        config.openai.base_url.clone_from(base_url);
    }
    if let Some(ref models) = toml.openai.models {
        config.openai.models.clone_from(models);
    }
    if let Some(ms) = toml.openai.connect_timeout_ms {
        config.openai.connect_timeout = Duration::from_millis(ms);
    }
}

/// Parse a numeric environment value, warning about garbage
fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key, value, "Ignoring unparseable environment value");
    }
    parsed
}

/// Split a comma-separated list, dropping blank entries
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut RelayConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    // Listener
    if let Some(host) = env("RELAY_HOST") {
        config.host = host;
        config.source = ConfigSource::Env;
    }
    if let Some(port) = env("PORT").and_then(|v| parse_env::<u16>("PORT", &v)) {
        config.port = port;
        config.source = ConfigSource::Env;
    }

    // Relay sessions
    if let Some(secs) =
        env("RELAY_KEEPALIVE_SECS").and_then(|v| parse_env::<u64>("RELAY_KEEPALIVE_SECS", &v))
    {
        config.relay.keepalive_interval = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) =
        env("RELAY_DEMO_DELAY_MS").and_then(|v| parse_env::<u64>("RELAY_DEMO_DELAY_MS", &v))
    {
        config.relay.demo_token_delay = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }

    // Registry
    if let Some(secs) =
        env("RELAY_RUN_TTL_SECS").and_then(|v| parse_env::<u64>("RELAY_RUN_TTL_SECS", &v))
    {
        config.run_ttl = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }

    // Providers
    if let Some(base_url) = env("LMSTUDIO_BASE") {
        config.lmstudio.base_url = base_url;
        config.source = ConfigSource::Env;
    }
    if let Some(key) = env("OPENAI_API_KEY") {
        config.openai.api_key = key;
        config.source = ConfigSource::Env;
    }
    if let Some(base_url) = env("OPENAI_BASE") {
        config.openai.base_url = base_url;
        config.source = ConfigSource::Env;
    }
    if let Some(models) = env("OPENAI_MODELS") {
        config.openai.models = split_list(&models);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Listen address override
    pub host: Option<String>,

    /// Listen port override
    pub port: Option<u16>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set listen address override
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set listen port override
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut RelayConfig) {
        if self.host.is_some() || self.port.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref host) = self.host {
            config.host.clone_from(host);
        }

        if let Some(port) = self.port {
            config.port = port;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
