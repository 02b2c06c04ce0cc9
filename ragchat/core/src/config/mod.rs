//! TOML Configuration File Support
//!
//! Centralized configuration loading for the client, supporting a TOML file
//! at `~/.config/ragchat/client.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/ragchat/client.toml` (typically `~/.config/ragchat/client.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! base_url = "http://rag.internal:8000"
//! connect_timeout_ms = 5000
//! request_timeout_secs = 300
//!
//! [session]
//! default_domains = ["legal", "finance"]
//! stream_buffer = 256
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::messages::DomainId;

/// Environment variable for the server base URL
pub const ENV_BASE_URL: &str = "RAGCHAT_BASE_URL";
/// Environment variable for the connect timeout (milliseconds)
pub const ENV_CONNECT_TIMEOUT: &str = "RAGCHAT_CONNECT_TIMEOUT";
/// Environment variable for the non-streaming request timeout (seconds)
pub const ENV_REQUEST_TIMEOUT: &str = "RAGCHAT_REQUEST_TIMEOUT";
/// Environment variable for the initial domain selection (comma separated)
pub const ENV_DOMAINS: &str = "RAGCHAT_DOMAINS";
/// Environment variable for the per-stream event buffer
pub const ENV_STREAM_BUFFER: &str = "RAGCHAT_STREAM_BUFFER";

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

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Base URL of the RAG service
    pub base_url: Option<String>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Whole-request timeout for non-streaming calls, in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Session section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Domains selected when a session starts
    pub default_domains: Option<Vec<String>>,

    /// Events buffered per stream before the pump waits on the session
    pub stream_buffer: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Server configuration section
    pub server: ServerToml,

    /// Session configuration section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved client configuration
///
/// Use [`load_config`] to load it with proper priority handling.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the RAG service
    pub base_url: String,

    /// Connect timeout, applied to every request
    pub connect_timeout: Duration,

    /// Whole-request timeout, applied to non-streaming requests only
    pub request_timeout: Duration,

    /// Domains selected when a session starts
    pub default_domains: Vec<DomainId>,

    /// Events buffered per stream
    pub stream_buffer: usize,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            default_domains: Vec::new(),
            stream_buffer: 100,
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

    /// Check values that would only fail later, at request time
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a base URL that is not an
    /// absolute http(s) URL or a zero stream buffer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            ConfigError::ValidationError(format!("base_url '{}': {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "base_url '{}' must use http or https",
                self.base_url
            )));
        }
        if self.stream_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "stream_buffer must be at least 1".to_string(),
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
/// Returns `$XDG_CONFIG_HOME/ragchat/client.toml` or
/// `~/.config/ragchat/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ragchat").join("client.toml"))
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

/// Load configuration from a specific path, then the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration using `lookup` in place of the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, lookup: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
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

    apply_env_config(&mut config, lookup);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    if let Some(ref url) = toml.server.base_url {
        config.base_url = url.clone();
    }
    if let Some(ms) = toml.server.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(secs) = toml.server.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }

    if let Some(ref domains) = toml.session.default_domains {
        config.default_domains = domains
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .map(DomainId::from)
            .collect();
    }
    if let Some(buffer) = toml.session.stream_buffer {
        config.stream_buffer = buffer;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ClientConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_BASE_URL) {
        config.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = lookup(ENV_CONNECT_TIMEOUT) {
        if let Ok(ms) = timeout.parse::<u64>() {
            config.connect_timeout = Duration::from_millis(ms);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(timeout) = lookup(ENV_REQUEST_TIMEOUT) {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.request_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(domains) = lookup(ENV_DOMAINS) {
        config.default_domains = parse_domain_list(&domains);
        config.source = ConfigSource::Env;
    }
    if let Some(buffer) = lookup(ENV_STREAM_BUFFER) {
        if let Ok(n) = buffer.parse::<usize>() {
            config.stream_buffer = n;
            config.source = ConfigSource::Env;
        }
    }
}

/// Split a comma separated domain list, dropping blanks and duplicates
#[must_use]
pub fn parse_domain_list(raw: &str) -> Vec<DomainId> {
    let mut domains: Vec<DomainId> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id = DomainId::from(name);
        if !domains.contains(&id) {
            domains.push(id);
        }
    }
    domains
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,

    /// Connect timeout override (milliseconds)
    pub connect_timeout_ms: Option<u64>,

    /// Domain selection override
    pub domains: Option<Vec<DomainId>>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set connect timeout override
    #[must_use]
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = Some(ms);
        self
    }

    /// Set domain selection override
    #[must_use]
    pub fn with_domains(mut self, domains: Vec<DomainId>) -> Self {
        self.domains = Some(domains);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.base_url.is_some() || self.connect_timeout_ms.is_some() || self.domains.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.base_url {
            config.base_url = url.clone();
        }

        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }

        if let Some(ref domains) = self.domains {
            config.default_domains = domains.clone();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
