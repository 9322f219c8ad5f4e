//! TOML Configuration File Support
//!
//! Centralized configuration loading for the assistant client, supporting a
//! TOML configuration file at `~/.config/quickplan/assistant.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! The configuration file follows XDG Base Directory specification:
//! - `$XDG_CONFIG_HOME/quickplan/assistant.toml` (typically `~/.config/quickplan/assistant.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! base_url = "http://localhost:8080/"
//! user_id = "default_user_001"
//!
//! [timeouts]
//! connect_timeout_ms = 30000
//! read_timeout_secs = 300
//! request_timeout_secs = 30
//!
//! [chat]
//! fragment_chars = 256
//! conversation_title = "New chat"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::ApiTimeouts;
use crate::streaming::DEFAULT_FRAGMENT_CHARS;

/// Default assistant service location
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";

/// User the client acts for when nobody has signed in
pub const DEFAULT_USER_ID: &str = "default_user_001";

/// Title given to conversations created on first send
pub const DEFAULT_CONVERSATION_TITLE: &str = "New chat";

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
    /// Assistant service base URL
    pub base_url: Option<String>,

    /// User the client acts for
    pub user_id: Option<String>,
}

/// Timeouts section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsToml {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Longest silence while reading a reply, in seconds
    pub read_timeout_secs: Option<u64>,

    /// Total timeout for non-streaming calls, in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Chat section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Maximum characters per streamed fragment
    pub fragment_chars: Option<usize>,

    /// Title for conversations created on first send
    pub conversation_title: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantToml {
    /// Server configuration section
    pub server: ServerToml,

    /// Timeouts configuration section
    pub timeouts: TimeoutsToml,

    /// Chat configuration section
    pub chat: ChatToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the assistant client
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct AssistantConfig {
    /// Assistant service base URL
    pub base_url: String,

    /// User the client acts for
    pub user_id: String,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Longest silence while reading a reply
    pub read_timeout: Duration,

    /// Total timeout for non-streaming calls
    pub request_timeout: Duration,

    /// Maximum characters per streamed fragment
    pub fragment_chars: usize,

    /// Title for conversations created on first send
    pub conversation_title: String,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        let timeouts = ApiTimeouts::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            connect_timeout: timeouts.connect,
            read_timeout: timeouts.read,
            request_timeout: timeouts.request,
            fragment_chars: DEFAULT_FRAGMENT_CHARS,
            conversation_title: DEFAULT_CONVERSATION_TITLE.to_string(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl AssistantConfig {
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

    /// HTTP client timeouts
    #[must_use]
    pub fn timeouts(&self) -> ApiTimeouts {
        ApiTimeouts {
            connect: self.connect_timeout,
            read: self.read_timeout,
            request: self.request_timeout,
        }
    }

    /// Check values that would make the client unusable
    ///
    /// # Errors
    ///
    /// `ValidationError` naming the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "base_url must not be empty".to_string(),
            ));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "base_url must start with http:// or https://, got {base_url:?}"
            )));
        }
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "user_id must not be empty".to_string(),
            ));
        }
        if self.fragment_chars == 0 {
            return Err(ConfigError::ValidationError(
                "fragment_chars must be greater than zero".to_string(),
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
/// Returns `$XDG_CONFIG_HOME/quickplan/assistant.toml` or
/// `~/.config/quickplan/assistant.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("quickplan").join("assistant.toml"))
}

/// Load configuration from all sources with proper priority
///
/// Priority order (highest first):
/// 1. CLI arguments (not handled here - caller should apply after)
/// 2. Environment variables
/// 3. TOML configuration file
/// 4. Default values
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// merged values fail validation. A missing config file is not an error.
pub fn load_config() -> Result<AssistantConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// if the merged values fail validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<AssistantConfig, ConfigError> {
    let mut config = AssistantConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: AssistantToml = toml::from_str(&toml_content)?;
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

    apply_env_config(&mut config);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut AssistantConfig, toml: &AssistantToml) {
    if let Some(ref url) = toml.server.base_url {
        config.base_url.clone_from(url);
    }
    if let Some(ref user) = toml.server.user_id {
        config.user_id.clone_from(user);
    }

    if let Some(ms) = toml.timeouts.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(secs) = toml.timeouts.read_timeout_secs {
        config.read_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.timeouts.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }

    if let Some(chars) = toml.chat.fragment_chars {
        config.fragment_chars = chars;
    }
    if let Some(ref title) = toml.chat.conversation_title {
        config.conversation_title.clone_from(title);
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut AssistantConfig) {
    if let Ok(url) = std::env::var("QUICKPLAN_BASE_URL") {
        config.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Ok(user) = std::env::var("QUICKPLAN_USER_ID") {
        config.user_id = user;
        config.source = ConfigSource::Env;
    }
    if let Ok(timeout) = std::env::var("QUICKPLAN_CONNECT_TIMEOUT_MS") {
        if let Ok(ms) = timeout.parse::<u64>() {
            config.connect_timeout = Duration::from_millis(ms);
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(timeout) = std::env::var("QUICKPLAN_READ_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.read_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(timeout) = std::env::var("QUICKPLAN_REQUEST_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.request_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(chars) = std::env::var("QUICKPLAN_FRAGMENT_CHARS") {
        if let Ok(n) = chars.parse::<usize>() {
            config.fragment_chars = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(title) = std::env::var("QUICKPLAN_CONVERSATION_TITLE") {
        config.conversation_title = title;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides,
/// then call [`AssistantConfig::validate`] again.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,

    /// User override
    pub user_id: Option<String>,

    /// Read timeout override (seconds)
    pub read_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set user override
    #[must_use]
    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Set read timeout override
    #[must_use]
    pub fn with_read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = Some(secs);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut AssistantConfig) {
        if self.base_url.is_some() || self.user_id.is_some() || self.read_timeout_secs.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.base_url {
            config.base_url.clone_from(url);
        }
        if let Some(ref user) = self.user_id {
            config.user_id.clone_from(user);
        }
        if let Some(secs) = self.read_timeout_secs {
            config.read_timeout = Duration::from_secs(secs);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
