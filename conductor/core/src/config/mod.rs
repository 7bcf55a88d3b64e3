//! MARK Settings
//!
//! One TOML file holds every user setting, stored at `$MARK_HOME/config.toml`
//! (`~/.mark/config.toml` when `MARK_HOME` is not set).
//!
//! # Layering
//!
//! Later layers win:
//! 1. built-in defaults
//! 2. the TOML file
//! 3. `MARK_*` / `OLLAMA_*` environment variables
//! 4. command-line flags, applied by the caller through [`ConfigOverrides`]
//!
//! The file is also written back: `/model`,
//! `/theme`, `/changeusr` and `/toggle-stats` persist their changes with
//! [`save_config`].
//!
//! # File Layout
//!
//! ```toml
//! [general]
//! default_provider = "GOOGLE"
//! default_model = "gemini-2.5-flash"
//! language = "en"
//! user_name = "User"
//! theme = "red"
//! show_stats = true
//!
//! [conversation]
//! max_context_messages = 20
//! auto_save = true
//! memory_window = 20
//!
//! [streaming]
//! refresh_interval_ms = 16
//! pacing_ms = 1
//!
//! [kleos]
//! max_refinements = 10
//!
//! [ollama]
//! host = "localhost"
//! port = 11434
//!
//! [local]
//! models_dir = "~/.mark/models"
//! context_size = 8192
//! ```

mod prompts;

pub use prompts::{system_prompt, DATE_FORMAT, TIME_FORMAT};

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{LocalSettings, OllamaSettings, ProviderSettings, GEMINI_DEFAULT_MODEL};
use crate::kleos::KleosConfig;
use crate::streaming::OrchestratorConfig;

/// Environment variable naming the data directory
pub const MARK_HOME_ENV: &str = "MARK_HOME";

/// Themes understood by the terminal surface
pub const THEMES: [&str; 8] = [
    "red",
    "hl3",
    "matrix",
    "cyberpunk",
    "synthwave",
    "dracula",
    "nord",
    "monokai",
];

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading or saving configuration
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

    /// Failed to write config file
    #[error("Failed to write config file at {path}: {source}")]
    WriteError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("Failed to serialize TOML config: {0}")]
    SerializeError(#[from] toml::ser::Error),

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

/// General section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralToml {
    /// Provider id (`GOOGLE`, `groq`, `LOCAL`, `gguf`)
    pub default_provider: Option<String>,

    /// Model id for that provider
    pub default_model: Option<String>,

    /// Language code for the system prompt
    pub language: Option<String>,

    /// How the assistant addresses the user
    pub user_name: Option<String>,

    /// Color theme
    pub theme: Option<String>,

    /// Show the statistics line after each response
    pub show_stats: Option<bool>,
}

/// Conversation section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationToml {
    /// Turns kept in the conversation context (0 = unlimited)
    pub max_context_messages: Option<usize>,

    /// Persist exchanges to the conversation log
    pub auto_save: Option<bool>,

    /// Recent memories sent with each request
    pub memory_window: Option<usize>,
}

/// Streaming section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingToml {
    /// Display refresh interval in milliseconds
    pub refresh_interval_ms: Option<u64>,

    /// Pause after each fragment in milliseconds
    pub pacing_ms: Option<u64>,
}

/// Kleos section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KleosToml {
    /// Modification rounds allowed before the pipeline gives up
    pub max_refinements: Option<usize>,
}

/// Ollama section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaToml {
    /// Server host (a full URL is accepted too)
    pub host: Option<String>,

    /// Server port
    pub port: Option<u16>,
}

/// Local inference section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalToml {
    /// Directory holding `.gguf` files (`~` is expanded)
    pub models_dir: Option<String>,

    /// Context window in tokens
    pub context_size: Option<u32>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkToml {
    /// General section
    pub general: GeneralToml,

    /// Conversation section
    pub conversation: ConversationToml,

    /// Streaming section
    pub streaming: StreamingToml,

    /// Kleos section
    pub kleos: KleosToml,

    /// Ollama section
    pub ollama: OllamaToml,

    /// Local inference section
    pub local: LocalToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved MARK configuration
///
/// Use [`load_config`] to load it with proper priority handling.
#[derive(Clone, Debug)]
pub struct MarkConfig {
    /// Provider id
    pub default_provider: String,

    /// Model id
    pub default_model: String,

    /// Language code for the system prompt
    pub language: String,

    /// User name
    pub user_name: String,

    /// Color theme
    pub theme: String,

    /// Show the statistics line after each response
    pub show_stats: bool,

    /// Turns kept in the conversation context
    pub max_context_messages: usize,

    /// Persist exchanges
    pub auto_save: bool,

    /// Recent memories sent with each request
    pub memory_window: usize,

    /// Display refresh interval
    pub refresh_interval: Duration,

    /// Pause after each fragment
    pub pacing: Duration,

    /// Kleos modification rounds
    pub max_refinements: usize,

    /// Ollama server
    pub ollama: OllamaSettings,

    /// Local GGUF inference
    pub local: LocalSettings,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for MarkConfig {
    fn default() -> Self {
        Self {
            default_provider: "GOOGLE".to_string(),
            default_model: GEMINI_DEFAULT_MODEL.to_string(),
            language: "en".to_string(),
            user_name: "User".to_string(),
            theme: "red".to_string(),
            show_stats: true,
            max_context_messages: 20,
            auto_save: true,
            memory_window: 20,
            refresh_interval: Duration::from_millis(16),
            pacing: Duration::from_millis(1),
            max_refinements: 10,
            ollama: OllamaSettings::default(),
            local: LocalSettings {
                models_dir: mark_home().join("models"),
                ..LocalSettings::default()
            },
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl MarkConfig {
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

    /// Settings for the provider factory
    #[must_use]
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            ollama: self.ollama.clone(),
            local: self.local.clone(),
            ..ProviderSettings::default()
        }
    }

    /// Settings for the stream orchestrator
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            refresh_interval: self.refresh_interval,
            pacing: self.pacing,
            ..OrchestratorConfig::default()
        }
    }

    /// Settings for the Kleos pipeline
    #[must_use]
    pub fn kleos_config(&self) -> KleosConfig {
        KleosConfig {
            max_refinements: self.max_refinements,
            memory_window: self.memory_window,
            auto_save: self.auto_save,
        }
    }

    /// Check that values are usable
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a zero refresh interval or an unknown
    /// theme.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "streaming.refresh_interval_ms must be greater than 0".to_string(),
            ));
        }
        if !THEMES.contains(&self.theme.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown theme '{}' (available: {})",
                self.theme,
                THEMES.join(", ")
            )));
        }
        Ok(())
    }

    fn to_toml(&self) -> MarkToml {
        MarkToml {
            general: GeneralToml {
                default_provider: Some(self.default_provider.clone()),
                default_model: Some(self.default_model.clone()),
                language: Some(self.language.clone()),
                user_name: Some(self.user_name.clone()),
                theme: Some(self.theme.clone()),
                show_stats: Some(self.show_stats),
            },
            conversation: ConversationToml {
                max_context_messages: Some(self.max_context_messages),
                auto_save: Some(self.auto_save),
                memory_window: Some(self.memory_window),
            },
            streaming: StreamingToml {
                refresh_interval_ms: u64::try_from(self.refresh_interval.as_millis()).ok(),
                pacing_ms: u64::try_from(self.pacing.as_millis()).ok(),
            },
            kleos: KleosToml {
                max_refinements: Some(self.max_refinements),
            },
            ollama: OllamaToml {
                host: Some(self.ollama.host.clone()),
                port: Some(self.ollama.port),
            },
            local: LocalToml {
                models_dir: Some(self.local.models_dir.display().to_string()),
                context_size: Some(self.local.context_size),
            },
        }
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// MARK data directory
///
/// Returns `$MARK_HOME` when set, otherwise `~/.mark`.
#[must_use]
pub fn mark_home() -> PathBuf {
    match std::env::var_os(MARK_HOME_ENV) {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mark"),
    }
}

/// Get the default configuration file path
#[must_use]
pub fn default_config_path() -> PathBuf {
    mark_home().join("config.toml")
}

/// Load the settings from the default path
///
/// # Errors
///
/// Fails when the file exists but is unreadable or malformed; a missing file
/// just yields the defaults.
pub fn load_config() -> Result<MarkConfig, ConfigError> {
    load_config_from_path(Some(default_config_path()))
}

/// Load the settings from `path`
///
/// With `None` only defaults and the environment apply.
///
/// # Errors
///
/// Fails when the file exists but is unreadable or malformed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<MarkConfig, ConfigError> {
    // Start with defaults
    let mut config = MarkConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: MarkToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
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
        // Remembered even when missing so that the first save creates it
        config.config_file_path = Some(config_path.clone());
    }

    // Apply environment variables (overrides file values)
    apply_env_config(&mut config);

    Ok(config)
}

/// Write the configuration back to its file
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns `ValidationError` when the configuration has no file path, or a
/// serialize / write error.
pub fn save_config(config: &MarkConfig) -> Result<(), ConfigError> {
    let path = config
        .config_file_path
        .as_deref()
        .ok_or_else(|| ConfigError::ValidationError("no configuration file path".to_string()))?;
    save_config_to(config, path)
}

fn save_config_to(config: &MarkConfig, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(&config.to_toml())?;
    let write_error = |source: std::io::Error| ConfigError::WriteError {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }
    std::fs::write(path, content).map_err(write_error)?;
    tracing::debug!(path = %path.display(), "Saved configuration");
    Ok(())
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut MarkConfig, toml: &MarkToml) {
    // General settings
    if let Some(ref provider) = toml.general.default_provider {
        config.default_provider = provider.clone();
    }
    if let Some(ref model) = toml.general.default_model {
        config.default_model = model.clone();
    }
    if let Some(ref language) = toml.general.language {
        config.language = language.clone();
    }
    if let Some(ref name) = toml.general.user_name {
        config.user_name = name.clone();
    }
    if let Some(ref theme) = toml.general.theme {
        config.theme = theme.to_lowercase();
    }
    if let Some(show) = toml.general.show_stats {
        config.show_stats = show;
    }

    // Conversation settings
    if let Some(max) = toml.conversation.max_context_messages {
        config.max_context_messages = max;
    }
    if let Some(save) = toml.conversation.auto_save {
        config.auto_save = save;
    }
    if let Some(window) = toml.conversation.memory_window {
        config.memory_window = window;
    }

    // Streaming settings
    if let Some(ms) = toml.streaming.refresh_interval_ms {
        config.refresh_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.streaming.pacing_ms {
        config.pacing = Duration::from_millis(ms);
    }

    if let Some(max) = toml.kleos.max_refinements {
        config.max_refinements = max;
    }

    // Backend settings
    if let Some(ref host) = toml.ollama.host {
        config.ollama.host = host.clone();
    }
    if let Some(port) = toml.ollama.port {
        config.ollama.port = port;
    }
    if let Some(ref dir) = toml.local.models_dir {
        config.local.models_dir = expand_home(dir);
    }
    if let Some(size) = toml.local.context_size {
        config.local.context_size = size;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut MarkConfig) {
    if let Ok(provider) = std::env::var("MARK_PROVIDER") {
        config.default_provider = provider;
        config.source = ConfigSource::Env;
    }
    if let Ok(model) = std::env::var("MARK_MODEL") {
        config.default_model = model;
        config.source = ConfigSource::Env;
    }
    if let Ok(language) = std::env::var("MARK_LANGUAGE") {
        config.language = language;
        config.source = ConfigSource::Env;
    }
    if let Ok(name) = std::env::var("MARK_USER_NAME") {
        config.user_name = name;
        config.source = ConfigSource::Env;
    }

    // Ollama settings from environment
    if let Ok(host) = std::env::var("OLLAMA_HOST") {
        config.ollama.host = host;
        config.source = ConfigSource::Env;
    }
    if let Ok(port) = std::env::var("OLLAMA_PORT") {
        if let Ok(p) = port.parse::<u16>() {
            config.ollama.port = p;
            config.source = ConfigSource::Env;
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map_or_else(|| PathBuf::from(path), |h| h.join(rest)),
        None => PathBuf::from(path),
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
    /// Provider override
    pub provider: Option<String>,

    /// Model override
    pub model: Option<String>,

    /// Language override
    pub language: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set provider override
    #[must_use]
    pub fn with_provider(mut self, provider: String) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Set language override
    #[must_use]
    pub fn with_language(mut self, language: String) -> Self {
        self.language = Some(language);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut MarkConfig) {
        if self.provider.is_some() || self.model.is_some() || self.language.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref provider) = self.provider {
            config.default_provider = provider.clone();
        }
        if let Some(ref model) = self.model {
            config.default_model = model.clone();
        }
        if let Some(ref language) = self.language {
            config.language = language.clone();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
