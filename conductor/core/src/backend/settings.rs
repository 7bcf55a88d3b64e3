//! Provider construction settings
//!
//! Plain values derived from the configuration file; adapters never read the
//! environment themselves except through [`OllamaSettings::from_env`].

use std::path::PathBuf;

/// Sampling parameters shared by every adapter
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationSettings {
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling threshold
    pub top_p: f32,
    /// Maximum tokens in a response
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            max_output_tokens: 8192,
        }
    }
}

/// Ollama server location
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OllamaSettings {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 11434,
        }
    }
}

impl OllamaSettings {
    /// Create Ollama settings
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Read `OLLAMA_HOST` / `OLLAMA_PORT`, falling back to defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = std::env::var("OLLAMA_HOST").unwrap_or(defaults.host);
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);
        Self { host, port }
    }

    /// Base URL of the server
    #[must_use]
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            self.host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

/// In-process GGUF inference parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalSettings {
    /// Directory scanned for `.gguf` files
    pub models_dir: PathBuf,
    /// Context window in tokens
    pub context_size: u32,
    /// Maximum tokens in a response
    pub max_output_tokens: u32,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            context_size: 8192,
            max_output_tokens: 2048,
        }
    }
}

/// Everything the provider factory needs besides id, credential and model
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProviderSettings {
    /// Sampling parameters
    pub generation: GenerationSettings,
    /// Ollama server
    pub ollama: OllamaSettings,
    /// Local GGUF inference
    pub local: LocalSettings,
}
