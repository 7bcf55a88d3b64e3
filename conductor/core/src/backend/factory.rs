//! Provider factory keyed on the provider id

use super::error::ProviderError;
use super::gemini::{GeminiProvider, GEMINI_DEFAULT_MODEL};
use super::groq::{GroqProvider, GROQ_DEFAULT_MODEL};
use super::local::LocalGgufProvider;
use super::ollama::OllamaProvider;
use super::settings::ProviderSettings;
use super::traits::Provider;

/// Known provider kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Google Gemini / Gemma
    Gemini,
    /// Groq cloud
    Groq,
    /// Ollama server
    Ollama,
    /// In-process GGUF file
    LocalGguf,
}

impl ProviderKind {
    /// Every kind, in menu order
    pub const ALL: [Self; 4] = [Self::Gemini, Self::Groq, Self::Ollama, Self::LocalGguf];

    /// Parse a provider id, case-insensitively
    ///
    /// Unknown ids fall back to Gemini.
    #[must_use]
    pub fn parse(id: &str) -> Self {
        match id.trim().to_ascii_lowercase().as_str() {
            "groq" => Self::Groq,
            "local" | "ollama" => Self::Ollama,
            "gguf" | "local-gguf" | "local_gguf" => Self::LocalGguf,
            _ => Self::Gemini,
        }
    }

    /// Id stored in configuration
    #[must_use]
    pub fn config_id(self) -> &'static str {
        match self {
            Self::Gemini => "GOOGLE",
            Self::Groq => "groq",
            Self::Ollama => "LOCAL",
            Self::LocalGguf => "gguf",
        }
    }

    /// Human-readable label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Gemini => "Google Gemini",
            Self::Groq => "Groq",
            Self::Ollama => "Ollama (local server)",
            Self::LocalGguf => "Local GGUF file",
        }
    }

    /// Whether a credential is needed
    #[must_use]
    pub fn needs_credential(self) -> bool {
        matches!(self, Self::Gemini | Self::Groq)
    }

    /// Model used when none is configured
    #[must_use]
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => GEMINI_DEFAULT_MODEL,
            Self::Groq => GROQ_DEFAULT_MODEL,
            Self::Ollama => "llama3.2",
            Self::LocalGguf => "",
        }
    }
}

/// Build a provider
///
/// An empty `model` selects the kind's default. Unknown catalogue models fall
/// back to the default as well.
///
/// # Errors
///
/// Returns `InvalidCredential` when a cloud provider has no credential.
pub fn create_provider(
    id: &str,
    credential: Option<&str>,
    model: &str,
    settings: &ProviderSettings,
) -> Result<Box<dyn Provider>, ProviderError> {
    let kind = ProviderKind::parse(id);
    let model = if model.trim().is_empty() {
        kind.default_model()
    } else {
        model
    };
    let credential = credential.map(str::trim).filter(|c| !c.is_empty());

    let mut provider: Box<dyn Provider> = match kind {
        ProviderKind::Gemini => Box::new(
            GeminiProvider::new(require(kind, credential)?, kind.default_model())
                .with_generation(settings.generation.clone()),
        ),
        ProviderKind::Groq => Box::new(
            GroqProvider::new(require(kind, credential)?, kind.default_model())
                .with_generation(settings.generation.clone()),
        ),
        ProviderKind::Ollama => Box::new(
            OllamaProvider::new(settings.ollama.clone(), model)
                .with_generation(settings.generation.clone()),
        ),
        ProviderKind::LocalGguf => {
            return Ok(Box::new(LocalGgufProvider::new(
                model,
                settings.local.clone(),
            )))
        }
    };

    if !provider.set_model(model) {
        tracing::warn!(
            provider = kind.config_id(),
            model,
            "Unknown model, keeping default"
        );
    }
    tracing::info!(provider = provider.name(), model = provider.model(), "Provider created");
    Ok(provider)
}

fn require(kind: ProviderKind, credential: Option<&str>) -> Result<&str, ProviderError> {
    credential.ok_or_else(|| ProviderError::InvalidCredential {
        provider: kind.config_id().to_string(),
    })
}
