//! LLM Provider Integration
//!
//! This module provides abstracted access to LLM backends through the common
//! [`Provider`] trait.
//!
//! # Available Providers
//!
//! - **Gemini** (`GOOGLE`): Google Generative Language API, stateful chat session
//! - **Groq** (`groq`): OpenAI-compatible cloud API, stateless
//! - **Ollama** (`LOCAL`): local LLM server
//! - **Local GGUF** (`LOCAL`): in-process inference, lazily loaded
//!
//! # Usage
//!
//! ```ignore
//! use mark_core::backend::{create_provider, ChatRequest, ProviderSettings};
//!
//! let mut provider = create_provider("groq", Some(&key), "", &ProviderSettings::default())?;
//! let rx = provider.stream_message(&ChatRequest::new("Hello!")).await?;
//! ```

mod error;
mod factory;
mod gemini;
mod groq;
#[cfg(feature = "llama")]
mod llama;
mod local;
mod ollama;
mod prompt;
mod settings;
mod sse;
mod traits;
mod usage;

pub use error::{extract_error_message, ProviderError};
pub use factory::{create_provider, ProviderKind};
pub use gemini::{GeminiProvider, GEMINI_DEFAULT_MODEL, GEMINI_MODELS, GEMINI_PROVIDER_ID};
pub use groq::{GroqProvider, GROQ_DEFAULT_MODEL, GROQ_MODELS, GROQ_PROVIDER_ID};
#[cfg(feature = "llama")]
pub use llama::LlamaLoader;
pub use local::{
    default_loader, discover_gguf_models, GenerationStats, LoadedModel, LocalGgufProvider,
    ModelLoader, UnavailableLoader, LOCAL_GGUF_PROVIDER_ID,
};
pub use ollama::{OllamaModel, OllamaProvider, OLLAMA_PROVIDER_ID};
pub use prompt::{chat_messages, fold_system, wrap_memories, ChatMessage, MemoryFraming};
pub use settings::{GenerationSettings, LocalSettings, OllamaSettings, ProviderSettings};
pub use traits::{
    is_offered, AiResponse, ChatRequest, ModelInfo, Provider, StreamingToken, TokenStream,
    BLOCKED_NOTICE,
};
pub use usage::{SessionUsage, UsageStats};

use std::time::Duration;

/// HTTP client shared by the adapters
///
/// Only the connect phase has a timeout; long generations stream for as long
/// as the backend keeps producing.
fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default()
}
