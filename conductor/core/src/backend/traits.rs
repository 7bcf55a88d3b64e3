//! Provider Traits
//!
//! Trait definitions for LLM providers. This abstraction lets the conductor and
//! the Kleos pipeline drive Gemini, Groq, Ollama or an in-process GGUF model
//! without changing core logic.
//!
//! # Design Philosophy
//!
//! The [`Provider`] trait is a capability contract:
//! - Build a request from a canonical [`ChatRequest`] (system instruction,
//!   memory block, history, new message, in that order)
//! - Answer in one piece or as a stream of fragments
//! - Account for token usage exactly once per completed call
//!
//! Implementations handle vendor details (wire format, auth, sessions) and map
//! every failure onto [`ProviderError`] before it leaves the adapter.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::ProviderError;
use super::usage::UsageStats;
use crate::messages::Message;

/// Notice shown in place of a response the backend refused to produce
pub const BLOCKED_NOTICE: &str = "⚠️ The response was blocked for safety reasons.";

/// Stream events from providers
#[derive(Clone, Debug)]
pub enum StreamingToken {
    /// A fragment of the response
    Token(String),
    /// Response completed successfully
    Complete {
        /// The complete message (may differ from concatenated fragments)
        message: String,
        /// Usage of this call, already added to the session accumulator
        usage: UsageStats,
    },
    /// The stream failed; no further events follow
    Error(ProviderError),
}

/// Receiving half of a provider stream
///
/// Dropping it tells the producer to stop.
pub type TokenStream = mpsc::Receiver<StreamingToken>;

/// Canonical request passed to every provider
#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    /// The new user message
    pub message: String,
    /// Prior turns, oldest first
    pub history: Vec<Message>,
    /// System instruction (optional)
    pub system_prompt: Option<String>,
    /// Rendered memory lines (optional, wrapped by the adapter)
    pub memories: Option<String>,
}

impl ChatRequest {
    /// Create a request with just a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Set the conversation history
    #[must_use]
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// Set the system instruction
    #[must_use]
    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    /// Set the memory block; blank text is ignored
    #[must_use]
    pub fn with_memories(mut self, memories: Option<String>) -> Self {
        self.memories = memories.filter(|m| !m.trim().is_empty());
        self
    }

    /// System prompt if present and not blank
    #[must_use]
    pub fn system(&self) -> Option<&str> {
        self.system_prompt.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Response from a non-streaming call
#[derive(Clone, Debug)]
pub struct AiResponse {
    /// The response text
    pub content: String,
    /// Model that generated the response
    pub model: String,
    /// Usage of this call
    pub usage: UsageStats,
    /// Vendor finish reason, if reported
    pub finish_reason: Option<String>,
    /// Raw vendor payload, for diagnostics
    pub raw: Option<serde_json::Value>,
    /// Whether the backend refused to answer
    pub blocked: bool,
}

impl AiResponse {
    /// A normal response
    pub fn new(content: impl Into<String>, model: impl Into<String>, usage: UsageStats) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            usage,
            finish_reason: None,
            raw: None,
            blocked: false,
        }
    }

    /// A refused response, carried as data rather than as an error
    pub fn blocked(model: impl Into<String>, usage: UsageStats) -> Self {
        Self {
            content: BLOCKED_NOTICE.to_string(),
            finish_reason: Some("SAFETY".to_string()),
            blocked: true,
            ..Self::new("", model, usage)
        }
    }

    /// Set finish reason
    #[must_use]
    pub fn with_finish_reason(mut self, reason: Option<String>) -> Self {
        self.finish_reason = reason;
        self
    }

    /// Attach the raw vendor payload
    #[must_use]
    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// Display information about the current model
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelInfo {
    /// Model identifier
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// Provider id
    pub provider: String,
}

/// Provider trait
///
/// Implement this trait to add support for another LLM backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable id used for credential lookup and display (e.g. "GOOGLE")
    fn name(&self) -> &str;

    /// Models this provider offers
    ///
    /// Empty for providers whose models are discovered at runtime; any id is
    /// then accepted by [`Provider::set_model`].
    fn available_models(&self) -> Vec<String>;

    /// Current model id
    fn model(&self) -> &str;

    /// Switch model
    ///
    /// Returns false and leaves the model unchanged when the id is not
    /// offered. On success any cached backend session is dropped.
    fn set_model(&mut self, model: &str) -> bool;

    /// Whether the current model has a dedicated system-instruction channel
    fn supports_system_instruction(&self) -> bool {
        true
    }

    /// Display information about the current model
    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            id: self.model().to_string(),
            display_name: self.model().to_string(),
            provider: self.name().to_string(),
        }
    }

    /// Send a request and wait for the complete response
    async fn send_message(&mut self, request: &ChatRequest) -> Result<AiResponse, ProviderError>;

    /// Send a request and receive the response as a stream of fragments
    ///
    /// The stream is finite and not restartable. Usage is recorded once, when
    /// the call completes.
    async fn stream_message(&mut self, request: &ChatRequest)
        -> Result<TokenStream, ProviderError>;

    /// Cheapest round-trip proving the credential or resource works
    async fn validate_api_key(&self) -> bool;

    /// Accumulated usage since the last reset
    fn session_usage(&self) -> UsageStats;

    /// Zero the session accumulator
    fn reset_session_usage(&mut self);

    /// Drop any backend chat session; caller history is unaffected
    fn reset_chat(&mut self) {}

    /// Release local resources (loaded model weights)
    fn unload(&mut self) {}
}

/// Shared `set_model` rule: an empty catalogue accepts anything
#[must_use]
pub fn is_offered(available: &[String], model: &str) -> bool {
    available.is_empty() || available.iter().any(|m| m == model)
}
