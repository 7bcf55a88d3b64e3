//! Local GGUF Provider
//!
//! In-process inference over a `.gguf` file. The model is loaded lazily on the
//! first call and kept until [`Provider::unload`] or a model switch.
//!
//! Inference itself sits behind the [`ModelLoader`] / [`LoadedModel`] seam.
//! With the `llama` feature the default loader drives llama.cpp; without it
//! the loader reports the backend as unavailable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::error::ProviderError;
use super::prompt::{chat_messages, ChatMessage};
use super::settings::LocalSettings;
use super::traits::{AiResponse, ChatRequest, ModelInfo, Provider, StreamingToken, TokenStream};
use super::usage::{SessionUsage, UsageStats};

/// Provider id
pub const LOCAL_GGUF_PROVIDER_ID: &str = "LOCAL";

/// Token counts of one generation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenerationStats {
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Generated tokens
    pub completion_tokens: u64,
}

/// A model resident in memory
pub trait LoadedModel: Send {
    /// Generate a reply, calling `on_piece` for each text piece
    ///
    /// `on_piece` returns false to stop early.
    ///
    /// # Errors
    ///
    /// Returns an error when tokenization or decoding fails.
    fn generate(
        &mut self,
        messages: &[ChatMessage],
        max_tokens: u32,
        on_piece: &mut dyn FnMut(&str) -> bool,
    ) -> Result<GenerationStats, ProviderError>;
}

/// Loads model files; blocking, called off the async runtime
pub trait ModelLoader: Send + Sync {
    /// Load the model at `path`
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` when the file cannot be loaded.
    fn load(
        &self,
        path: &Path,
        settings: &LocalSettings,
    ) -> Result<Box<dyn LoadedModel>, ProviderError>;
}

/// Loader used when no inference engine is compiled in
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableLoader;

impl ModelLoader for UnavailableLoader {
    fn load(
        &self,
        _path: &Path,
        _settings: &LocalSettings,
    ) -> Result<Box<dyn LoadedModel>, ProviderError> {
        Err(ProviderError::unavailable(
            LOCAL_GGUF_PROVIDER_ID,
            "this build has no local inference engine (enable the `llama` feature)",
        ))
    }
}

/// The loader matching the enabled cargo features
#[must_use]
pub fn default_loader() -> Arc<dyn ModelLoader> {
    #[cfg(feature = "llama")]
    {
        Arc::new(super::llama::LlamaLoader)
    }
    #[cfg(not(feature = "llama"))]
    {
        Arc::new(UnavailableLoader)
    }
}

/// Find `.gguf` files in a directory, sorted by name
#[must_use]
pub fn discover_gguf_models(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut models: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("gguf"))
        })
        .collect();
    models.sort();
    models
}

type ModelSlot = Arc<Mutex<Option<Box<dyn LoadedModel>>>>;

/// Local GGUF provider
pub struct LocalGgufProvider {
    model_path: PathBuf,
    settings: LocalSettings,
    loader: Arc<dyn ModelLoader>,
    loaded: ModelSlot,
    usage: SessionUsage,
    model_id: String,
}

impl LocalGgufProvider {
    /// Create a provider for the file at `model_path` (nothing is loaded yet)
    pub fn new(model_path: impl Into<PathBuf>, settings: LocalSettings) -> Self {
        Self::with_loader(model_path, settings, default_loader())
    }

    /// Create a provider with a specific loader
    pub fn with_loader(
        model_path: impl Into<PathBuf>,
        settings: LocalSettings,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        let model_path = model_path.into();
        Self {
            model_id: model_path.display().to_string(),
            model_path,
            settings,
            loader,
            loaded: Arc::new(Mutex::new(None)),
            usage: SessionUsage::new(),
        }
    }

    /// Whether weights are currently resident
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.lock().is_some()
    }

    /// Load the model if needed
    async fn ensure_loaded(&self) -> Result<(), ProviderError> {
        if self.is_loaded() {
            return Ok(());
        }
        if !self.model_path.is_file() {
            return Err(ProviderError::unavailable(
                LOCAL_GGUF_PROVIDER_ID,
                format!("model file not found: {}", self.model_path.display()),
            ));
        }

        tracing::info!(path = %self.model_path.display(), "Loading GGUF model");
        let loader = Arc::clone(&self.loader);
        let path = self.model_path.clone();
        let settings = self.settings.clone();
        let model = tokio::task::spawn_blocking(move || loader.load(&path, &settings))
            .await
            .map_err(|e| ProviderError::Unknown(format!("Model loader panicked: {e}")))??;
        *self.loaded.lock() = Some(model);
        Ok(())
    }
}

#[async_trait]
impl Provider for LocalGgufProvider {
    fn name(&self) -> &str {
        LOCAL_GGUF_PROVIDER_ID
    }

    fn available_models(&self) -> Vec<String> {
        Vec::new()
    }

    fn model(&self) -> &str {
        &self.model_id
    }

    fn set_model(&mut self, model: &str) -> bool {
        let path = PathBuf::from(model);
        if !path.is_file() {
            tracing::warn!(model, "GGUF file does not exist");
            return false;
        }
        self.unload();
        self.model_id = path.display().to_string();
        self.model_path = path;
        true
    }

    fn model_info(&self) -> ModelInfo {
        let display_name = self
            .model_path
            .file_name()
            .map_or_else(|| self.model_id.clone(), |n| n.to_string_lossy().to_string());
        ModelInfo {
            id: self.model_id.clone(),
            display_name,
            provider: LOCAL_GGUF_PROVIDER_ID.to_string(),
        }
    }

    async fn send_message(&mut self, request: &ChatRequest) -> Result<AiResponse, ProviderError> {
        let mut stream = self.stream_message(request).await?;
        let mut content = String::new();
        while let Some(event) = stream.recv().await {
            match event {
                StreamingToken::Token(piece) => content.push_str(&piece),
                StreamingToken::Complete { usage, .. } => {
                    return Ok(AiResponse::new(content, self.model_id.clone(), usage));
                }
                StreamingToken::Error(e) => return Err(e),
            }
        }
        Err(ProviderError::Unknown(
            "local generation ended unexpectedly".to_string(),
        ))
    }

    async fn stream_message(
        &mut self,
        request: &ChatRequest,
    ) -> Result<TokenStream, ProviderError> {
        self.ensure_loaded().await?;

        let (tx, rx) = mpsc::channel(100);
        let messages = chat_messages(request, true);
        let max_tokens = self.settings.max_output_tokens;
        let slot = Arc::clone(&self.loaded);
        let usage = self.usage.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot.lock();
            let Some(model) = guard.as_mut() else {
                let _ = tx.blocking_send(StreamingToken::Error(ProviderError::unavailable(
                    LOCAL_GGUF_PROVIDER_ID,
                    "model was unloaded",
                )));
                return;
            };

            let mut full_response = String::new();
            let mut consumer_gone = false;
            let result = model.generate(&messages, max_tokens, &mut |piece| {
                full_response.push_str(piece);
                if tx
                    .blocking_send(StreamingToken::Token(piece.to_string()))
                    .is_err()
                {
                    consumer_gone = true;
                    return false;
                }
                true
            });
            if consumer_gone {
                return;
            }

            match result {
                Ok(stats) => {
                    let call = UsageStats::from_counts(stats.prompt_tokens, stats.completion_tokens);
                    usage.record(&call);
                    let _ = tx.blocking_send(StreamingToken::Complete {
                        message: full_response,
                        usage: call,
                    });
                }
                Err(e) => {
                    let _ = tx.blocking_send(StreamingToken::Error(e));
                }
            }
        });

        Ok(rx)
    }

    async fn validate_api_key(&self) -> bool {
        match self.ensure_loaded().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Local model validation failed");
                false
            }
        }
    }

    fn session_usage(&self) -> UsageStats {
        self.usage.snapshot()
    }

    fn reset_session_usage(&mut self) {
        self.usage.reset();
    }

    fn unload(&mut self) {
        if self.loaded.lock().take().is_some() {
            tracing::info!(path = %self.model_path.display(), "Unloaded GGUF model");
        }
    }
}
