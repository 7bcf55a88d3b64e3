//! llama.cpp inference engine (`llama` feature)
//!
//! Implements the [`ModelLoader`] / [`LoadedModel`] seam with `llama-cpp-2`.
//! All calls are blocking and run on the blocking thread pool.

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::OnceLock;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaChatMessage, LlamaChatTemplate, LlamaModel};
use llama_cpp_2::sampling::LlamaSampler;

use super::error::ProviderError;
use super::local::{GenerationStats, LoadedModel, ModelLoader, LOCAL_GGUF_PROVIDER_ID};
use super::prompt::ChatMessage;
use super::settings::LocalSettings;

static BACKEND: OnceLock<LlamaBackend> = OnceLock::new();

fn engine_error(what: &str, e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Unknown(format!("{what}: {e}"))
}

/// The process-wide llama.cpp backend, initialized on first use
fn backend() -> Result<&'static LlamaBackend, ProviderError> {
    if let Some(backend) = BACKEND.get() {
        return Ok(backend);
    }
    let backend = LlamaBackend::init().map_err(|e| {
        ProviderError::unavailable(LOCAL_GGUF_PROVIDER_ID, format!("llama backend: {e}"))
    })?;
    Ok(BACKEND.get_or_init(|| backend))
}

/// Loads GGUF files through llama.cpp
#[derive(Clone, Copy, Debug, Default)]
pub struct LlamaLoader;

impl ModelLoader for LlamaLoader {
    fn load(
        &self,
        path: &Path,
        settings: &LocalSettings,
    ) -> Result<Box<dyn LoadedModel>, ProviderError> {
        let backend = backend()?;
        let model = LlamaModel::load_from_file(backend, path, &LlamaModelParams::default())
            .map_err(|e| {
                ProviderError::unavailable(LOCAL_GGUF_PROVIDER_ID, format!("failed to load model: {e}"))
            })?;

        let template = match model.chat_template(None) {
            Ok(template) => template,
            Err(_) => {
                tracing::warn!("Model has no embedded chat template, falling back to chatml");
                LlamaChatTemplate::new("chatml")
                    .map_err(|e| engine_error("Failed to create fallback chat template", e))?
            }
        };

        Ok(Box::new(LlamaEngine {
            backend,
            model,
            template,
            context_size: settings.context_size,
        }))
    }
}

struct LlamaEngine {
    backend: &'static LlamaBackend,
    model: LlamaModel,
    template: LlamaChatTemplate,
    context_size: u32,
}

impl LlamaEngine {
    fn render_prompt(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let chat = messages
            .iter()
            .map(|m| LlamaChatMessage::new(m.role.to_string(), m.content.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| engine_error("Invalid chat message", e))?;
        self.model
            .apply_chat_template(&self.template, &chat, true)
            .map_err(|e| engine_error("Failed to apply chat template", e))
    }
}

impl LoadedModel for LlamaEngine {
    fn generate(
        &mut self,
        messages: &[ChatMessage],
        max_tokens: u32,
        on_piece: &mut dyn FnMut(&str) -> bool,
    ) -> Result<GenerationStats, ProviderError> {
        let prompt = self.render_prompt(messages)?;
        let tokens = self
            .model
            .str_to_token(&prompt, AddBos::Never)
            .map_err(|e| engine_error("Failed to tokenize prompt", e))?;
        let prompt_tokens = tokens.len();
        let budget = (self.context_size as usize).saturating_sub(prompt_tokens);
        if budget == 0 {
            return Err(ProviderError::Unknown(format!(
                "Prompt ({prompt_tokens} tokens) exceeds the context window ({})",
                self.context_size
            )));
        }

        let params =
            LlamaContextParams::default().with_n_ctx(NonZeroU32::new(self.context_size));
        let mut ctx = self
            .model
            .new_context(self.backend, params)
            .map_err(|e| engine_error("Failed to create context", e))?;

        let n_batch = ctx.n_batch() as usize;
        for chunk in tokens.chunks(n_batch.max(1)) {
            let mut batch = LlamaBatch::get_one(chunk)
                .map_err(|e| engine_error("Failed to create batch", e))?;
            ctx.decode(&mut batch)
                .map_err(|e| engine_error("Prefill decode failed", e))?;
        }

        let mut sampler = LlamaSampler::chain_simple([
            LlamaSampler::top_p(0.95, 1),
            LlamaSampler::temp(0.7),
            LlamaSampler::dist(0),
        ]);
        let mut decoder = encoding_rs::UTF_8.new_decoder();
        let mut produced = 0u64;

        for _ in 0..budget.min(max_tokens as usize) {
            let token = sampler.sample(&ctx, -1);
            sampler.accept(token);
            if self.model.is_eog_token(token) {
                break;
            }
            produced += 1;

            let piece = self
                .model
                .token_to_piece(token, &mut decoder, true, None)
                .map_err(|e| engine_error("Failed to decode token", e))?;
            if !piece.is_empty() && !on_piece(&piece) {
                break;
            }

            let next = [token];
            let mut batch =
                LlamaBatch::get_one(&next).map_err(|e| engine_error("Failed to create batch", e))?;
            ctx.decode(&mut batch)
                .map_err(|e| engine_error("Decode failed", e))?;
        }

        Ok(GenerationStats {
            prompt_tokens: prompt_tokens as u64,
            completion_tokens: produced,
        })
    }
}
