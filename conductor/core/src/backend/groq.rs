//! Groq Provider Implementation
//!
//! Stateless OpenAI-compatible chat completions. Every call carries the full
//! message list built by [`chat_messages`]; there is no session to manage.
//!
//! Rate-limit headers (`x-ratelimit-remaining-requests`,
//! `x-ratelimit-reset-requests`) are copied into the usage of each call.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::error::ProviderError;
use super::prompt::chat_messages;
use super::settings::GenerationSettings;
use super::sse::{self, RateLimitHeaders, SseChunk};
use super::traits::{
    is_offered, AiResponse, ChatRequest, ModelInfo, Provider, TokenStream, BLOCKED_NOTICE,
};
use super::usage::{SessionUsage, UsageStats};

const API_BASE: &str = "https://api.groq.com/openai/v1";

/// Provider id
pub const GROQ_PROVIDER_ID: &str = "groq";

/// Default Groq model
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Models offered by the Groq provider
pub const GROQ_MODELS: &[&str] = &[
    "groq/compound",
    "llama-3.3-70b-versatile",
    "openai/gpt-oss-120b",
    "moonshotai/Kimi-K2-Instruct",
];

fn display_name(model: &str) -> &str {
    match model {
        "openai/gpt-oss-120b" => "GPT-OSS 120B",
        "llama-3.3-70b-versatile" => "Llama 70B Versatile",
        "moonshotai/Kimi-K2-Instruct" => "Kimi K2",
        "groq/compound" => "Groq Compound",
        other => other,
    }
}

/// Read `usage` (or Groq's `x_groq.usage` on stream chunks)
fn parse_usage(data: &Value) -> Option<(u64, u64)> {
    let usage = data
        .get("usage")
        .filter(|u| !u.is_null())
        .or_else(|| data.get("x_groq").and_then(|x| x.get("usage")))?;
    let count = |field: &str| usage.get(field).and_then(Value::as_u64).unwrap_or(0);
    Some((count("prompt_tokens"), count("completion_tokens")))
}

fn finish_reason(choice: Option<&Value>) -> Option<String> {
    choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(Value::as_str)
        .map(|reason| {
            if reason == "content_filter" {
                "SAFETY".to_string()
            } else {
                reason.to_string()
            }
        })
}

/// Extract one streamed delta
fn parse_stream_chunk(data: &Value) -> SseChunk {
    let choice = data.get("choices").and_then(|c| c.get(0));
    SseChunk {
        text: choice
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string),
        usage: parse_usage(data),
        finish_reason: finish_reason(choice),
    }
}

/// Groq provider client
pub struct GroqProvider {
    api_key: String,
    model: String,
    generation: GenerationSettings,
    usage: SessionUsage,
    base_url: String,
    http_client: reqwest::Client,
}

impl GroqProvider {
    /// Create a new Groq provider
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            generation: GenerationSettings::default(),
            usage: SessionUsage::new(),
            base_url: API_BASE.to_string(),
            http_client: super::http_client(),
        }
    }

    /// Override sampling parameters
    #[must_use]
    pub fn with_generation(mut self, generation: GenerationSettings) -> Self {
        self.generation = generation;
        self
    }

    /// Point the client at another endpoint (tests, proxies)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": chat_messages(request, true),
            "temperature": self.generation.temperature,
            "top_p": self.generation.top_p,
            "max_completion_tokens": self.generation.max_output_tokens,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = json!({ "include_usage": true });
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(GROQ_PROVIDER_ID, &e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let limits = RateLimitHeaders::from_response(&response);
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status, model = %self.model, "Groq request failed");
            return Err(match ProviderError::from_http(GROQ_PROVIDER_ID, status, &body) {
                ProviderError::RateLimited { provider, .. } => ProviderError::RateLimited {
                    provider,
                    retry_after: limits.reset,
                },
                other => other,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for GroqProvider {
    fn name(&self) -> &str {
        GROQ_PROVIDER_ID
    }

    fn available_models(&self) -> Vec<String> {
        GROQ_MODELS.iter().map(ToString::to_string).collect()
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: &str) -> bool {
        if !is_offered(&self.available_models(), model) {
            tracing::warn!(model, "Rejected unknown Groq model");
            return false;
        }
        self.model = model.to_string();
        true
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            id: self.model.clone(),
            display_name: display_name(&self.model).to_string(),
            provider: GROQ_PROVIDER_ID.to_string(),
        }
    }

    async fn send_message(&mut self, request: &ChatRequest) -> Result<AiResponse, ProviderError> {
        let response = match self.post(&self.build_body(request, false)).await {
            Ok(response) => response,
            Err(ProviderError::ContentBlocked { .. }) => {
                let usage = UsageStats::from_counts(0, 0);
                self.usage.record(&usage);
                return Ok(AiResponse::blocked(self.model.clone(), usage));
            }
            Err(e) => return Err(e),
        };
        let limits = RateLimitHeaders::from_response(&response);
        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Unknown(format!("Invalid Groq response: {e}")))?;

        let choice = data.get("choices").and_then(|c| c.get(0));
        let content = choice
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let reason = finish_reason(choice);
        let (input, output) = parse_usage(&data).unwrap_or((0, 0));
        let usage =
            UsageStats::from_counts(input, output).with_rate_limit(limits.remaining, limits.reset);
        self.usage.record(&usage);

        if content.is_empty() && reason.as_deref() == Some("SAFETY") {
            return Ok(AiResponse::blocked(self.model.clone(), usage).with_raw(data));
        }
        Ok(AiResponse::new(content, self.model.clone(), usage)
            .with_finish_reason(reason)
            .with_raw(data))
    }

    async fn stream_message(
        &mut self,
        request: &ChatRequest,
    ) -> Result<TokenStream, ProviderError> {
        let response = match self.post(&self.build_body(request, true)).await {
            Ok(response) => response,
            Err(ProviderError::ContentBlocked { .. }) => {
                return Ok(sse::notice_stream(BLOCKED_NOTICE, &self.usage));
            }
            Err(e) => return Err(e),
        };
        let limits = RateLimitHeaders::from_response(&response);

        tracing::debug!(model = %self.model, "Groq stream started");
        Ok(sse::spawn_sse_stream(
            GROQ_PROVIDER_ID.to_string(),
            response,
            limits,
            self.usage.clone(),
            None,
            parse_stream_chunk,
        ))
    }

    async fn validate_api_key(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Groq key validation failed");
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
}
