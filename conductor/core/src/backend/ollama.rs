//! Ollama Provider Implementation
//!
//! Provider for Ollama (local LLM server).
//!
//! # Ollama API
//!
//! Ollama provides a REST API for:
//! - `/api/chat` - Chat completions with message history (NDJSON when streaming)
//! - `/api/tags` - List installed models
//!
//! Models are discovered at runtime, so [`Provider::available_models`] is empty
//! and any id is accepted; use [`OllamaProvider::list_models`] to offer a choice.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use super::error::ProviderError;
use super::prompt::chat_messages;
use super::settings::{GenerationSettings, OllamaSettings};
use super::traits::{AiResponse, ChatRequest, Provider, StreamingToken, TokenStream};
use super::usage::{SessionUsage, UsageStats};

/// Provider id
pub const OLLAMA_PROVIDER_ID: &str = "LOCAL";

/// An installed Ollama model
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OllamaModel {
    /// Model tag, e.g. `llama3.2:latest`
    pub name: String,
    /// Size on disk in bytes (if known)
    pub size: Option<u64>,
    /// Parameter count (if known)
    pub parameters: Option<String>,
}

/// Read `prompt_eval_count` / `eval_count` from a final chunk
fn parse_counts(data: &Value) -> (u64, u64) {
    let count = |field: &str| data.get(field).and_then(Value::as_u64).unwrap_or(0);
    (count("prompt_eval_count"), count("eval_count"))
}

/// Ollama provider client
#[derive(Clone)]
pub struct OllamaProvider {
    /// Server location
    settings: OllamaSettings,
    /// Current model
    model: String,
    /// Sampling parameters
    generation: GenerationSettings,
    /// Session accumulator
    usage: SessionUsage,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    pub fn new(settings: OllamaSettings, model: impl Into<String>) -> Self {
        Self {
            settings,
            model: model.into(),
            generation: GenerationSettings::default(),
            usage: SessionUsage::new(),
            http_client: super::http_client(),
        }
    }

    /// Create from environment variables
    #[must_use]
    pub fn from_env(model: &str) -> Self {
        Self::new(OllamaSettings::from_env(), model)
    }

    /// Override sampling parameters
    #[must_use]
    pub fn with_generation(mut self, generation: GenerationSettings) -> Self {
        self.generation = generation;
        self
    }

    /// Get chat endpoint URL
    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.settings.base_url())
    }

    /// Get tags endpoint URL
    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.settings.base_url())
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": chat_messages(request, true),
            "stream": stream,
            "options": {
                "temperature": self.generation.temperature,
                "top_p": self.generation.top_p,
                "num_predict": self.generation.max_output_tokens,
            },
        })
    }

    fn transport_error(e: &reqwest::Error) -> ProviderError {
        if e.is_connect() {
            ProviderError::unavailable(
                OLLAMA_PROVIDER_ID,
                "Cannot connect to Ollama. Make sure Ollama is running (ollama serve).",
            )
        } else {
            ProviderError::from_transport(OLLAMA_PROVIDER_ID, e)
        }
    }

    async fn post_chat(&self, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http_client
            .post(self.chat_url())
            .json(body)
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        // Check for HTTP errors
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status, model = %self.model, "Ollama request failed");
            return Err(ProviderError::from_http(OLLAMA_PROVIDER_ID, status, &body));
        }
        Ok(response)
    }

    /// List installed models
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` when the server cannot be reached.
    pub async fn list_models(&self) -> Result<Vec<OllamaModel>, ProviderError> {
        let response = self
            .http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_http(OLLAMA_PROVIDER_ID, status, &body));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Unknown(format!("Invalid Ollama tags response: {e}")))?;
        Ok(parse_tags(&data))
    }
}

/// Parse the `/api/tags` payload
fn parse_tags(data: &Value) -> Vec<OllamaModel> {
    data.get("models")
        .and_then(|m| m.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|m| {
                    let name = m.get("name")?.as_str()?.to_string();
                    let size = m.get("size").and_then(Value::as_u64);
                    let parameters = m
                        .get("details")
                        .and_then(|d| d.get("parameter_size"))
                        .and_then(|p| p.as_str())
                        .map(String::from);
                    Some(OllamaModel {
                        name,
                        size,
                        parameters,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        OLLAMA_PROVIDER_ID
    }

    fn available_models(&self) -> Vec<String> {
        Vec::new()
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: &str) -> bool {
        if model.trim().is_empty() {
            return false;
        }
        self.model = model.to_string();
        true
    }

    async fn send_message(&mut self, request: &ChatRequest) -> Result<AiResponse, ProviderError> {
        let response = self.post_chat(&self.build_body(request, false)).await?;
        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Unknown(format!("Invalid Ollama response: {e}")))?;

        let content = data
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let (input, output) = parse_counts(&data);
        let usage = UsageStats::from_counts(input, output);
        self.usage.record(&usage);

        let finish_reason = data
            .get("done_reason")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(AiResponse::new(content, self.model.clone(), usage)
            .with_finish_reason(finish_reason)
            .with_raw(data))
    }

    async fn stream_message(
        &mut self,
        request: &ChatRequest,
    ) -> Result<TokenStream, ProviderError> {
        let (tx, rx) = mpsc::channel(100);
        let response = self.post_chat(&self.build_body(request, true)).await?;
        let mut stream = response.bytes_stream();
        let usage = self.usage.clone();

        // Spawn task to process stream
        tokio::spawn(async move {
            // Raw bytes: a chunk may end inside a multi-byte character
            let mut buffer: Vec<u8> = Vec::new();
            let mut full_response = String::new();
            let mut counts = (0, 0);

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(StreamingToken::Error(ProviderError::from_transport(
                                OLLAMA_PROVIDER_ID,
                                &e,
                            )))
                            .await;
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                // Parse newline-delimited JSON, one complete line at a time
                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let Ok(data) = serde_json::from_slice::<Value>(&line) else {
                        continue;
                    };

                    if let Some(message) = data.get("error").and_then(Value::as_str) {
                        let _ = tx
                            .send(StreamingToken::Error(ProviderError::from_stream_message(
                                OLLAMA_PROVIDER_ID,
                                message,
                            )))
                            .await;
                        return;
                    }

                    if let Some(token) = data
                        .get("message")
                        .and_then(|m| m.get("content"))
                        .and_then(Value::as_str)
                        .filter(|t| !t.is_empty())
                    {
                        full_response.push_str(token);
                        if tx
                            .send(StreamingToken::Token(token.to_string()))
                            .await
                            .is_err()
                        {
                            // Receiver dropped, stop streaming
                            return;
                        }
                    }

                    if data.get("done").and_then(Value::as_bool).unwrap_or(false) {
                        counts = parse_counts(&data);
                    }
                }
            }

            let call = UsageStats::from_counts(counts.0, counts.1);
            usage.record(&call);
            let _ = tx
                .send(StreamingToken::Complete {
                    message: full_response,
                    usage: call,
                })
                .await;
        });

        Ok(rx)
    }

    async fn validate_api_key(&self) -> bool {
        self.http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    fn session_usage(&self) -> UsageStats {
        self.usage.snapshot()
    }

    fn reset_session_usage(&mut self) {
        self.usage.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Message;

    #[test]
    fn test_ollama_provider_creation() {
        let provider = OllamaProvider::new(OllamaSettings::new("localhost", 11434), "llama3.2");
        assert_eq!(provider.chat_url(), "http://localhost:11434/api/chat");
        assert_eq!(provider.tags_url(), "http://localhost:11434/api/tags");
        assert_eq!(provider.name(), "LOCAL");
    }

    #[test]
    fn test_accepts_any_model() {
        let mut provider = OllamaProvider::new(OllamaSettings::default(), "llama3.2");
        assert!(provider.available_models().is_empty());
        assert!(provider.set_model("qwen2.5:7b"));
        assert_eq!(provider.model(), "qwen2.5:7b");
        assert!(!provider.set_model("  "));
        assert_eq!(provider.model(), "qwen2.5:7b");
    }

    #[test]
    fn test_build_body() {
        let provider = OllamaProvider::new(OllamaSettings::default(), "llama3.2");
        let request = ChatRequest::new("Hello")
            .with_system_prompt("Be helpful")
            .with_history(vec![Message::user("Hi"), Message::assistant("Hey")]);
        let body = provider.build_body(&request, true);

        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], true);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["content"], "Be helpful");
        assert_eq!(messages[3]["content"], "Hello");
        assert_eq!(body["options"]["num_predict"], 8192);
    }

    #[test]
    fn test_parse_tags() {
        let data = serde_json::json!({
            "models": [
                {"name": "llama3.2:latest", "size": 2019393189u64, "details": {"parameter_size": "3.2B"}},
                {"name": "qwen2.5:7b"},
                {"size": 1}
            ]
        });
        let models = parse_tags(&data);
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].parameters.as_deref(), Some("3.2B"));
        assert_eq!(models[1].name, "qwen2.5:7b");
    }

    #[test]
    fn test_parse_counts() {
        let data = serde_json::json!({"done": true, "prompt_eval_count": 26, "eval_count": 298});
        assert_eq!(parse_counts(&data), (26, 298));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        // Port 9 (discard) is closed on test machines
        let provider = OllamaProvider::new(OllamaSettings::new("127.0.0.1", 9), "llama3.2");
        assert!(!provider.validate_api_key().await);
        match provider.list_models().await {
            Err(ProviderError::BackendUnavailable { provider, .. }) => assert_eq!(provider, "LOCAL"),
            other => panic!("Expected BackendUnavailable, got {other:?}"),
        }
    }
}
