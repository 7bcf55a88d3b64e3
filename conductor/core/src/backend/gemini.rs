//! Gemini Provider Implementation
//!
//! Google Generative Language REST API (`generateContent` and
//! `streamGenerateContent?alt=sse`).
//!
//! # Chat sessions
//!
//! Like the vendor SDK, the adapter keeps a client-side chat session that
//! accumulates turns. The conductor, however, owns the authoritative history
//! and passes it on every call. To make sure history is never dropped nor sent
//! twice, the session also mirrors the caller history it was built from:
//!
//! - mirror equals the caller history and the system prompt matches: reuse
//! - anything else: replace the session with a fresh one replayed from the
//!   caller history
//!
//! Gemma models have no system-instruction channel, so the system prompt is
//! folded into the first user turn instead.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::error::ProviderError;
use super::prompt::{fold_system, wrap_memories, MemoryFraming};
use super::settings::GenerationSettings;
use super::sse::{self, CompletionHook, RateLimitHeaders, SseChunk};
use super::traits::{is_offered, AiResponse, ChatRequest, ModelInfo, Provider, TokenStream};
use super::usage::{SessionUsage, UsageStats};
use crate::messages::{same_history, Message, MessageRole};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Provider id
pub const GEMINI_PROVIDER_ID: &str = "GOOGLE";

/// Default Gemini model
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Models offered by the Gemini provider
pub const GEMINI_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-3-flash-preview",
    "gemma-3-27b",
    "gemma-3-27b-it",
    "gemma-3-27b-en",
    "gemma-3-27b-es",
    "gemma-3-27b-fr",
    "gemma-3-27b-de",
];

fn is_gemma(model: &str) -> bool {
    model.starts_with("gemma")
}

/// Map a catalogue id to the id the API serves
///
/// All Gemma 3 27B language variants are the same instruction-tuned model.
fn api_model_id(model: &str) -> &str {
    if model.starts_with("gemma-3-27b") {
        "gemma-3-27b-it"
    } else {
        model
    }
}

fn display_name(model: &str) -> String {
    match model {
        "gemini-2.5-flash" => "Gemini 2.5 Flash".to_string(),
        "gemini-2.5-flash-lite" => "Gemini 2.5 Flash Lite".to_string(),
        "gemini-3-flash-preview" => "Gemini 3 Flash (Preview)".to_string(),
        "gemma-3-27b" => "Gemma 3 27B".to_string(),
        other => match other.strip_prefix("gemma-3-27b-") {
            Some(lang) => format!("Gemma 3 27B ({})", lang.to_uppercase()),
            None => other.to_string(),
        },
    }
}

fn content_turn(role: MessageRole, text: &str) -> Value {
    let role = match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "model",
    };
    json!({ "role": role, "parts": [{ "text": text }] })
}

// ============================================================================
// Chat Session
// ============================================================================

/// Client-side chat session
#[derive(Clone, Debug, Default)]
struct ChatSession {
    model: String,
    system_prompt: Option<String>,
    /// Caller history this session was built from, plus completed exchanges
    mirror: Vec<Message>,
    /// Wire-level turns
    turns: Vec<Value>,
    /// Whether a Gemma system prompt already sits inside `turns`
    system_folded: bool,
}

impl ChatSession {
    fn replay(model: &str, system: Option<&str>, history: &[Message]) -> Self {
        let mut pending = system.filter(|_| is_gemma(model)).map(str::to_string);
        let turns = history
            .iter()
            .map(|message| {
                let folded = match message.role {
                    MessageRole::User => pending.take(),
                    MessageRole::Assistant => None,
                };
                match folded {
                    Some(system) => content_turn(message.role, &fold_system(&system, &message.content)),
                    None => content_turn(message.role, &message.content),
                }
            })
            .collect();

        Self {
            model: model.to_string(),
            system_prompt: system.map(str::to_string),
            mirror: history.to_vec(),
            turns,
            system_folded: is_gemma(model) && system.is_some() && pending.is_none(),
        }
    }

    fn matches(&self, model: &str, system: Option<&str>, history: &[Message]) -> bool {
        self.model == model
            && self.system_prompt.as_deref() == system
            && same_history(&self.mirror, history)
    }

    fn commit(&mut self, user_turn: Value, message: &str, reply: &str, folded_now: bool) {
        self.turns.push(user_turn);
        self.turns.push(content_turn(MessageRole::Assistant, reply));
        self.mirror.push(Message::user(message));
        self.mirror.push(Message::assistant(reply));
        if folded_now {
            self.system_folded = true;
        }
    }
}

/// A request ready to send, plus what to commit when it completes
struct PreparedCall {
    body: Value,
    session: Arc<Mutex<ChatSession>>,
    user_turn: Value,
    message: String,
    folded_now: bool,
}

impl PreparedCall {
    fn into_hook(self) -> CompletionHook {
        let Self {
            session,
            user_turn,
            message,
            folded_now,
            ..
        } = self;
        Box::new(move |reply: &str| {
            session.lock().commit(user_turn, &message, reply, folded_now);
        })
    }
}

/// Build the `generateContent` body
fn build_request_body(
    contents: Vec<Value>,
    system_instruction: Option<&str>,
    generation: &GenerationSettings,
) -> Value {
    let mut body = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": generation.temperature,
            "topP": generation.top_p,
            "maxOutputTokens": generation.max_output_tokens,
        },
    });
    if let Some(system) = system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
}

/// Extract text, usage and finish reason from one response or SSE chunk
fn parse_chunk(data: &Value) -> SseChunk {
    let candidate = data.get("candidates").and_then(|c| c.get(0));
    let text = candidate
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .filter(|t| !t.is_empty());

    let blocked_prompt = data
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .is_some();
    let finish_reason = if blocked_prompt {
        Some("SAFETY".to_string())
    } else {
        candidate
            .and_then(|c| c.get("finishReason"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let usage = data.get("usageMetadata").map(|u| {
        let count = |field: &str| u.get(field).and_then(Value::as_u64).unwrap_or(0);
        (count("promptTokenCount"), count("candidatesTokenCount"))
    });

    SseChunk {
        text,
        usage,
        finish_reason,
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Gemini provider client
pub struct GeminiProvider {
    api_key: String,
    model: String,
    generation: GenerationSettings,
    usage: SessionUsage,
    session: Option<Arc<Mutex<ChatSession>>>,
    base_url: String,
    http_client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            generation: GenerationSettings::default(),
            usage: SessionUsage::new(),
            session: None,
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

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/models/{}:{action}",
            self.base_url,
            api_model_id(&self.model)
        )
    }

    /// Pick or rebuild the chat session and assemble the request body
    fn prepare(&mut self, request: &ChatRequest) -> PreparedCall {
        let system = request.system();
        let reusable = self
            .session
            .as_ref()
            .filter(|s| s.lock().matches(&self.model, system, &request.history))
            .cloned();
        let session = if let Some(session) = reusable {
            session
        } else {
            tracing::debug!(
                model = %self.model,
                history = request.history.len(),
                "Starting new Gemini chat session"
            );
            let fresh = Arc::new(Mutex::new(ChatSession::replay(
                &self.model,
                system,
                &request.history,
            )));
            self.session = Some(Arc::clone(&fresh));
            fresh
        };

        let gemma = is_gemma(&self.model);
        let guard = session.lock();
        let mut text = match request.memories.as_deref() {
            Some(memories) => format!(
                "{}{}",
                wrap_memories(memories, MemoryFraming::UserPrefix),
                request.message
            ),
            None => request.message.clone(),
        };
        let mut folded_now = false;
        if let (true, Some(system), false) = (gemma, system, guard.system_folded) {
            text = fold_system(system, &text);
            folded_now = true;
        }

        let user_turn = content_turn(MessageRole::User, &text);
        let mut contents = guard.turns.clone();
        contents.push(user_turn.clone());
        let body = build_request_body(
            contents,
            if gemma { None } else { system },
            &self.generation,
        );
        drop(guard);

        PreparedCall {
            body,
            session,
            user_turn,
            message: request.message.clone(),
            folded_now,
        }
    }

    async fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http_client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(GEMINI_PROVIDER_ID, &e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status, model = %self.model, "Gemini request failed");
            return Err(ProviderError::from_http(GEMINI_PROVIDER_ID, status, &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        GEMINI_PROVIDER_ID
    }

    fn available_models(&self) -> Vec<String> {
        GEMINI_MODELS.iter().map(ToString::to_string).collect()
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: &str) -> bool {
        if !is_offered(&self.available_models(), model) {
            tracing::warn!(model, "Rejected unknown Gemini model");
            return false;
        }
        self.model = model.to_string();
        self.session = None;
        true
    }

    fn supports_system_instruction(&self) -> bool {
        !is_gemma(&self.model)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            id: self.model.clone(),
            display_name: display_name(&self.model),
            provider: GEMINI_PROVIDER_ID.to_string(),
        }
    }

    async fn send_message(&mut self, request: &ChatRequest) -> Result<AiResponse, ProviderError> {
        let prepared = self.prepare(request);
        let url = self.endpoint("generateContent");
        let response = match self.post(&url, &prepared.body).await {
            Ok(response) => response,
            Err(ProviderError::ContentBlocked { .. }) => {
                let usage = UsageStats::from_counts(0, 0);
                self.usage.record(&usage);
                return Ok(AiResponse::blocked(self.model.clone(), usage));
            }
            Err(e) => return Err(e),
        };

        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Unknown(format!("Invalid Gemini response: {e}")))?;
        let chunk = parse_chunk(&data);
        let (input, output) = chunk.usage.unwrap_or((0, 0));
        let usage = UsageStats::from_counts(input, output);
        self.usage.record(&usage);

        if chunk.text.is_none() && chunk.finish_reason.as_deref() == Some("SAFETY") {
            return Ok(AiResponse::blocked(self.model.clone(), usage).with_raw(data));
        }

        let content = chunk.text.unwrap_or_default();
        let model = self.model.clone();
        let finish_reason = chunk.finish_reason;
        prepared.into_hook()(&content);
        Ok(AiResponse::new(content, model, usage)
            .with_finish_reason(finish_reason)
            .with_raw(data))
    }

    async fn stream_message(
        &mut self,
        request: &ChatRequest,
    ) -> Result<TokenStream, ProviderError> {
        let prepared = self.prepare(request);
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        let response = match self.post(&url, &prepared.body).await {
            Ok(response) => response,
            Err(ProviderError::ContentBlocked { .. }) => {
                return Ok(sse::notice_stream(super::BLOCKED_NOTICE, &self.usage));
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(model = %self.model, "Gemini stream started");
        Ok(sse::spawn_sse_stream(
            GEMINI_PROVIDER_ID.to_string(),
            response,
            RateLimitHeaders::default(),
            self.usage.clone(),
            Some(prepared.into_hook()),
            parse_chunk,
        ))
    }

    async fn validate_api_key(&self) -> bool {
        let url = format!("{}/models?pageSize=1", self.base_url);
        match self
            .http_client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Gemini key validation failed");
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

    fn reset_chat(&mut self) {
        self.session = None;
    }
}
