//! Shared test doubles for the integration tests
//!
//! Every collaborator of the conductor and the Kleos pipeline has an
//! in-memory stand-in here. Handles (`Arc`s) let a test inspect what a double
//! saw after it has been moved into the code under test.

#![allow(dead_code)]

pub mod http;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use mark_core::backend::{
    is_offered, AiResponse, ChatRequest, Provider, ProviderError, SessionUsage, StreamingToken,
    TokenStream, UsageStats,
};
use mark_core::memory::{ConversationLog, MemoryRecord, MemoryService};
use mark_core::messages::{NotifyLevel, ResponseMetadata};
use mark_core::streaming::{CancelToken, DisplaySink};
use mark_core::UserPrompter;

// =============================================================================
// Mock Provider
// =============================================================================

/// What the mock does for one call
#[derive(Clone, Debug)]
pub enum Script {
    /// Stream these fragments, then complete
    Reply(Vec<&'static str>),
    /// Fail before streaming
    Fail(ProviderError),
    /// Stream one fragment, then fail
    FailMidStream(&'static str, ProviderError),
}

/// Scripted provider that records every request it receives
pub struct MockProvider {
    model: String,
    models: Vec<String>,
    scripts: VecDeque<Script>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    usage: SessionUsage,
    delay: Duration,
    chat_resets: Arc<Mutex<usize>>,
}

impl MockProvider {
    /// A provider answering from `scripts` in order, then "ok"
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            model: "mock-model".to_string(),
            models: vec!["mock-model".to_string(), "mock-large".to_string()],
            scripts: scripts.into(),
            requests: Arc::default(),
            usage: SessionUsage::new(),
            delay: Duration::ZERO,
            chat_resets: Arc::default(),
        }
    }

    /// Pause between fragments
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Handle on the recorded requests
    pub fn requests(&self) -> Arc<Mutex<Vec<ChatRequest>>> {
        Arc::clone(&self.requests)
    }

    /// Handle on the number of `reset_chat` calls
    pub fn chat_resets(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.chat_resets)
    }

    fn next_script(&mut self, request: &ChatRequest) -> Script {
        self.requests.lock().push(request.clone());
        self.scripts
            .pop_front()
            .unwrap_or(Script::Reply(vec!["ok"]))
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "MOCK"
    }

    fn available_models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: &str) -> bool {
        if !is_offered(&self.models, model) {
            return false;
        }
        self.model = model.to_string();
        true
    }

    async fn send_message(&mut self, request: &ChatRequest) -> Result<AiResponse, ProviderError> {
        match self.next_script(request) {
            Script::Reply(parts) => {
                let usage = UsageStats::from_counts(3, parts.len() as u64);
                self.usage.record(&usage);
                Ok(AiResponse::new(parts.concat(), self.model.clone(), usage))
            }
            Script::Fail(e) | Script::FailMidStream(_, e) => Err(e),
        }
    }

    async fn stream_message(
        &mut self,
        request: &ChatRequest,
    ) -> Result<TokenStream, ProviderError> {
        let script = self.next_script(request);
        let (tx, rx) = mpsc::channel(100);
        let usage = self.usage.clone();
        let delay = self.delay;

        match script {
            Script::Fail(e) => return Err(e),
            Script::Reply(parts) => {
                tokio::spawn(async move {
                    for part in &parts {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        if tx.send(StreamingToken::Token((*part).to_string())).await.is_err() {
                            return;
                        }
                    }
                    let call = UsageStats::from_counts(3, parts.len() as u64);
                    usage.record(&call);
                    let _ = tx
                        .send(StreamingToken::Complete {
                            message: parts.concat(),
                            usage: call,
                        })
                        .await;
                });
            }
            Script::FailMidStream(part, e) => {
                tokio::spawn(async move {
                    let _ = tx.send(StreamingToken::Token(part.to_string())).await;
                    let _ = tx.send(StreamingToken::Error(e)).await;
                });
            }
        }
        Ok(rx)
    }

    async fn validate_api_key(&self) -> bool {
        true
    }

    fn session_usage(&self) -> UsageStats {
        self.usage.snapshot()
    }

    fn reset_session_usage(&mut self) {
        self.usage.reset();
    }

    fn reset_chat(&mut self) {
        *self.chat_resets.lock() += 1;
    }
}

// =============================================================================
// Recording Sink
// =============================================================================

/// Display sink that keeps everything it is shown
#[derive(Default)]
pub struct RecordingSink {
    pub partials: Vec<String>,
    pub statuses: Vec<String>,
    pub finals: Vec<(String, ResponseMetadata)>,
    pub notices: Vec<(String, NotifyLevel)>,
    cancel_on: Option<(String, CancelToken)>,
}

impl RecordingSink {
    /// Cancel `token` as soon as a partial rendering contains `trigger`
    pub fn cancelling_on(trigger: &str, token: CancelToken) -> Self {
        Self {
            cancel_on: Some((trigger.to_string(), token)),
            ..Self::default()
        }
    }

    /// Final texts only
    pub fn final_texts(&self) -> Vec<String> {
        self.finals.iter().map(|(t, _)| t.clone()).collect()
    }

    /// Whether a notice at `level` contains `needle`
    pub fn has_notice(&self, level: NotifyLevel, needle: &str) -> bool {
        self.notices
            .iter()
            .any(|(text, l)| *l == level && text.contains(needle))
    }
}

impl DisplaySink for RecordingSink {
    fn show_partial(&mut self, text: &str, _meta: &ResponseMetadata) {
        if let Some((trigger, token)) = &self.cancel_on {
            if text.contains(trigger.as_str()) {
                token.cancel();
            }
        }
        self.partials.push(text.to_string());
    }

    fn show_final(&mut self, text: &str, meta: &ResponseMetadata) {
        self.finals.push((text.to_string(), meta.clone()));
    }

    fn show_status(&mut self, status: &str, _meta: &ResponseMetadata) {
        self.statuses.push(status.to_string());
    }

    fn show_system(&mut self, text: &str, level: NotifyLevel) {
        self.notices.push((text.to_string(), level));
    }
}

// =============================================================================
// Scripted Prompter
// =============================================================================

/// Answers questions from a fixed list; runs out as empty input
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    pub asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(ToString::to_string).collect(),
            asked: Vec::new(),
        }
    }
}

#[async_trait]
impl UserPrompter for ScriptedPrompter {
    async fn ask(&mut self, prompt: &str) -> String {
        self.asked.push(prompt.to_string());
        self.answers.pop_front().unwrap_or_default()
    }
}

// =============================================================================
// In-Memory Stores
// =============================================================================

/// Memory service backed by a vector
#[derive(Clone, Default)]
pub struct InMemoryMemory {
    records: Arc<Mutex<Vec<MemoryRecord>>>,
}

impl InMemoryMemory {
    pub fn with(entries: &[(&str, &str)]) -> Self {
        let memory = Self::default();
        for (key, value) in entries {
            memory.save(key, value).unwrap();
        }
        memory
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }
}

impl MemoryService for InMemoryMemory {
    fn list_recent(&self, limit: usize) -> anyhow::Result<Vec<MemoryRecord>> {
        Ok(self.records.lock().iter().rev().take(limit).cloned().collect())
    }

    fn save(&self, key: &str, value: &str) -> anyhow::Result<MemoryRecord> {
        let mut records = self.records.lock();
        let record = MemoryRecord {
            id: records.last().map_or(1, |r| r.id + 1),
            timestamp: Local::now(),
            key: key.to_string(),
            value: value.to_string(),
            metadata: None,
        };
        records.push(record.clone());
        Ok(record)
    }

    fn search(&self, query: &str) -> anyhow::Result<Vec<MemoryRecord>> {
        let query = query.to_lowercase();
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|r| {
                r.key.to_lowercase().contains(&query) || r.value.to_lowercase().contains(&query)
            })
            .cloned()
            .collect())
    }

    fn delete(&self, id: u64) -> anyhow::Result<bool> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }

    fn clear(&self) -> anyhow::Result<usize> {
        let mut records = self.records.lock();
        let count = records.len();
        records.clear();
        Ok(count)
    }
}

/// One logged exchange
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggedExchange {
    pub provider: String,
    pub model: String,
    pub user: String,
    pub assistant: String,
}

/// Conversation log backed by a vector
#[derive(Clone, Default)]
pub struct InMemoryLog {
    pub entries: Arc<Mutex<Vec<LoggedExchange>>>,
}

impl ConversationLog for InMemoryLog {
    fn append(
        &self,
        provider: &str,
        model: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> anyhow::Result<()> {
        self.entries.lock().push(LoggedExchange {
            provider: provider.to_string(),
            model: model.to_string(),
            user: user_text.to_string(),
            assistant: assistant_text.to_string(),
        });
        Ok(())
    }

    fn exchange_counts(&self) -> anyhow::Result<Vec<(String, u64)>> {
        let mut counts: Vec<(String, u64)> = Vec::new();
        for entry in self.entries.lock().iter() {
            match counts.iter_mut().find(|(p, _)| *p == entry.provider) {
                Some((_, n)) => *n += 1,
                None => counts.push((entry.provider.clone(), 1)),
            }
        }
        Ok(counts)
    }
}
