//! Request assembly shared by the adapters
//!
//! Canonical order: system instruction, memory block, history, new message.
//! When a model has no system channel the instruction is folded into the
//! first user-visible content instead of being dropped.

use serde::Serialize;

use super::traits::ChatRequest;
use crate::messages::MessageRole;

/// How a memory block is framed for a backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryFraming {
    /// Prepended to the user message, with a translation hint
    UserPrefix,
    /// Appended to the system message
    System,
}

/// Wrap rendered memory lines in the delimited block the system prompts refer to
#[must_use]
pub fn wrap_memories(memories: &str, framing: MemoryFraming) -> String {
    match framing {
        MemoryFraming::UserPrefix => format!(
            "--- MEMORY CONTEXT (TRANSLATE IF NEEDED) ---\n<MEMORIES>\n{memories}\n</MEMORIES>\n------------------------------------------\n\n"
        ),
        MemoryFraming::System => {
            format!("--- MEMORY CONTEXT ---\n<MEMORIES>\n{memories}\n</MEMORIES>\n----------------------")
        }
    }
}

/// Fold a system instruction into user content
#[must_use]
pub fn fold_system(system: &str, content: &str) -> String {
    format!("{system}\n\n{content}")
}

/// One message in an OpenAI-style `messages` array
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// "system", "user" or "assistant"
    pub role: &'static str,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Build an OpenAI-style message list
///
/// With a system channel the memory block is appended to the system message,
/// or sent as its own system message when there is no system prompt. Without
/// one, both are folded into the first user content.
#[must_use]
pub fn chat_messages(request: &ChatRequest, system_channel: bool) -> Vec<ChatMessage> {
    let memory_block = request
        .memories
        .as_deref()
        .map(|m| wrap_memories(m, MemoryFraming::System));
    let system = match (request.system(), memory_block) {
        (Some(system), Some(block)) => Some(format!("{system}\n\n{block}")),
        (Some(system), None) => Some(system.to_string()),
        (None, Some(block)) => Some(block),
        (None, None) => None,
    };

    let mut messages = Vec::with_capacity(request.history.len() + 2);
    let mut pending_system = None;
    match system {
        Some(system) if system_channel => messages.push(ChatMessage::new("system", system)),
        other => pending_system = other,
    }

    for message in &request.history {
        let folded = match message.role {
            MessageRole::User => pending_system.take(),
            MessageRole::Assistant => None,
        };
        let content = match folded {
            Some(system) => fold_system(&system, &message.content),
            None => message.content.clone(),
        };
        messages.push(ChatMessage::new(message.role.as_str(), content));
    }

    let content = match pending_system {
        Some(system) => fold_system(&system, &request.message),
        None => request.message.clone(),
    };
    messages.push(ChatMessage::new("user", content));
    messages
}
