//! Conversation Messages
//!
//! Value types shared between the conductor, providers and display surfaces.
//!
//! # Design Philosophy
//!
//! A [`Message`] is one turn of the conversation. Messages are created once and
//! never edited; the conversation context only appends and evicts. Display
//! metadata travels next to the text as a [`ResponseMetadata`] so that a surface
//! can render a header without knowing where the text came from.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Message role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,
    /// Assistant response
    Assistant,
}

impl MessageRole {
    /// Wire name used by OpenAI-compatible APIs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn of the conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// When the message was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Local>>,
}

impl Message {
    /// Create a message stamped with the current local time
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Some(Local::now()),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Whether two messages carry the same turn, ignoring timestamps
    #[must_use]
    pub fn same_turn(&self, other: &Self) -> bool {
        self.role == other.role && self.content == other.content
    }
}

/// Compare two histories turn by turn, ignoring timestamps
#[must_use]
pub fn same_history(a: &[Message], b: &[Message]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_turn(y))
}

/// How a block of text should be styled by the surface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayStyle {
    /// Echo of user input
    User,
    /// Regular assistant answer
    #[default]
    Assistant,
    /// Intermediate output of a multi-stage pipeline
    Pipeline,
}

/// Metadata shown alongside a response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseMetadata {
    /// Model that produced the text
    pub model: String,
    /// Local time the response started
    pub timestamp: DateTime<Local>,
    /// Display style
    pub style: DisplayStyle,
}

impl ResponseMetadata {
    /// Metadata for an assistant response produced now
    pub fn assistant(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            timestamp: Local::now(),
            style: DisplayStyle::Assistant,
        }
    }

    /// Metadata for intermediate pipeline output produced now
    pub fn pipeline(model: impl Into<String>) -> Self {
        Self {
            style: DisplayStyle::Pipeline,
            ..Self::assistant(model)
        }
    }
}

/// Notification level for system notices
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Success
    Success,
    /// Warning
    Warning,
    /// Error
    Error,
}
