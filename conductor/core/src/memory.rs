//! Memory and Persistence Collaborators
//!
//! The core consumes persistence through small traits and never depends on a
//! storage engine. Surfaces provide the implementations.
//!
//! # Memory commands
//!
//! Natural-language commands in Italian and English ("ricorda che ...",
//! "remember that ...") save a memory instead of going to the model. A key is
//! derived from the value ("mi chiamo Marco" is stored under `nome`).

use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A saved memory
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Record id
    pub id: u64,
    /// When it was saved
    pub timestamp: DateTime<Local>,
    /// Category key
    pub key: String,
    /// Remembered text
    pub value: String,
    /// Free-form extra data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Memory store
pub trait MemoryService: Send + Sync {
    /// Most recent memories first
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be read.
    fn list_recent(&self, limit: usize) -> anyhow::Result<Vec<MemoryRecord>>;

    /// Save a memory
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be written.
    fn save(&self, key: &str, value: &str) -> anyhow::Result<MemoryRecord>;

    /// Memories whose key or value contains `query` (case-insensitive)
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be read.
    fn search(&self, query: &str) -> anyhow::Result<Vec<MemoryRecord>>;

    /// Delete one memory; false if it did not exist
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be written.
    fn delete(&self, id: u64) -> anyhow::Result<bool>;

    /// Delete everything, returning how many were removed
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be written.
    fn clear(&self) -> anyhow::Result<usize>;
}

/// Persisted conversation log
pub trait ConversationLog: Send + Sync {
    /// Append one exchange
    ///
    /// # Errors
    ///
    /// Returns an error when the log cannot be written.
    fn append(
        &self,
        provider: &str,
        model: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> anyhow::Result<()>;

    /// Number of logged exchanges per provider id
    ///
    /// # Errors
    ///
    /// Returns an error when the log cannot be read.
    fn exchange_counts(&self) -> anyhow::Result<Vec<(String, u64)>>;
}

/// Credential store
pub trait CredentialStore: Send + Sync {
    /// Credential for a provider id
    fn get(&self, provider: &str) -> Option<String>;

    /// Store a credential
    ///
    /// # Errors
    ///
    /// Returns an error when the credential cannot be persisted.
    fn set(&self, provider: &str, credential: &str) -> anyhow::Result<()>;
}

/// Render memories as `- [key] value` lines
///
/// Returns `None` for an empty list so no empty block is sent.
#[must_use]
pub fn render_memories(records: &[MemoryRecord]) -> Option<String> {
    if records.is_empty() {
        return None;
    }
    Some(
        records
            .iter()
            .map(|r| format!("- [{}] {}", r.key, r.value))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// Fetch and render the recent-memory window, logging read failures
pub fn recent_memory_block(memory: &dyn MemoryService, limit: usize) -> Option<String> {
    match memory.list_recent(limit) {
        Ok(records) => render_memories(&records),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read memories, continuing without them");
            None
        }
    }
}

// ============================================================================
// Memory Commands
// ============================================================================

/// A parsed "remember that ..." command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryCommand {
    /// Derived category key
    pub key: String,
    /// Text to remember, in its original case
    pub value: String,
}

const COMMAND_PATTERNS: &[&str] = &[
    r"(?i)ricorda(?:ti)? che (.+)",
    r"(?i)memorizza che (.+)",
    r"(?i)tieni a mente che (.+)",
    r"(?i)salva che (.+)",
    r"(?i)ricorda:?\s*(.+)",
    r"(?i)remember that (.+)",
    r"(?i)memorize that (.+)",
    r"(?i)save that (.+)",
    r"(?i)keep in mind that (.+)",
    r"(?i)note that (.+)",
];

const KEY_PATTERNS: &[(&str, &str)] = &[
    (r"mi chiamo|my name is|sono", "nome"),
    (r"ho (\d+) anni|i am (\d+) years old", "età"),
    (r"abito|vivo|live in", "residenza"),
    (r"lavoro|work as|sono un", "lavoro"),
    (r"mi piace|like|love|amo", "preferenze"),
    (r"odio|hate|detesto", "antipatie"),
    (r"compleanno|birthday|nato", "data_nascita"),
    (r"email|mail", "email"),
    (r"telefono|phone|numero", "telefono"),
];

static COMMANDS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    COMMAND_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

static KEYS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    KEY_PATTERNS
        .iter()
        .filter_map(|(p, key)| Regex::new(p).ok().map(|re| (re, *key)))
        .collect()
});

/// Parse a memory command, if `input` is one
#[must_use]
pub fn parse_memory_command(input: &str) -> Option<MemoryCommand> {
    let input = input.trim();
    COMMANDS.iter().find_map(|re| {
        let value = re.captures(input)?.get(1)?.as_str().trim().to_string();
        if value.is_empty() {
            return None;
        }
        Some(MemoryCommand {
            key: derive_key(&value),
            value,
        })
    })
}

/// Derive a category key from the remembered text
#[must_use]
pub fn derive_key(value: &str) -> String {
    let lower = value.to_lowercase();
    if let Some((_, key)) = KEYS.iter().find(|(re, _)| re.is_match(&lower)) {
        return (*key).to_string();
    }
    lower
        .split_whitespace()
        .take(3)
        .collect::<Vec<_>>()
        .join("_")
        .replace(['.', ','], "")
}
