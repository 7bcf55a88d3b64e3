//! File-backed collaborators
//!
//! Everything lives under `$MARK_HOME`:
//!
//! - `memories.json`: the memory records, rewritten on every change
//! - `conversations.jsonl`: one JSON object per saved exchange
//! - `credentials.toml`: `provider = "key"` pairs, read after the environment

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use mark_core::{ConversationLog, CredentialStore, MemoryRecord, MemoryService};

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

// ============================================================================
// Memories
// ============================================================================

/// Memory records kept in a single JSON file
pub struct JsonMemoryStore {
    path: PathBuf,
    records: Mutex<Vec<MemoryRecord>>,
}

impl JsonMemoryStore {
    /// Open the store, reading existing records
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("Invalid memory file {}", path.display()))?
            }
        } else {
            Vec::new()
        };
        tracing::debug!(path = %path.display(), count = records.len(), "Memory store opened");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    fn persist(&self, records: &[MemoryRecord]) -> Result<()> {
        ensure_parent(&self.path)?;
        let content = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

impl MemoryService for JsonMemoryStore {
    fn list_recent(&self, limit: usize) -> Result<Vec<MemoryRecord>> {
        let records = self.records.lock();
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    fn save(&self, key: &str, value: &str) -> Result<MemoryRecord> {
        let mut records = self.records.lock();
        let record = MemoryRecord {
            id: records.iter().map(|r| r.id).max().unwrap_or(0) + 1,
            timestamp: Local::now(),
            key: key.to_string(),
            value: value.to_string(),
            metadata: None,
        };
        records.push(record.clone());
        if let Err(e) = self.persist(&records) {
            records.pop();
            return Err(e);
        }
        Ok(record)
    }

    fn search(&self, query: &str) -> Result<Vec<MemoryRecord>> {
        let query = query.to_lowercase();
        let records = self.records.lock();
        Ok(records
            .iter()
            .rev()
            .filter(|r| {
                r.key.to_lowercase().contains(&query) || r.value.to_lowercase().contains(&query)
            })
            .cloned()
            .collect())
    }

    fn delete(&self, id: u64) -> Result<bool> {
        let mut records = self.records.lock();
        let kept: Vec<MemoryRecord> = records.iter().filter(|r| r.id != id).cloned().collect();
        if kept.len() == records.len() {
            return Ok(false);
        }
        // Memory follows the file: commit only what was written
        self.persist(&kept)?;
        *records = kept;
        Ok(true)
    }

    fn clear(&self) -> Result<usize> {
        let mut records = self.records.lock();
        let count = records.len();
        self.persist(&[])?;
        records.clear();
        Ok(count)
    }
}

// ============================================================================
// Conversation Log
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct LogEntry {
    timestamp: DateTime<Local>,
    provider: String,
    model: String,
    user: String,
    assistant: String,
}

/// Append-only JSON-lines conversation log
pub struct JsonlConversationLog {
    path: PathBuf,
}

impl JsonlConversationLog {
    /// Log at `path`; the file is created on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConversationLog for JsonlConversationLog {
    fn append(
        &self,
        provider: &str,
        model: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<()> {
        ensure_parent(&self.path)?;
        let entry = LogEntry {
            timestamp: Local::now(),
            provider: provider.to_string(),
            model: model.to_string(),
            user: user_text.to_string(),
            assistant: assistant_text.to_string(),
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        writeln!(file, "{}", serde_json::to_string(&entry)?)?;
        Ok(())
    }

    fn exchange_counts(&self) -> Result<Vec<(String, u64)>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<LogEntry>(line) {
                Ok(entry) => *counts.entry(entry.provider).or_default() += 1,
                Err(e) => tracing::debug!(error = %e, "Skipping malformed log line"),
            }
        }
        Ok(counts.into_iter().collect())
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Credentials from `<PROVIDER>_API_KEY`, then a TOML file
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn env_var(provider: &str) -> String {
        let name = match provider.to_ascii_uppercase().as_str() {
            "GOOGLE" | "GEMINI" => "GOOGLE".to_string(),
            other => other.replace('-', "_"),
        };
        format!("{name}_API_KEY")
    }

    fn read_file(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid {}", self.path.display()))
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, provider: &str) -> Option<String> {
        if let Ok(key) = std::env::var(Self::env_var(provider)) {
            if !key.trim().is_empty() {
                return Some(key.trim().to_string());
            }
        }
        match self.read_file() {
            Ok(keys) => keys
                .get(&provider.to_ascii_lowercase())
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read credentials");
                None
            }
        }
    }

    fn set(&self, provider: &str, credential: &str) -> Result<()> {
        let mut keys = self.read_file().unwrap_or_default();
        keys.insert(provider.to_ascii_lowercase(), credential.trim().to_string());
        ensure_parent(&self.path)?;
        fs::write(&self.path, toml::to_string(&keys)?)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        tracing::info!(provider, "Credential saved");
        Ok(())
    }
}
