//! Slash Commands
//!
//! Parsing only. The command word is matched case-insensitively while
//! arguments keep their case, so `/kleos` prompts and user names reach the
//! conductor as typed.

/// `/memory` sub-commands
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryAction {
    /// List recent memories (the default)
    List,
    /// Search key and value
    Search(String),
    /// Delete by id; `None` when the id did not parse
    Delete(Option<u64>),
    /// Delete everything
    Clear,
    /// Show sub-command usage
    Usage,
}

/// A parsed slash command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlashCommand {
    /// `/quit`, `/exit`, `/q`
    Quit,
    /// `/help`, `/h`, `/?`
    Help,
    /// `/clear`, `/cls`
    Clear,
    /// `/model`
    Model,
    /// `/stats`
    Stats,
    /// `/memory [list|search <q>|delete <id>|clear]`
    Memory(MemoryAction),
    /// `/reset`
    Reset,
    /// `/config`
    Config,
    /// `/kleos <prompt>`; empty when no prompt was given
    Kleos(String),
    /// `/changeusr <name>`, `/changename <name>`
    ChangeUser(String),
    /// `/toggle-stats`, `/ts`
    ToggleStats,
    /// `/theme [name]`
    Theme(Option<String>),
    /// Anything else starting with `/`
    Unknown(String),
}

impl SlashCommand {
    /// Parse `input`; `None` when it is not a slash command
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if !input.starts_with('/') {
            return None;
        }
        let (word, rest) = input
            .split_once(char::is_whitespace)
            .map_or((input, ""), |(w, r)| (w, r.trim()));

        let command = match word.to_lowercase().as_str() {
            "/quit" | "/exit" | "/q" => Self::Quit,
            "/help" | "/h" | "/?" => Self::Help,
            "/clear" | "/cls" => Self::Clear,
            "/model" => Self::Model,
            "/stats" => Self::Stats,
            "/memory" => Self::Memory(parse_memory_action(rest)),
            "/reset" => Self::Reset,
            "/config" => Self::Config,
            "/kleos" => Self::Kleos(rest.to_string()),
            "/changeusr" | "/changename" => Self::ChangeUser(rest.to_string()),
            "/toggle-stats" | "/ts" => Self::ToggleStats,
            "/theme" => Self::Theme(
                rest.split_whitespace()
                    .next()
                    .map(str::to_lowercase),
            ),
            other => Self::Unknown(other.to_string()),
        };
        Some(command)
    }
}

fn parse_memory_action(args: &str) -> MemoryAction {
    let (action, rest) = args
        .split_once(char::is_whitespace)
        .map_or((args, ""), |(a, r)| (a, r.trim()));
    match (action.to_lowercase().as_str(), rest) {
        ("" | "list", _) => MemoryAction::List,
        ("search", q) if !q.is_empty() => MemoryAction::Search(q.to_string()),
        ("delete", id) if !id.is_empty() => MemoryAction::Delete(id.parse().ok()),
        ("clear", _) => MemoryAction::Clear,
        _ => MemoryAction::Usage,
    }
}

/// Command reference shown by `/help`
pub const HELP_TEXT: &str = "\
AVAILABLE COMMANDS
  /help                Show this help message
  /clear               Clear screen
  /model               Change provider & model
  /kleos <prompt>      Deep reasoning mode (Analyst + Thinker)
  /theme [name]        Change UI theme
  /stats               Show detailed statistics
  /memory              Memory mgmt (list, search, delete, clear)
  /config              Show configuration
  /changeusr <name>    Change username
  /toggle-stats        Toggle response statistics
  /reset               Reset chat session
  /quit, /exit         Exit MARK
  Ctrl+C               Stop AI response

  remember that ...    Save info to memory";

/// Usage of the `/memory` sub-commands
pub const MEMORY_USAGE: &str = "\
Memory commands:

  /memory list          - List memories
  /memory search <term> - Search memories
  /memory delete <id>   - Delete memory
  /memory clear         - Delete all";
