//! Conductor - The Orchestration Core
//!
//! The Conductor owns everything a chat session needs: the active provider,
//! the conversation context, the configuration and the persistence
//! collaborators. A surface feeds it one line of input at a time through
//! [`Conductor::handle_input`] and renders what comes back through a
//! [`DisplaySink`].
//!
//! # Design Philosophy
//!
//! The Conductor is UI-agnostic. It never reads the keyboard or writes to the
//! terminal. Interactive flows that need several questions (provider and
//! model selection, credential entry) are returned to the surface as a
//! [`CommandOutcome`], and the surface calls back with the result.
//!
//! One request is in flight at a time. The conversation context belongs to
//! the Conductor, not to the provider, so it survives provider switches.

use chrono::Local;

use crate::backend::{ChatRequest, Provider, ProviderError};
use crate::commands::{MemoryAction, SlashCommand, HELP_TEXT, MEMORY_USAGE};
use crate::config::{save_config, system_prompt, MarkConfig, THEMES};
use crate::kleos::{KleosOutcome, KleosPipeline, UserPrompter};
use crate::memory::{
    parse_memory_command, recent_memory_block, ConversationLog, MemoryRecord, MemoryService,
};
use crate::messages::{Message, NotifyLevel, ResponseMetadata};
use crate::session::ConversationContext;
use crate::streaming::{CancelToken, DisplayMode, DisplaySink, StreamOrchestrator};

const NO_PROVIDER: &str = "No AI model selected.";
const NO_PROVIDER_HINT: &str = "Use /model to select a provider and model to start chatting.";

// ============================================================================
// Outcomes
// ============================================================================

/// Statistics of one completed response
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseStats {
    /// Time to first token
    pub ttft: Option<std::time::Duration>,
    /// Estimated input tokens
    pub tokens_in: u64,
    /// Estimated output tokens
    pub tokens_out: u64,
    /// Total response time
    pub total: std::time::Duration,
}

impl ResponseStats {
    /// One-line summary shown under a response
    #[must_use]
    pub fn summary(&self) -> String {
        let ttft = self
            .ttft
            .map_or_else(|| "-".to_string(), |t| format!("{:.2}s", t.as_secs_f64()));
        format!(
            "TTFT {ttft} · ~{} tokens in / ~{} out · {:.2}s total",
            self.tokens_in,
            self.tokens_out,
            self.total.as_secs_f64()
        )
    }
}

/// Rough token estimate: 1.3 tokens per whitespace-separated word
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    let words = text.split_whitespace().count() as u64;
    words * 13 / 10
}

/// Result of sending a message to the model
#[derive(Clone, Debug, PartialEq)]
pub enum SendOutcome {
    /// The response completed
    Completed {
        /// Response statistics
        stats: ResponseStats,
    },
    /// The user stopped the response; partial text was kept
    Cancelled,
    /// The provider failed; the error was shown
    Failed(ProviderError),
    /// The provider rejected the credential; the surface should ask again
    CredentialRejected,
    /// No provider is configured
    NoProvider,
}

/// Result of a slash command
#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    /// Output was shown through the sink
    Shown,
    /// The surface should clear the screen
    ClearScreen,
    /// The surface should run the provider/model selection flow
    SelectModel,
    /// The theme was changed and saved
    ThemeChanged(String),
    /// A Kleos run finished
    Kleos(KleosOutcome),
}

/// Result of one line of input
#[derive(Clone, Debug, PartialEq)]
pub enum InputOutcome {
    /// Blank input, nothing done
    Empty,
    /// A natural-language memory command was stored
    MemorySaved(MemoryRecord),
    /// A slash command ran
    Command(CommandOutcome),
    /// The message went to the model
    Sent(SendOutcome),
    /// The user asked to quit
    Quit,
}

// ============================================================================
// Conductor
// ============================================================================

/// The orchestration core
pub struct Conductor {
    provider: Option<Box<dyn Provider>>,
    context: ConversationContext,
    config: MarkConfig,
    orchestrator: StreamOrchestrator,
    memory: Box<dyn MemoryService>,
    log: Box<dyn ConversationLog>,
}

impl Conductor {
    /// Create a conductor
    ///
    /// `provider` may be `None` when no credential is available yet; sends
    /// then report [`SendOutcome::NoProvider`] until one is installed.
    pub fn new(
        config: MarkConfig,
        provider: Option<Box<dyn Provider>>,
        memory: Box<dyn MemoryService>,
        log: Box<dyn ConversationLog>,
    ) -> Self {
        Self {
            provider,
            context: ConversationContext::new(config.max_context_messages),
            orchestrator: StreamOrchestrator::new(config.orchestrator_config()),
            config,
            memory,
            log,
        }
    }

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &MarkConfig {
        &self.config
    }

    /// Active provider, if any
    #[must_use]
    pub fn provider(&self) -> Option<&dyn Provider> {
        self.provider.as_deref()
    }

    /// Conversation history
    #[must_use]
    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Memory store
    #[must_use]
    pub fn memory(&self) -> &dyn MemoryService {
        self.memory.as_ref()
    }

    /// Install a new provider, keeping the conversation context
    ///
    /// The provider's own chat session is reset and the choice is saved.
    pub fn switch_provider(&mut self, mut provider: Box<dyn Provider>, provider_id: &str) {
        provider.reset_chat();
        tracing::info!(
            provider = provider_id,
            model = provider.model(),
            context_messages = self.context.len(),
            "Switched provider"
        );
        self.config.default_provider = provider_id.to_string();
        self.config.default_model = provider.model().to_string();
        self.provider = Some(provider);
        self.persist_config();
    }

    /// Change the model of the active provider
    ///
    /// Returns false when there is no provider or the model is not offered.
    pub fn select_model(&mut self, model: &str) -> bool {
        let Some(provider) = self.provider.as_deref_mut() else {
            return false;
        };
        if !provider.set_model(model) {
            return false;
        }
        self.config.default_model = provider.model().to_string();
        self.persist_config();
        true
    }

    /// Handle one line of user input
    pub async fn handle_input(
        &mut self,
        input: &str,
        sink: &mut dyn DisplaySink,
        prompter: &mut dyn UserPrompter,
        cancel: &CancelToken,
    ) -> InputOutcome {
        let input = input.trim();
        if input.is_empty() {
            return InputOutcome::Empty;
        }

        if let Some(command) = SlashCommand::parse(input) {
            return self.handle_command(command, sink, prompter, cancel).await;
        }

        if let Some(command) = parse_memory_command(input) {
            match self.memory.save(&command.key, &command.value) {
                Ok(record) => {
                    tracing::info!(id = record.id, key = %record.key, "Memory saved");
                    sink.show_system(
                        &format!("Saved to memory: [{}] {}", record.key, record.value),
                        NotifyLevel::Success,
                    );
                    return InputOutcome::MemorySaved(record);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to save memory");
                    sink.show_error(&format!("Failed to save memory: {e}"), None);
                    return InputOutcome::Empty;
                }
            }
        }

        InputOutcome::Sent(self.send(input, sink, cancel).await)
    }

    // ========================================================================
    // Send Path
    // ========================================================================

    /// Send a message with history, memories and system prompt
    pub async fn send(
        &mut self,
        message: &str,
        sink: &mut dyn DisplaySink,
        cancel: &CancelToken,
    ) -> SendOutcome {
        let Some(provider) = self.provider.as_deref_mut() else {
            sink.show_error(NO_PROVIDER, Some(NO_PROVIDER_HINT));
            return SendOutcome::NoProvider;
        };

        let memories = recent_memory_block(self.memory.as_ref(), self.config.memory_window);
        let system = system_prompt(&self.config.language, &self.config.user_name, Local::now());
        let request = ChatRequest::new(message)
            .with_history(self.context.messages().to_vec())
            .with_system_prompt(system)
            .with_memories(memories);

        tracing::debug!(
            provider = provider.name(),
            model = provider.model(),
            history = request.history.len(),
            "Sending message"
        );

        let stream = match provider.stream_message(&request).await {
            Ok(stream) => stream,
            Err(e) => return report_failure(sink, e),
        };
        let meta = ResponseMetadata::assistant(provider.model());
        let outcome = self
            .orchestrator
            .run(stream, cancel, sink, &meta, DisplayMode::Incremental)
            .await;

        if !outcome.text.is_empty() {
            self.context
                .push_exchange(Message::user(message), Message::assistant(&outcome.text));
            if self.config.auto_save {
                if let Err(e) =
                    self.log
                        .append(provider.name(), provider.model(), message, &outcome.text)
                {
                    tracing::warn!(error = %e, "Failed to persist exchange");
                }
            }
        }

        if let Some(e) = outcome.error {
            return report_failure(sink, e);
        }
        if outcome.cancelled {
            return SendOutcome::Cancelled;
        }

        let stats = ResponseStats {
            ttft: outcome.ttft,
            tokens_in: estimate_tokens(message),
            tokens_out: estimate_tokens(&outcome.text),
            total: outcome.elapsed,
        };
        if self.config.show_stats {
            sink.show_system(&stats.summary(), NotifyLevel::Info);
        }
        SendOutcome::Completed { stats }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    async fn handle_command(
        &mut self,
        command: SlashCommand,
        sink: &mut dyn DisplaySink,
        prompter: &mut dyn UserPrompter,
        cancel: &CancelToken,
    ) -> InputOutcome {
        let outcome = match command {
            SlashCommand::Quit => return InputOutcome::Quit,
            SlashCommand::Help => {
                sink.show_system(HELP_TEXT, NotifyLevel::Info);
                CommandOutcome::Shown
            }
            SlashCommand::Clear => CommandOutcome::ClearScreen,
            SlashCommand::Model => CommandOutcome::SelectModel,
            SlashCommand::Stats => {
                sink.show_system(&self.stats_report(), NotifyLevel::Info);
                CommandOutcome::Shown
            }
            SlashCommand::Memory(action) => {
                self.handle_memory(action, sink);
                CommandOutcome::Shown
            }
            SlashCommand::Reset => {
                self.reset();
                sink.show_system("Session reset.", NotifyLevel::Success);
                CommandOutcome::Shown
            }
            SlashCommand::Config => {
                sink.show_system(&self.config_report(), NotifyLevel::Info);
                CommandOutcome::Shown
            }
            SlashCommand::Kleos(prompt) if prompt.is_empty() => {
                sink.show_system("Usage: /kleos <prompt>", NotifyLevel::Warning);
                CommandOutcome::Shown
            }
            SlashCommand::Kleos(prompt) => match self.run_kleos(&prompt, sink, prompter, cancel).await {
                Some(outcome) => CommandOutcome::Kleos(outcome),
                None => CommandOutcome::Shown,
            },
            SlashCommand::ChangeUser(name) if name.is_empty() => {
                sink.show_system("Usage: /changeusr <new_name>", NotifyLevel::Warning);
                CommandOutcome::Shown
            }
            SlashCommand::ChangeUser(name) => {
                sink.show_system(&format!("User name updated to: {name}"), NotifyLevel::Success);
                self.config.user_name = name;
                self.persist_config();
                CommandOutcome::Shown
            }
            SlashCommand::ToggleStats => {
                self.config.show_stats = !self.config.show_stats;
                self.persist_config();
                let status = if self.config.show_stats { "enabled" } else { "disabled" };
                sink.show_system(&format!("Response statistics {status}."), NotifyLevel::Success);
                CommandOutcome::Shown
            }
            SlashCommand::Theme(None) => {
                sink.show_system(
                    &format!("Available themes: {}\nUsage: /theme <name>", THEMES.join(", ")),
                    NotifyLevel::Info,
                );
                CommandOutcome::Shown
            }
            SlashCommand::Theme(Some(name)) => {
                if THEMES.contains(&name.as_str()) {
                    self.config.theme.clone_from(&name);
                    self.persist_config();
                    sink.show_system(&format!("Theme updated to: {name}"), NotifyLevel::Success);
                    CommandOutcome::ThemeChanged(name)
                } else {
                    sink.show_error(
                        &format!("Theme '{name}' not found."),
                        Some(&format!("Available: {}", THEMES.join(", "))),
                    );
                    CommandOutcome::Shown
                }
            }
            SlashCommand::Unknown(word) => {
                sink.show_system(
                    &format!("Unknown command: {word}\nUse /help to see commands."),
                    NotifyLevel::Warning,
                );
                CommandOutcome::Shown
            }
        };
        InputOutcome::Command(outcome)
    }

    async fn run_kleos(
        &mut self,
        prompt: &str,
        sink: &mut dyn DisplaySink,
        prompter: &mut dyn UserPrompter,
        cancel: &CancelToken,
    ) -> Option<KleosOutcome> {
        let Some(provider) = self.provider.as_deref_mut() else {
            sink.show_error(NO_PROVIDER, Some(NO_PROVIDER_HINT));
            return None;
        };
        let mut pipeline = KleosPipeline::new(
            provider,
            &self.orchestrator,
            sink,
            prompter,
            self.memory.as_ref(),
            &mut self.context,
        )
        .with_log(self.log.as_ref())
        .with_cancel(cancel.clone())
        .with_config(self.config.kleos_config());
        let outcome = pipeline.run(prompt).await;
        tracing::info!(states = ?pipeline.states(), "Kleos finished");
        Some(outcome)
    }

    fn handle_memory(&self, action: MemoryAction, sink: &mut dyn DisplaySink) {
        let result = match action {
            MemoryAction::List => self
                .memory
                .list_recent(self.config.memory_window)
                .map(|records| sink.show_system(&memory_list(&records), NotifyLevel::Info)),
            MemoryAction::Search(query) => self
                .memory
                .search(&query)
                .map(|records| sink.show_system(&memory_list(&records), NotifyLevel::Info)),
            MemoryAction::Delete(Some(id)) => self.memory.delete(id).map(|deleted| {
                if deleted {
                    sink.show_system(&format!("Memory #{id} deleted."), NotifyLevel::Success);
                } else {
                    sink.show_error(&format!("Memory #{id} not found."), None);
                }
            }),
            MemoryAction::Delete(None) => {
                sink.show_error("Invalid memory ID.", None);
                Ok(())
            }
            MemoryAction::Clear => self.memory.clear().map(|count| {
                sink.show_system(&format!("Deleted {count} memories."), NotifyLevel::Warning);
            }),
            MemoryAction::Usage => {
                sink.show_system(MEMORY_USAGE, NotifyLevel::Info);
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Memory command failed");
            sink.show_error(&format!("Memory error: {e}"), None);
        }
    }

    /// Clear context, session usage and the provider's chat session
    pub fn reset(&mut self) {
        self.context.clear();
        if let Some(provider) = self.provider.as_deref_mut() {
            provider.reset_session_usage();
            provider.reset_chat();
        }
        tracing::info!("Session reset");
    }

    fn stats_report(&self) -> String {
        let usage = self
            .provider
            .as_deref()
            .map(Provider::session_usage)
            .unwrap_or_default();
        let logged = match self.log.exchange_counts() {
            Ok(counts) => counts
                .iter()
                .find(|(p, _)| p.eq_ignore_ascii_case(&self.config.default_provider))
                .map_or(0, |(_, n)| *n),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read conversation log");
                0
            }
        };

        let mut report = String::from("DETAILED STATISTICS\n\nCURRENT SESSION\n");
        report.push_str(&format!("  Token Input    {}\n", usage.tokens_input));
        report.push_str(&format!("  Token Output   {}\n", usage.tokens_output));
        report.push_str(&format!("  Total Tokens   {}\n", usage.tokens_total));
        report.push_str(&format!("  Requests       {}\n", usage.requests_count));
        if let Some(remaining) = usage.rate_limit_remaining {
            report.push_str(&format!("  Rate limit     {remaining} requests left\n"));
        }
        report.push_str(&format!("\nSAVED CONVERSATIONS\n  Exchanges      {logged}\n"));
        report.push_str(&format!(
            "\nPROVIDER\n  Name           {}\n  Model          {}",
            self.config.default_provider.to_uppercase(),
            self.config.default_model
        ));
        report
    }

    fn config_report(&self) -> String {
        let c = &self.config;
        let path = c
            .config_file_path
            .as_ref()
            .map_or_else(|| "(none)".to_string(), |p| p.display().to_string());
        format!(
            "CONFIGURATION ({})\n  File           {path}\n  Provider       {}\n  Model          {}\n  \
             Language       {}\n  User           {}\n  Theme          {}\n  Show stats     {}\n  \
             Context turns  {}\n  Auto-save      {}\n  Memory window  {}",
            c.source(),
            c.default_provider,
            c.default_model,
            c.language,
            c.user_name,
            c.theme,
            c.show_stats,
            c.max_context_messages,
            c.auto_save,
            c.memory_window
        )
    }

    fn persist_config(&self) {
        if let Err(e) = save_config(&self.config) {
            tracing::warn!(error = %e, "Failed to save configuration");
        }
    }
}

fn report_failure(sink: &mut dyn DisplaySink, error: ProviderError) -> SendOutcome {
    tracing::warn!(error = %error, "Request failed");
    let suggestion = error.suggestion();
    sink.show_error(&error.to_string(), suggestion.as_deref());
    if error.is_credential_error() {
        SendOutcome::CredentialRejected
    } else {
        SendOutcome::Failed(error)
    }
}

fn memory_list(records: &[MemoryRecord]) -> String {
    if records.is_empty() {
        return "No memories found.".to_string();
    }
    records
        .iter()
        .map(|r| {
            format!(
                "#{} [{}] {} ({})",
                r.id,
                r.key,
                r.value,
                r.timestamp.format("%Y-%m-%d %H:%M")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one two three four five six seven eight nine ten"), 13);
    }

    #[test]
    fn test_stats_summary() {
        let stats = ResponseStats {
            ttft: Some(Duration::from_millis(420)),
            tokens_in: 5,
            tokens_out: 40,
            total: Duration::from_millis(3100),
        };
        assert_eq!(stats.summary(), "TTFT 0.42s · ~5 tokens in / ~40 out · 3.10s total");
    }

    #[test]
    fn test_memory_list_empty() {
        assert_eq!(memory_list(&[]), "No memories found.");
    }
}
