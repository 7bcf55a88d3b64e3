//! Kleos Multi-Stage Pipeline
//!
//! Kleos turns a vague request into a better one before answering it:
//!
//! ```text
//! Activated ─▶ Analyzing ─▶ AwaitingUserDetails ─▶ Drafting ─▶ AwaitingConfirmation
//!                                                     ▲                │
//!                                                     └── feedback ────┤
//!                                                                      ▼ yes
//!                                                      Done ◀──── Thinking
//! ```
//!
//! The analyst asks clarifying questions, the user answers, a master prompt
//! is drafted and confirmed (or revised), and the confirmed draft is sent
//! with a fixed thinker instruction and no history. Only the original prompt
//! and the final answer reach the conversation context and the log.
//!
//! Every phase is a streamed call driven by the [`StreamOrchestrator`], so
//! the cancel token and the display rules are the same as for a normal send.

mod language;
mod prompts;

pub use language::Language;
pub use prompts::{ANALYST_SYSTEM, MASTER_SYSTEM, THINKER_SYSTEM};

use async_trait::async_trait;

use crate::backend::{ChatRequest, Provider, ProviderError};
use crate::memory::{recent_memory_block, ConversationLog, MemoryService};
use crate::messages::{Message, NotifyLevel, ResponseMetadata};
use crate::session::ConversationContext;
use crate::streaming::{CancelToken, DisplayMode, DisplaySink, StreamOrchestrator};

// ============================================================================
// States and Outcomes
// ============================================================================

/// Pipeline states, in the order they can be visited
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KleosState {
    /// Language detected, pipeline started
    Activated,
    /// Analyst is asking questions
    Analyzing,
    /// Waiting for the user's answers
    AwaitingUserDetails,
    /// Master prompt being drafted
    Drafting,
    /// Waiting for the user to accept the draft
    AwaitingConfirmation,
    /// Final answer being produced
    Thinking,
    /// Answer produced
    Done,
    /// Stopped by the user
    Cancelled,
    /// A phase failed
    Failed,
}

/// Phases that call the provider
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KleosPhase {
    /// Clarifying questions
    Analysis,
    /// Master prompt
    Drafting,
    /// Final answer
    Thinking,
}

impl KleosPhase {
    /// User-facing error message for a failure in this phase
    #[must_use]
    pub fn error_message(self, error: &ProviderError) -> String {
        match self {
            Self::Analysis => format!("Error during Kleos analysis: {error}"),
            Self::Drafting => format!("Error during Master Prompt generation: {error}"),
            Self::Thinking => format!("Error during Thinker phase: {error}"),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Analysis => "Analyst",
            Self::Drafting => "Master Prompt",
            Self::Thinking => "Thinker",
        }
    }
}

/// How a pipeline run ended
#[derive(Clone, Debug, PartialEq)]
pub enum KleosOutcome {
    /// The final answer was produced
    Done {
        /// Final answer text
        answer: String,
    },
    /// The user stopped the pipeline
    Cancelled,
    /// A provider call failed; no retry is attempted
    Failed {
        /// Phase that failed
        phase: KleosPhase,
        /// The provider error
        error: ProviderError,
    },
}

/// Pipeline tuning
#[derive(Clone, Debug)]
pub struct KleosConfig {
    /// Maximum number of modification rounds before giving up
    pub max_refinements: usize,
    /// Number of recent memories sent with the final call
    pub memory_window: usize,
    /// Persist the final exchange
    pub auto_save: bool,
}

impl Default for KleosConfig {
    fn default() -> Self {
        Self {
            max_refinements: 10,
            memory_window: 20,
            auto_save: true,
        }
    }
}

/// Blocking single-line questions to the user
#[async_trait]
pub trait UserPrompter: Send {
    /// Show `prompt` and read one line, trimmed; end of input reads as empty
    async fn ask(&mut self, prompt: &str) -> String;
}

enum PhaseEnd {
    Cancelled,
    Failed(KleosPhase, ProviderError),
}

impl From<PhaseEnd> for KleosOutcome {
    fn from(end: PhaseEnd) -> Self {
        match end {
            PhaseEnd::Cancelled => Self::Cancelled,
            PhaseEnd::Failed(phase, error) => Self::Failed { phase, error },
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// One Kleos run over borrowed collaborators
pub struct KleosPipeline<'a> {
    provider: &'a mut dyn Provider,
    orchestrator: &'a StreamOrchestrator,
    sink: &'a mut dyn DisplaySink,
    prompter: &'a mut dyn UserPrompter,
    memory: &'a dyn MemoryService,
    context: &'a mut ConversationContext,
    log: Option<&'a dyn ConversationLog>,
    cancel: CancelToken,
    config: KleosConfig,
    states: Vec<KleosState>,
}

impl<'a> KleosPipeline<'a> {
    /// Create a pipeline
    pub fn new(
        provider: &'a mut dyn Provider,
        orchestrator: &'a StreamOrchestrator,
        sink: &'a mut dyn DisplaySink,
        prompter: &'a mut dyn UserPrompter,
        memory: &'a dyn MemoryService,
        context: &'a mut ConversationContext,
    ) -> Self {
        Self {
            provider,
            orchestrator,
            sink,
            prompter,
            memory,
            context,
            log: None,
            cancel: CancelToken::new(),
            config: KleosConfig::default(),
            states: Vec::new(),
        }
    }

    /// Persist the final exchange to `log`
    #[must_use]
    pub fn with_log(mut self, log: &'a dyn ConversationLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Use the caller's cancel token
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set tuning
    #[must_use]
    pub fn with_config(mut self, config: KleosConfig) -> Self {
        self.config = config;
        self
    }

    /// States visited so far
    #[must_use]
    pub fn states(&self) -> &[KleosState] {
        &self.states
    }

    /// Run the pipeline for `original`
    pub async fn run(&mut self, original: &str) -> KleosOutcome {
        let outcome = match self.drive(original).await {
            Ok(answer) => KleosOutcome::Done { answer },
            Err(end) => end.into(),
        };
        self.enter(match outcome {
            KleosOutcome::Done { .. } => KleosState::Done,
            KleosOutcome::Cancelled => KleosState::Cancelled,
            KleosOutcome::Failed { .. } => KleosState::Failed,
        });
        outcome
    }

    async fn drive(&mut self, original: &str) -> Result<String, PhaseEnd> {
        self.enter(KleosState::Activated);
        let lang = Language::detect(original);
        tracing::info!(language = lang.code(), model = self.provider.model(), "Kleos activated");

        // Analyst output is shown to the user and then discarded
        self.enter(KleosState::Analyzing);
        let request = ChatRequest::new(prompts::analyst_input(original))
            .with_system_prompt(prompts::language_forced(ANALYST_SYSTEM, lang));
        self.stream_phase(KleosPhase::Analysis, &request).await?;

        self.enter(KleosState::AwaitingUserDetails);
        self.sink.show_system(prompts::INTRO, NotifyLevel::Info);
        let details = self.ask("> ").await?;
        let mut context = if details.is_empty() {
            String::new()
        } else {
            prompts::details_line(&details)
        };

        let mut refinements = 0;
        let draft = loop {
            self.enter(KleosState::Drafting);
            let request = ChatRequest::new(prompts::refinement_input(original, &context, lang))
                .with_system_prompt(prompts::language_forced(MASTER_SYSTEM, lang));
            let draft = self.stream_phase(KleosPhase::Drafting, &request).await?;

            self.enter(KleosState::AwaitingConfirmation);
            let choice = self.ask(prompts::CONFIRM).await?.to_lowercase();
            if matches!(choice.as_str(), "" | "y" | "yes") {
                break draft;
            }

            let feedback = self.ask(prompts::MODIFY).await?;
            if feedback.is_empty() {
                self.sink.show_system(prompts::CANCELLED, NotifyLevel::Info);
                return Err(PhaseEnd::Cancelled);
            }
            refinements += 1;
            if refinements > self.config.max_refinements {
                tracing::warn!(refinements, "Kleos refinement limit reached");
                self.sink.show_system(
                    &format!(
                        "Refinement limit ({}) reached. {}",
                        self.config.max_refinements,
                        prompts::CANCELLED
                    ),
                    NotifyLevel::Warning,
                );
                return Err(PhaseEnd::Cancelled);
            }
            context.push_str(&prompts::feedback_line(&feedback));
        };

        self.enter(KleosState::Thinking);
        let memories = recent_memory_block(self.memory, self.config.memory_window);
        let request = ChatRequest::new(draft)
            .with_system_prompt(THINKER_SYSTEM)
            .with_memories(memories);
        let answer = self.stream_phase(KleosPhase::Thinking, &request).await?;

        if !answer.is_empty() {
            self.commit(original, &answer);
        }
        Ok(answer)
    }

    async fn stream_phase(
        &mut self,
        phase: KleosPhase,
        request: &ChatRequest,
    ) -> Result<String, PhaseEnd> {
        if self.cancel.is_cancelled() {
            return Err(PhaseEnd::Cancelled);
        }
        let (meta, mode) = match phase {
            KleosPhase::Thinking => (
                ResponseMetadata::assistant(self.provider.model()),
                DisplayMode::ThinkingOnly,
            ),
            _ => (
                ResponseMetadata::pipeline(phase.label()),
                DisplayMode::Incremental,
            ),
        };

        let stream = match self.provider.stream_message(request).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(phase, e)),
        };
        let outcome = self
            .orchestrator
            .run(stream, &self.cancel, &mut *self.sink, &meta, mode)
            .await;

        if outcome.cancelled {
            return Err(PhaseEnd::Cancelled);
        }
        if let Some(e) = outcome.error {
            return Err(self.fail(phase, e));
        }
        Ok(outcome.text)
    }

    fn fail(&mut self, phase: KleosPhase, error: ProviderError) -> PhaseEnd {
        tracing::warn!(phase = phase.label(), error = %error, "Kleos phase failed");
        let suggestion = error.suggestion();
        self.sink
            .show_error(&phase.error_message(&error), suggestion.as_deref());
        PhaseEnd::Failed(phase, error)
    }

    async fn ask(&mut self, prompt: &str) -> Result<String, PhaseEnd> {
        let answer = self.prompter.ask(prompt).await;
        if self.cancel.is_cancelled() {
            return Err(PhaseEnd::Cancelled);
        }
        Ok(answer.trim().to_string())
    }

    fn commit(&mut self, original: &str, answer: &str) {
        self.context
            .push_exchange(Message::user(original), Message::assistant(answer));
        if !self.config.auto_save {
            return;
        }
        if let Some(log) = self.log {
            if let Err(e) = log.append(self.provider.name(), self.provider.model(), original, answer)
            {
                tracing::warn!(error = %e, "Failed to persist Kleos exchange");
            }
        }
    }

    fn enter(&mut self, state: KleosState) {
        tracing::debug!(?state, "Kleos state");
        self.states.push(state);
    }
}
