//! Conductor behavior: send path, slash commands and memory commands

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use common::{InMemoryLog, InMemoryMemory, MockProvider, RecordingSink, Script, ScriptedPrompter};
use mark_core::backend::{ChatRequest, ProviderError};
use mark_core::messages::{MessageRole, NotifyLevel};
use mark_core::streaming::CancelToken;
use mark_core::{
    load_config_from_path, CommandOutcome, Conductor, InputOutcome, KleosOutcome, MarkConfig,
    SendOutcome,
};

struct Harness {
    conductor: Conductor,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    chat_resets: Arc<Mutex<usize>>,
    memory: InMemoryMemory,
    log: InMemoryLog,
    sink: RecordingSink,
    prompter: ScriptedPrompter,
}

fn test_config() -> MarkConfig {
    let mut config = MarkConfig::default();
    config.default_provider = "MOCK".to_string();
    config.default_model = "mock-model".to_string();
    config.pacing = Duration::ZERO;
    config
}

fn harness(provider: MockProvider, memory: InMemoryMemory) -> Harness {
    harness_with(test_config(), provider, memory)
}

fn harness_with(config: MarkConfig, provider: MockProvider, memory: InMemoryMemory) -> Harness {
    let log = InMemoryLog::default();
    let requests = provider.requests();
    let chat_resets = provider.chat_resets();
    let conductor = Conductor::new(
        config,
        Some(Box::new(provider)),
        Box::new(memory.clone()),
        Box::new(log.clone()),
    );
    Harness {
        conductor,
        requests,
        chat_resets,
        memory,
        log,
        sink: RecordingSink::default(),
        prompter: ScriptedPrompter::default(),
    }
}

impl Harness {
    async fn input(&mut self, line: &str) -> InputOutcome {
        self.conductor
            .handle_input(line, &mut self.sink, &mut self.prompter, &CancelToken::new())
            .await
    }
}

// =============================================================================
// Send Path
// =============================================================================

#[tokio::test]
async fn test_send_builds_request_and_records_exchange() {
    let memory = InMemoryMemory::with(&[("nome", "Marco")]);
    let mut h = harness(
        MockProvider::new(vec![Script::Reply(vec!["Ciao ", "Marco"])]),
        memory,
    );

    let outcome = h.input("  Hello  ").await;

    let InputOutcome::Sent(SendOutcome::Completed { stats }) = outcome else {
        panic!("Expected a completed send, got {outcome:?}");
    };
    assert_eq!(stats.tokens_in, 1);
    assert_eq!(stats.tokens_out, 2);
    assert!(stats.ttft.is_some());

    let requests = h.requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].message, "Hello");
    assert!(requests[0].history.is_empty());
    assert_eq!(requests[0].memories.as_deref(), Some("- [nome] Marco"));
    let system = requests[0].system_prompt.as_deref().unwrap();
    assert!(system.starts_with("You are MARK"));
    assert!(system.contains("User"));

    let messages = h.conductor.context().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].content, "Hello");
    assert_eq!(messages[1].content, "Ciao Marco");

    let entries = h.log.entries.lock().clone();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].provider, "MOCK");
    assert_eq!(entries[0].model, "mock-model");
    assert_eq!(entries[0].assistant, "Ciao Marco");

    assert_eq!(h.sink.final_texts(), vec!["Ciao Marco".to_string()]);
    assert!(h.sink.has_notice(NotifyLevel::Info, "TTFT"));
}

#[tokio::test]
async fn test_history_is_sent_on_next_turn() {
    let mut h = harness(
        MockProvider::new(vec![
            Script::Reply(vec!["first answer"]),
            Script::Reply(vec!["second answer"]),
        ]),
        InMemoryMemory::default(),
    );

    h.input("first").await;
    h.input("second").await;

    let requests = h.requests.lock().clone();
    let history: Vec<&str> = requests[1].history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(history, vec!["first", "first answer"]);
    assert!(requests[1].memories.is_none());
    assert_eq!(h.conductor.context().len(), 4);
}

#[tokio::test]
async fn test_auto_save_off_skips_log() {
    let mut config = test_config();
    config.auto_save = false;
    let mut h = harness_with(config, MockProvider::new(vec![]), InMemoryMemory::default());

    h.input("hello").await;

    assert_eq!(h.conductor.context().len(), 2);
    assert!(h.log.entries.lock().is_empty());
}

#[tokio::test]
async fn test_credential_rejection_is_reported() {
    let mut h = harness(
        MockProvider::new(vec![Script::Fail(ProviderError::InvalidCredential {
            provider: "MOCK".to_string(),
        })]),
        InMemoryMemory::default(),
    );

    let outcome = h.input("hello").await;

    assert_eq!(outcome, InputOutcome::Sent(SendOutcome::CredentialRejected));
    assert!(h.sink.has_notice(NotifyLevel::Error, "Invalid API key for MOCK"));
    assert!(h.sink.has_notice(NotifyLevel::Error, "/model"));
    assert!(h.conductor.context().is_empty());
    assert!(h.log.entries.lock().is_empty());
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_partial_text() {
    let error = ProviderError::Unknown("connection reset".to_string());
    let mut h = harness(
        MockProvider::new(vec![Script::FailMidStream("Partial", error.clone())]),
        InMemoryMemory::default(),
    );

    let outcome = h.input("hello").await;

    assert_eq!(outcome, InputOutcome::Sent(SendOutcome::Failed(error)));
    assert_eq!(h.sink.final_texts(), vec!["Partial".to_string()]);
    assert_eq!(h.conductor.context().messages()[1].content, "Partial");
    assert!(h.sink.has_notice(NotifyLevel::Error, "connection reset"));
    assert!(!h.sink.has_notice(NotifyLevel::Info, "TTFT"));
}

#[tokio::test]
async fn test_cancelled_send_keeps_marked_partial() {
    let provider = MockProvider::new(vec![Script::Reply(vec!["Hel", "lo"])])
        .with_delay(Duration::from_millis(150));
    let mut h = harness(provider, InMemoryMemory::default());
    let cancel = CancelToken::new();
    let mut sink = RecordingSink::cancelling_on("Hel", cancel.clone());

    let outcome = h
        .conductor
        .handle_input("hello", &mut sink, &mut h.prompter, &cancel)
        .await;

    assert_eq!(outcome, InputOutcome::Sent(SendOutcome::Cancelled));
    let expected = "Hel\n\n*[Response stopped]*";
    assert_eq!(h.conductor.context().messages()[1].content, expected);
    assert_eq!(h.log.entries.lock()[0].assistant, expected);
    assert!(!sink.has_notice(NotifyLevel::Info, "TTFT"));
}

#[tokio::test]
async fn test_no_provider() {
    let log = InMemoryLog::default();
    let mut conductor = Conductor::new(
        test_config(),
        None,
        Box::new(InMemoryMemory::default()),
        Box::new(log.clone()),
    );
    let mut sink = RecordingSink::default();
    let mut prompter = ScriptedPrompter::default();
    let cancel = CancelToken::new();

    let outcome = conductor
        .handle_input("hello", &mut sink, &mut prompter, &cancel)
        .await;
    assert_eq!(outcome, InputOutcome::Sent(SendOutcome::NoProvider));
    assert!(sink.has_notice(NotifyLevel::Error, "No AI model selected."));

    let outcome = conductor
        .handle_input("/kleos plan a trip", &mut sink, &mut prompter, &cancel)
        .await;
    assert_eq!(outcome, InputOutcome::Command(CommandOutcome::Shown));
    assert!(prompter.asked.is_empty());
    assert!(!conductor.select_model("mock-model"));
    assert!(conductor.context().is_empty());
}

// =============================================================================
// Memory Commands
// =============================================================================

#[tokio::test]
async fn test_memory_command_is_saved_not_sent() {
    let mut h = harness(MockProvider::new(vec![]), InMemoryMemory::default());

    let outcome = h.input("Ricorda che mi chiamo Marco").await;

    let InputOutcome::MemorySaved(record) = outcome else {
        panic!("Expected a saved memory, got {outcome:?}");
    };
    assert_eq!(record.key, "nome");
    assert_eq!(record.value, "mi chiamo Marco");
    assert_eq!(h.memory.len(), 1);
    assert!(h.requests.lock().is_empty());
    assert!(h.conductor.context().is_empty());
    assert!(h
        .sink
        .has_notice(NotifyLevel::Success, "Saved to memory: [nome] mi chiamo Marco"));
}

#[tokio::test]
async fn test_memory_slash_commands() {
    let memory = InMemoryMemory::with(&[("nome", "Marco"), ("lavoro", "sviluppatore Rust")]);
    let mut h = harness(MockProvider::new(vec![]), memory);

    h.input("/memory").await;
    assert!(h.sink.has_notice(NotifyLevel::Info, "#1 [nome] Marco"));
    assert!(h.sink.has_notice(NotifyLevel::Info, "#2 [lavoro] sviluppatore Rust"));

    h.input("/memory search RUST").await;
    let (last, _) = h.sink.notices.last().unwrap();
    assert!(last.starts_with("#2 [lavoro]"));
    assert!(!last.contains("[nome]"));

    h.input("/memory delete 1").await;
    assert!(h.sink.has_notice(NotifyLevel::Success, "Memory #1 deleted."));
    h.input("/memory delete 1").await;
    assert!(h.sink.has_notice(NotifyLevel::Error, "Memory #1 not found."));
    h.input("/memory delete one").await;
    assert!(h.sink.has_notice(NotifyLevel::Error, "Invalid memory ID."));

    h.input("/memory clear").await;
    assert!(h.sink.has_notice(NotifyLevel::Warning, "Deleted 1 memories."));
    assert_eq!(h.memory.len(), 0);

    h.input("/memory search anything").await;
    assert!(h.sink.has_notice(NotifyLevel::Info, "No memories found."));
}

// =============================================================================
// Slash Commands
// =============================================================================

#[tokio::test]
async fn test_reset_clears_context_usage_and_chat() {
    let mut h = harness(MockProvider::new(vec![]), InMemoryMemory::default());
    h.input("hello").await;
    assert_eq!(
        h.conductor.provider().unwrap().session_usage().requests_count,
        1
    );

    let outcome = h.input("/RESET").await;

    assert_eq!(outcome, InputOutcome::Command(CommandOutcome::Shown));
    assert!(h.conductor.context().is_empty());
    assert!(h.conductor.provider().unwrap().session_usage().is_empty());
    assert_eq!(*h.chat_resets.lock(), 1);
    assert!(h.sink.has_notice(NotifyLevel::Success, "Session reset."));
    // The saved log is not touched
    assert_eq!(h.log.entries.lock().len(), 1);
}

#[tokio::test]
async fn test_simple_commands() {
    let mut h = harness(MockProvider::new(vec![]), InMemoryMemory::default());

    assert_eq!(h.input("   ").await, InputOutcome::Empty);
    assert_eq!(h.input("/quit").await, InputOutcome::Quit);
    assert_eq!(
        h.input("/cls").await,
        InputOutcome::Command(CommandOutcome::ClearScreen)
    );
    assert_eq!(
        h.input("/model").await,
        InputOutcome::Command(CommandOutcome::SelectModel)
    );

    h.input("/help").await;
    assert!(h.sink.has_notice(NotifyLevel::Info, "/kleos"));

    h.input("/kleos").await;
    assert!(h.sink.has_notice(NotifyLevel::Warning, "Usage: /kleos <prompt>"));

    h.input("/changeusr").await;
    assert!(h
        .sink
        .has_notice(NotifyLevel::Warning, "Usage: /changeusr <new_name>"));

    h.input("/frobnicate now").await;
    assert!(h.sink.has_notice(
        NotifyLevel::Warning,
        "Unknown command: /frobnicate\nUse /help to see commands."
    ));
    assert!(h.requests.lock().is_empty());
}

#[tokio::test]
async fn test_stats_report() {
    let mut h = harness(MockProvider::new(vec![]), InMemoryMemory::default());
    h.input("hello").await;

    h.input("/stats").await;

    let (report, _) = h.sink.notices.last().unwrap().clone();
    assert!(report.starts_with("DETAILED STATISTICS"));
    assert!(report.contains("Requests       1"));
    assert!(report.contains("Exchanges      1"));
    assert!(report.contains("Model          mock-model"));
}

#[tokio::test]
async fn test_toggle_stats_hides_summary() {
    let mut h = harness(MockProvider::new(vec![]), InMemoryMemory::default());

    h.input("/ts").await;
    assert!(!h.conductor.config().show_stats);
    assert!(h
        .sink
        .has_notice(NotifyLevel::Success, "Response statistics disabled."));

    h.input("hello").await;
    assert!(!h.sink.has_notice(NotifyLevel::Info, "TTFT"));
}

#[tokio::test]
async fn test_theme_command() {
    let mut h = harness(MockProvider::new(vec![]), InMemoryMemory::default());

    assert_eq!(
        h.input("/theme Nord").await,
        InputOutcome::Command(CommandOutcome::ThemeChanged("nord".to_string()))
    );
    assert_eq!(h.conductor.config().theme, "nord");

    assert_eq!(
        h.input("/theme pink").await,
        InputOutcome::Command(CommandOutcome::Shown)
    );
    assert_eq!(h.conductor.config().theme, "nord");
    assert!(h.sink.has_notice(
        NotifyLevel::Error,
        "Theme 'pink' not found.\nAvailable: red, hl3, matrix, cyberpunk, synthwave, dracula, nord, monokai"
    ));

    h.input("/theme").await;
    assert!(h.sink.has_notice(NotifyLevel::Info, "Usage: /theme <name>"));
}

#[tokio::test]
async fn test_change_user_is_persisted_and_used() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let mut config = test_config();
    config.config_file_path = Some(path.clone());
    let mut h = harness_with(config, MockProvider::new(vec![]), InMemoryMemory::default());

    h.input("/changeusr Marco Rossi").await;
    assert!(h
        .sink
        .has_notice(NotifyLevel::Success, "User name updated to: Marco Rossi"));

    let saved = load_config_from_path(Some(path)).unwrap();
    assert_eq!(saved.user_name, "Marco Rossi");

    h.input("hello").await;
    let requests = h.requests.lock();
    assert!(requests[0]
        .system_prompt
        .as_deref()
        .unwrap()
        .contains("Marco Rossi"));
}

#[tokio::test]
async fn test_kleos_command_runs_pipeline() {
    let mut h = harness(
        MockProvider::new(vec![
            Script::Reply(vec!["1. Where?"]),
            Script::Reply(vec!["Plan a week in Rome"]),
            Script::Reply(vec!["Day 1: Colosseum"]),
        ]),
        InMemoryMemory::default(),
    );
    h.prompter = ScriptedPrompter::new(&["Rome, one week", "y"]);

    let outcome = h.input("/Kleos Plan a trip").await;

    assert_eq!(
        outcome,
        InputOutcome::Command(CommandOutcome::Kleos(KleosOutcome::Done {
            answer: "Day 1: Colosseum".to_string()
        }))
    );
    let messages = h.conductor.context().messages();
    assert_eq!(messages[0].content, "Plan a trip");
    assert_eq!(messages[1].content, "Day 1: Colosseum");
    assert_eq!(h.log.entries.lock()[0].user, "Plan a trip");
}

// =============================================================================
// Provider and Model Switching
// =============================================================================

#[tokio::test]
async fn test_switch_provider_keeps_context() {
    let mut h = harness(MockProvider::new(vec![]), InMemoryMemory::default());
    h.input("hello").await;

    let next = MockProvider::new(vec![Script::Reply(vec!["from the new one"])]);
    let next_requests = next.requests();
    let next_resets = next.chat_resets();
    h.conductor.switch_provider(Box::new(next), "groq");

    assert_eq!(h.conductor.config().default_provider, "groq");
    assert_eq!(h.conductor.config().default_model, "mock-model");
    assert_eq!(*next_resets.lock(), 1);
    assert_eq!(h.conductor.context().len(), 2);

    h.input("and now?").await;
    let requests = next_requests.lock();
    assert_eq!(requests[0].history.len(), 2);
    assert_eq!(requests[0].history[0].content, "hello");
}

#[tokio::test]
async fn test_select_model() {
    let mut h = harness(MockProvider::new(vec![]), InMemoryMemory::default());

    assert!(h.conductor.select_model("mock-large"));
    assert_eq!(h.conductor.config().default_model, "mock-large");
    assert_eq!(h.conductor.provider().unwrap().model(), "mock-large");

    assert!(!h.conductor.select_model("gpt-4"));
    assert_eq!(h.conductor.config().default_model, "mock-large");
}
