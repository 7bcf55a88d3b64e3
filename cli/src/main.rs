//! MARK - terminal AI assistant
//!
//! # Usage
//!
//! ```bash
//! # Start with the saved provider and model
//! mark
//!
//! # One-off provider / model
//! mark --provider groq --model llama-3.3-70b-versatile
//!
//! # Alternate configuration file
//! mark --config ~/mark-work.toml
//!
//! # Verbose logging to stderr instead of the log file
//! RUST_LOG=debug mark --log-stderr
//! ```
//!
//! # Signals
//!
//! - `Ctrl+C` while a response streams: stop it, keeping the partial text
//! - `Ctrl+C` at the prompt: exit

mod prompter;
mod setup;
mod store;
mod terminal;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use mark_core::{
    default_config_path, load_config_from_path, mark_home, CancelToken, CommandOutcome, Conductor,
    ConfigOverrides, InputOutcome, SendOutcome,
};

use prompter::StdinPrompter;
use store::{FileCredentialStore, JsonMemoryStore, JsonlConversationLog};
use terminal::{clock, TerminalSink, Theme};

/// MARK - terminal AI assistant
#[derive(Parser, Debug)]
#[command(name = "mark")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Provider id (GOOGLE, groq, LOCAL, gguf)
    #[arg(short = 'p', long, value_name = "ID")]
    provider: Option<String>,

    /// Model id, or a .gguf path for the gguf provider
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// Answer language (en, it)
    #[arg(long, value_name = "CODE")]
    language: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "MARK_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "MARK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log to stderr instead of the log file
    #[arg(long)]
    log_stderr: bool,
}

/// Initialize logging
///
/// Logs go to a daily file under `<home>/logs` so they never interleave with
/// streamed output. The returned guard flushes the file on drop.
fn init_logging(home: &Path, level: &str, stderr: bool) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("mark={level},mark_core={level}")));

    if stderr {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;
        return Ok(None);
    }

    let log_dir = home.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "mark.log"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;
    Ok(Some(guard))
}

/// Ctrl+C stops the running response, or exits at the prompt
fn spawn_interrupt_handler(cancel: CancelToken, busy: Arc<AtomicBool>) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("Ctrl+C handler unavailable");
                return;
            }
            if busy.load(Ordering::SeqCst) {
                info!("Interrupt: stopping response");
                cancel.cancel();
            } else {
                println!();
                std::process::exit(130);
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let home = mark_home();
    let _log_guard = init_logging(&home, &args.log_level, args.log_stderr)?;

    info!(version = env!("CARGO_PKG_VERSION"), home = %home.display(), "Starting MARK");

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config = load_config_from_path(Some(config_path)).context("Failed to load config")?;
    ConfigOverrides {
        provider: args.provider,
        model: args.model,
        language: args.language,
    }
    .apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let memory = JsonMemoryStore::open(home.join("memories.json"))?;
    let log = JsonlConversationLog::new(home.join("conversations.jsonl"));
    let creds = FileCredentialStore::new(home.join("credentials.toml"));

    let provider = setup::initial_provider(&config, &creds);
    let mut sink = TerminalSink::new(std::io::stdout(), Theme::named(&config.theme));
    let mut conductor = Conductor::new(config, provider, Box::new(memory), Box::new(log));

    let cancel = CancelToken::new();
    let busy = Arc::new(AtomicBool::new(false));
    spawn_interrupt_handler(cancel.clone(), Arc::clone(&busy));
    let mut prompter = StdinPrompter::new(cancel.clone());

    sink.banner(
        conductor
            .provider()
            .map(|p| (p.name(), p.model())),
    )?;
    if conductor.provider().is_none() {
        setup::select_model(&mut conductor, &mut sink, &mut prompter, &creds).await;
    }

    loop {
        sink.prompt(&format!("[{}] {} > ", clock(), conductor.config().user_name))?;
        let Some(line) = prompter.read_line("").await else {
            break;
        };

        cancel.reset();
        busy.store(true, Ordering::SeqCst);
        let outcome = conductor
            .handle_input(&line, &mut sink, &mut prompter, &cancel)
            .await;
        busy.store(false, Ordering::SeqCst);

        match outcome {
            InputOutcome::Quit => break,
            InputOutcome::Command(CommandOutcome::ClearScreen) => sink.clear_screen()?,
            InputOutcome::Command(CommandOutcome::SelectModel) => {
                setup::select_model(&mut conductor, &mut sink, &mut prompter, &creds).await;
            }
            InputOutcome::Command(CommandOutcome::ThemeChanged(name)) => {
                sink.set_theme(Theme::named(&name));
            }
            InputOutcome::Sent(SendOutcome::CredentialRejected) => {
                setup::reenter_credential(&mut conductor, &mut sink, &mut prompter, &creds).await;
            }
            InputOutcome::Sent(SendOutcome::NoProvider) => {
                setup::select_model(&mut conductor, &mut sink, &mut prompter, &creds).await;
            }
            _ => {}
        }
    }

    info!("MARK exiting");
    println!("Goodbye.");
    Ok(())
}
