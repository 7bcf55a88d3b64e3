//! Stream Orchestrator Implementation
//!
//! Drives one provider stream into a [`DisplaySink`] under a cancellation
//! signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

use crate::backend::{ProviderError, StreamingToken, TokenStream, UsageStats};
use crate::messages::{NotifyLevel, ResponseMetadata};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the stream orchestrator
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Minimum time between display refreshes
    /// Default: 16ms (~60 FPS)
    pub refresh_interval: Duration,
    /// Pause after each fragment so the runtime stays responsive
    pub pacing: Duration,
    /// Appended to the text when the user stops a response
    pub stopped_marker: String,
    /// Shown after partial text while streaming
    pub cursor: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_millis(16),
            pacing: Duration::from_millis(1),
            stopped_marker: "\n\n*[Response stopped]*".to_string(),
            cursor: "▌".to_string(),
        }
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation flag for one request
///
/// Clones share the flag. Set from a signal handler, polled by the
/// orchestrator at every refresh tick.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an unset token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag before the next request
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Display Sink
// ============================================================================

/// Where streamed text is rendered
///
/// The core never writes to the terminal itself; surfaces implement this.
pub trait DisplaySink: Send {
    /// Replace the in-progress rendering with `text`
    fn show_partial(&mut self, text: &str, meta: &ResponseMetadata);

    /// Commit the final text; called exactly once per stream
    fn show_final(&mut self, text: &str, meta: &ResponseMetadata);

    /// Replace the in-progress rendering with a status line
    fn show_status(&mut self, status: &str, meta: &ResponseMetadata) {
        self.show_partial(status, meta);
    }

    /// A system notice outside of any response
    fn show_system(&mut self, _text: &str, _level: NotifyLevel) {}

    /// An error with an optional recovery hint
    fn show_error(&mut self, message: &str, suggestion: Option<&str>) {
        let text = match suggestion {
            Some(hint) => format!("{message}\n{hint}"),
            None => message.to_string(),
        };
        self.show_system(&text, NotifyLevel::Error);
    }
}

/// How progress is displayed while the stream runs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayMode {
    /// Show partial text with a cursor
    #[default]
    Incremental,
    /// Show only an elapsed-time indicator until the final text
    ThinkingOnly,
}

const SPINNER: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

fn thinking_status(elapsed: Duration) -> String {
    let frame = SPINNER[(elapsed.as_millis() / 80) as usize % SPINNER.len()];
    format!("{frame} Thinking for {}s", elapsed.as_secs())
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Result of driving one stream
#[derive(Clone, Debug, Default)]
pub struct StreamOutcome {
    /// Final committed text (including the stop marker when cancelled)
    pub text: String,
    /// Time to first fragment
    pub ttft: Option<Duration>,
    /// Total time
    pub elapsed: Duration,
    /// Whether the user stopped the response
    pub cancelled: bool,
    /// Error that ended the stream early; partial text was still committed
    pub error: Option<ProviderError>,
    /// Usage reported on completion
    pub usage: Option<UsageStats>,
}

impl StreamOutcome {
    /// Whether the stream ran to completion
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.error.is_none()
    }
}

/// Drives fragment streams into display sinks
#[derive(Clone, Debug, Default)]
pub struct StreamOrchestrator {
    config: OrchestratorConfig,
}

impl StreamOrchestrator {
    /// Create an orchestrator
    #[must_use]
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Consume `stream` until it ends, fails or `cancel` is set
    ///
    /// Never fails: errors end consumption and are returned in the outcome
    /// after the partial text has been committed. Dropping the stream on
    /// cancellation tells the producer to stop.
    pub async fn run(
        &self,
        mut stream: TokenStream,
        cancel: &CancelToken,
        sink: &mut dyn DisplaySink,
        meta: &ResponseMetadata,
        mode: DisplayMode,
    ) -> StreamOutcome {
        let start = Instant::now();
        let mut ticker = tokio::time::interval(self.config.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut outcome = StreamOutcome::default();
        let mut text = String::new();
        let mut dirty = false;

        loop {
            tokio::select! {
                biased;

                _ = ticker.tick() => {
                    if cancel.is_cancelled() {
                        tracing::debug!(chars = text.len(), "Stream cancelled by user");
                        outcome.cancelled = true;
                        break;
                    }
                    match mode {
                        DisplayMode::Incremental if dirty => {
                            sink.show_partial(&format!("{text}{}", self.config.cursor), meta);
                            dirty = false;
                        }
                        DisplayMode::ThinkingOnly => {
                            sink.show_status(&thinking_status(start.elapsed()), meta);
                        }
                        DisplayMode::Incremental => {}
                    }
                }

                event = stream.recv() => match event {
                    Some(StreamingToken::Token(fragment)) => {
                        if outcome.ttft.is_none() {
                            outcome.ttft = Some(start.elapsed());
                        }
                        text.push_str(&fragment);
                        dirty = true;
                        if !self.config.pacing.is_zero() {
                            tokio::time::sleep(self.config.pacing).await;
                        }
                    }
                    Some(StreamingToken::Complete { message, usage }) => {
                        if text.is_empty() && !message.is_empty() {
                            if outcome.ttft.is_none() {
                                outcome.ttft = Some(start.elapsed());
                            }
                            text = message;
                        }
                        outcome.usage = Some(usage);
                        break;
                    }
                    Some(StreamingToken::Error(e)) => {
                        tracing::warn!(error = %e, chars = text.len(), "Stream failed");
                        outcome.error = Some(e);
                        break;
                    }
                    None => break,
                },
            }
        }
        drop(stream);

        if outcome.cancelled {
            text.push_str(&self.config.stopped_marker);
        }
        sink.show_final(&text, meta);

        outcome.text = text;
        outcome.elapsed = start.elapsed();
        outcome
    }
}
