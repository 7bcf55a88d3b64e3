//! Line input from stdin
//!
//! A single reader is shared by the main loop and the Kleos questions, so no
//! buffered input is ever lost between them.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use mark_core::{CancelToken, UserPrompter};

/// How often a pending question checks for Ctrl+C
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Reads lines from stdin
pub struct StdinPrompter {
    lines: Lines<BufReader<Stdin>>,
    cancel: CancelToken,
}

impl StdinPrompter {
    /// Reader whose questions give up when `cancel` fires
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            cancel,
        }
    }

    /// Print `prompt` and read one line; `None` at end of input
    pub async fn read_line(&mut self, prompt: &str) -> Option<String> {
        show_prompt(prompt);
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stdin");
                None
            }
        }
    }
}

fn show_prompt(prompt: &str) {
    let mut out = std::io::stdout();
    let _ = write!(out, "{prompt}");
    let _ = out.flush();
}

async fn cancelled(cancel: &CancelToken) {
    while !cancel.is_cancelled() {
        tokio::time::sleep(CANCEL_POLL).await;
    }
}

#[async_trait]
impl UserPrompter for StdinPrompter {
    async fn ask(&mut self, prompt: &str) -> String {
        show_prompt(prompt);
        tokio::select! {
            line = self.lines.next_line() => match line {
                Ok(Some(line)) => line.trim().to_string(),
                Ok(None) => String::new(),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read stdin");
                    String::new()
                }
            },
            () = cancelled(&self.cancel) => {
                println!();
                String::new()
            }
        }
    }
}
