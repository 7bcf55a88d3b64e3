//! Streaming Infrastructure
//!
//! This module turns a provider's fragment stream into display updates. The
//! [`StreamOrchestrator`] owns the timing: when to refresh the surface, when to
//! look at the cancellation flag, and when to measure time to first token.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  StreamingToken   ┌────────────────────┐  show_partial  ┌─────────────┐
//! │   Provider   │ ────────────────▶ │ StreamOrchestrator │ ─────────────▶ │ DisplaySink │
//! │ (spawned task│    mpsc channel   │  select! {         │  show_final    │  (surface)  │
//! │  producer)   │ ◀──── drop ────── │   refresh tick,    │ ─────────────▶ │             │
//! └──────────────┘                   │   next fragment }  │                └─────────────┘
//!                                    └─────────▲──────────┘
//!                                              │ polled every tick
//!                                        ┌─────┴──────┐
//!                                        │ CancelToken│ ◀── Ctrl-C handler
//!                                        └────────────┘
//! ```
//!
//! # Features
//!
//! - **Bounded refresh rate**: the sink is refreshed at most every 16ms
//! - **Cooperative cancellation**: checked at every refresh tick
//! - **Always commits**: the final text is shown once, even after an error
//!
//! # Example
//!
//! ```ignore
//! use mark_core::streaming::{CancelToken, DisplayMode, StreamOrchestrator};
//!
//! let orchestrator = StreamOrchestrator::default();
//! let rx = provider.stream_message(&request).await?;
//! let outcome = orchestrator
//!     .run(rx, &CancelToken::new(), &mut sink, &meta, DisplayMode::Incremental)
//!     .await;
//! println!("ttft: {:?}", outcome.ttft);
//! ```

mod orchestrator;

pub use orchestrator::{
    CancelToken, DisplayMode, DisplaySink, OrchestratorConfig, StreamOrchestrator, StreamOutcome,
};

// Re-export StreamingToken from backend for convenience
pub use crate::backend::StreamingToken;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ProviderError, UsageStats};
    use crate::messages::ResponseMetadata;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingSink {
        partials: Vec<String>,
        statuses: Vec<String>,
        finals: Vec<String>,
    }

    impl DisplaySink for RecordingSink {
        fn show_partial(&mut self, text: &str, _meta: &ResponseMetadata) {
            self.partials.push(text.to_string());
        }
        fn show_final(&mut self, text: &str, _meta: &ResponseMetadata) {
            self.finals.push(text.to_string());
        }
        fn show_status(&mut self, status: &str, _meta: &ResponseMetadata) {
            self.statuses.push(status.to_string());
        }
    }

    #[tokio::test]
    async fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_error_commits_partial_text() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamingToken::Token("partial".to_string()))
            .await
            .unwrap();
        tx.send(StreamingToken::Error(ProviderError::Unknown("boom".to_string())))
            .await
            .unwrap();

        let mut sink = RecordingSink::default();
        let outcome = StreamOrchestrator::default()
            .run(
                rx,
                &CancelToken::new(),
                &mut sink,
                &ResponseMetadata::assistant("m"),
                DisplayMode::Incremental,
            )
            .await;

        assert_eq!(outcome.text, "partial");
        assert_eq!(sink.finals, vec!["partial".to_string()]);
        assert_eq!(outcome.error, Some(ProviderError::Unknown("boom".to_string())));
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn test_thinking_mode_shows_status_not_text() {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            tx.send(StreamingToken::Token("secret ".to_string())).await.ok();
            tokio::time::sleep(Duration::from_millis(60)).await;
            tx.send(StreamingToken::Token("answer".to_string())).await.ok();
            tx.send(StreamingToken::Complete {
                message: "secret answer".to_string(),
                usage: UsageStats::from_counts(1, 2),
            })
            .await
            .ok();
        });

        let mut sink = RecordingSink::default();
        let outcome = StreamOrchestrator::default()
            .run(
                rx,
                &CancelToken::new(),
                &mut sink,
                &ResponseMetadata::assistant("m"),
                DisplayMode::ThinkingOnly,
            )
            .await;

        assert!(sink.partials.is_empty());
        assert!(!sink.statuses.is_empty());
        assert!(sink.statuses.iter().all(|s| s.contains("Thinking for")));
        assert_eq!(sink.finals, vec!["secret answer".to_string()]);
        assert_eq!(outcome.usage.map(|u| u.tokens_total), Some(3));
    }

    #[tokio::test]
    async fn test_complete_message_used_when_no_fragments() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamingToken::Complete {
            message: "whole".to_string(),
            usage: UsageStats::default(),
        })
        .await
        .unwrap();

        let mut sink = RecordingSink::default();
        let outcome = StreamOrchestrator::default()
            .run(
                rx,
                &CancelToken::new(),
                &mut sink,
                &ResponseMetadata::assistant("m"),
                DisplayMode::Incremental,
            )
            .await;
        assert_eq!(outcome.text, "whole");
        assert!(outcome.is_complete());
    }
}
