//! Server-sent event pump shared by the cloud adapters
//!
//! Reads an SSE response in a spawned task, forwards text fragments in order
//! and records usage once when the vendor stream ends. The task stops as soon
//! as the receiving side is dropped.

use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use tokio::sync::mpsc;

use super::error::{extract_error_message, ProviderError};
use super::traits::{StreamingToken, TokenStream, BLOCKED_NOTICE};
use super::usage::{SessionUsage, UsageStats};

/// What an adapter extracted from one SSE payload
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SseChunk {
    /// Text fragment, if any
    pub text: Option<String>,
    /// `(input, output)` token counts, usually only on the last chunk
    pub usage: Option<(u64, u64)>,
    /// Vendor finish reason
    pub finish_reason: Option<String>,
}

/// Called with the full text once the stream completes
pub(crate) type CompletionHook = Box<dyn FnOnce(&str) + Send>;

/// Rate-limit values observed on the response headers
#[derive(Clone, Debug, Default)]
pub(crate) struct RateLimitHeaders {
    pub remaining: Option<u64>,
    pub reset: Option<String>,
}

impl RateLimitHeaders {
    /// Read OpenAI-style `x-ratelimit-*-requests` headers
    pub(crate) fn from_response(response: &reqwest::Response) -> Self {
        let headers = response.headers();
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            remaining: read("x-ratelimit-remaining-requests").and_then(|v| v.parse().ok()),
            reset: read("x-ratelimit-reset-requests"),
        }
    }
}

/// Spawn the pump and return the fragment receiver
pub(crate) fn spawn_sse_stream<P>(
    provider: String,
    response: reqwest::Response,
    rate_limit: RateLimitHeaders,
    usage: SessionUsage,
    on_complete: Option<CompletionHook>,
    mut parse: P,
) -> TokenStream
where
    P: FnMut(&serde_json::Value) -> SseChunk + Send + 'static,
{
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        let mut stream = response.bytes_stream().eventsource();
        let mut full_response = String::new();
        let mut counts = (0, 0);
        let mut finish_reason = None;

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "SSE stream error");
                    let error = match e {
                        EventStreamError::Transport(e) => {
                            ProviderError::from_transport(&provider, &e)
                        }
                        other => ProviderError::Unknown(format!("SSE stream error: {other}")),
                    };
                    let _ = tx.send(StreamingToken::Error(error)).await;
                    return;
                }
            };

            let raw = event.data;
            if raw.trim() == "[DONE]" {
                break;
            }
            let json: serde_json::Value = match serde_json::from_str(&raw) {
                Ok(json) => json,
                Err(e) => {
                    tracing::debug!(provider = %provider, error = %e, "Skipping non-JSON SSE payload");
                    continue;
                }
            };
            if json.get("error").is_some() {
                let message = extract_error_message(&raw);
                tracing::warn!(provider = %provider, message = %message, "Error inside stream");
                let _ = tx
                    .send(StreamingToken::Error(ProviderError::from_stream_message(
                        &provider, &message,
                    )))
                    .await;
                return;
            }

            let chunk = parse(&json);
            if let Some(reported) = chunk.usage {
                counts = reported;
            }
            if chunk.finish_reason.is_some() {
                finish_reason = chunk.finish_reason;
            }
            if let Some(text) = chunk.text.filter(|t| !t.is_empty()) {
                full_response.push_str(&text);
                if tx.send(StreamingToken::Token(text)).await.is_err() {
                    // Receiver dropped, stop streaming
                    tracing::debug!(provider = %provider, "Stream consumer went away");
                    return;
                }
            }
        }

        if full_response.is_empty() && finish_reason.as_deref() == Some("SAFETY") {
            full_response.push_str(BLOCKED_NOTICE);
            if tx
                .send(StreamingToken::Token(BLOCKED_NOTICE.to_string()))
                .await
                .is_err()
            {
                return;
            }
        }

        let call = UsageStats::from_counts(counts.0, counts.1)
            .with_rate_limit(rate_limit.remaining, rate_limit.reset);
        usage.record(&call);
        if let Some(hook) = on_complete {
            hook(&full_response);
        }
        let _ = tx
            .send(StreamingToken::Complete {
                message: full_response,
                usage: call,
            })
            .await;
    });

    rx
}

/// A finished stream carrying a single notice, used for refused responses
pub(crate) fn notice_stream(notice: &str, usage: &SessionUsage) -> TokenStream {
    let (tx, rx) = mpsc::channel(2);
    let call = UsageStats::from_counts(0, 0);
    usage.record(&call);
    // Capacity 2 holds both events, so neither send can fail on a full channel
    let _ = tx.try_send(StreamingToken::Token(notice.to_string()));
    let _ = tx.try_send(StreamingToken::Complete {
        message: notice.to_string(),
        usage: call,
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notice_stream_records_usage_once() {
        let usage = SessionUsage::new();
        let mut rx = notice_stream(BLOCKED_NOTICE, &usage);

        match rx.recv().await {
            Some(StreamingToken::Token(text)) => assert_eq!(text, BLOCKED_NOTICE),
            other => panic!("Expected notice token, got {other:?}"),
        }
        assert!(matches!(
            rx.recv().await,
            Some(StreamingToken::Complete { .. })
        ));
        assert!(rx.recv().await.is_none());
        assert_eq!(usage.snapshot().requests_count, 1);
    }
}
