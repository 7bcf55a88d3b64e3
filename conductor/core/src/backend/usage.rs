//! Token usage accounting
//!
//! Per-call [`UsageStats`] are built once by an adapter when a call completes.
//! Each provider instance owns one [`SessionUsage`] accumulator that only grows
//! until the user resets it.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Token counters for one call, or accumulated over a session
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    /// Prompt tokens
    pub tokens_input: u64,
    /// Completion tokens
    pub tokens_output: u64,
    /// Always `tokens_input + tokens_output`
    pub tokens_total: u64,
    /// Completed calls
    pub requests_count: u64,
    /// Requests left in the current rate-limit window, if reported
    pub rate_limit_remaining: Option<u64>,
    /// When the rate-limit window resets, as reported by the backend
    pub rate_limit_reset: Option<String>,
}

impl UsageStats {
    /// Usage of a single completed call
    #[must_use]
    pub fn from_counts(tokens_input: u64, tokens_output: u64) -> Self {
        Self {
            tokens_input,
            tokens_output,
            tokens_total: tokens_input + tokens_output,
            requests_count: 1,
            rate_limit_remaining: None,
            rate_limit_reset: None,
        }
    }

    /// Attach rate-limit observations
    #[must_use]
    pub fn with_rate_limit(mut self, remaining: Option<u64>, reset: Option<String>) -> Self {
        self.rate_limit_remaining = remaining;
        self.rate_limit_reset = reset;
        self
    }

    /// Whether nothing has been counted yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests_count == 0 && self.tokens_total == 0
    }
}

/// Session accumulator shared with spawned stream tasks
///
/// Cloning yields a handle to the same counters.
#[derive(Clone, Debug, Default)]
pub struct SessionUsage {
    inner: Arc<Mutex<UsageStats>>,
}

impl SessionUsage {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one completed call
    ///
    /// Counters only grow; rate-limit fields keep the latest observed values.
    pub fn record(&self, call: &UsageStats) {
        let mut total = self.inner.lock();
        total.tokens_input += call.tokens_input;
        total.tokens_output += call.tokens_output;
        total.tokens_total = total.tokens_input + total.tokens_output;
        total.requests_count += 1;
        if call.rate_limit_remaining.is_some() {
            total.rate_limit_remaining = call.rate_limit_remaining;
        }
        if call.rate_limit_reset.is_some() {
            total.rate_limit_reset.clone_from(&call.rate_limit_reset);
        }
    }

    /// Current totals
    #[must_use]
    pub fn snapshot(&self) -> UsageStats {
        self.inner.lock().clone()
    }

    /// Zero every counter
    pub fn reset(&self) {
        *self.inner.lock() = UsageStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_counts_computes_total() {
        let usage = UsageStats::from_counts(12, 30);
        assert_eq!(usage.tokens_total, 42);
        assert_eq!(usage.requests_count, 1);
    }

    #[test]
    fn test_record_sums_calls() {
        let session = SessionUsage::new();
        let calls = [(10, 5), (7, 3), (0, 0)];
        for (input, output) in calls {
            session.record(&UsageStats::from_counts(input, output));
        }

        let total = session.snapshot();
        assert_eq!(total.tokens_input, 17);
        assert_eq!(total.tokens_output, 8);
        assert_eq!(total.tokens_total, 25);
        assert_eq!(total.requests_count, 3);
    }

    #[test]
    fn test_rate_limit_keeps_latest_observation() {
        let session = SessionUsage::new();
        session.record(
            &UsageStats::from_counts(1, 1).with_rate_limit(Some(99), Some("2s".to_string())),
        );
        session.record(&UsageStats::from_counts(1, 1));
        session.record(&UsageStats::from_counts(1, 1).with_rate_limit(Some(97), None));

        let total = session.snapshot();
        assert_eq!(total.rate_limit_remaining, Some(97));
        assert_eq!(total.rate_limit_reset.as_deref(), Some("2s"));
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let session = SessionUsage::new();
        session.record(&UsageStats::from_counts(4, 4));
        session.reset();
        assert_eq!(session.snapshot(), UsageStats::default());
        assert!(session.snapshot().is_empty());
    }

    #[test]
    fn test_clones_share_counters() {
        let session = SessionUsage::new();
        let handle = session.clone();
        handle.record(&UsageStats::from_counts(2, 3));
        assert_eq!(session.snapshot().tokens_total, 5);
    }
}
