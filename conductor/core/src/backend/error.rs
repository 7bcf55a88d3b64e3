//! Provider failure taxonomy
//!
//! Every adapter maps its transport and vendor errors onto [`ProviderError`]
//! at the boundary, so the conductor can react to a category (re-enter
//! credential setup, tell the user to start a local server) without knowing
//! which backend failed.

use thiserror::Error;

/// Errors surfaced by providers
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The credential was rejected by the backend
    #[error("Invalid API key for {provider}")]
    InvalidCredential {
        /// Provider id
        provider: String,
    },

    /// The backend is throttling requests
    #[error("Rate limit exceeded for {provider}")]
    RateLimited {
        /// Provider id
        provider: String,
        /// Reset hint reported by the backend
        retry_after: Option<String>,
    },

    /// The backend refused to answer for safety reasons
    ///
    /// Adapters turn this into a normal response carrying a notice.
    #[error("Response blocked: {reason}")]
    ContentBlocked {
        /// Vendor block reason
        reason: String,
    },

    /// The backend could not be reached or loaded
    #[error("{provider} is unavailable: {message}")]
    BackendUnavailable {
        /// Provider id
        provider: String,
        /// What went wrong
        message: String,
    },

    /// Anything else, with the original message
    #[error("{0}")]
    Unknown(String),
}

impl ProviderError {
    /// Backend unreachable or not loaded
    pub fn unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// A user-facing hint for recovering from this error
    #[must_use]
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::InvalidCredential { .. } => {
                Some("Check your API key, or run /model to enter a new one.".to_string())
            }
            Self::RateLimited { retry_after, .. } => Some(match retry_after {
                Some(reset) => format!("Wait {reset} before retrying, or switch model with /model."),
                None => "Wait a moment before retrying, or switch model with /model.".to_string(),
            }),
            Self::ContentBlocked { .. } => Some("Try rephrasing your request.".to_string()),
            Self::BackendUnavailable { provider, .. } if provider == "LOCAL" => Some(
                "Cannot connect to Ollama. Make sure Ollama is running (ollama serve).".to_string(),
            ),
            Self::BackendUnavailable { .. } => {
                Some("Check your connection or select another provider with /model.".to_string())
            }
            Self::Unknown(_) => None,
        }
    }

    /// Whether the conductor should re-enter credential setup
    #[must_use]
    pub fn is_credential_error(&self) -> bool {
        matches!(self, Self::InvalidCredential { .. })
    }

    /// Classify a failed HTTP response
    ///
    /// Markers in the body win over the status code, since some vendors
    /// report a bad key as 400.
    #[must_use]
    pub fn from_http(provider: &str, status: u16, body: &str) -> Self {
        let upper = body.to_ascii_uppercase();
        if status == 401
            || upper.contains("API_KEY_INVALID")
            || upper.contains("INVALID_API_KEY")
            || upper.contains("INVALID API KEY")
        {
            return Self::InvalidCredential {
                provider: provider.to_string(),
            };
        }
        if status == 429 || upper.contains("RATE_LIMIT") || upper.contains("RESOURCE_EXHAUSTED") {
            return Self::RateLimited {
                provider: provider.to_string(),
                retry_after: None,
            };
        }
        if is_block_report(body) {
            return Self::ContentBlocked {
                reason: "SAFETY".to_string(),
            };
        }
        if status == 502 || status == 503 || status == 504 {
            return Self::unavailable(provider, format!("HTTP {status}"));
        }
        Self::Unknown(format!(
            "{provider} returned {status}: {}",
            extract_error_message(body)
        ))
    }

    /// Classify an error reported inside an otherwise successful stream
    #[must_use]
    pub fn from_stream_message(provider: &str, message: &str) -> Self {
        match Self::from_http(provider, 200, message) {
            Self::Unknown(_) => Self::Unknown(message.to_string()),
            classified => classified,
        }
    }

    /// Classify a transport failure
    ///
    /// Refused and timed-out connections, and bodies that break off while
    /// being read, mean the backend is unavailable. Only request sending and
    /// body streaming are classified here, never JSON decoding.
    #[must_use]
    pub fn from_transport(provider: &str, error: &reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() || error.is_body() || error.is_decode() {
            Self::unavailable(provider, error.to_string())
        } else {
            Self::Unknown(error.to_string())
        }
    }
}

/// Whether a body carries a vendor content-block marker
///
/// Only the markers vendors emit for a refused prompt or answer count: a
/// body that merely mentions safety (say, a rejected `safety_settings`
/// value) is a real error.
fn is_block_report(body: &str) -> bool {
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    compact.contains("\"blockReason\"")
        || compact.contains("\"finishReason\":\"SAFETY\"")
        || compact.contains("content_filter")
}

/// Pull a readable message out of a vendor error body
///
/// Handles `{"error": {"message": ...}}`, `{"error": "..."}` and plain text.
#[must_use]
pub fn extract_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(error) = json.get("error") {
            if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
                return message.to_string();
            }
            if let Some(message) = error.as_str() {
                return message.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.chars().count() > 200 {
        let cut: String = trimmed.chars().take(200).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}
