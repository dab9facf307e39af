//! Unified error type for the LLM gateway.
//!
//! Goals:
//! - Single root [`LlmError`] for all public functions.
//! - HTTP-aware mapping (401 → Unauthorized, 429 → RateLimited, 5xx → Server).
//! - A `is_transient()` classifier so call sites can decide whether a
//!   bounded retry is safe.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias for gateway operations.
pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Root error type for `llm-gateway`.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Configuration problems detected at construction time.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The provider in the config does not match the service being built.
    #[error("invalid provider for this service")]
    InvalidProvider,

    /// Invalid endpoint (empty or missing http/https scheme).
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// API key required but absent.
    #[error("missing api key")]
    MissingApiKey,

    /// Unauthorized (HTTP 401/403) — credentials rejected by the provider.
    #[error("unauthorized")]
    Unauthorized,

    /// The provider does not know the requested model (HTTP 404 on model routes).
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Rate limited (HTTP 429).
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Request exceeded its timeout.
    #[error("timeout")]
    Timeout,

    /// Non-successful HTTP status not covered above.
    #[error("unexpected HTTP status {status} from {url}: {snippet}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        snippet: String,
    },

    /// Transport-level failure without a status (DNS/connect/reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// Unexpected/invalid JSON in a provider response.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Chat completion returned no choices.
    #[error("empty choices in completion response")]
    EmptyChoices,

    /// Structured-output payload did not match the requested schema.
    #[error("schema violation for {schema}: {detail}")]
    SchemaViolation {
        schema: &'static str,
        detail: String,
    },
}

impl LlmError {
    /// Whether a bounded retry is worthwhile for this error.
    ///
    /// Only failures that may resolve on their own qualify; auth errors,
    /// unknown models and schema violations are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::Timeout | LlmError::Transport(_) => true,
            LlmError::HttpStatus { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return LlmError::Timeout;
        }
        if let Some(status) = e.status() {
            return match status.as_u16() {
                401 | 403 => LlmError::Unauthorized,
                429 => LlmError::RateLimited {
                    retry_after_secs: None,
                },
                _ => LlmError::HttpStatus {
                    status,
                    url: e.url().map(|u| u.to_string()).unwrap_or_default(),
                    snippet: String::new(),
                },
            };
        }
        LlmError::Transport(e.to_string())
    }
}

/// Error enum for environment/config-driven setup.
///
/// Keep this focused: only errors that realistically happen at config
/// load/validation time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A number failed to parse (ports, limits, timeouts).
    #[error("invalid number in {var}: {reason}")]
    InvalidNumber {
        var: &'static str,
        reason: &'static str,
    },

    /// Unsupported provider in `LLM_KIND`.
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Value had the wrong format (e.g. invalid URL).
    #[error("invalid format in {var}: {reason}")]
    InvalidFormat {
        var: &'static str,
        reason: &'static str,
    },
}

/* ------------------------ Env helpers ------------------------ */

/// Fetches a required, non-empty environment variable.
pub fn must_env(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

/// Parses an optional `u32` from env (`Ok(None)` if unset/empty).
pub fn env_opt_u32(name: &'static str) -> Result<Option<u32>, ConfigError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => {
            v.parse::<u32>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidNumber {
                    var: name,
                    reason: "expected u32",
                })
        }
        _ => Ok(None),
    }
}

/// Builds a short, log-safe snippet from a response body.
pub fn make_snippet(body: &str) -> String {
    body.chars().take(240).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(LlmError::Timeout.is_transient());
        assert!(
            LlmError::RateLimited {
                retry_after_secs: None
            }
            .is_transient()
        );
        assert!(
            LlmError::HttpStatus {
                status: StatusCode::BAD_GATEWAY,
                url: "http://x".into(),
                snippet: String::new(),
            }
            .is_transient()
        );
        assert!(!LlmError::Unauthorized.is_transient());
        assert!(!LlmError::UnknownModel("m".into()).is_transient());
        assert!(
            !LlmError::SchemaViolation {
                schema: "ReviewPlan",
                detail: "missing field".into(),
            }
            .is_transient()
        );
    }
}
