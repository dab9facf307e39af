//! Crate-wide error hierarchy for the review pipeline.
//!
//! Goals:
//! - Single root `ReviewError` for all public functions.
//! - No dynamic dispatch; ergonomic `?` via `From` impls.
//! - Parse failures carry enough context for the repair loop and for
//!   callers deciding between "fail the stage" and "empty batch".

use thiserror::Error;

pub type ReviewResult<T> = std::result::Result<T, ReviewError>;

/// Root error type for the review pipeline.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Malformed request or missing required fields. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// LLM output could not be coerced into the target schema.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Gateway failure (transport, rate limit, provider).
    #[error(transparent)]
    Llm(#[from] llm_gateway::LlmError),

    /// Retrieval/indexing failure.
    #[error(transparent)]
    Rag(#[from] rag_engine::RagError),

    /// The request's cancellation signal fired.
    #[error("review cancelled")]
    Cancelled,
}

/// Structured-output parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// No JSON object could be located in the raw text.
    #[error("no JSON object found in response for {schema}")]
    NoJsonObject { schema: &'static str },

    /// JSON was found but did not validate against the schema.
    #[error("invalid {schema} payload: {detail}")]
    Invalid {
        schema: &'static str,
        detail: String,
    },

    /// The repair loop ran out of attempts.
    #[error("failed to parse {schema} after {attempts} repair attempts: {last_error}")]
    RepairExhausted {
        schema: &'static str,
        attempts: u32,
        last_error: String,
    },
}
