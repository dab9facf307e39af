//! Default LLM configs loaded strictly from environment variables.
//!
//! Convenience constructors for [`LlmModelConfig`], grouped by provider and
//! role:
//!
//! - **Slow**   → high-quality, slower model (review stages)
//! - **Fast**   → lower-quality, faster model (drafting/repair)
//! - **Embedding** → embedding generator
//!
//! # Environment variables
//!
//! Common:
//! - `LLM_KIND` = provider kind (`ollama` | `openai`), default `ollama`
//! - `LLM_MAX_TOKENS` = optional max tokens (u32)
//!
//! Ollama-specific:
//! - `OLLAMA_URL` or `OLLAMA_PORT` = endpoint (mandatory)
//! - `OLLAMA_MODEL`      = slow/quality model (mandatory)
//! - `OLLAMA_MODEL_FAST` = fast model (optional, falls back to slow)
//! - `EMBEDDING_MODEL`   = embedding model (mandatory)
//!
//! OpenAI-specific:
//! - `OPENAI_URL`     = API base (default `https://api.openai.com`)
//! - `OPENAI_API_KEY` = key (mandatory)
//! - `OPENAI_MODEL`, `OPENAI_MODEL_FAST`, `EMBEDDING_MODEL`

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    errors::{ConfigError, LlmError, env_opt_u32, must_env},
};

/// Resolves the Ollama endpoint strictly from environment.
///
/// Precedence:
/// 1. `OLLAMA_URL` if present and non-empty
/// 2. `OLLAMA_PORT` → `http://localhost:{port}`
fn ollama_endpoint() -> Result<String, LlmError> {
    if let Ok(url) = std::env::var("OLLAMA_URL") {
        if !url.trim().is_empty() {
            return Ok(url);
        }
    }
    if let Ok(port) = std::env::var("OLLAMA_PORT") {
        if !port.trim().is_empty() {
            let _ = port
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidNumber {
                    var: "OLLAMA_PORT",
                    reason: "expected u16 (1..=65535)",
                })?;
            return Ok(format!("http://localhost:{port}"));
        }
    }
    Err(LlmError::Config(ConfigError::MissingVar(
        "OLLAMA_URL or OLLAMA_PORT",
    )))
}

/// Constructs a config for the **slow/quality** Ollama model.
pub fn config_ollama_slow() -> Result<LlmModelConfig, LlmError> {
    let endpoint = ollama_endpoint()?;
    let model = must_env("OLLAMA_MODEL")?;
    let max_tokens = env_opt_u32("LLM_MAX_TOKENS")?;

    Ok(LlmModelConfig {
        provider: LlmProvider::Ollama,
        model,
        endpoint,
        api_key: None,
        max_tokens,
        temperature: Some(0.2),
        top_p: None,
        timeout_secs: Some(600),
    })
}

/// Constructs a config for the **fast** Ollama model, when configured.
pub fn config_ollama_fast() -> Result<Option<LlmModelConfig>, LlmError> {
    let model = match std::env::var("OLLAMA_MODEL_FAST") {
        Ok(m) if !m.trim().is_empty() => m,
        _ => return Ok(None),
    };
    let endpoint = ollama_endpoint()?;
    let max_tokens = env_opt_u32("LLM_MAX_TOKENS")?;

    Ok(Some(LlmModelConfig {
        provider: LlmProvider::Ollama,
        model,
        endpoint,
        api_key: None,
        max_tokens,
        temperature: Some(0.7),
        top_p: Some(0.9),
        timeout_secs: Some(600),
    }))
}

/// Constructs a config for the **embedding** Ollama model.
pub fn config_ollama_embedding() -> Result<LlmModelConfig, LlmError> {
    let endpoint = ollama_endpoint()?;
    let model = must_env("EMBEDDING_MODEL")?;

    Ok(LlmModelConfig {
        provider: LlmProvider::Ollama,
        model,
        endpoint,
        api_key: None,
        max_tokens: None,
        temperature: Some(0.0),
        top_p: None,
        timeout_secs: Some(120),
    })
}

fn openai_endpoint() -> String {
    std::env::var("OPENAI_URL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "https://api.openai.com".to_string())
}

/// Constructs a config for the **slow/quality** OpenAI model.
pub fn config_openai_slow() -> Result<LlmModelConfig, LlmError> {
    let api_key = must_env("OPENAI_API_KEY")?;
    let model = must_env("OPENAI_MODEL")?;
    let max_tokens = env_opt_u32("LLM_MAX_TOKENS")?;

    Ok(LlmModelConfig {
        provider: LlmProvider::OpenAI,
        model,
        endpoint: openai_endpoint(),
        api_key: Some(api_key),
        max_tokens,
        temperature: Some(0.2),
        top_p: None,
        timeout_secs: Some(600),
    })
}

/// Constructs a config for the **fast** OpenAI model, when configured.
pub fn config_openai_fast() -> Result<Option<LlmModelConfig>, LlmError> {
    let model = match std::env::var("OPENAI_MODEL_FAST") {
        Ok(m) if !m.trim().is_empty() => m,
        _ => return Ok(None),
    };
    let api_key = must_env("OPENAI_API_KEY")?;
    let max_tokens = env_opt_u32("LLM_MAX_TOKENS")?;

    Ok(Some(LlmModelConfig {
        provider: LlmProvider::OpenAI,
        model,
        endpoint: openai_endpoint(),
        api_key: Some(api_key),
        max_tokens,
        temperature: Some(0.7),
        top_p: Some(0.9),
        timeout_secs: Some(300),
    }))
}

/// Constructs a config for the **embedding** OpenAI model.
pub fn config_openai_embedding() -> Result<LlmModelConfig, LlmError> {
    let api_key = must_env("OPENAI_API_KEY")?;
    let model = must_env("EMBEDDING_MODEL")?;

    Ok(LlmModelConfig {
        provider: LlmProvider::OpenAI,
        model,
        endpoint: openai_endpoint(),
        api_key: Some(api_key),
        max_tokens: None,
        temperature: Some(0.0),
        top_p: None,
        timeout_secs: Some(120),
    })
}

/// Builds the `(fast, slow, embedding)` triple for the provider selected by
/// `LLM_KIND` (default `ollama`).
///
/// The "fast" profile is optional in the environment; when absent the slow
/// model serves both roles.
pub fn profiles_from_env()
-> Result<(LlmModelConfig, Option<LlmModelConfig>, LlmModelConfig), LlmError> {
    let kind = std::env::var("LLM_KIND").unwrap_or_else(|_| "ollama".to_string());

    match kind.to_ascii_lowercase().as_str() {
        "ollama" => {
            let slow = config_ollama_slow()?;
            let fast = config_ollama_fast()?.unwrap_or_else(|| slow.clone());
            let embedding = config_ollama_embedding()?;
            Ok((fast, Some(slow), embedding))
        }
        "openai" | "chatgpt" => {
            let slow = config_openai_slow()?;
            let fast = config_openai_fast()?.unwrap_or_else(|| slow.clone());
            let embedding = config_openai_embedding()?;
            Ok((fast, Some(slow), embedding))
        }
        other => Err(LlmError::Config(ConfigError::UnsupportedProvider(
            other.to_string(),
        ))),
    }
}
