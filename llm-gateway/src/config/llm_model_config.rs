use crate::config::llm_provider::LlmProvider;

/// Configuration for one LLM model invocation target.
///
/// Holds both general and provider-specific parameters; extend as needed
/// when new backends or sampling options appear.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmModelConfig {
    /// The LLM provider/backend (Ollama or OpenAI).
    pub provider: LlmProvider,

    /// Model identifier string (e.g. `"qwen3:14b"`, `"gpt-4o-mini"`).
    pub model: String,

    /// Inference endpoint (local server or remote API base URL).
    pub endpoint: String,

    /// Optional API key for authentication.
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
}
