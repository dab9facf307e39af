use std::fmt;

/// Represents the provider (backend) used for LLM inference and embeddings.
///
/// Adding more providers later (e.g. Anthropic, Mistral API) is done by
/// extending this enum and the matching service dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    /// Local Ollama runtime for on-device inference.
    Ollama,
    /// OpenAI-compatible chat/embeddings API.
    OpenAI,
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::Ollama => write!(f, "ollama"),
            LlmProvider::OpenAI => write!(f, "openai"),
        }
    }
}
