//! Error types used across the RAG engine.

use thiserror::Error;

pub type RagResult<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("qdrant error: {0}")]
    Qdrant(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] llm_gateway::LlmError),

    #[error("payload error: {0}")]
    Payload(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("vector size mismatch: got={got}, want={want}")]
    VectorSizeMismatch { got: usize, want: usize },

    #[error("indexing cancelled")]
    Cancelled,
}
