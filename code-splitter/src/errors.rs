//! Error types for the splitter.

use thiserror::Error;

pub type SplitResult<T> = std::result::Result<T, SplitError>;

#[derive(Debug, Error)]
pub enum SplitError {
    #[error("tree-sitter language error: {0}")]
    Language(String),

    #[error("query compile error: {0}")]
    Query(String),

    #[error("parse failed for {0}")]
    Parse(String),
}
