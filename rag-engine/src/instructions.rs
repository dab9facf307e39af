//! Embedding query instructions.
//!
//! Instruction-tuned embedding models (Qwen3-Embedding family) score
//! noticeably better when the query carries an explicit task instruction.
//! Documents are embedded bare; only queries get the prefix.

/// Task framing for a retrieval query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionType {
    /// Generic semantic search.
    General,
    /// Same business logic / data schema across the codebase.
    Logic,
    /// Callers and dependents of a given definition.
    Dependency,
    /// Downstream components affected by a change.
    Impact,
    /// Existing implementations of the same functionality.
    Duplication,
}

impl InstructionType {
    fn text(self) -> &'static str {
        match self {
            InstructionType::General => {
                "Given a web search query, retrieve relevant passages that answer the query"
            }
            InstructionType::Logic => {
                "Retrieve code snippets that implement the same business logic or data schema, \
                 regardless of the programming language used."
            }
            InstructionType::Dependency => {
                "Given the following function name or signature, retrieve all code snippets that \
                 invoke this logic or depend on its return value across the repository."
            }
            InstructionType::Impact => {
                "Find all downstream components, interfaces, or configurations that would be \
                 affected by a change in the following implementation."
            }
            InstructionType::Duplication => {
                "Given the following code implementation, retrieve all existing code snippets in \
                 the repository that implement the same or very similar functionality."
            }
        }
    }
}

/// Formats a query for an instruction-tuned embedder:
/// `Instruct: {instruction}\nQuery: {query}`.
pub fn format_query(query: &str, instruction: InstructionType) -> String {
    format!("Instruct: {}\nQuery: {}", instruction.text(), query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_instruction_prefix() {
        let q = format_query("token refresh logic", InstructionType::Dependency);
        assert!(q.starts_with("Instruct: "));
        assert!(q.contains("\nQuery: token refresh logic"));
    }
}
