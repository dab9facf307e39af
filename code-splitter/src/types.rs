//! Chunk model shared with the indexing layer.

use serde::{Deserialize, Serialize};

/// Content type as determined by the splitting path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Full function/class definition captured from the AST.
    FunctionsClasses,
    /// File skeleton where each definition is a placeholder comment.
    SimplifiedCode,
    /// Non-AST content split by the recursive-character splitter.
    Fallback,
    /// Large AST chunk re-split by the recursive-character splitter.
    OversizedSplit,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::FunctionsClasses => "functions_classes",
            ContentType::SimplifiedCode => "simplified_code",
            ContentType::Fallback => "fallback",
            ContentType::OversizedSplit => "oversized_split",
        }
    }
}

/// One unit of indexed text with its retrieval metadata.
///
/// `chunk_index` is the position within the file's chunk list; together
/// with the path and branch it drives the stable point id at upsert time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeChunk {
    /// Deterministic id: first 32 hex chars of sha256(path:index:content[..500]).
    pub id: String,
    pub path: String,
    pub language: String,
    pub content: String,
    pub content_type: ContentType,
    pub chunk_index: usize,

    /// Names defined in this chunk (AST first, regex best-effort otherwise).
    pub semantic_names: Vec<String>,
    /// First semantic name, when any.
    pub primary_name: Option<String>,
    /// Enclosing scopes, outermost first (e.g. `["MyClass"]` for a method).
    pub parent_context: Vec<String>,
    /// Innermost enclosing class, when nested.
    pub parent_class: Option<String>,

    pub docstring: Option<String>,
    pub signature: Option<String>,
    pub extends: Vec<String>,
    pub implements: Vec<String>,
    pub imports: Vec<String>,
    pub namespace: Option<String>,

    pub start_line: usize,
    pub end_line: usize,
    /// Raw AST node kind for semantic chunks (`"simplified"` for skeletons).
    pub node_type: Option<String>,
    /// Id of the original oversized chunk for `oversized_split` parts.
    pub parent_chunk_id: Option<String>,
}

impl CodeChunk {
    /// Blank chunk with required fields; metadata filled by the splitter.
    pub fn new(
        path: &str,
        language: &str,
        content: String,
        content_type: ContentType,
        chunk_index: usize,
    ) -> Self {
        let id = crate::ids::chunk_id(path, chunk_index, &content);
        Self {
            id,
            path: path.to_string(),
            language: language.to_string(),
            content,
            content_type,
            chunk_index,
            semantic_names: Vec::new(),
            primary_name: None,
            parent_context: Vec::new(),
            parent_class: None,
            docstring: None,
            signature: None,
            extends: Vec::new(),
            implements: Vec::new(),
            imports: Vec::new(),
            namespace: None,
            start_line: 0,
            end_line: 0,
            node_type: None,
            parent_chunk_id: None,
        }
    }
}
