//! Semantic code chunking for retrieval indexing.
//!
//! Decision procedure per file:
//! 1. Detect language by extension.
//! 2. If the language has a grammar and the file has enough lines, parse with
//!    Tree-sitter and run the packaged tag query (grammar `TAGS_QUERY` as
//!    fallback) to capture functions, classes, methods, modules and imports.
//! 3. Emit one `functions_classes` chunk per captured construct, with parent
//!    breadcrumbs for nested definitions. Oversized constructs are re-split
//!    with a language-aware recursive-character splitter (`oversized_split`).
//! 4. Synthesize one `simplified_code` skeleton chunk: the file with each
//!    semantic chunk replaced by a placeholder comment.
//! 5. If AST is unavailable or parsing fails, split the whole file with the
//!    recursive-character splitter (`fallback`) and extract names by regex.
//!
//! Chunk ids are deterministic (sha256 of path, index and a content prefix),
//! so re-splitting unchanged content yields identical ids.

pub mod ast;
pub mod errors;
pub mod fallback;
pub mod ids;
pub mod language;
pub mod metadata;
pub mod simplified;
pub mod splitter;
pub mod types;

pub use errors::SplitError;
pub use language::{AstLanguage, detect_language};
pub use splitter::{CodeSplitter, SplitterConfig};
pub use types::{CodeChunk, ContentType};
