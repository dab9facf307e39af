//! Splitting orchestration: AST first, fallback otherwise.

use tracing::{debug, warn};

use crate::ast;
use crate::fallback::RecursiveSplitter;
use crate::ids::chunk_id;
use crate::language::detect_language;
use crate::metadata;
use crate::simplified::build_simplified;
use crate::types::{CodeChunk, ContentType};

/// Tuning knobs for the splitter.
#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Maximum characters per chunk; larger chunks are re-split.
    pub max_chunk_size: usize,
    /// Chunks smaller than this are dropped unless they are the only chunk.
    pub min_chunk_size: usize,
    /// Overlap between chunks when re-splitting oversized content.
    pub chunk_overlap: usize,
    /// Minimum line count for AST parsing; smaller files use the fallback.
    pub parser_threshold: usize,
    /// Cap on imports recorded per file.
    pub max_imports: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 2000,
            min_chunk_size: 100,
            chunk_overlap: 200,
            parser_threshold: 10,
            max_imports: 30,
        }
    }
}

/// Hard cap on a single emitted chunk, applied after all splitting.
const ABSOLUTE_CHUNK_CAP: usize = 30_000;

/// Splits source files into retrieval chunks with enriched metadata.
#[derive(Debug, Clone)]
pub struct CodeSplitter {
    cfg: SplitterConfig,
}

impl CodeSplitter {
    pub fn new(cfg: SplitterConfig) -> Self {
        Self { cfg }
    }

    /// Splits one file. Never fails: AST problems degrade to the fallback
    /// splitter, and empty input yields no chunks.
    pub fn split_file(&self, path: &str, content: &str) -> Vec<CodeChunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }

        let (lang_name, ast_lang) = detect_language(path);
        let line_count = content.lines().count();

        let use_ast = ast_lang.is_some() && line_count >= self.cfg.parser_threshold;

        let chunks = if use_ast {
            let lang = ast_lang.unwrap();
            match ast::extract(lang, content, path, self.cfg.max_imports) {
                Ok(extraction) if !extraction.units.is_empty() => {
                    self.split_with_ast(path, content, &lang_name, lang, extraction)
                }
                Ok(_) => {
                    debug!(path, "no semantic units captured, using fallback");
                    self.split_fallback(path, content, &lang_name)
                }
                Err(e) => {
                    warn!(path, error = %e, "ast parsing failed, using fallback");
                    self.split_fallback(path, content, &lang_name)
                }
            }
        } else {
            self.split_fallback(path, content, &lang_name)
        };

        debug!(
            path,
            language = %lang_name,
            count = chunks.len(),
            ast = use_ast,
            "file split"
        );
        chunks
    }

    fn split_with_ast(
        &self,
        path: &str,
        content: &str,
        lang_name: &str,
        lang: crate::language::AstLanguage,
        extraction: ast::AstExtraction,
    ) -> Vec<CodeChunk> {
        let namespace = metadata::extract_namespace(content, lang_name);
        let mut chunks: Vec<CodeChunk> = Vec::new();
        let mut index = 0usize;

        for unit in &extraction.units {
            if unit.content.chars().count() > self.cfg.max_chunk_size {
                self.push_oversized(path, lang_name, unit, &extraction.imports, &namespace, &mut index, &mut chunks);
                continue;
            }

            let mut chunk = CodeChunk::new(
                path,
                lang_name,
                truncate_chars(&unit.content, ABSOLUTE_CHUNK_CAP),
                ContentType::FunctionsClasses,
                index,
            );
            index += 1;

            // AST names win; regex only fills gaps.
            let names = match &unit.name {
                Some(n) => vec![n.clone()],
                None => metadata::extract_names(&unit.content, lang_name),
            };
            chunk.primary_name = names.first().cloned();
            chunk.semantic_names = names;
            chunk.parent_context = unit.parent_context.clone();
            chunk.parent_class = unit.parent_context.last().cloned();
            chunk.docstring = metadata::extract_docstring(&unit.content, lang_name);
            chunk.signature = metadata::extract_signature(&unit.content, lang_name);
            let (extends, implements) = metadata::extract_inheritance(&unit.content, lang_name);
            chunk.extends = extends;
            chunk.implements = implements;
            chunk.imports = extraction.imports.clone();
            chunk.namespace = namespace.clone();
            chunk.start_line = unit.start_line;
            chunk.end_line = unit.end_line;
            chunk.node_type = Some(unit.node_type.clone());

            chunks.push(chunk);
        }

        if let Some(skeleton) = build_simplified(content, &extraction.units, lang) {
            let mut chunk = CodeChunk::new(
                path,
                lang_name,
                truncate_chars(&skeleton, ABSOLUTE_CHUNK_CAP),
                ContentType::SimplifiedCode,
                index,
            );
            chunk.imports = extraction.imports.clone();
            chunk.namespace = namespace.clone();
            chunk.start_line = 1;
            chunk.end_line = content.lines().count();
            chunk.node_type = Some("simplified".to_string());
            chunks.push(chunk);
        }

        self.drop_undersized(chunks)
    }

    #[allow(clippy::too_many_arguments)]
    fn push_oversized(
        &self,
        path: &str,
        lang_name: &str,
        unit: &ast::SemanticUnit,
        imports: &[String],
        namespace: &Option<String>,
        index: &mut usize,
        chunks: &mut Vec<CodeChunk>,
    ) {
        let parent_id = chunk_id(path, 0, &unit.content);
        let splitter =
            RecursiveSplitter::for_language(lang_name, self.cfg.max_chunk_size, self.cfg.chunk_overlap);
        let parts = splitter.split_text(&unit.content);
        let many = parts.len() > 1;

        for part in parts {
            if many && part.trim().chars().count() < self.cfg.min_chunk_size {
                continue;
            }
            let mut chunk = CodeChunk::new(
                path,
                lang_name,
                truncate_chars(&part, ABSOLUTE_CHUNK_CAP),
                ContentType::OversizedSplit,
                *index,
            );
            *index += 1;

            chunk.semantic_names = unit.name.clone().into_iter().collect();
            chunk.primary_name = unit.name.clone();
            chunk.parent_context = unit.parent_context.clone();
            chunk.parent_class = unit.parent_context.last().cloned();
            chunk.imports = imports.to_vec();
            chunk.namespace = namespace.clone();
            chunk.start_line = unit.start_line;
            chunk.end_line = unit.end_line;
            chunk.node_type = Some(unit.node_type.clone());
            chunk.parent_chunk_id = Some(parent_id.clone());
            chunks.push(chunk);
        }
    }

    fn split_fallback(&self, path: &str, content: &str, lang_name: &str) -> Vec<CodeChunk> {
        let splitter =
            RecursiveSplitter::for_language(lang_name, self.cfg.max_chunk_size, self.cfg.chunk_overlap);
        let parts = splitter.split_text(content);
        let many = parts.len() > 1;

        let imports = metadata::extract_imports(content, self.cfg.max_imports);
        let namespace = metadata::extract_namespace(content, lang_name);

        let mut chunks = Vec::new();
        let mut index = 0usize;
        let mut search_from = 0usize;

        for part in parts {
            if many && part.trim().chars().count() < self.cfg.min_chunk_size {
                continue;
            }

            // Locate the part in the source to derive line numbers; overlap
            // means a part can begin before the previous search cursor.
            let pos = content[search_from..]
                .find(&part)
                .map(|p| p + search_from)
                .or_else(|| content.find(&part));
            let start_line = match pos {
                Some(p) => {
                    search_from = (p + 1).min(content.len());
                    content[..p].matches('\n').count() + 1
                }
                None => 1,
            };

            let mut chunk = CodeChunk::new(
                path,
                lang_name,
                truncate_chars(&part, ABSOLUTE_CHUNK_CAP),
                ContentType::Fallback,
                index,
            );
            index += 1;

            let names = metadata::extract_names(&part, lang_name);
            chunk.primary_name = names.first().cloned();
            chunk.semantic_names = names;
            chunk.imports = imports.clone();
            chunk.namespace = namespace.clone();
            chunk.start_line = start_line;
            chunk.end_line = start_line + part.matches('\n').count();
            chunks.push(chunk);
        }

        self.drop_undersized(chunks)
    }

    /// Drops undersized chunks unless a file would end up with none.
    fn drop_undersized(&self, chunks: Vec<CodeChunk>) -> Vec<CodeChunk> {
        if chunks.len() <= 1 {
            return chunks;
        }
        let kept: Vec<CodeChunk> = chunks
            .iter()
            .filter(|c| c.content.trim().chars().count() >= self.cfg.min_chunk_size)
            .cloned()
            .collect();
        if kept.is_empty() { chunks } else { kept }
    }
}

fn truncate_chars(s: &str, cap: usize) -> String {
    if s.chars().count() <= cap {
        s.to_string()
    } else {
        s.chars().take(cap).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_python() -> &'static str {
        r#"import os
from db import connect

class UserRepo:
    """Data access for users."""

    def find(self, user_id):
        conn = connect()
        return conn.query("SELECT * FROM users WHERE id = %s", user_id)

    def delete(self, user_id):
        conn = connect()
        conn.execute("DELETE FROM users WHERE id = %s", user_id)

def healthcheck():
    return os.path.exists("/tmp/ready")
"#
    }

    #[test]
    fn python_file_yields_semantic_and_simplified_chunks() {
        let splitter = CodeSplitter::new(SplitterConfig::default());
        let chunks = splitter.split_file("src/repo.py", sample_python());

        assert!(
            chunks
                .iter()
                .any(|c| c.content_type == ContentType::FunctionsClasses)
        );
        assert!(
            chunks
                .iter()
                .any(|c| c.content_type == ContentType::SimplifiedCode)
        );

        let method = chunks
            .iter()
            .find(|c| c.primary_name.as_deref() == Some("find"))
            .expect("method chunk");
        assert_eq!(method.parent_class.as_deref(), Some("UserRepo"));
        assert!(method.imports.iter().any(|i| i.contains("from db")));
    }

    #[test]
    fn split_is_deterministic() {
        let splitter = CodeSplitter::new(SplitterConfig::default());
        let a: Vec<String> = splitter
            .split_file("src/repo.py", sample_python())
            .into_iter()
            .map(|c| c.id)
            .collect();
        let b: Vec<String> = splitter
            .split_file("src/repo.py", sample_python())
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn oversized_definitions_are_resplit_with_parent_link() {
        let mut body = String::from("def big():\n");
        for i in 0..200 {
            body.push_str(&format!("    value_{i} = compute_{i}(input_{i})\n"));
        }
        let code = format!("import x\n\n{body}\ndef small():\n    return 1\n");

        let splitter = CodeSplitter::new(SplitterConfig {
            max_chunk_size: 500,
            min_chunk_size: 50,
            chunk_overlap: 50,
            parser_threshold: 5,
            max_imports: 30,
        });
        let chunks = splitter.split_file("big.py", &code);

        let oversized: Vec<_> = chunks
            .iter()
            .filter(|c| c.content_type == ContentType::OversizedSplit)
            .collect();
        assert!(oversized.len() > 1);

        let parent_id = oversized[0].parent_chunk_id.clone().unwrap();
        assert!(oversized.iter().all(|c| c.parent_chunk_id.as_deref() == Some(parent_id.as_str())));
        assert!(oversized.iter().all(|c| c.primary_name.as_deref() == Some("big")));
    }

    #[test]
    fn unsupported_language_uses_fallback() {
        let code = "type Server struct {}\n\nfunc Start() error {\n\treturn nil\n}\n"
            .repeat(10);
        let splitter = CodeSplitter::new(SplitterConfig::default());
        let chunks = splitter.split_file("cmd/server.go", &code);

        assert!(!chunks.is_empty());
        assert!(
            chunks
                .iter()
                .all(|c| c.content_type == ContentType::Fallback)
        );
        assert!(chunks[0].semantic_names.contains(&"Server".to_string()));
    }

    #[test]
    fn tiny_file_keeps_its_single_chunk() {
        let splitter = CodeSplitter::new(SplitterConfig::default());
        let chunks = splitter.split_file("note.txt", "short note");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "short note");
    }

    #[test]
    fn empty_file_yields_nothing() {
        let splitter = CodeSplitter::new(SplitterConfig::default());
        assert!(splitter.split_file("empty.py", "   \n").is_empty());
    }
}
