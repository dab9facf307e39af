//! Tree-sitter parsing and tag-query extraction.
//!
//! Responsibilities:
//! - Initialize a parser for the selected language (a fresh `Parser` per
//!   call; parsing is cheap next to embedding);
//! - Compile the packaged tag query, falling back to the grammar's built-in
//!   `TAGS_QUERY` when the packaged one does not match the linked grammar;
//! - Walk matches into [`SemanticUnit`]s with parent breadcrumbs, plus the
//!   file's import statements.

use std::collections::HashSet;

use streaming_iterator::StreamingIterator;
use tracing::{debug, warn};
use tree_sitter::{Node, Parser, Query, QueryCursor};

use crate::errors::{SplitError, SplitResult};
use crate::language::AstLanguage;

/// One captured definition with enough context to become a chunk.
#[derive(Debug, Clone)]
pub struct SemanticUnit {
    pub content: String,
    pub name: Option<String>,
    /// Enclosing container names, outermost first.
    pub parent_context: Vec<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub node_type: String,
    pub byte_range: (usize, usize),
}

/// Extraction result for one file.
#[derive(Debug, Default)]
pub struct AstExtraction {
    pub units: Vec<SemanticUnit>,
    pub imports: Vec<String>,
}

/// Parses `code` and extracts semantic units and imports.
pub fn extract(
    lang: AstLanguage,
    code: &str,
    path: &str,
    max_imports: usize,
) -> SplitResult<AstExtraction> {
    let grammar = lang.grammar();
    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| SplitError::Language(e.to_string()))?;

    let tree = parser
        .parse(code, None)
        .ok_or_else(|| SplitError::Parse(path.to_string()))?;

    let query = match Query::new(&grammar, lang.packaged_query()) {
        Ok(q) => q,
        Err(e) => {
            warn!(
                language = lang.name(),
                error = %e,
                "packaged query failed to compile, using built-in tags query"
            );
            Query::new(&grammar, lang.builtin_tags_query())
                .map_err(|e| SplitError::Query(e.to_string()))?
        }
    };

    let capture_names = query.capture_names();
    let container_kinds = lang.container_kinds();

    let mut out = AstExtraction::default();
    let mut seen_ranges: HashSet<(usize, usize)> = HashSet::new();
    let mut seen_imports: HashSet<String> = HashSet::new();

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), code.as_bytes());

    while let Some(m) = matches.next() {
        let mut def_node: Option<Node> = None;
        let mut def_kind: Option<&str> = None;
        let mut name: Option<String> = None;

        for cap in m.captures {
            let cap_name = capture_names[cap.index as usize];
            if let Some(kind) = cap_name.strip_prefix("definition.") {
                def_node = Some(cap.node);
                def_kind = Some(kind);
            } else if cap_name == "name" {
                name = node_text(cap.node, code);
            } else if cap_name == "import" {
                if out.imports.len() < max_imports {
                    if let Some(text) = node_text(cap.node, code) {
                        let line = text.lines().next().unwrap_or("").trim().to_string();
                        if !line.is_empty() && seen_imports.insert(line.clone()) {
                            out.imports.push(line);
                        }
                    }
                }
            }
        }

        let (node, kind) = match (def_node, def_kind) {
            (Some(n), Some(k)) => (n, k),
            _ => continue,
        };

        let range = (node.start_byte(), node.end_byte());
        if !seen_ranges.insert(range) {
            continue;
        }

        let content = code
            .get(range.0..range.1)
            .unwrap_or_default()
            .to_string();
        if content.is_empty() {
            continue;
        }

        // Breadcrumb: names of class-like ancestors, outermost first.
        // The definition node itself is excluded.
        let mut breadcrumb = Vec::new();
        let mut cur = node.parent();
        while let Some(p) = cur {
            if container_kinds.contains(&p.kind()) && p.byte_range() != node.byte_range() {
                if let Some(n) = container_name(p, code) {
                    breadcrumb.push(n);
                }
            }
            cur = p.parent();
        }
        breadcrumb.reverse();

        out.units.push(SemanticUnit {
            content,
            name,
            parent_context: breadcrumb,
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            node_type: format!("{}_{}", lang.name(), kind),
            byte_range: range,
        });
    }

    out.units.sort_by_key(|u| u.byte_range.0);
    debug!(
        path,
        language = lang.name(),
        units = out.units.len(),
        imports = out.imports.len(),
        "ast extraction complete"
    );
    Ok(out)
}

fn node_text(node: Node, code: &str) -> Option<String> {
    code.get(node.byte_range()).map(|s| s.to_string())
}

/// Best-effort name for a container node (for breadcrumbs).
fn container_name(node: Node, code: &str) -> Option<String> {
    if let Some(n) = node.child_by_field_name("name") {
        return node_text(n, code);
    }
    // Rust impl blocks carry the type under the `type` field, possibly generic.
    if let Some(ty) = node.child_by_field_name("type") {
        if ty.kind() == "type_identifier" {
            return node_text(ty, code);
        }
        if let Some(inner) = ty.child_by_field_name("type") {
            return node_text(inner, code);
        }
        return node_text(ty, code);
    }
    let mut walker = node.walk();
    for child in node.named_children(&mut walker) {
        if matches!(
            child.kind(),
            "identifier" | "type_identifier" | "property_identifier"
        ) {
            return node_text(child, code);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_python_class_and_methods() {
        let code = r#"
import os
from typing import List

class UserService:
    """Service for users."""

    def get_user(self, user_id: int):
        return self.repo.find(user_id)

    def delete_user(self, user_id: int):
        self.repo.delete(user_id)

def standalone():
    pass
"#;
        let out = extract(AstLanguage::Python, code, "svc.py", 30).unwrap();

        let names: Vec<_> = out.units.iter().filter_map(|u| u.name.clone()).collect();
        assert!(names.contains(&"UserService".to_string()));
        assert!(names.contains(&"get_user".to_string()));
        assert!(names.contains(&"standalone".to_string()));

        let method = out
            .units
            .iter()
            .find(|u| u.name.as_deref() == Some("get_user"))
            .unwrap();
        assert_eq!(method.parent_context, vec!["UserService".to_string()]);

        assert!(out.imports.iter().any(|i| i.contains("import os")));
        assert!(out.imports.iter().any(|i| i.contains("from typing")));
    }

    #[test]
    fn extracts_rust_items_with_impl_breadcrumb() {
        let code = r#"
use std::collections::HashMap;

pub struct Store {
    items: HashMap<String, u32>,
}

impl Store {
    pub fn get(&self, key: &str) -> Option<u32> {
        self.items.get(key).copied()
    }
}
"#;
        let out = extract(AstLanguage::Rust, code, "store.rs", 30).unwrap();

        let names: Vec<_> = out.units.iter().filter_map(|u| u.name.clone()).collect();
        assert!(names.contains(&"Store".to_string()));
        assert!(names.contains(&"get".to_string()));

        let method = out
            .units
            .iter()
            .find(|u| u.name.as_deref() == Some("get"))
            .unwrap();
        assert_eq!(method.parent_context, vec!["Store".to_string()]);
        assert!(out.imports.iter().any(|i| i.contains("use std")));
    }

    #[test]
    fn line_numbers_are_one_based() {
        let code = "def f():\n    pass\n";
        let out = extract(AstLanguage::Python, code, "f.py", 30).unwrap();
        let unit = &out.units[0];
        assert_eq!(unit.start_line, 1);
        assert!(unit.end_line >= 2);
    }
}
