//! Language detection and grammar access.
//!
//! Only a subset of languages gets full AST support; everything else that
//! still looks like text goes through the fallback splitter with a plain
//! language name in the payload.

use std::path::Path;

use tree_sitter::Language as TsLanguage;

/// Languages with a packaged Tree-sitter grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AstLanguage {
    Rust,
    Python,
    TypeScript,
    JavaScript,
}

impl AstLanguage {
    /// The compiled grammar for this language.
    pub fn grammar(self) -> TsLanguage {
        match self {
            AstLanguage::Rust => tree_sitter_rust::LANGUAGE.into(),
            AstLanguage::Python => tree_sitter_python::LANGUAGE.into(),
            AstLanguage::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            AstLanguage::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        }
    }

    /// Packaged tag query source, preferred over the grammar's built-in tags.
    pub fn packaged_query(self) -> &'static str {
        match self {
            AstLanguage::Rust => include_str!("../queries/rust.scm"),
            AstLanguage::Python => include_str!("../queries/python.scm"),
            AstLanguage::TypeScript => include_str!("../queries/typescript.scm"),
            AstLanguage::JavaScript => include_str!("../queries/javascript.scm"),
        }
    }

    /// The grammar's built-in TAGS query, used when the packaged query
    /// fails to compile against the linked grammar version.
    pub fn builtin_tags_query(self) -> &'static str {
        match self {
            AstLanguage::Rust => tree_sitter_rust::TAGS_QUERY,
            AstLanguage::Python => tree_sitter_python::TAGS_QUERY,
            AstLanguage::TypeScript => tree_sitter_typescript::TAGS_QUERY,
            AstLanguage::JavaScript => tree_sitter_javascript::TAGS_QUERY,
        }
    }

    /// Node kinds that act as breadcrumb containers (class-like scopes).
    pub fn container_kinds(self) -> &'static [&'static str] {
        match self {
            AstLanguage::Rust => &["impl_item", "trait_item", "mod_item"],
            AstLanguage::Python => &["class_definition"],
            AstLanguage::TypeScript => &[
                "class_declaration",
                "abstract_class_declaration",
                "interface_declaration",
                "internal_module",
            ],
            AstLanguage::JavaScript => &["class_declaration"],
        }
    }

    /// Canonical lowercase name used in chunk payloads.
    pub fn name(self) -> &'static str {
        match self {
            AstLanguage::Rust => "rust",
            AstLanguage::Python => "python",
            AstLanguage::TypeScript => "typescript",
            AstLanguage::JavaScript => "javascript",
        }
    }

    /// Single-line comment prefix, used by the simplified skeleton chunk.
    pub fn comment_prefix(self) -> &'static str {
        match self {
            AstLanguage::Python => "#",
            _ => "//",
        }
    }
}

/// Detects `(payload language name, AST support)` from a path extension.
pub fn detect_language(path: &str) -> (String, Option<AstLanguage>) {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let (name, ast) = match ext.as_str() {
        "rs" => ("rust", Some(AstLanguage::Rust)),
        "py" | "pyw" | "pyi" => ("python", Some(AstLanguage::Python)),
        "ts" | "tsx" => ("typescript", Some(AstLanguage::TypeScript)),
        "js" | "jsx" | "mjs" | "cjs" => ("javascript", Some(AstLanguage::JavaScript)),
        "java" => ("java", None),
        "kt" | "kts" => ("kotlin", None),
        "go" => ("go", None),
        "c" | "h" => ("c", None),
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" => ("cpp", None),
        "cs" => ("csharp", None),
        "php" | "phtml" => ("php", None),
        "rb" => ("ruby", None),
        "swift" => ("swift", None),
        "scala" => ("scala", None),
        "lua" => ("lua", None),
        "pl" | "pm" => ("perl", None),
        "sh" | "bash" => ("bash", None),
        "sql" => ("sql", None),
        "md" | "markdown" => ("markdown", None),
        "json" => ("json", None),
        "yaml" | "yml" => ("yaml", None),
        "toml" => ("toml", None),
        "xml" => ("xml", None),
        "html" | "htm" => ("html", None),
        "css" | "scss" | "sass" => ("css", None),
        "vue" => ("vue", None),
        "dart" => ("dart", None),
        _ => ("text", None),
    };
    (name.to_string(), ast)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_ast_languages() {
        assert_eq!(detect_language("src/main.rs").1, Some(AstLanguage::Rust));
        assert_eq!(detect_language("a/b.py").1, Some(AstLanguage::Python));
        assert_eq!(
            detect_language("ui/App.tsx").1,
            Some(AstLanguage::TypeScript)
        );
        assert_eq!(
            detect_language("lib/index.mjs").1,
            Some(AstLanguage::JavaScript)
        );
    }

    #[test]
    fn unsupported_extensions_fall_back() {
        let (name, ast) = detect_language("pom.xml");
        assert_eq!(name, "xml");
        assert!(ast.is_none());

        let (name, ast) = detect_language("Makefile");
        assert_eq!(name, "text");
        assert!(ast.is_none());
    }
}
