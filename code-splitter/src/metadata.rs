//! Regex-based metadata enrichment.
//!
//! Used two ways: to enrich AST chunks with docstrings/signatures/
//! inheritance the tag queries do not capture, and as the best-effort name
//! extractor for fallback chunks. When the AST and a regex disagree on
//! names, the AST result wins.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PY_DOCSTRING: Regex =
        Regex::new(r#"(?s)"""(.*?)"""|'''(.*?)'''"#).unwrap();
    static ref BLOCK_DOC: Regex = Regex::new(r"(?s)/\*\*(.*?)\*/").unwrap();
    static ref BLOCK_DOC_STAR: Regex = Regex::new(r"(?m)^\s*\*\s?").unwrap();

    static ref PY_CLASS: Regex = Regex::new(r"(?m)^class\s+(\w+)").unwrap();
    static ref PY_FN: Regex = Regex::new(r"(?m)^\s*(?:async\s+)?def\s+(\w+)\s*\(").unwrap();
    static ref RS_FN: Regex = Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+(\w+)").unwrap();
    static ref RS_TYPE: Regex = Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait)\s+(\w+)").unwrap();
    static ref JS_CLASS: Regex =
        Regex::new(r"(?m)(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(\w+)").unwrap();
    static ref JS_FN: Regex =
        Regex::new(r"(?m)(?:export\s+)?(?:async\s+)?function\s*\*?\s*(\w+)\s*\(").unwrap();
    static ref TS_INTERFACE: Regex = Regex::new(r"(?m)(?:export\s+)?interface\s+(\w+)").unwrap();
    static ref JAVA_CLASS: Regex = Regex::new(
        r"(?m)(?:public\s+|private\s+|protected\s+)?(?:abstract\s+|final\s+)?class\s+(\w+)"
    )
    .unwrap();
    static ref JAVA_METHOD: Regex = Regex::new(
        r"(?m)(?:public|private|protected)\s+(?:static\s+)?[\w<>,\[\]\s]+\s+(\w+)\s*\("
    )
    .unwrap();
    static ref GO_FN: Regex = Regex::new(r"(?m)^func\s+(?:\([^)]+\)\s+)?(\w+)\s*\(").unwrap();
    static ref GO_TYPE: Regex = Regex::new(r"(?m)^type\s+(\w+)\s+(?:struct|interface)\b").unwrap();

    static ref EXTENDS: Regex = Regex::new(r"\bextends\s+([\w.,<>\s]+?)(?:\s+implements\b|\s*\{)").unwrap();
    static ref IMPLEMENTS: Regex = Regex::new(r"\bimplements\s+([\w.,<>\s]+?)\s*\{").unwrap();
    static ref PY_BASES: Regex = Regex::new(r"(?m)^class\s+\w+\s*\(([^)]+)\)").unwrap();
    static ref RS_IMPL_FOR: Regex = Regex::new(r"impl(?:<[^>]*>)?\s+([\w:]+)(?:<[^>]*>)?\s+for\s+").unwrap();

    static ref NS_JAVA: Regex = Regex::new(r"(?m)^package\s+([\w.]+)\s*;").unwrap();
    static ref NS_CSHARP: Regex = Regex::new(r"(?m)^namespace\s+([\w.]+)").unwrap();
    static ref NS_PHP: Regex = Regex::new(r"(?m)^namespace\s+([\w\\]+)\s*;").unwrap();
    static ref NS_TS: Regex = Regex::new(r"(?m)^(?:export\s+)?namespace\s+([\w.]+)").unwrap();

    static ref IMPORT_LINE: Regex = Regex::new(
        r"(?m)^\s*(?:import\s+[^\n;]+;?|from\s+[\w.]+\s+import\s+[^\n]+|use\s+[\w:{}, *]+;|#include\s+[<\x22][^>\x22]+[>\x22]|require\s*\(\s*['\x22][^'\x22]+['\x22]\s*\))"
    )
    .unwrap();
}

/// Extracts a docstring from a chunk's content, per language convention.
pub fn extract_docstring(content: &str, language: &str) -> Option<String> {
    match language {
        "python" => PY_DOCSTRING.captures(content).and_then(|c| {
            c.get(1)
                .or_else(|| c.get(2))
                .map(|m| m.as_str().trim().to_string())
        }),
        "rust" => {
            let mut lines = Vec::new();
            for line in content.lines() {
                let trimmed = line.trim();
                if let Some(rest) = trimmed.strip_prefix("///") {
                    lines.push(rest.trim().to_string());
                } else if !lines.is_empty() {
                    break;
                }
            }
            if lines.is_empty() {
                None
            } else {
                Some(lines.join("\n"))
            }
        }
        "javascript" | "typescript" | "java" | "kotlin" | "csharp" | "php" | "go" | "scala" => {
            BLOCK_DOC.captures(content).map(|c| {
                BLOCK_DOC_STAR
                    .replace_all(c.get(1).map(|m| m.as_str()).unwrap_or(""), "")
                    .trim()
                    .to_string()
            })
        }
        _ => None,
    }
    .filter(|d| !d.is_empty())
    .map(|d| d.chars().take(500).collect())
}

/// Extracts the definition signature: the first definition line up to the
/// opening brace or colon.
pub fn extract_signature(content: &str, language: &str) -> Option<String> {
    for line in content.lines().take(15) {
        let line = line.trim();
        let is_def = match language {
            "python" => {
                line.starts_with("def ")
                    || line.starts_with("async def ")
                    || line.starts_with("class ")
            }
            "rust" => {
                line.starts_with("fn ")
                    || line.starts_with("pub fn ")
                    || line.starts_with("pub async fn ")
                    || line.starts_with("async fn ")
                    || line.starts_with("impl ")
                    || line.starts_with("struct ")
                    || line.starts_with("pub struct ")
                    || line.starts_with("trait ")
                    || line.starts_with("pub trait ")
                    || line.starts_with("enum ")
                    || line.starts_with("pub enum ")
            }
            "javascript" | "typescript" => {
                line.starts_with("function ")
                    || line.starts_with("async function ")
                    || line.starts_with("export ")
                    || line.starts_with("class ")
                    || line.starts_with("interface ")
            }
            "go" => line.starts_with("func ") || line.starts_with("type "),
            _ => line.contains('(') && !line.starts_with("//") && !line.starts_with('*'),
        };
        if !is_def {
            continue;
        }

        if language == "python" {
            return Some(match line.split_once(':') {
                Some((head, _)) => format!("{}:", head),
                None => line.to_string(),
            });
        }
        return Some(line.split('{').next().unwrap_or(line).trim().to_string());
    }
    None
}

/// Extracts `(extends, implements)` lists from a chunk's content.
pub fn extract_inheritance(content: &str, language: &str) -> (Vec<String>, Vec<String>) {
    let split_list = |s: &str| -> Vec<String> {
        s.split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    };

    match language {
        "python" => {
            let bases = PY_BASES
                .captures(content)
                .map(|c| split_list(c.get(1).map(|m| m.as_str()).unwrap_or("")))
                .unwrap_or_default();
            // Python does not distinguish the two; bases count as extends.
            (bases, Vec::new())
        }
        "rust" => {
            let implemented = RS_IMPL_FOR
                .captures(content)
                .and_then(|c| c.get(1))
                .map(|m| vec![m.as_str().to_string()])
                .unwrap_or_default();
            (Vec::new(), implemented)
        }
        _ => {
            let extends = EXTENDS
                .captures(content)
                .map(|c| split_list(c.get(1).map(|m| m.as_str()).unwrap_or("")))
                .unwrap_or_default();
            let implements = IMPLEMENTS
                .captures(content)
                .map(|c| split_list(c.get(1).map(|m| m.as_str()).unwrap_or("")))
                .unwrap_or_default();
            (extends, implements)
        }
    }
}

/// Best-effort namespace/package detection from file content.
pub fn extract_namespace(content: &str, language: &str) -> Option<String> {
    let re = match language {
        "java" | "kotlin" | "scala" => &*NS_JAVA,
        "csharp" => &*NS_CSHARP,
        "php" => &*NS_PHP,
        "typescript" => &*NS_TS,
        _ => return None,
    };
    re.captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Best-effort import extraction for non-AST languages.
pub fn extract_imports(content: &str, max_imports: usize) -> Vec<String> {
    let mut out = Vec::new();
    for m in IMPORT_LINE.find_iter(content) {
        let line = m.as_str().trim().to_string();
        if !out.contains(&line) {
            out.push(line);
        }
        if out.len() >= max_imports {
            break;
        }
    }
    out
}

/// Best-effort name extraction for fallback chunks (regex per language).
pub fn extract_names(content: &str, language: &str) -> Vec<String> {
    let patterns: Vec<&Regex> = match language {
        "python" => vec![&*PY_CLASS, &*PY_FN],
        "rust" => vec![&*RS_TYPE, &*RS_FN],
        "javascript" => vec![&*JS_CLASS, &*JS_FN],
        "typescript" => vec![&*JS_CLASS, &*JS_FN, &*TS_INTERFACE],
        "java" | "kotlin" | "csharp" => vec![&*JAVA_CLASS, &*JAVA_METHOD],
        "go" => vec![&*GO_TYPE, &*GO_FN],
        _ => return Vec::new(),
    };

    let mut names = Vec::new();
    for re in patterns {
        for cap in re.captures_iter(content) {
            if let Some(m) = cap.get(1) {
                let name = m.as_str().to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            if names.len() >= 10 {
                return names;
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_docstring_and_signature() {
        let content = "def fetch(url):\n    \"\"\"Fetch a URL.\"\"\"\n    return get(url)\n";
        assert_eq!(
            extract_docstring(content, "python").as_deref(),
            Some("Fetch a URL.")
        );
        assert_eq!(
            extract_signature(content, "python").as_deref(),
            Some("def fetch(url):")
        );
    }

    #[test]
    fn rust_doc_comment_lines() {
        let content = "/// Adds two numbers.\n/// Wrapping is not handled.\nfn add(a: u32, b: u32) -> u32 { a + b }\n";
        let doc = extract_docstring(content, "rust").unwrap();
        assert!(doc.contains("Adds two numbers."));
        assert_eq!(
            extract_signature(content, "rust").as_deref(),
            Some("fn add(a: u32, b: u32) -> u32")
        );
    }

    #[test]
    fn java_inheritance() {
        let content = "public class OrderService extends BaseService implements Auditable {\n}";
        let (extends, implements) = extract_inheritance(content, "java");
        assert_eq!(extends, vec!["BaseService".to_string()]);
        assert_eq!(implements, vec!["Auditable".to_string()]);
    }

    #[test]
    fn python_bases_as_extends() {
        let (extends, implements) =
            extract_inheritance("class Admin(User, Loggable):\n    pass", "python");
        assert_eq!(extends, vec!["User".to_string(), "Loggable".to_string()]);
        assert!(implements.is_empty());
    }

    #[test]
    fn namespace_detection() {
        assert_eq!(
            extract_namespace("package com.acme.billing;\nclass A {}", "java").as_deref(),
            Some("com.acme.billing")
        );
        assert!(extract_namespace("fn main() {}", "rust").is_none());
    }

    #[test]
    fn fallback_names_go() {
        let content = "type Server struct {}\n\nfunc (s *Server) Start() error { return nil }\n";
        let names = extract_names(content, "go");
        assert!(names.contains(&"Server".to_string()));
        assert!(names.contains(&"Start".to_string()));
    }
}
