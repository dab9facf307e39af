//! Simplified skeleton chunk.
//!
//! Replaces every extracted definition with a one-line placeholder comment
//! so retrieval keeps a cheap whole-file view of structure (imports, module
//! docs, top-level glue) without duplicating definition bodies.

use crate::ast::SemanticUnit;
use crate::language::AstLanguage;

/// Builds the skeleton text, or `None` when there is nothing meaningful left.
pub fn build_simplified(code: &str, units: &[SemanticUnit], lang: AstLanguage) -> Option<String> {
    if units.is_empty() {
        return None;
    }

    let prefix = lang.comment_prefix();

    // Replace from the end so earlier byte ranges stay valid. Units that
    // overlap an already-replaced range (a class whose methods were replaced
    // first) are skipped — their shell stays, the bodies become placeholders.
    let mut sorted: Vec<&SemanticUnit> = units.iter().collect();
    sorted.sort_by(|a, b| b.byte_range.0.cmp(&a.byte_range.0));

    let mut result = code.to_string();
    let mut replaced: Vec<(usize, usize)> = Vec::new();

    for unit in sorted {
        let (start, end) = unit.byte_range;
        if replaced.iter().any(|&(s, e)| start < e && end > s) {
            continue;
        }
        if end > result.len() || !result.is_char_boundary(start) || !result.is_char_boundary(end) {
            continue;
        }

        let mut first_line = unit.content.lines().next().unwrap_or("").trim().to_string();
        if first_line.chars().count() > 60 {
            first_line = first_line.chars().take(60).collect::<String>() + "...";
        }

        let breadcrumb = if unit.parent_context.is_empty() {
            String::new()
        } else {
            format!(" (in {})", unit.parent_context.join("."))
        };

        let placeholder = format!("{} Code for: {}{}\n", prefix, first_line, breadcrumb);
        result.replace_range(start..end, &placeholder);
        replaced.push((start, end));
    }

    let trimmed = result.trim();
    if trimmed.len() > 50 {
        Some(trimmed.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::extract;

    #[test]
    fn replaces_definitions_with_placeholders() {
        let code = r#"import os
import sys

CONFIG_PATH = "/etc/app.conf"

def load_config():
    with open(CONFIG_PATH) as f:
        return f.read()

def save_config(data):
    with open(CONFIG_PATH, "w") as f:
        f.write(data)
"#;
        let out = extract(AstLanguage::Python, code, "cfg.py", 30).unwrap();
        let skeleton = build_simplified(code, &out.units, AstLanguage::Python).unwrap();

        assert!(skeleton.contains("import os"));
        assert!(skeleton.contains("CONFIG_PATH"));
        assert!(skeleton.contains("# Code for: def load_config():"));
        assert!(!skeleton.contains("f.write(data)"));
    }

    #[test]
    fn none_when_no_units() {
        assert!(build_simplified("x = 1", &[], AstLanguage::Python).is_none());
    }
}
