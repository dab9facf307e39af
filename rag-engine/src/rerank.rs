//! Priority reranking of retrieval hits.
//!
//! Multiplicative score adjustment from three signals: file-path keywords,
//! chunk content type, and metadata richness. Scores are capped at 1.0 so
//! downstream thresholds keep meaning.

use code_splitter::ContentType;

use crate::payload::ChunkPayload;

/// Path keywords that mark core logic (services, security, persistence).
const HIGH_PRIORITY_PATTERNS: &[&str] = &[
    "service",
    "controller",
    "handler",
    "api",
    "core",
    "auth",
    "security",
    "permission",
    "repository",
    "dao",
    "migration",
];

/// Path keywords for supporting code.
const MEDIUM_PRIORITY_PATTERNS: &[&str] = &[
    "model",
    "entity",
    "dto",
    "util",
    "helper",
    "common",
    "component",
    "hook",
    "client",
    "integration",
];

/// Path keywords for low-signal files.
const LOW_PRIORITY_PATTERNS: &[&str] = &["test", "spec", "config", "mock", "fixture", "stub"];

/// Applies all boosts to a raw similarity score and caps the result at 1.0.
pub fn rerank_score(raw: f32, payload: &ChunkPayload) -> f32 {
    let mut score = raw;

    let path = payload.path.to_lowercase();
    if HIGH_PRIORITY_PATTERNS.iter().any(|p| path.contains(p)) {
        score *= 1.3;
    } else if MEDIUM_PRIORITY_PATTERNS.iter().any(|p| path.contains(p)) {
        score *= 1.1;
    } else if LOW_PRIORITY_PATTERNS.iter().any(|p| path.contains(p)) {
        score *= 0.8;
    }

    score *= match payload.content_type_enum() {
        Some(ContentType::FunctionsClasses) => 1.2,
        Some(ContentType::Fallback) | None => 1.0,
        Some(ContentType::OversizedSplit) => 0.95,
        Some(ContentType::SimplifiedCode) => 0.7,
    };

    if !payload.semantic_names.is_empty() {
        score *= 1.1;
    }
    if payload.docstring.is_some() {
        score *= 1.05;
    }

    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(path: &str, content_type: &str) -> ChunkPayload {
        ChunkPayload {
            path: path.to_string(),
            language: "python".into(),
            workspace: "w".into(),
            project: "p".into(),
            branch: "main".into(),
            commit: "c".into(),
            indexed_at: String::new(),
            content: String::new(),
            content_type: content_type.to_string(),
            semantic_names: Vec::new(),
            primary_name: None,
            parent_context: Vec::new(),
            parent_class: None,
            start_line: 0,
            end_line: 0,
            docstring: None,
            signature: None,
            extends: Vec::new(),
            implements: Vec::new(),
            imports: Vec::new(),
            namespace: None,
            parent_chunk_id: None,
            pr_number: None,
        }
    }

    #[test]
    fn service_paths_outrank_tests() {
        let svc = rerank_score(0.6, &payload("src/services/user.py", "fallback"));
        let test = rerank_score(0.6, &payload("tests/test_user.py", "fallback"));
        assert!(svc > test);
        assert!((svc - 0.78).abs() < 1e-5);
        assert!((test - 0.48).abs() < 1e-5);
    }

    #[test]
    fn content_type_coefficients_apply() {
        let full = rerank_score(0.5, &payload("src/thing.py", "functions_classes"));
        let skeleton = rerank_score(0.5, &payload("src/thing.py", "simplified_code"));
        assert!(full > skeleton);
    }

    #[test]
    fn metadata_bonuses_apply() {
        let mut p = payload("src/thing.py", "fallback");
        let plain = rerank_score(0.5, &p);
        p.semantic_names = vec!["Thing".into()];
        p.docstring = Some("doc".into());
        let enriched = rerank_score(0.5, &p);
        assert!((enriched / plain - 1.1 * 1.05).abs() < 1e-4);
    }

    #[test]
    fn score_is_capped_at_one() {
        let mut p = payload("src/services/auth/security.py", "functions_classes");
        p.semantic_names = vec!["AuthService".into()];
        p.docstring = Some("doc".into());
        let score = rerank_score(0.99, &p);
        assert!(score <= 1.0);
    }
}
