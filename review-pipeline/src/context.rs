//! Retrieval context shaping for prompts.
//!
//! Two responsibilities: render retrieved chunks into a readable prompt
//! block (with stale-chunk suppression), and pre-filter the global context
//! when a per-batch retrieval failed.

use std::collections::HashSet;

use tracing::debug;

use rag_engine::ScoredChunk;

/// At most this many chunks are rendered into one prompt.
const MAX_PROMPT_CHUNKS: usize = 15;

/// Chunks from PR-modified files below this score are treated as stale
/// (pre-PR content) and dropped.
const STALE_SCORE_FLOOR: f32 = 0.70;

/// Fallback-filter keeps any chunk at or above this score regardless of path.
const FALLBACK_KEEP_SCORE: f32 = 0.8;

/// Renders chunks into the prompt's repository-context block.
///
/// Relevance is trusted from the retriever's scores; the only filtering
/// here is stale-data suppression for files the PR itself modifies.
pub fn format_rag_context(chunks: &[ScoredChunk], pr_changed_files: &[String]) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let mut changed: HashSet<&str> = HashSet::new();
    for f in pr_changed_files {
        changed.insert(f.as_str());
        if let Some((_, base)) = f.rsplit_once('/') {
            changed.insert(base);
        }
    }

    let mut parts = Vec::new();
    let mut skipped_stale = 0usize;

    for chunk in chunks {
        if parts.len() >= MAX_PROMPT_CHUNKS {
            break;
        }
        let p = &chunk.payload;
        if p.content.is_empty() {
            continue;
        }

        let basename = p.path.rsplit('/').next().unwrap_or(&p.path);
        let from_modified = changed.contains(p.path.as_str())
            || changed.contains(basename)
            || pr_changed_files
                .iter()
                .any(|f| p.path.ends_with(f.as_str()) || f.ends_with(&p.path));
        if from_modified && chunk.score < STALE_SCORE_FLOOR {
            skipped_stale += 1;
            continue;
        }

        let mut meta = vec![format!("File: {}", p.path)];
        if let Some(ns) = &p.namespace {
            meta.push(format!("Namespace: {ns}"));
        }
        if let Some(name) = &p.primary_name {
            meta.push(format!("Definition: {name}"));
        } else if !p.semantic_names.is_empty() {
            let shown: Vec<&str> = p.semantic_names.iter().take(5).map(|s| s.as_str()).collect();
            meta.push(format!("Definitions: {}", shown.join(", ")));
        }
        if !p.extends.is_empty() {
            meta.push(format!("Extends: {}", p.extends.join(", ")));
        }
        if !p.implements.is_empty() {
            meta.push(format!("Implements: {}", p.implements.join(", ")));
        }
        if !p.imports.is_empty() {
            let shown: Vec<&str> = p.imports.iter().take(5).map(|s| s.as_str()).collect();
            let suffix = if p.imports.len() > 5 {
                format!("... (+{} more)", p.imports.len() - 5)
            } else {
                String::new()
            };
            meta.push(format!("Imports: {}{}", shown.join("; "), suffix));
        }
        if !p.parent_context.is_empty() {
            meta.push(format!("Parent: {}", p.parent_context.join(".")));
        }
        if p.content_type != "functions_classes" {
            meta.push(format!("Type: {}", p.content_type));
        }

        parts.push(format!(
            "### Context from `{}` (relevance: {:.2})\n{}\n```\n{}\n```\n",
            p.path,
            chunk.score,
            meta.join("\n"),
            p.content
        ));
    }

    debug!(
        included = parts.len(),
        skipped_stale, "rag context formatted"
    );
    parts.join("\n")
}

/// Pre-filters the global context for one batch when per-batch retrieval
/// failed: keep chunks sharing the batch's files, basenames or directories,
/// plus anything scoring ≥ 0.8. An empty filter result falls back to the
/// original set rather than an empty one.
pub fn filter_context_for_batch(
    chunks: &[ScoredChunk],
    batch_file_paths: &[String],
) -> Vec<ScoredChunk> {
    if chunks.is_empty() {
        return Vec::new();
    }

    let basenames: HashSet<&str> = batch_file_paths
        .iter()
        .map(|p| p.rsplit('/').next().unwrap_or(p.as_str()))
        .collect();
    let dirs: HashSet<&str> = batch_file_paths
        .iter()
        .filter_map(|p| p.rsplit_once('/').map(|(d, _)| d))
        .collect();

    let filtered: Vec<ScoredChunk> = chunks
        .iter()
        .filter(|c| {
            let path = c.payload.path.as_str();
            let basename = path.rsplit('/').next().unwrap_or(path);
            let dir = path.rsplit_once('/').map(|(d, _)| d).unwrap_or("");

            basenames.contains(basename)
                || dirs.contains(dir)
                || batch_file_paths
                    .iter()
                    .any(|bp| path.ends_with(bp.as_str()) || bp.ends_with(path))
                || c.score >= FALLBACK_KEEP_SCORE
        })
        .cloned()
        .collect();

    if filtered.is_empty() {
        chunks.to_vec()
    } else {
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_engine::ChunkPayload;

    fn chunk(path: &str, score: f32, content: &str) -> ScoredChunk {
        ScoredChunk {
            score,
            payload: ChunkPayload {
                path: path.to_string(),
                language: "python".into(),
                workspace: "w".into(),
                project: "p".into(),
                branch: "main".into(),
                commit: "c".into(),
                indexed_at: String::new(),
                content: content.to_string(),
                content_type: "functions_classes".into(),
                semantic_names: vec!["Thing".into()],
                primary_name: Some("Thing".into()),
                parent_context: Vec::new(),
                parent_class: None,
                start_line: 1,
                end_line: 5,
                docstring: None,
                signature: None,
                extends: Vec::new(),
                implements: Vec::new(),
                imports: Vec::new(),
                namespace: None,
                parent_chunk_id: None,
                pr_number: None,
            },
        }
    }

    #[test]
    fn renders_metadata_and_content() {
        let out = format_rag_context(
            &[chunk("src/service/user.py", 0.9, "class Thing: pass")],
            &[],
        );
        assert!(out.contains("### Context from `src/service/user.py`"));
        assert!(out.contains("Definition: Thing"));
        assert!(out.contains("class Thing: pass"));
    }

    #[test]
    fn drops_low_score_chunks_from_modified_files() {
        let changed = vec!["src/service/user.py".to_string()];
        let stale = chunk("src/service/user.py", 0.5, "old content");
        let fresh = chunk("src/service/user.py", 0.9, "still relevant part");
        let out = format_rag_context(&[stale, fresh], &changed);
        assert!(!out.contains("old content"));
        assert!(out.contains("still relevant part"));
    }

    #[test]
    fn caps_rendered_chunks() {
        let chunks: Vec<ScoredChunk> = (0..30)
            .map(|i| chunk(&format!("src/f{i}.py"), 0.9, "content"))
            .collect();
        let out = format_rag_context(&chunks, &[]);
        assert_eq!(out.matches("### Context from").count(), MAX_PROMPT_CHUNKS);
    }

    #[test]
    fn batch_filter_keeps_related_and_high_score() {
        let chunks = vec![
            chunk("src/auth/token.py", 0.6, "a"),
            chunk("src/other/unrelated.py", 0.6, "b"),
            chunk("src/other/important.py", 0.85, "c"),
        ];
        let batch = vec!["src/auth/session.py".to_string()];
        let out = filter_context_for_batch(&chunks, &batch);
        let paths: Vec<&str> = out.iter().map(|c| c.payload.path.as_str()).collect();
        assert!(paths.contains(&"src/auth/token.py")); // same directory
        assert!(paths.contains(&"src/other/important.py")); // high score
        assert!(!paths.contains(&"src/other/unrelated.py"));
    }

    #[test]
    fn batch_filter_falls_back_to_original_when_empty() {
        let chunks = vec![chunk("src/a.py", 0.3, "a")];
        let out = filter_context_for_batch(&chunks, &["elsewhere/b.py".to_string()]);
        assert_eq!(out.len(), 1);
    }
}
