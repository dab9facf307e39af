//! Smart multi-query PR context retrieval.
//!
//! One PR query fans out into several targeted sub-queries (intent,
//! directory clusters, diff snippets), each embedded with a task
//! instruction and searched across the target and base branches. Hits are
//! deduplicated with target-branch priority, rerank-boosted, thresholded,
//! and truncated to `top_k`.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use llm_gateway::LlmServiceProfiles;

use crate::config::RagConfig;
use crate::errors::RagResult;
use crate::facade::QdrantFacade;
use crate::filters;
use crate::instructions::{InstructionType, format_query};
use crate::naming;
use crate::payload::{ChunkPayload, ScoredChunk};
use crate::rerank::rerank_score;

/// Base branches probed when the caller does not supply one.
const FALLBACK_BRANCHES: &[&str] = &["main", "master", "develop"];

/// Description prefix length used in the intent query.
const INTENT_DESCRIPTION_CHARS: usize = 500;

/// How many directory-cluster queries to issue at most.
const MAX_CLUSTER_QUERIES: usize = 5;

/// How many diff-snippet queries to issue at most.
const MAX_SNIPPET_QUERIES: usize = 3;

/// Fallback size when the score threshold empties the result set.
const THRESHOLD_FALLBACK_KEEP: usize = 5;

/// Page cap for deterministic lookup scans; reaching it is logged.
const DETERMINISTIC_SCAN_CAP: usize = 5000;

/// Parameters for one PR context retrieval.
#[derive(Debug, Clone)]
pub struct PrContextRequest {
    pub workspace: String,
    pub project: String,
    /// Target branch (the PR's source branch).
    pub branch: String,
    /// Base branch; auto-detected from the fallback list when `None`.
    pub base_branch: Option<String>,
    pub changed_files: Vec<String>,
    pub diff_snippets: Vec<String>,
    pub pr_title: Option<String>,
    pub pr_description: Option<String>,
    /// Files deleted in the PR — never returned as context.
    pub deleted_files: Vec<String>,
    pub top_k: usize,
    pub min_score: f32,
    pub priority_reranking: bool,
}

impl PrContextRequest {
    pub fn new(workspace: &str, project: &str, branch: &str) -> Self {
        Self {
            workspace: workspace.to_string(),
            project: project.to_string(),
            branch: branch.to_string(),
            base_branch: None,
            changed_files: Vec::new(),
            diff_snippets: Vec::new(),
            pr_title: None,
            pr_description: None,
            deleted_files: Vec::new(),
            top_k: 15,
            min_score: 0.7,
            priority_reranking: true,
        }
    }
}

/// Retrieval result for a PR.
#[derive(Debug, Clone, Default)]
pub struct PrContext {
    pub relevant_code: Vec<ScoredChunk>,
    pub related_files: Vec<String>,
    pub branches_searched: Vec<String>,
}

/// One decomposed sub-query.
#[derive(Debug)]
struct SubQuery {
    text: String,
    /// Score multiplier for hits from this query (snippets are the most
    /// precise signal, directory clusters the least).
    weight: f32,
    top_k: usize,
    instruction: InstructionType,
}

/// Multi-query retriever over the project collection.
pub struct Retriever {
    cfg: RagConfig,
    facade: Arc<QdrantFacade>,
    llm: Arc<LlmServiceProfiles>,
}

impl Retriever {
    pub fn new(cfg: RagConfig, facade: Arc<QdrantFacade>, llm: Arc<LlmServiceProfiles>) -> Self {
        Self { cfg, facade, llm }
    }

    fn alias(&self, workspace: &str, project: &str) -> String {
        naming::project_alias(&self.cfg.collection_prefix, workspace, project)
    }

    /// Retrieves PR review context across target and base branches.
    pub async fn get_pr_context(&self, req: &PrContextRequest) -> RagResult<PrContext> {
        let alias = self.alias(&req.workspace, &req.project);

        if !self.facade.collection_or_alias_exists(&alias).await? {
            warn!(collection = %alias, "get_pr_context: collection does not exist");
            return Ok(PrContext::default());
        }

        // Branch set: target first, then base (supplied or probed).
        let mut branches = vec![req.branch.clone()];
        let base = match &req.base_branch {
            Some(b) if !b.trim().is_empty() => Some(b.clone()),
            _ => self.detect_base_branch(&alias, &req.branch).await?,
        };
        if let Some(b) = &base {
            if !branches.contains(b) {
                branches.push(b.clone());
            }
        }

        info!(
            files = req.changed_files.len(),
            branches = ?branches,
            reranking = req.priority_reranking,
            "smart retrieval: multi-branch query"
        );

        let queries = decompose_queries(req);
        let branch_filter = filters::branch_any(&branches);

        let mut raw_hits: Vec<ScoredChunk> = Vec::new();
        for q in &queries {
            let vector = self.llm.embed(&format_query(&q.text, q.instruction)).await?;
            let limit = (q.top_k * branches.len()) as u64;
            let hits = self
                .facade
                .search(&alias, vector, limit, Some(branch_filter.clone()))
                .await?;

            for hit in hits {
                let payload = match ChunkPayload::from_qdrant(&hit.payload) {
                    Ok(p) => p,
                    Err(e) => {
                        debug!(error = %e, "skipping hit with unreadable payload");
                        continue;
                    }
                };
                if req.deleted_files.iter().any(|d| d == &payload.path) {
                    continue;
                }
                raw_hits.push(ScoredChunk {
                    score: (hit.score * q.weight).min(1.0),
                    payload,
                });
            }
        }

        let deduped = dedupe_by_branch_priority(raw_hits, &req.branch, base.as_deref());

        // Rerank and threshold.
        let threshold = if req.priority_reranking {
            req.min_score
        } else {
            0.5
        };
        let mut ranked: Vec<ScoredChunk> = deduped
            .iter()
            .map(|c| ScoredChunk {
                score: if req.priority_reranking {
                    rerank_score(c.score, &c.payload)
                } else {
                    c.score
                },
                payload: c.payload.clone(),
            })
            .filter(|c| c.score >= threshold)
            .collect();

        // The threshold can be too strict for sparse collections; fall back
        // to the best raw hits rather than returning nothing.
        if ranked.is_empty() && !deduped.is_empty() {
            info!("score threshold emptied the result set, keeping top raw hits");
            let mut fallback = deduped;
            fallback.sort_by(|a, b| b.score.total_cmp(&a.score));
            fallback.truncate(THRESHOLD_FALLBACK_KEEP);
            ranked = fallback;
        }

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(req.top_k);

        let mut related_files: Vec<String> = Vec::new();
        for c in &ranked {
            if !related_files.contains(&c.payload.path) {
                related_files.push(c.payload.path.clone());
            }
        }

        info!(
            chunks = ranked.len(),
            files = related_files.len(),
            branches = branches.len(),
            "smart retrieval: context assembled"
        );

        Ok(PrContext {
            relevant_code: ranked,
            related_files,
            branches_searched: branches,
        })
    }

    /// Finds a base branch that actually has points in the collection.
    async fn detect_base_branch(
        &self,
        alias: &str,
        target_branch: &str,
    ) -> RagResult<Option<String>> {
        for candidate in FALLBACK_BRANCHES {
            if *candidate == target_branch {
                continue;
            }
            let count = self
                .facade
                .count_by_filter(alias, filters::branch_eq(candidate))
                .await
                .unwrap_or(0);
            if count > 0 {
                info!(branch = candidate, points = count, "base branch detected");
                return Ok(Some(candidate.to_string()));
            }
        }
        Ok(None)
    }

    /// Non-semantic lookup: chunks whose `semantic_names` or `imports`
    /// reference the given files or their basenames.
    ///
    /// Results carry a fixed synthetic score of 0.85 so callers can merge
    /// them with semantic hits.
    pub async fn deterministic_lookup(
        &self,
        workspace: &str,
        project: &str,
        branches: &[String],
        file_paths: &[String],
        limit_per_file: usize,
    ) -> RagResult<Vec<ScoredChunk>> {
        let alias = self.alias(workspace, project);
        if !self.facade.collection_or_alias_exists(&alias).await? {
            return Ok(Vec::new());
        }

        let stems: Vec<(String, String)> = file_paths
            .iter()
            .map(|p| (p.clone(), file_stem(p)))
            .filter(|(_, s)| !s.is_empty())
            .collect();
        if stems.is_empty() {
            return Ok(Vec::new());
        }

        let points = self
            .facade
            .scroll_all(&alias, Some(filters::branch_any(branches)), 200, false)
            .await?;
        if points.len() >= DETERMINISTIC_SCAN_CAP {
            warn!(
                cap = DETERMINISTIC_SCAN_CAP,
                "deterministic lookup scanned the cap; results may be partial"
            );
        }

        let mut per_file: HashMap<String, usize> = HashMap::new();
        let mut out = Vec::new();

        for p in points.into_iter().take(DETERMINISTIC_SCAN_CAP) {
            let payload = match ChunkPayload::from_qdrant(&p.payload) {
                Ok(pl) => pl,
                Err(_) => continue,
            };

            let matched = stems.iter().find(|(path, stem)| {
                // Own chunks of the changed file are not "related" context.
                if &payload.path == path {
                    return false;
                }
                payload.semantic_names.iter().any(|n| n == stem)
                    || payload
                        .imports
                        .iter()
                        .any(|imp| imp.contains(stem.as_str()) || imp.contains(path.as_str()))
            });

            if let Some((path, _)) = matched {
                let used = per_file.entry(path.clone()).or_insert(0);
                if *used >= limit_per_file {
                    continue;
                }
                *used += 1;
                out.push(ScoredChunk {
                    score: 0.85,
                    payload,
                });
            }
        }

        debug!(hits = out.len(), "deterministic lookup complete");
        Ok(out)
    }
}

/// Breaks one PR into targeted sub-queries.
fn decompose_queries(req: &PrContextRequest) -> Vec<SubQuery> {
    let mut queries = Vec::new();

    // A. Intent query (high level).
    let mut intent_parts = Vec::new();
    if let Some(t) = &req.pr_title {
        if !t.trim().is_empty() {
            intent_parts.push(t.trim().to_string());
        }
    }
    if let Some(d) = &req.pr_description {
        let prefix: String = d.chars().take(INTENT_DESCRIPTION_CHARS).collect();
        if !prefix.trim().is_empty() {
            intent_parts.push(prefix);
        }
    }
    if !intent_parts.is_empty() {
        queries.push(SubQuery {
            text: intent_parts.join(" "),
            weight: 1.0,
            top_k: 10,
            instruction: InstructionType::General,
        });
    }

    // B. Directory cluster queries (mid level): the most-changed directories
    // are this PR's hotspots.
    let mut dir_groups: HashMap<String, Vec<String>> = HashMap::new();
    for f in &req.changed_files {
        let (dir, file) = match f.rsplit_once('/') {
            Some((d, f)) => (d.to_string(), f.to_string()),
            None => ("root".to_string(), f.clone()),
        };
        dir_groups.entry(dir).or_default().push(file);
    }
    let mut dirs: Vec<(String, Vec<String>)> = dir_groups.into_iter().collect();
    dirs.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(&b.0)));

    for (dir, files) in dirs.into_iter().take(MAX_CLUSTER_QUERIES) {
        let shown = files.len().min(10);
        let mut files_str = files[..shown].join(", ");
        if files.len() > 10 {
            files_str.push_str("...");
        }
        let clean_dir = if dir == "root" {
            "root directory".to_string()
        } else {
            dir
        };
        queries.push(SubQuery {
            text: format!("logic in {clean_dir} related to {files_str}"),
            weight: 0.8,
            top_k: 5,
            instruction: InstructionType::Logic,
        });
    }

    // C. Snippet queries (low level, high precision).
    for snippet in req.diff_snippets.iter().take(MAX_SNIPPET_QUERIES) {
        let lines: Vec<&str> = snippet
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && !l.starts_with('+') && !l.starts_with('-'))
            .collect();
        let clean = lines[..lines.len().min(3)].join(" ");
        if clean.chars().count() > 10 {
            queries.push(SubQuery {
                text: clean,
                weight: 1.2,
                top_k: 5,
                instruction: InstructionType::Dependency,
            });
        }
    }

    queries
}

/// Deduplicates hits by `(path, content prefix hash)` with branch priority:
/// target branch wins, then base branch, then the higher score.
fn dedupe_by_branch_priority(
    hits: Vec<ScoredChunk>,
    target_branch: &str,
    base_branch: Option<&str>,
) -> Vec<ScoredChunk> {
    let mut grouped: HashMap<String, ScoredChunk> = HashMap::new();

    for hit in hits {
        let key = format!(
            "{}:{}",
            hit.payload.path,
            content_prefix_hash(&hit.payload.content)
        );

        match grouped.get(&key) {
            None => {
                grouped.insert(key, hit);
            }
            Some(existing) => {
                let existing_branch = existing.payload.branch.clone();
                let new_branch = &hit.payload.branch;

                let replace = if new_branch == target_branch && existing_branch != target_branch {
                    true
                } else if base_branch == Some(new_branch.as_str())
                    && existing_branch != target_branch
                    && Some(existing_branch.as_str()) != base_branch
                {
                    true
                } else {
                    existing_branch == *new_branch && hit.score > existing.score
                };

                if replace {
                    grouped.insert(key, hit);
                }
            }
        }
    }

    grouped.into_values().collect()
}

/// Identity hash over the first 200 characters of chunk content.
fn content_prefix_hash(content: &str) -> String {
    let prefix: String = content.chars().take(200).collect();
    let digest = Sha256::digest(prefix.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn file_stem(path: &str) -> String {
    let base = path.rsplit('/').next().unwrap_or(path);
    base.rsplit_once('.')
        .map(|(s, _)| s.to_string())
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(path: &str, branch: &str, content: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            score,
            payload: ChunkPayload {
                path: path.to_string(),
                language: "python".into(),
                workspace: "w".into(),
                project: "p".into(),
                branch: branch.to_string(),
                commit: "c".into(),
                indexed_at: String::new(),
                content: content.to_string(),
                content_type: "functions_classes".into(),
                semantic_names: Vec::new(),
                primary_name: None,
                parent_context: Vec::new(),
                parent_class: None,
                start_line: 1,
                end_line: 2,
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
    fn target_branch_wins_dedupe() {
        let hits = vec![
            chunk("util.py", "main", "content A", 0.95),
            chunk("util.py", "feature/x", "content A", 0.60),
        ];
        let out = dedupe_by_branch_priority(hits, "feature/x", Some("main"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload.branch, "feature/x");
    }

    #[test]
    fn base_only_files_survive() {
        let hits = vec![
            chunk("util.py", "feature/x", "content B", 0.8),
            chunk("legacy.py", "main", "content C", 0.7),
        ];
        let out = dedupe_by_branch_priority(hits, "feature/x", Some("main"));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn same_branch_keeps_higher_score() {
        let hits = vec![
            chunk("a.py", "main", "same content", 0.5),
            chunk("a.py", "main", "same content", 0.9),
        ];
        let out = dedupe_by_branch_priority(hits, "feature/x", Some("main"));
        assert_eq!(out.len(), 1);
        assert!((out[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn different_chunks_of_one_file_are_kept() {
        let hits = vec![
            chunk("a.py", "main", "def first(): pass", 0.5),
            chunk("a.py", "main", "def second(): pass", 0.6),
        ];
        let out = dedupe_by_branch_priority(hits, "feature/x", Some("main"));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn decompose_builds_intent_cluster_and_snippet_queries() {
        let mut req = PrContextRequest::new("w", "p", "feature/x");
        req.pr_title = Some("Add token refresh".into());
        req.pr_description = Some("Refreshes JWTs before expiry".into());
        req.changed_files = vec![
            "src/auth/token.py".into(),
            "src/auth/session.py".into(),
            "src/api/login.py".into(),
        ];
        req.diff_snippets = vec!["def refresh_token(session): return issue(session.user)".into()];

        let queries = decompose_queries(&req);

        assert!(queries.iter().any(|q| q.instruction == InstructionType::General));
        let cluster = queries
            .iter()
            .find(|q| q.instruction == InstructionType::Logic)
            .expect("cluster query");
        assert!(cluster.text.contains("src/auth"));
        assert!(
            queries
                .iter()
                .any(|q| q.instruction == InstructionType::Dependency)
        );
    }

    #[test]
    fn cluster_queries_prioritize_most_changed_dirs() {
        let mut req = PrContextRequest::new("w", "p", "b");
        for i in 0..3 {
            req.changed_files.push(format!("hot/dir/file{i}.py"));
        }
        for d in 0..6 {
            req.changed_files.push(format!("cold{d}/one.py"));
        }
        let queries = decompose_queries(&req);
        let clusters: Vec<&SubQuery> = queries
            .iter()
            .filter(|q| q.instruction == InstructionType::Logic)
            .collect();
        assert_eq!(clusters.len(), MAX_CLUSTER_QUERIES);
        assert!(clusters[0].text.contains("hot/dir"));
    }
}
