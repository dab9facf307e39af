//! Repository indexing with atomic alias-swap reindexing.
//!
//! One collection per (workspace, project), addressed via a stable alias.
//! `index_repository` builds a fresh versioned collection, carries over
//! points from other branches, then atomically swaps the alias — the swap
//! is the commit point. Any failure before it leaves the live index
//! untouched; the partially built collection is deleted.
//!
//! Branch-scoped operations (`update_files`, `delete_files`,
//! `delete_branch`) and PR-scoped hybrid points write through the alias
//! into whatever collection currently backs it.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use qdrant_client::qdrant::{PointStruct, Vectors};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use code_splitter::{CodeChunk, CodeSplitter, SplitterConfig};
use llm_gateway::LlmServiceProfiles;

use crate::config::RagConfig;
use crate::errors::{RagError, RagResult};
use crate::facade::QdrantFacade;
use crate::filters;
use crate::locks::ProjectLocks;
use crate::naming;
use crate::payload::ChunkPayload;
use crate::scan::{ScannedFile, scan_repository};

/// Sample size for chunk-count estimation on large repositories.
const ESTIMATE_SAMPLE_FILES: usize = 100;

/// Estimation variance buffer applied before rejecting on the chunk cap.
const ESTIMATE_BUFFER: f64 = 1.2;

/// Statistics for one index scope.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub workspace: String,
    pub project: String,
    /// `"*"` for project-wide stats.
    pub branch: String,
    pub document_count: usize,
    pub chunk_count: usize,
    pub last_updated: String,
}

/// A PR file handed over for hybrid indexing.
#[derive(Debug, Clone)]
pub struct PrFile {
    pub path: String,
    pub content: String,
}

/// Indexing engine over the Qdrant facade.
pub struct Indexer {
    cfg: RagConfig,
    facade: Arc<QdrantFacade>,
    llm: Arc<LlmServiceProfiles>,
    splitter: CodeSplitter,
    locks: Arc<ProjectLocks>,
}

impl Indexer {
    pub fn new(
        cfg: RagConfig,
        facade: Arc<QdrantFacade>,
        llm: Arc<LlmServiceProfiles>,
        locks: Arc<ProjectLocks>,
    ) -> Self {
        let splitter = CodeSplitter::new(SplitterConfig {
            max_chunk_size: cfg.chunk_size,
            min_chunk_size: (cfg.chunk_size / 4).min(200).max(100),
            chunk_overlap: cfg.chunk_overlap,
            ..SplitterConfig::default()
        });
        Self {
            cfg,
            facade,
            llm,
            splitter,
            locks,
        }
    }

    fn alias(&self, workspace: &str, project: &str) -> String {
        naming::project_alias(&self.cfg.collection_prefix, workspace, project)
    }

    /// Indexes a full repository checkout for one branch.
    ///
    /// Budget checks run before anything is written. On success the alias
    /// points at the new versioned collection and the previous one is gone;
    /// on failure (or cancellation) the previous index is untouched.
    pub async fn index_repository(
        &self,
        repo_path: &Path,
        workspace: &str,
        project: &str,
        branch: &str,
        commit: &str,
        exclude_patterns: &[String],
        cancel: &CancellationToken,
    ) -> RagResult<IndexStats> {
        let alias = self.alias(workspace, project);
        let lock = self.locks.for_project(&alias);
        let _guard = lock.lock().await;

        info!(
            workspace,
            project,
            branch,
            repo = %repo_path.display(),
            "index_repository: start"
        );

        let files = scan_repository(repo_path, exclude_patterns, self.cfg.max_file_bytes)?;
        let total_files = files.len();

        if total_files == 0 {
            warn!("index_repository: no files to index");
            return self.branch_stats_inner(&alias, workspace, project, branch).await;
        }

        // Budget: file cap first, it is free to check.
        if self.cfg.max_files_per_index > 0 && total_files > self.cfg.max_files_per_index {
            return Err(RagError::BudgetExceeded(format!(
                "repository has {} files (max {}); add exclude patterns to narrow the index",
                total_files, self.cfg.max_files_per_index
            )));
        }

        // Budget: estimated chunk cap, before any embedding spend.
        if self.cfg.max_chunks_per_index > 0 {
            let estimated = self.estimate_chunks(&files).await?;
            debug!(estimated, cap = self.cfg.max_chunks_per_index, "chunk estimate");
            if estimated as f64 > self.cfg.max_chunks_per_index as f64 * ESTIMATE_BUFFER {
                return Err(RagError::BudgetExceeded(format!(
                    "estimated ~{} chunks exceeds the cap of {}; add exclude patterns",
                    estimated, self.cfg.max_chunks_per_index
                )));
            }
        }

        self.cleanup_orphaned_versions(&alias).await?;

        let temp = naming::versioned_collection(&alias, Utc::now().timestamp_millis());
        self.facade
            .create_collection(&temp, self.cfg.embedding_dim)
            .await?;

        match self
            .populate_and_swap(&temp, &alias, &files, workspace, project, branch, commit, cancel)
            .await
        {
            Ok(stats) => Ok(stats),
            Err(e) => {
                warn!(error = %e, "index_repository failed, removing versioned collection");
                self.facade.delete_collection(&temp).await.ok();
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn populate_and_swap(
        &self,
        temp: &str,
        alias: &str,
        files: &[ScannedFile],
        workspace: &str,
        project: &str,
        branch: &str,
        commit: &str,
        cancel: &CancellationToken,
    ) -> RagResult<IndexStats> {
        let old_exists = self.facade.collection_or_alias_exists(alias).await?;

        // Carry points from other branches into the new collection, unless
        // the old vector space no longer matches (those branches will be
        // re-embedded on their next index).
        if old_exists {
            let actual = self
                .facade
                .resolve_alias(alias)
                .await?
                .unwrap_or_else(|| alias.to_string());
            let old_dim = self.facade.vector_dim(&actual).await?;
            if old_dim == Some(self.cfg.embedding_dim as u64) {
                let preserved = self
                    .facade
                    .scroll_all(&actual, Some(filters::branch_not(branch)), 100, true)
                    .await?;
                info!(count = preserved.len(), "preserving other-branch points");
                for batch in preserved.chunks(self.cfg.insert_batch_size) {
                    if cancel.is_cancelled() {
                        return Err(RagError::Cancelled);
                    }
                    let points: Vec<PointStruct> = batch
                        .iter()
                        .map(|p| PointStruct {
                            id: Some(p.id.clone()),
                            payload: p.payload.clone(),
                            vectors: Some(Vectors::from(p.vector.clone())),
                        })
                        .collect();
                    self.facade.upsert_points(temp, points).await?;
                }
            } else {
                warn!(
                    old_dim = ?old_dim,
                    new_dim = self.cfg.embedding_dim,
                    "vector dimensions differ, other branches not carried over"
                );
            }
        }

        let indexed_at = Utc::now().to_rfc3339();
        let mut document_count = 0usize;
        let mut chunk_count = 0usize;
        let mut successful_chunks = 0usize;

        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner} indexing {pos}/{len} files {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        for (batch_num, file_batch) in files.chunks(self.cfg.document_batch_size).enumerate() {
            if cancel.is_cancelled() {
                pb.finish_and_clear();
                return Err(RagError::Cancelled);
            }

            let mut batch_chunks: Vec<CodeChunk> = Vec::new();
            for file in file_batch {
                match tokio::fs::read_to_string(&file.abs_path).await {
                    Ok(content) => {
                        document_count += 1;
                        batch_chunks.extend(self.splitter.split_file(&file.rel_path, &content));
                    }
                    Err(e) => {
                        warn!(path = %file.rel_path, error = %e, "read failed, skipping");
                    }
                }
            }
            pb.inc(file_batch.len() as u64);

            if batch_chunks.is_empty() {
                continue;
            }
            chunk_count += batch_chunks.len();

            // The estimate already passed; this is the hard cap.
            if self.cfg.max_chunks_per_index > 0 && chunk_count > self.cfg.max_chunks_per_index {
                pb.finish_and_clear();
                return Err(RagError::BudgetExceeded(format!(
                    "chunk cap of {} exceeded while indexing",
                    self.cfg.max_chunks_per_index
                )));
            }

            let points = self
                .build_points(&batch_chunks, workspace, project, branch, commit, &indexed_at, None)
                .await?;
            let built = points.len();

            for insert in points.chunks(self.cfg.insert_batch_size) {
                self.facade.upsert_points(temp, insert.to_vec()).await?;
            }
            successful_chunks += built;

            debug!(
                batch = batch_num + 1,
                files = file_batch.len(),
                chunks = batch_chunks.len(),
                "batch indexed"
            );
        }
        pb.finish_and_clear();

        info!(
            files = document_count,
            chunks = successful_chunks,
            "streaming indexing complete"
        );

        let temp_points = self.facade.points_count(temp).await?.unwrap_or(0);
        if temp_points == 0 {
            return Err(RagError::Qdrant(
                "versioned collection is empty after indexing".into(),
            ));
        }

        if cancel.is_cancelled() {
            return Err(RagError::Cancelled);
        }

        self.swap_into_place(alias, temp, old_exists).await?;

        Ok(IndexStats {
            workspace: workspace.to_string(),
            project: project.to_string(),
            branch: branch.to_string(),
            document_count,
            chunk_count: successful_chunks,
            last_updated: Utc::now().to_rfc3339(),
        })
    }

    /// Atomic alias swap, then removal of the superseded collection.
    ///
    /// Handles the pre-alias layout where a plain collection occupies the
    /// alias name: the direct collection is deleted first and the swap is
    /// retried once.
    async fn swap_into_place(&self, alias: &str, temp: &str, old_exists: bool) -> RagResult<()> {
        let is_direct = self.facade.collection_exists(alias).await?
            && !self.facade.alias_exists(alias).await?;

        let old_versioned = if old_exists && !is_direct {
            self.facade.resolve_alias(alias).await?
        } else {
            None
        };

        if is_direct {
            info!(
                collection = alias,
                "migrating direct collection to alias-based indexing"
            );
            self.facade.delete_collection(alias).await?;
        }

        let delete_existing = old_exists && !is_direct;
        if let Err(first) = self.facade.swap_alias(alias, temp, delete_existing).await {
            // A racing direct collection can still occupy the name; clear it
            // and retry exactly once.
            let occupied = self.facade.collection_exists(alias).await.unwrap_or(false)
                && !self.facade.alias_exists(alias).await.unwrap_or(false);
            if occupied {
                warn!(alias, "alias name occupied by a collection, retrying swap once");
                self.facade.delete_collection(alias).await?;
                self.facade.swap_alias(alias, temp, false).await?;
            } else {
                return Err(first);
            }
        }

        if let Some(old) = old_versioned {
            if old != temp {
                info!(collection = %old, "deleting superseded versioned collection");
                self.facade.delete_collection(&old).await.ok();
            }
        }
        Ok(())
    }

    /// Deletes `…_v*` leftovers from crashed runs that no alias points at.
    async fn cleanup_orphaned_versions(&self, alias: &str) -> RagResult<()> {
        let current = self.facade.resolve_alias(alias).await?;
        for name in self.facade.list_collections().await? {
            if naming::is_versioned_of(alias, &name) && current.as_deref() != Some(&name) {
                info!(collection = %name, "cleaning up orphaned versioned collection");
                self.facade.delete_collection(&name).await.ok();
            }
        }
        Ok(())
    }

    /// Splits, embeds and shapes points for a set of chunks.
    ///
    /// Chunk indices restart per file so point ids stay stable regardless of
    /// how files are batched together.
    async fn build_points(
        &self,
        chunks: &[CodeChunk],
        workspace: &str,
        project: &str,
        branch: &str,
        commit: &str,
        indexed_at: &str,
        pr_number: Option<i64>,
    ) -> RagResult<Vec<PointStruct>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.llm.embed_batch(&texts).await?;

        let mut points = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.iter().zip(embeddings) {
            if vector.len() != self.cfg.embedding_dim {
                return Err(RagError::VectorSizeMismatch {
                    got: vector.len(),
                    want: self.cfg.embedding_dim,
                });
            }

            let mut payload =
                ChunkPayload::from_chunk(chunk, workspace, project, branch, commit, indexed_at);
            payload.pr_number = pr_number;

            // PR points get their own id space so they never clobber branch data.
            let id_branch = match pr_number {
                Some(n) => format!("{branch}#pr{n}"),
                None => branch.to_string(),
            };
            let id = naming::point_id(workspace, project, &id_branch, &chunk.path, chunk.chunk_index);

            points.push(PointStruct::new(id, vector, payload.to_qdrant()?));
        }
        Ok(points)
    }

    /// Estimates total chunk count, sampling evenly on large repositories.
    async fn estimate_chunks(&self, files: &[ScannedFile]) -> RagResult<usize> {
        if files.is_empty() {
            return Ok(0);
        }

        let sample: Vec<&ScannedFile> = if files.len() <= ESTIMATE_SAMPLE_FILES {
            files.iter().collect()
        } else {
            let step = files.len() / ESTIMATE_SAMPLE_FILES;
            files.iter().step_by(step.max(1)).take(ESTIMATE_SAMPLE_FILES).collect()
        };

        let mut sampled_chunks = 0usize;
        for file in &sample {
            if let Ok(content) = tokio::fs::read_to_string(&file.abs_path).await {
                sampled_chunks += self.splitter.split_file(&file.rel_path, &content).len();
            }
        }

        if files.len() <= ESTIMATE_SAMPLE_FILES {
            Ok(sampled_chunks)
        } else {
            let avg = sampled_chunks as f64 / sample.len().max(1) as f64;
            Ok((avg * files.len() as f64) as usize)
        }
    }

    /* ---------------------- branch-scoped updates ---------------------- */

    /// Replaces the index entries for specific files on one branch.
    ///
    /// Delete-old then insert-new; deterministic point ids make the insert
    /// an idempotent replace.
    pub async fn update_files(
        &self,
        file_paths: &[String],
        repo_base: &Path,
        workspace: &str,
        project: &str,
        branch: &str,
        commit: &str,
    ) -> RagResult<IndexStats> {
        let alias = self.alias(workspace, project);
        let lock = self.locks.for_project(&alias);
        let _guard = lock.lock().await;

        info!(files = file_paths.len(), workspace, project, branch, "update_files");

        self.ensure_collection(&alias).await?;

        self.facade
            .delete_by_filter(&alias, filters::paths_in_branch(file_paths, branch))
            .await?;

        let mut chunks: Vec<CodeChunk> = Vec::new();
        for rel in file_paths {
            let abs = repo_base.join(rel);
            match tokio::fs::read_to_string(&abs).await {
                Ok(content) => chunks.extend(self.splitter.split_file(rel, &content)),
                Err(e) => warn!(path = %rel, error = %e, "update_files: read failed, skipping"),
            }
        }

        if !chunks.is_empty() {
            let indexed_at = Utc::now().to_rfc3339();
            let points = self
                .build_points(&chunks, workspace, project, branch, commit, &indexed_at, None)
                .await?;
            for insert in points.chunks(self.cfg.insert_batch_size) {
                self.facade.upsert_points(&alias, insert.to_vec()).await?;
            }
        }

        info!(chunks = chunks.len(), branch, "update_files complete");
        self.project_stats(workspace, project).await
    }

    /// Deletes index entries for specific files on one branch.
    pub async fn delete_files(
        &self,
        file_paths: &[String],
        workspace: &str,
        project: &str,
        branch: &str,
    ) -> RagResult<IndexStats> {
        let alias = self.alias(workspace, project);
        let lock = self.locks.for_project(&alias);
        let _guard = lock.lock().await;

        info!(files = file_paths.len(), branch, "delete_files");
        self.facade
            .delete_by_filter(&alias, filters::paths_in_branch(file_paths, branch))
            .await?;
        self.project_stats(workspace, project).await
    }

    /// Deletes every point for one branch; collection and alias stay.
    pub async fn delete_branch(
        &self,
        workspace: &str,
        project: &str,
        branch: &str,
    ) -> RagResult<bool> {
        let alias = self.alias(workspace, project);
        let lock = self.locks.for_project(&alias);
        let _guard = lock.lock().await;

        if !self.facade.collection_or_alias_exists(&alias).await? {
            warn!(collection = %alias, "delete_branch: collection does not exist");
            return Ok(false);
        }

        self.facade
            .delete_by_filter(&alias, filters::branch_eq(branch))
            .await?;
        info!(branch, "branch points deleted");
        Ok(true)
    }

    /* ------------------------- PR hybrid points ------------------------ */

    /// Writes PR-tagged points so retrieval sees fresh PR content.
    ///
    /// Returns the number of chunks indexed. Deleted after the review via
    /// [`Indexer::delete_pr_files`].
    pub async fn index_pr_files(
        &self,
        workspace: &str,
        project: &str,
        branch: &str,
        pr_number: i64,
        files: &[PrFile],
    ) -> RagResult<usize> {
        let alias = self.alias(workspace, project);
        let lock = self.locks.for_project(&alias);
        let _guard = lock.lock().await;

        self.ensure_collection(&alias).await?;

        let mut chunks: Vec<CodeChunk> = Vec::new();
        for f in files {
            chunks.extend(self.splitter.split_file(&f.path, &f.content));
        }
        if chunks.is_empty() {
            return Ok(0);
        }

        let indexed_at = Utc::now().to_rfc3339();
        let points = self
            .build_points(
                &chunks,
                workspace,
                project,
                branch,
                "pr-head",
                &indexed_at,
                Some(pr_number),
            )
            .await?;
        for insert in points.chunks(self.cfg.insert_batch_size) {
            self.facade.upsert_points(&alias, insert.to_vec()).await?;
        }

        info!(pr_number, chunks = chunks.len(), "PR files indexed");
        Ok(chunks.len())
    }

    /// Removes every point tagged with this PR number.
    pub async fn delete_pr_files(
        &self,
        workspace: &str,
        project: &str,
        pr_number: i64,
    ) -> RagResult<()> {
        let alias = self.alias(workspace, project);
        let lock = self.locks.for_project(&alias);
        let _guard = lock.lock().await;

        if !self.facade.collection_or_alias_exists(&alias).await? {
            return Ok(());
        }
        self.facade
            .delete_by_filter(&alias, filters::pr_number_eq(pr_number))
            .await?;
        info!(pr_number, "PR points cleaned up");
        Ok(())
    }

    /* ----------------------------- stats ------------------------------- */

    /// Point count for one branch.
    pub async fn branch_point_count(
        &self,
        workspace: &str,
        project: &str,
        branch: &str,
    ) -> RagResult<u64> {
        let alias = self.alias(workspace, project);
        if !self.facade.collection_or_alias_exists(&alias).await? {
            return Ok(0);
        }
        self.facade
            .count_by_filter(&alias, filters::branch_eq(branch))
            .await
    }

    /// Distinct branches present in the project collection.
    pub async fn indexed_branches(&self, workspace: &str, project: &str) -> RagResult<Vec<String>> {
        let alias = self.alias(workspace, project);
        if !self.facade.collection_or_alias_exists(&alias).await? {
            return Ok(Vec::new());
        }

        let points = self.facade.scroll_all(&alias, None, 100, false).await?;
        let mut branches: Vec<String> = Vec::new();
        for p in points {
            if let Some(b) = p.payload.get("branch").and_then(|v| match &v.kind {
                Some(qdrant_client::qdrant::value::Kind::StringValue(s)) => Some(s.clone()),
                _ => None,
            }) {
                if !branches.contains(&b) {
                    branches.push(b);
                }
            }
        }
        Ok(branches)
    }

    /// Project-wide stats (all branches combined).
    pub async fn project_stats(&self, workspace: &str, project: &str) -> RagResult<IndexStats> {
        let alias = self.alias(workspace, project);
        let count = self.facade.points_count(&alias).await?.unwrap_or(0);
        Ok(IndexStats {
            workspace: workspace.to_string(),
            project: project.to_string(),
            branch: "*".to_string(),
            document_count: 0,
            chunk_count: count as usize,
            last_updated: Utc::now().to_rfc3339(),
        })
    }

    async fn branch_stats_inner(
        &self,
        alias: &str,
        workspace: &str,
        project: &str,
        branch: &str,
    ) -> RagResult<IndexStats> {
        let count = if self.facade.collection_or_alias_exists(alias).await? {
            self.facade
                .count_by_filter(alias, filters::branch_eq(branch))
                .await?
        } else {
            0
        };
        Ok(IndexStats {
            workspace: workspace.to_string(),
            project: project.to_string(),
            branch: branch.to_string(),
            document_count: 0,
            chunk_count: count as usize,
            last_updated: Utc::now().to_rfc3339(),
        })
    }

    /// Creates the project collection when neither alias nor collection
    /// exists yet (first partial update before any full index).
    async fn ensure_collection(&self, alias: &str) -> RagResult<()> {
        if self.facade.collection_or_alias_exists(alias).await? {
            return Ok(());
        }
        info!(collection = %alias, "creating project collection (no alias yet)");
        self.facade
            .create_collection(alias, self.cfg.embedding_dim)
            .await
    }
}
