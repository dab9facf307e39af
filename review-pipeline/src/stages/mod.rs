//! Stage orchestration: the single public entry for running a review.
//!
//! Stages are strictly sequential; only Stage 1 fans out internally into
//! bounded parallel waves. Progress events fire at stage boundaries with
//! the percent milestones 10 / …60 / 70 / 85 / 100. The cancellation token
//! is observed at every boundary and between waves; PR-scoped index points
//! are cleaned up whether the review succeeds or not.

pub mod aggregate;
pub mod cross_file;
pub mod file_review;
pub mod planning;

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use llm_gateway::LlmServiceProfiles;
use rag_engine::{Indexer, PrContext, PrContextRequest, Retriever};
use rag_engine::indexer::PrFile;

use crate::batch::{self, MAX_FILES_PER_BATCH};
use crate::diff::{DiffProcessor, ProcessedDiff, extract_diff_snippets};
use crate::errors::{ReviewError, ReviewResult};
use crate::events::EventSink;
use crate::model::{Issue, ReviewOutcome, ReviewRequest};

/// Default bound on concurrent Stage 1 batches per wave.
pub const DEFAULT_MAX_PARALLEL_STAGE_1: usize = 5;

/// Services the pipeline depends on. Process-lifetime construction is the
/// boundary; nothing here is global.
#[derive(Clone)]
pub struct ReviewDeps {
    pub llm: Arc<LlmServiceProfiles>,
    /// Absent retriever means reviews run without repository context.
    pub retriever: Option<Arc<Retriever>>,
    /// Absent indexer disables PR-scoped hybrid indexing.
    pub indexer: Option<Arc<Indexer>>,
    pub max_parallel_stage_1: usize,
}

impl ReviewDeps {
    pub fn new(llm: Arc<LlmServiceProfiles>) -> Self {
        Self {
            llm,
            retriever: None,
            indexer: None,
            max_parallel_stage_1: DEFAULT_MAX_PARALLEL_STAGE_1,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_indexer(mut self, indexer: Arc<Indexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }
}

/// Runs the full multi-stage review.
pub async fn orchestrate_review(
    deps: &ReviewDeps,
    request: &ReviewRequest,
    events: &EventSink,
    cancel: &CancellationToken,
) -> ReviewResult<ReviewOutcome> {
    request.validate()?;

    // An empty PR never reaches a model: empty plan, PASS, fixed comment.
    if request.changed_files.is_empty() {
        info!("review requested with no changed files");
        let outcome = ReviewOutcome {
            comment: "## Code Review\n\nThis pull request contains no changes to review.\n\n\
                      **Recommendation: PASS**\n"
                .to_string(),
            issues: Vec::new(),
        };
        events.final_result(outcome.clone());
        return Ok(outcome);
    }

    let processed = DiffProcessor::process(&request.diff);
    let is_incremental = request.is_incremental();
    if is_incremental {
        info!(
            previous = request.previous_issues.len(),
            "INCREMENTAL mode: reviewing delta diff"
        );
    } else {
        info!("FULL mode: initial PR review");
    }

    let pr_indexed = index_pr_files(deps, request, &processed).await;

    let result = run_stages(deps, request, &processed, is_incremental, events, cancel).await;

    cleanup_pr_files(deps, request, pr_indexed).await;

    match &result {
        Ok(outcome) => events.final_result(outcome.clone()),
        Err(e) => events.error(e.to_string()),
    }
    result
}

async fn run_stages(
    deps: &ReviewDeps,
    request: &ReviewRequest,
    processed: &ProcessedDiff,
    is_incremental: bool,
    events: &EventSink,
    cancel: &CancellationToken,
) -> ReviewResult<ReviewOutcome> {
    // ---------------- Stage 0: planning ----------------
    check_cancelled(cancel)?;
    events.status("stage_0_started", "Stage 0: Planning & Prioritization...");

    let plan = planning::execute_stage_0(deps, request, processed, is_incremental).await?;
    let plan = planning::ensure_all_files_planned(plan, &request.changed_files);
    events.progress(10, "Stage 0 Complete: Review plan created");

    // Global retrieval context: fallback source for batches and relation
    // discovery when no enrichment was supplied.
    check_cancelled(cancel)?;
    let global_context = fetch_global_context(deps, request).await;

    // Relationship source precedence: enrichment wins when non-empty.
    let relations = match &request.enrichment {
        Some(e) if !e.is_empty() => batch::relations_from_enrichment(e),
        _ => match &global_context {
            Some(ctx) => batch::relations_from_chunks(&ctx.relevant_code, &request.changed_files),
            None => Default::default(),
        },
    };

    let batches = batch::create_batches(&plan, &relations, MAX_FILES_PER_BATCH);

    // ---------------- Stage 1: per-batch reviews ----------------
    events.status(
        "stage_1_started",
        format!("Stage 1: Analyzing {} files...", plan.file_count()),
    );

    let delta = if is_incremental {
        request.delta_diff.as_deref().map(DiffProcessor::process)
    } else {
        None
    };

    let mut issues: Vec<Issue> = Vec::new();
    let total_batches = batches.len();
    let max_parallel = deps.max_parallel_stage_1.max(1);

    for (wave_idx, wave) in batches.chunks(max_parallel).enumerate() {
        check_cancelled(cancel)?;
        debug!(
            wave = wave_idx + 1,
            batches = wave.len(),
            "stage1: starting wave"
        );

        let tasks = wave.iter().map(|b| {
            file_review::review_batch(
                deps,
                request,
                b,
                processed,
                delta.as_ref(),
                global_context.as_ref(),
                is_incremental,
            )
        });

        // join_all preserves wave-start order regardless of completion order.
        for (offset, batch_issues) in join_all(tasks).await.into_iter().enumerate() {
            let batch_num = wave_idx * max_parallel + offset + 1;
            info!(
                batch = batch_num,
                issues = batch_issues.len(),
                "stage1: batch completed"
            );
            issues.extend(batch_issues);
        }

        let done = (wave_idx * max_parallel + wave.len()).min(total_batches);
        let percent = 10 + ((done as f32 / total_batches.max(1) as f32) * 50.0) as u8;
        events.progress(
            percent,
            format!("Stage 1: Reviewed {done}/{total_batches} batches"),
        );
    }
    info!(issues = issues.len(), "stage1: complete");

    // ---------------- Stage 1.5: reconciliation ----------------
    if !request.previous_issues.is_empty() {
        check_cancelled(cancel)?;
        events.status("reconciliation_started", "Reconciling previous issues...");
        issues =
            crate::reconcile::reconcile_previous_issues(&request.previous_issues, issues, delta.as_ref());
        events.progress(
            70,
            format!("Reconciliation Complete: {} total issues", issues.len()),
        );
    }

    // ---------------- Stage 2: cross-file ----------------
    check_cancelled(cancel)?;
    events.status("stage_2_started", "Stage 2: Analyzing cross-file patterns...");
    let cross = cross_file::execute_stage_2(deps, request, &issues, &plan, processed).await?;
    events.progress(85, "Stage 2 Complete: Cross-file analysis finished");

    // ---------------- Stage 3: aggregation ----------------
    check_cancelled(cancel)?;
    events.status("stage_3_started", "Stage 3: Generating final report...");
    let comment =
        aggregate::execute_stage_3(deps, request, &plan, &issues, &cross, processed, is_incremental)
            .await?;
    events.progress(100, "Stage 3 Complete: Report generated");

    Ok(ReviewOutcome { comment, issues })
}

/// PR-scoped hybrid indexing: fresh PR content becomes retrievable during
/// this review. Failures are logged, never fatal.
async fn index_pr_files(
    deps: &ReviewDeps,
    request: &ReviewRequest,
    processed: &ProcessedDiff,
) -> bool {
    let (Some(indexer), Some(pr_number)) = (&deps.indexer, request.pull_request_id) else {
        return false;
    };

    let files: Vec<PrFile> = processed
        .included_files()
        .filter_map(|f| {
            let content = f.full_content.clone().unwrap_or_else(|| f.content.clone());
            if content.is_empty() {
                None
            } else {
                Some(PrFile {
                    path: f.path.clone(),
                    content,
                })
            }
        })
        .collect();
    if files.is_empty() {
        return false;
    }

    match indexer
        .index_pr_files(
            &request.workspace,
            &request.project,
            &request.branch,
            pr_number,
            &files,
        )
        .await
    {
        Ok(chunks) => {
            info!(pr_number, chunks, "PR files indexed for hybrid retrieval");
            true
        }
        Err(e) => {
            warn!(error = %e, "PR file indexing failed, continuing without it");
            false
        }
    }
}

/// Removes PR-scoped points; runs regardless of review success.
async fn cleanup_pr_files(deps: &ReviewDeps, request: &ReviewRequest, pr_indexed: bool) {
    if !pr_indexed {
        return;
    }
    let (Some(indexer), Some(pr_number)) = (&deps.indexer, request.pull_request_id) else {
        return;
    };
    if let Err(e) = indexer
        .delete_pr_files(&request.workspace, &request.project, pr_number)
        .await
    {
        warn!(error = %e, pr_number, "failed to clean up PR-indexed points");
    }
}

/// One global retrieval pass over the whole PR, used as fallback context
/// and for relationship discovery. Best-effort.
async fn fetch_global_context(deps: &ReviewDeps, request: &ReviewRequest) -> Option<PrContext> {
    let retriever = deps.retriever.as_ref()?;

    let mut req = PrContextRequest::new(&request.workspace, &request.project, &request.branch);
    req.base_branch = request.target_branch.clone();
    req.changed_files = request.changed_files.clone();
    req.diff_snippets = extract_diff_snippets(&request.diff);
    req.pr_title = request.pr_title.clone();
    req.pr_description = request.pr_description.clone();
    req.deleted_files = request.deleted_files.clone();

    match retriever.get_pr_context(&req).await {
        Ok(ctx) => {
            debug!(chunks = ctx.relevant_code.len(), "global context fetched");
            Some(ctx)
        }
        Err(e) => {
            warn!(error = %e, "global context retrieval failed");
            None
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> ReviewResult<()> {
    if cancel.is_cancelled() {
        Err(ReviewError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ReviewEvent;
    use llm_gateway::{LlmModelConfig, LlmProvider};

    fn deps() -> ReviewDeps {
        let cfg = LlmModelConfig {
            provider: LlmProvider::Ollama,
            model: "test".into(),
            endpoint: "http://localhost:11434".into(),
            api_key: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            timeout_secs: Some(1),
        };
        ReviewDeps::new(Arc::new(LlmServiceProfiles::new(
            cfg.clone(),
            None,
            cfg,
        )))
    }

    fn empty_request() -> ReviewRequest {
        ReviewRequest {
            workspace: "acme".into(),
            project: "billing".into(),
            branch: "feature/x".into(),
            target_branch: Some("main".into()),
            commit: None,
            pull_request_id: None,
            pr_title: None,
            pr_description: None,
            changed_files: vec![],
            deleted_files: vec![],
            diff: String::new(),
            delta_diff: None,
            analysis_mode: crate::model::AnalysisMode::Full,
            previous_issues: vec![],
            enrichment: None,
        }
    }

    #[tokio::test]
    async fn empty_pr_passes_without_llm_calls() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let outcome = orchestrate_review(
            &deps(),
            &empty_request(),
            &EventSink::new(tx),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(outcome.issues.is_empty());
        assert!(outcome.comment.contains("no changes"));
        assert!(outcome.comment.contains("PASS"));

        match rx.recv().await.unwrap() {
            ReviewEvent::Final { result } => assert!(result.issues.is_empty()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_stage_0() {
        let mut request = empty_request();
        request.changed_files = vec!["src/a.py".into()];
        request.diff = "--- a/src/a.py\n+++ b/src/a.py\n@@ -1 +1 @@\n+x = 1\n".into();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrate_review(&deps(), &request, &EventSink::disabled(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Cancelled));
    }

    #[tokio::test]
    async fn invalid_request_is_rejected() {
        let mut request = empty_request();
        request.workspace = String::new();
        let err = orchestrate_review(
            &deps(),
            &request,
            &EventSink::disabled(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)));
    }
}
