//! Stage 1: per-batch file review.
//!
//! One LLM call per batch. Each batch gets its own retrieval context
//! (semantic + deterministic lookups); when that fails, the global context
//! is filtered down to the batch's files. A batch that defeats both
//! structured output and the repair loop yields zero issues — other
//! batches are unaffected.

use tracing::{debug, info, warn};

use rag_engine::{PrContext, PrContextRequest, ScoredChunk};

use crate::batch::BatchItem;
use crate::context::{filter_context_for_batch, format_rag_context};
use crate::diff::{ProcessedDiff, extract_diff_snippets};
use crate::model::{FileReviewBatchOutput, Issue, Priority, ReviewRequest};
use crate::parser::parse_with_repair;
use crate::prompt::{BatchFilePrompt, build_stage_1_batch_prompt, format_previous_issues};
use crate::reconcile::files_match;
use crate::stages::ReviewDeps;

/// Per-batch retrieval fetches fewer chunks than the global pass.
const BATCH_TOP_K: usize = 10;

/// Limit for deterministic per-file lookups merged into batch context.
const DETERMINISTIC_LIMIT_PER_FILE: usize = 5;

/// Reviews one batch of files. Never propagates failure.
pub async fn review_batch(
    deps: &ReviewDeps,
    request: &ReviewRequest,
    batch: &[BatchItem],
    processed: &ProcessedDiff,
    delta: Option<&ProcessedDiff>,
    global_context: Option<&PrContext>,
    is_incremental: bool,
) -> Vec<Issue> {
    if batch.is_empty() {
        return Vec::new();
    }

    let batch_paths: Vec<String> = batch.iter().map(|i| i.file.path.clone()).collect();
    debug!(files = ?batch_paths, "stage1: reviewing batch");

    // Incremental reviews read the delta diff; the full diff otherwise.
    let diff_source = match (is_incremental, delta) {
        (true, Some(d)) => d,
        _ => processed,
    };

    let mut files = Vec::with_capacity(batch.len());
    let mut batch_snippets: Vec<String> = Vec::new();
    for item in batch {
        let diff_text = diff_source
            .file_diff(&item.file.path)
            .map(|f| f.content.clone())
            .unwrap_or_else(|| "(Diff unavailable)".to_string());
        if diff_text != "(Diff unavailable)" {
            batch_snippets.extend(extract_diff_snippets(&diff_text));
        }
        files.push(BatchFilePrompt {
            path: item.file.path.clone(),
            focus_areas: item.file.focus_areas.clone(),
            diff: diff_text,
        });
    }

    // Context: per-batch retrieval first, filtered global as fallback.
    let context_chunks = fetch_batch_context(deps, request, &batch_paths, &batch_snippets)
        .await
        .or_else(|| {
            global_context.map(|ctx| {
                debug!("stage1: using filtered global context for batch");
                filter_context_for_batch(&ctx.relevant_code, &batch_paths)
            })
        })
        .unwrap_or_default();
    let rag_context = format_rag_context(&context_chunks, &request.changed_files);
    debug!(context_len = rag_context.len(), "stage1: batch context ready");

    // Prior issues touching this batch ride along for resolution tracking.
    let relevant_prior: Vec<Issue> = request
        .previous_issues
        .iter()
        .filter(|issue| batch_paths.iter().any(|p| files_match(&issue.file, p)))
        .cloned()
        .collect();
    let previous_block = format_previous_issues(&relevant_prior);

    let priority = batch.iter().map(|i| i.priority).min().unwrap_or(Priority::Medium);
    let prompt = build_stage_1_batch_prompt(
        &files,
        priority,
        &rag_context,
        &previous_block,
        &request.changed_files,
        is_incremental,
    );

    match deps
        .llm
        .invoke_structured::<FileReviewBatchOutput>(&prompt)
        .await
    {
        Ok(output) => return collect_issues(output),
        Err(e) => {
            warn!(error = %e, "stage1: structured output failed for batch, falling back");
        }
    }

    let raw = match deps.llm.generate_slow(&prompt).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, files = ?batch_paths, "stage1: batch generation failed, zero issues recorded");
            return Vec::new();
        }
    };

    match parse_with_repair::<FileReviewBatchOutput>(&deps.llm, &raw).await {
        Ok(output) => collect_issues(output),
        Err(e) => {
            warn!(
                error = %e,
                files = ?batch_paths,
                "stage1: batch parse failed after repair, zero issues recorded — results may be incomplete"
            );
            Vec::new()
        }
    }
}

fn collect_issues(output: FileReviewBatchOutput) -> Vec<Issue> {
    let mut issues = Vec::new();
    for review in output.reviews {
        issues.extend(review.issues);
    }
    issues
}

/// Per-batch retrieval: semantic context plus deterministic lookups merged
/// at a fixed synthetic score. `None` signals the caller to fall back.
async fn fetch_batch_context(
    deps: &ReviewDeps,
    request: &ReviewRequest,
    batch_paths: &[String],
    batch_snippets: &[String],
) -> Option<Vec<ScoredChunk>> {
    let retriever = deps.retriever.as_ref()?;

    let mut req = PrContextRequest::new(&request.workspace, &request.project, &request.branch);
    req.base_branch = request.target_branch.clone();
    req.changed_files = batch_paths.to_vec();
    req.diff_snippets = batch_snippets.to_vec();
    req.pr_title = request.pr_title.clone();
    req.pr_description = request.pr_description.clone();
    req.deleted_files = request.deleted_files.clone();
    req.top_k = BATCH_TOP_K;

    let mut chunks = match retriever.get_pr_context(&req).await {
        Ok(ctx) if !ctx.relevant_code.is_empty() => ctx.relevant_code,
        Ok(_) => {
            debug!("stage1: per-batch retrieval returned nothing");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "stage1: per-batch retrieval failed");
            return None;
        }
    };

    // Deterministic cross-file definitions are an optional enhancement;
    // their absence never fails the batch.
    let mut branches = vec![request.branch.clone()];
    if let Some(base) = &request.target_branch {
        if !branches.contains(base) {
            branches.push(base.clone());
        }
    }
    match retriever
        .deterministic_lookup(
            &request.workspace,
            &request.project,
            &branches,
            batch_paths,
            DETERMINISTIC_LIMIT_PER_FILE,
        )
        .await
    {
        Ok(extra) if !extra.is_empty() => {
            info!(count = extra.len(), "stage1: deterministic lookups merged");
            chunks.extend(extra);
        }
        Ok(_) => {}
        Err(e) => debug!(error = %e, "stage1: deterministic lookup skipped"),
    }

    Some(chunks)
}
