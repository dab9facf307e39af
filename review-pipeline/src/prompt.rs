//! Prompt builders for the four review stages.
//!
//! Prompts are plain strings assembled from request data and retrieval
//! context. Structured-output expectations are stated in the prompt even
//! when the provider enforces the schema server-side — models follow the
//! shape more reliably when they can see it.

use crate::model::{Issue, Priority, ReviewRequest};

/// Per-file input block for a Stage 1 batch.
pub struct BatchFilePrompt {
    pub path: String,
    pub focus_areas: Vec<String>,
    pub diff: String,
}

/// Stage 0: produce the review plan from PR metadata.
pub fn build_stage_0_planning_prompt(
    request: &ReviewRequest,
    changed_files_json: &str,
    is_incremental: bool,
) -> String {
    let mode_note = if is_incremental {
        "\nThis is an INCREMENTAL review: only the delta since the last review will be analyzed. \
         Prioritize files that changed in the delta.\n"
    } else {
        ""
    };

    format!(
        "You are a senior code reviewer planning a pull-request review.\n\
        \n\
        Repository: {workspace}/{project}\n\
        PR #{pr_id}: {title}\n\
        Source branch: {branch} → target: {target}\n\
        Commit: {commit}\n\
        {mode_note}\
        Changed files:\n{files}\n\
        \n\
        Produce a review plan:\n\
        - Group related files into file_groups, each with a group_id, a priority \
          (CRITICAL, HIGH, MEDIUM or LOW), a short rationale, and per-file focus_areas.\n\
        - Security-sensitive, data-access and API-surface files get higher priority.\n\
        - List files not worth reviewing (generated code, lockfiles, pure formatting) \
          in files_to_skip with a reason.\n\
        - Every changed file MUST appear exactly once: either in a group or in files_to_skip.\n\
        - Note hypotheses about cross-file interactions in cross_file_concerns.\n\
        \n\
        Respond with a single JSON object matching the ReviewPlan schema.",
        workspace = request.workspace,
        project = request.project,
        pr_id = request
            .pull_request_id
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".into()),
        title = request.pr_title.as_deref().unwrap_or(""),
        branch = request.branch,
        target = request.target_branch.as_deref().unwrap_or("main"),
        commit = request.commit.as_deref().unwrap_or("HEAD"),
        files = changed_files_json,
    )
}

/// Stage 1: review one batch of files in a single call.
pub fn build_stage_1_batch_prompt(
    files: &[BatchFilePrompt],
    priority: Priority,
    rag_context: &str,
    previous_issues: &str,
    all_pr_files: &[String],
    is_incremental: bool,
) -> String {
    let mut out = String::new();

    out.push_str(
        "You are a senior code reviewer. Review ONLY the changed lines in the diffs below.\n\n",
    );
    out.push_str(&format!("Batch priority: {:?}\n", priority));

    if is_incremental {
        out.push_str(
            "Mode: INCREMENTAL — these diffs are the delta since the previous review. \
             Focus on what changed now; do not re-report unchanged code.\n",
        );
    }

    if !all_pr_files.is_empty() {
        out.push_str(&format!(
            "All files in this PR (for cross-file awareness): {}\n",
            all_pr_files.join(", ")
        ));
    }
    out.push('\n');

    if !rag_context.is_empty() {
        out.push_str("=== REPOSITORY CONTEXT (read-only, for reference) ===\n");
        out.push_str(rag_context);
        out.push_str("=== END REPOSITORY CONTEXT ===\n\n");
    }

    if !previous_issues.is_empty() {
        out.push_str(previous_issues);
        out.push_str("\n\n");
    }

    out.push_str("Files to review:\n\n");
    for f in files {
        out.push_str(&format!("### File: {}\n", f.path));
        if !f.focus_areas.is_empty() {
            out.push_str(&format!("Focus areas: {}\n", f.focus_areas.join(", ")));
        }
        out.push_str("```diff\n");
        out.push_str(&f.diff);
        if !f.diff.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n\n");
    }

    out.push_str(
        "For each file report issues with: severity (CRITICAL/HIGH/MEDIUM/LOW/INFO), \
        category (SECURITY/PERFORMANCE/CODE_QUALITY/BUG_RISK/STYLE/DOCUMENTATION/\
        BEST_PRACTICES/ERROR_HANDLING/TESTING/ARCHITECTURE), file, line (in the NEW \
        file version, as a string), reason, suggestedFixDescription, and when you can \
        propose one, suggestedFixDiff as unified-diff text. \
        Only report real problems in the changed lines; an empty issues array is a \
        valid answer.\n\
        Respond with a single JSON object matching the FileReviewBatchOutput schema.",
    );

    out
}

/// Renders prior issues for a Stage 1 batch prompt, with resolution
/// tracking instructions.
pub fn format_previous_issues(issues: &[Issue]) -> String {
    if issues.is_empty() {
        return String::new();
    }

    let mut lines = vec![
        "=== PREVIOUS ISSUES HISTORY (check if resolved/persisting) ===".to_string(),
        "Issues from earlier iterations of this PR. Status indicates whether each is still open."
            .to_string(),
        String::new(),
    ];

    for issue in issues {
        let id = issue.id.as_deref().unwrap_or("unknown");
        let status = issue.status.as_deref().unwrap_or("open");
        let mut status_display = status.to_uppercase();
        if status.eq_ignore_ascii_case("resolved") {
            if let Some(desc) = &issue.resolved_description {
                status_display.push_str(&format!(" - {desc}"));
            }
            if let Some(v) = issue.pr_version {
                status_display.push_str(&format!(" (in v{v})"));
            }
        }

        lines.push(format!(
            "[ID:{id}] {:?} @ {}:{}",
            issue.severity, issue.file, issue.line
        ));
        lines.push(format!("  Status: {status_display}"));
        lines.push(format!("  Issue: {}", issue.reason));
        lines.push(String::new());
    }

    lines.push("INSTRUCTIONS:".to_string());
    lines.push("- For OPEN issues that are now FIXED: report them with \"isResolved\": true".to_string());
    lines.push("- For OPEN issues still present: report them with \"isResolved\": false".to_string());
    lines.push("- For already RESOLVED issues: do NOT re-report them (context only)".to_string());
    lines.push(
        "- IMPORTANT: \"isResolved\" MUST be a JSON boolean (true/false), not a string".to_string(),
    );
    lines.push("- Preserve the \"id\" field on every issue you carry over".to_string());
    lines.push("=== END PREVIOUS ISSUES ===".to_string());

    lines.join("\n")
}

/// Stage 2: cross-file and architectural analysis.
pub fn build_stage_2_cross_file_prompt(
    request: &ReviewRequest,
    stage_1_findings_json: &str,
    architecture_context: &str,
    migrations: &str,
    cross_file_concerns: &[String],
) -> String {
    let concerns = if cross_file_concerns.is_empty() {
        "(none noted by the planner)".to_string()
    } else {
        cross_file_concerns
            .iter()
            .map(|c| format!("- {c}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are analyzing a pull request for CROSS-FILE problems only.\n\
        \n\
        Repository: {workspace}/{project}\n\
        PR: {title} (commit {commit})\n\
        \n\
        Stage 1 findings (location + severity + reason, already reported per-file):\n\
        {findings}\n\
        \n\
        Architecture reference:\n{architecture}\n\
        \n\
        Database migrations:\n{migrations}\n\
        \n\
        Planner's cross-file concerns:\n{concerns}\n\
        \n\
        Identify ONLY issues that span two or more files: broken contracts between \
        caller and callee, schema changes not reflected in code, inconsistent \
        validation across layers, data-flow problems. Every cross_file_issue MUST \
        list at least two affected_files — single-file findings belong to Stage 1 \
        and will be discarded.\n\
        Conclude with pr_risk_level, pr_recommendation (PASS, PASS_WITH_WARNINGS or \
        FAIL) and your confidence (0.0-1.0).\n\
        Respond with a single JSON object matching the CrossFileResult schema.",
        workspace = request.workspace,
        project = request.project,
        title = request.pr_title.as_deref().unwrap_or(""),
        commit = request.commit.as_deref().unwrap_or("HEAD"),
        findings = stage_1_findings_json,
        architecture = architecture_context,
        migrations = migrations,
    )
}

/// Stage 3: executive markdown report.
#[allow(clippy::too_many_arguments)]
pub fn build_stage_3_aggregation_prompt(
    request: &ReviewRequest,
    plan_summary: &str,
    stage_1_summary: &str,
    stage_2_json: &str,
    recommendation: &str,
    total_files: usize,
    additions: usize,
    deletions: usize,
    incremental_context: &str,
) -> String {
    format!(
        "Write the final review report for this pull request, in Markdown.\n\
        \n\
        Repository: {workspace}/{project}\n\
        PR #{pr_id}: {title}\n\
        Scope: {total_files} files, +{additions}/-{deletions} lines\n\
        {incremental}\
        \n\
        Review plan summary:\n{plan}\n\
        \n\
        Per-file findings summary:\n{stage1}\n\
        \n\
        Cross-file analysis:\n{stage2}\n\
        \n\
        The recommendation is {recommendation}. Structure the report as:\n\
        1. A one-paragraph executive summary.\n\
        2. A summary table: | Severity | Count | — only severities that occur.\n\
        3. Key findings, most severe first, referencing files by path.\n\
        4. Cross-file concerns, if any.\n\
        5. Final recommendation with a one-line justification.\n\
        \n\
        Keep it factual and compact; the full issue list is delivered separately. \
        Respond with Markdown only — no JSON, no code fences around the whole reply.",
        workspace = request.workspace,
        project = request.project,
        pr_id = request
            .pull_request_id
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".into()),
        title = request.pr_title.as_deref().unwrap_or(""),
        total_files = total_files,
        additions = additions,
        deletions = deletions,
        incremental = incremental_context,
        plan = plan_summary,
        stage1 = stage_1_summary,
        stage2 = stage_2_json,
        recommendation = recommendation,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalysisMode, Category, Severity};

    fn request() -> ReviewRequest {
        ReviewRequest {
            workspace: "acme".into(),
            project: "billing".into(),
            branch: "feature/x".into(),
            target_branch: Some("main".into()),
            commit: Some("abc123".into()),
            pull_request_id: Some(42),
            pr_title: Some("Harden token handling".into()),
            pr_description: None,
            changed_files: vec!["src/auth.py".into()],
            deleted_files: vec![],
            diff: String::new(),
            delta_diff: None,
            analysis_mode: AnalysisMode::Full,
            previous_issues: vec![],
            enrichment: None,
        }
    }

    #[test]
    fn planning_prompt_mentions_completeness_rule() {
        let p = build_stage_0_planning_prompt(&request(), "[]", false);
        assert!(p.contains("exactly once"));
        assert!(p.contains("ReviewPlan"));
        assert!(p.contains("acme/billing"));
    }

    #[test]
    fn previous_issues_block_includes_boolean_instruction() {
        let issue = Issue {
            id: Some("ABC".into()),
            severity: Severity::High,
            category: Category::BugRisk,
            file: "auth.go".into(),
            line: "42".into(),
            reason: "missing null-check".into(),
            suggested_fix_description: String::new(),
            suggested_fix_diff: None,
            is_resolved: false,
            code_snippet: None,
            resolved_in_pr: None,
            status: Some("open".into()),
            resolved_description: None,
            pr_version: Some(1),
        };
        let block = format_previous_issues(&[issue]);
        assert!(block.contains("[ID:ABC]"));
        assert!(block.contains("auth.go:42"));
        assert!(block.contains("JSON boolean"));
    }

    #[test]
    fn empty_previous_issues_renders_nothing() {
        assert!(format_previous_issues(&[]).is_empty());
    }

    #[test]
    fn stage_2_prompt_requires_two_files() {
        let p = build_stage_2_cross_file_prompt(&request(), "[]", "none", "none", &[]);
        assert!(p.contains("at least two affected_files"));
        assert!(p.contains("CrossFileResult"));
    }
}
