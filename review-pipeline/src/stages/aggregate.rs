//! Stage 3: aggregation into the executive markdown report.
//!
//! Consumes compact summaries — the full issue list travels separately in
//! the response, so the report only needs counts, top findings and the
//! cross-file verdict. Incremental reviews get a resolved-vs-new section
//! prepended.

use std::collections::BTreeMap;

use tracing::info;

use crate::diff::ProcessedDiff;
use crate::errors::ReviewResult;
use crate::model::{CrossFileResult, Issue, Recommendation, ReviewPlan, ReviewRequest, Severity};
use crate::prompt::build_stage_3_aggregation_prompt;
use crate::stages::ReviewDeps;

/// Top findings listed in the Stage 3 summary.
const TOP_FINDINGS: usize = 10;

/// Runs the aggregation call and returns the markdown report.
pub async fn execute_stage_3(
    deps: &ReviewDeps,
    request: &ReviewRequest,
    plan: &ReviewPlan,
    issues: &[Issue],
    cross: &CrossFileResult,
    processed: &ProcessedDiff,
    is_incremental: bool,
) -> ReviewResult<String> {
    let stage_1_summary = summarize_issues(issues);
    let plan_summary = summarize_plan(plan);
    let stage_2_json = serde_json::to_string_pretty(cross).unwrap_or_else(|_| "{}".to_string());

    let incremental_context = if is_incremental {
        incremental_summary(request, issues)
    } else {
        String::new()
    };

    let recommendation = match cross.pr_recommendation {
        Recommendation::Pass => "PASS",
        Recommendation::PassWithWarnings => "PASS_WITH_WARNINGS",
        Recommendation::Fail => "FAIL",
    };

    let prompt = build_stage_3_aggregation_prompt(
        request,
        &plan_summary,
        &stage_1_summary,
        &stage_2_json,
        recommendation,
        request.changed_files.len(),
        processed.total_additions,
        processed.total_deletions,
        &incremental_context,
    );

    let report = deps.llm.generate_slow(&prompt).await?;
    info!(report_len = report.len(), "stage3: report generated");

    // The resolved-vs-new section is guaranteed, not left to the model.
    if is_incremental {
        Ok(format!("{incremental_context}\n{report}"))
    } else {
        Ok(report)
    }
}

/// Counts by severity/category plus the most severe findings.
pub fn summarize_issues(issues: &[Issue]) -> String {
    if issues.is_empty() {
        return "No issues found in Stage 1.".to_string();
    }

    let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
    for issue in issues {
        *by_severity.entry(enum_name(&issue.severity)).or_default() += 1;
        *by_category.entry(enum_name(&issue.category)).or_default() += 1;
    }

    let mut lines = vec![
        format!("Total issues: {}", issues.len()),
        format!(
            "By severity: {}",
            by_severity
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        format!(
            "By category: {}",
            by_category
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    ];

    let mut ranked: Vec<&Issue> = issues.iter().collect();
    ranked.sort_by_key(|i| severity_rank(i.severity));
    lines.push("\nTop findings:".to_string());
    for (n, issue) in ranked.iter().take(TOP_FINDINGS).enumerate() {
        let reason: String = issue.reason.chars().take(120).collect();
        lines.push(format!(
            "  {}. [{}] {}: {}",
            n + 1,
            enum_name(&issue.severity),
            issue.file,
            reason
        ));
    }

    lines.join("\n")
}

/// Compact plan summary: scope, priorities, concerns and the path list.
pub fn summarize_plan(plan: &ReviewPlan) -> String {
    let mut lines = vec![format!(
        "Total files planned for review: {}",
        plan.file_count()
    )];

    let mut by_priority: BTreeMap<String, usize> = BTreeMap::new();
    for group in &plan.file_groups {
        *by_priority.entry(enum_name(&group.priority)).or_default() += group.files.len();
    }
    if !by_priority.is_empty() {
        lines.push(format!(
            "By priority: {}",
            by_priority
                .iter()
                .map(|(k, v)| format!("{k}: {v} files"))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    if !plan.cross_file_concerns.is_empty() {
        lines.push(format!(
            "\nCross-file concerns ({}):",
            plan.cross_file_concerns.len()
        ));
        for concern in plan.cross_file_concerns.iter().take(5) {
            let short: String = concern.chars().take(150).collect();
            lines.push(format!("  - {short}"));
        }
    }

    let paths: Vec<&str> = plan
        .file_groups
        .iter()
        .flat_map(|g| g.files.iter().map(|f| f.path.as_str()))
        .collect();
    if !paths.is_empty() {
        let shown = paths.len().min(20);
        lines.push(format!("\nFiles reviewed: {}", paths[..shown].join(", ")));
        if paths.len() > 20 {
            lines.push(format!("  ... and {} more", paths.len() - 20));
        }
    }

    lines.join("\n")
}

/// The resolved-vs-new block for incremental runs.
fn incremental_summary(request: &ReviewRequest, issues: &[Issue]) -> String {
    let resolved = issues.iter().filter(|i| i.is_resolved).count();
    let new_count = issues.len() - resolved;
    format!(
        "## Incremental Review Summary\n\
        - Previous issues from last review: {}\n\
        - Issues resolved in this update: {}\n\
        - New or persisting issues: {}\n\
        - Total issues after reconciliation: {}\n",
        request.previous_issues.len(),
        resolved,
        new_count,
        issues.len()
    )
}

/// Serde-rendered enum name (e.g. `BUG_RISK`), reused for summaries.
fn enum_name<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_default()
}

fn severity_rank(s: Severity) -> u8 {
    match s {
        Severity::Critical => 0,
        Severity::High => 1,
        Severity::Medium => 2,
        Severity::Low => 3,
        Severity::Info => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, FileGroup, Priority, ReviewFile};

    fn issue(severity: Severity, file: &str, reason: &str) -> Issue {
        Issue {
            id: None,
            severity,
            category: Category::BugRisk,
            file: file.to_string(),
            line: "1".into(),
            reason: reason.to_string(),
            suggested_fix_description: String::new(),
            suggested_fix_diff: None,
            is_resolved: false,
            code_snippet: None,
            resolved_in_pr: None,
            status: None,
            resolved_description: None,
            pr_version: None,
        }
    }

    #[test]
    fn issue_summary_ranks_critical_first() {
        let issues = vec![
            issue(Severity::Low, "a.py", "nit"),
            issue(Severity::Critical, "b.py", "boom"),
            issue(Severity::Medium, "c.py", "hm"),
        ];
        let summary = summarize_issues(&issues);
        assert!(summary.contains("Total issues: 3"));
        let boom_pos = summary.find("boom").unwrap();
        let nit_pos = summary.find("nit").unwrap();
        assert!(boom_pos < nit_pos);
    }

    #[test]
    fn empty_issue_summary() {
        assert_eq!(summarize_issues(&[]), "No issues found in Stage 1.");
    }

    #[test]
    fn plan_summary_counts_by_priority() {
        let plan = ReviewPlan {
            analysis_summary: String::new(),
            file_groups: vec![FileGroup {
                group_id: "G".into(),
                priority: Priority::High,
                rationale: String::new(),
                files: vec![
                    ReviewFile {
                        path: "a.py".into(),
                        focus_areas: vec![],
                        risk_level: None,
                        estimated_issues: None,
                    },
                    ReviewFile {
                        path: "b.py".into(),
                        focus_areas: vec![],
                        risk_level: None,
                        estimated_issues: None,
                    },
                ],
            }],
            files_to_skip: vec![],
            cross_file_concerns: vec!["shared session state".into()],
        };
        let summary = summarize_plan(&plan);
        assert!(summary.contains("HIGH: 2 files"));
        assert!(summary.contains("shared session state"));
        assert!(summary.contains("a.py, b.py"));
    }
}
