//! Stage 0: planning and prioritization.
//!
//! One structured LLM call over the PR metadata and changed-file summary.
//! Structured-output mode is tried first; raw generation plus the repair
//! loop is the fallback. A completeness check guarantees the plan covers
//! every changed file — planner omissions land in a LOW-priority
//! catch-all group, never get silently dropped.

use serde_json::json;
use tracing::{info, warn};

use crate::diff::ProcessedDiff;
use crate::errors::ReviewResult;
use crate::model::{FileGroup, Priority, ReviewFile, ReviewPlan, ReviewRequest};
use crate::parser::parse_with_repair;
use crate::prompt::build_stage_0_planning_prompt;
use crate::stages::ReviewDeps;

/// Group id for files the planner forgot.
pub const GROUP_MISSING_FILES: &str = "GROUP_MISSING_FILES";

/// Runs the planning call.
pub async fn execute_stage_0(
    deps: &ReviewDeps,
    request: &ReviewRequest,
    processed: &ProcessedDiff,
    is_incremental: bool,
) -> ReviewResult<ReviewPlan> {
    let summary: Vec<serde_json::Value> = request
        .changed_files
        .iter()
        .map(|path| {
            let (change_type, added, deleted) = processed
                .file_diff(path)
                .map(|f| (format!("{:?}", f.change_type).to_uppercase(), f.added, f.deleted))
                .unwrap_or_else(|| ("MODIFIED".to_string(), 0, 0));
            json!({
                "path": path,
                "type": change_type,
                "lines_added": added,
                "lines_deleted": deleted,
            })
        })
        .collect();
    let changed_files_json =
        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "[]".to_string());

    let prompt = build_stage_0_planning_prompt(request, &changed_files_json, is_incremental);

    match deps.llm.invoke_structured::<ReviewPlan>(&prompt).await {
        Ok(plan) => {
            info!(
                groups = plan.file_groups.len(),
                skipped = plan.files_to_skip.len(),
                "stage0: plan created via structured output"
            );
            return Ok(plan);
        }
        Err(e) => {
            warn!(error = %e, "stage0: structured output failed, falling back to manual parse");
        }
    }

    let raw = deps.llm.generate_slow(&prompt).await?;
    let plan = parse_with_repair::<ReviewPlan>(&deps.llm, &raw).await?;
    info!(
        groups = plan.file_groups.len(),
        "stage0: plan created via manual parse"
    );
    Ok(plan)
}

/// Completeness check: every changed file must appear in a group or in the
/// skip list. Missing paths are appended to an existing LOW group, or to a
/// new catch-all group.
pub fn ensure_all_files_planned(mut plan: ReviewPlan, changed_files: &[String]) -> ReviewPlan {
    let mut covered: Vec<&str> = Vec::new();
    for group in &plan.file_groups {
        covered.extend(group.files.iter().map(|f| f.path.as_str()));
    }
    covered.extend(plan.files_to_skip.iter().map(|s| s.path.as_str()));

    let missing: Vec<&String> = changed_files
        .iter()
        .filter(|f| !covered.contains(&f.as_str()))
        .collect();

    if missing.is_empty() {
        info!(
            planned = covered.len(),
            "stage0: plan complete, all files covered"
        );
        return plan;
    }

    warn!(
        missing = missing.len(),
        total = changed_files.len(),
        "stage0: plan missing files, adding to LOW priority group"
    );

    let missing_files: Vec<ReviewFile> = missing
        .into_iter()
        .map(|path| ReviewFile {
            path: path.clone(),
            focus_areas: vec!["GENERAL".to_string()],
            risk_level: Some("LOW".to_string()),
            estimated_issues: Some(0),
        })
        .collect();

    if let Some(low) = plan
        .file_groups
        .iter_mut()
        .find(|g| g.priority == Priority::Low)
    {
        low.files.extend(missing_files);
    } else {
        plan.file_groups.push(FileGroup {
            group_id: GROUP_MISSING_FILES.to_string(),
            priority: Priority::Low,
            rationale: "Files not categorized by planner - added automatically".to_string(),
            files: missing_files,
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SkippedFile;

    fn plan_with_group(paths: &[&str], priority: Priority) -> ReviewPlan {
        ReviewPlan {
            analysis_summary: String::new(),
            file_groups: vec![FileGroup {
                group_id: "G1".into(),
                priority,
                rationale: String::new(),
                files: paths
                    .iter()
                    .map(|p| ReviewFile {
                        path: p.to_string(),
                        focus_areas: vec![],
                        risk_level: None,
                        estimated_issues: None,
                    })
                    .collect(),
            }],
            files_to_skip: vec![],
            cross_file_concerns: vec![],
        }
    }

    #[test]
    fn complete_plan_is_untouched() {
        let plan = plan_with_group(&["a.py", "b.py"], Priority::High);
        let out = ensure_all_files_planned(plan, &["a.py".into(), "b.py".into()]);
        assert_eq!(out.file_groups.len(), 1);
        assert_eq!(out.file_count(), 2);
    }

    #[test]
    fn missing_files_get_catch_all_group() {
        let plan = plan_with_group(&["a.py"], Priority::High);
        let out = ensure_all_files_planned(plan, &["a.py".into(), "forgotten.py".into()]);

        let catch_all = out
            .file_groups
            .iter()
            .find(|g| g.group_id == GROUP_MISSING_FILES)
            .expect("catch-all group");
        assert_eq!(catch_all.priority, Priority::Low);
        assert_eq!(catch_all.files[0].path, "forgotten.py");
    }

    #[test]
    fn missing_files_join_existing_low_group() {
        let plan = plan_with_group(&["a.py"], Priority::Low);
        let out = ensure_all_files_planned(plan, &["a.py".into(), "forgotten.py".into()]);

        assert_eq!(out.file_groups.len(), 1);
        assert!(out.file_groups[0].files.iter().any(|f| f.path == "forgotten.py"));
    }

    #[test]
    fn skipped_files_count_as_covered() {
        let mut plan = plan_with_group(&["a.py"], Priority::High);
        plan.files_to_skip.push(SkippedFile {
            path: "generated.lock".into(),
            reason: "lockfile".into(),
        });
        let out = ensure_all_files_planned(plan, &["a.py".into(), "generated.lock".into()]);
        assert!(
            !out.file_groups
                .iter()
                .any(|g| g.group_id == GROUP_MISSING_FILES)
        );
    }
}
