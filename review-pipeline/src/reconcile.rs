//! Prior-issue reconciliation (Stage 1.5).
//!
//! Runs whenever the request carries issues from earlier reviews. A prior
//! issue already re-reported by Stage 1 (matched by id, or by file + line)
//! is left to the new finding; everything else is carried forward as
//! persisting with its original identifiers and fix metadata intact.
//! Resolution is never inferred here — only the LLM's explicit
//! `isResolved=true` on a matching id resolves an issue.
//!
//! Reconciliation never fails the review: malformed prior data degrades
//! field by field (an unparsable line becomes "1").

use tracing::{debug, info};

use crate::diff::ProcessedDiff;
use crate::model::Issue;

/// Merges prior issues into the Stage 1 findings.
pub fn reconcile_previous_issues(
    previous: &[Issue],
    new_issues: Vec<Issue>,
    delta: Option<&ProcessedDiff>,
) -> Vec<Issue> {
    if previous.is_empty() {
        return new_issues;
    }

    info!(
        previous = previous.len(),
        new = new_issues.len(),
        "reconciling prior issues"
    );

    let delta_paths: Vec<&str> = delta
        .map(|d| d.files.iter().map(|f| f.path.as_str()).collect())
        .unwrap_or_default();

    let mut reconciled = new_issues;

    for prior in previous {
        let already_reported = reconciled.iter().any(|n| matches_prior(prior, n));
        if already_reported {
            debug!(id = ?prior.id, file = %prior.file, "prior issue re-reported by stage 1");
            continue;
        }

        let file_in_delta = delta_paths
            .iter()
            .any(|p| files_match(&prior.file, p));
        if file_in_delta {
            debug!(
                id = ?prior.id,
                file = %prior.file,
                "file touched by delta but issue not re-reported; carrying forward as open"
            );
        }

        reconciled.push(carry_forward(prior));
    }

    info!(total = reconciled.len(), "reconciliation complete");
    reconciled
}

/// A new finding covers a prior issue when the ids match, or when both the
/// file and the normalized line number match.
fn matches_prior(prior: &Issue, new: &Issue) -> bool {
    if let (Some(pid), Some(nid)) = (&prior.id, &new.id) {
        if pid == nid {
            return true;
        }
    }
    files_match(&prior.file, &new.file) && prior.line_number() == new.line_number()
}

/// File identity: exact, suffix either way, or same basename.
pub(crate) fn files_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if a.ends_with(&format!("/{b}")) || b.ends_with(&format!("/{a}")) {
        return true;
    }
    let base_a = a.rsplit('/').next().unwrap_or(a);
    let base_b = b.rsplit('/').next().unwrap_or(b);
    base_a == base_b
}

/// Clones a prior issue as a persisting finding, normalizing only what is
/// unusable and preserving everything else — id and suggested fix included.
fn carry_forward(prior: &Issue) -> Issue {
    let mut issue = prior.clone();
    issue.is_resolved = false;
    issue.line = issue.line_number().to_string();
    issue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffProcessor;
    use crate::model::{Category, Severity};

    fn issue(id: Option<&str>, file: &str, line: &str, reason: &str) -> Issue {
        Issue {
            id: id.map(|s| s.to_string()),
            severity: Severity::High,
            category: Category::BugRisk,
            file: file.to_string(),
            line: line.to_string(),
            reason: reason.to_string(),
            suggested_fix_description: "add a null-check".into(),
            suggested_fix_diff: Some("--- a/auth.go\n+++ b/auth.go\n@@ -42 +42 @@\n+if user == nil { return }\n".into()),
            is_resolved: false,
            code_snippet: None,
            resolved_in_pr: None,
            status: None,
            resolved_description: None,
            pr_version: None,
        }
    }

    #[test]
    fn matched_by_id_is_not_duplicated() {
        let prior = vec![issue(Some("ABC"), "auth.go", "42", "missing null-check")];
        let new = vec![{
            let mut i = issue(Some("ABC"), "auth.go", "42", "missing null-check");
            i.is_resolved = true;
            i
        }];
        let out = reconcile_previous_issues(&prior, new, None);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_resolved);
        assert_eq!(out[0].id.as_deref(), Some("ABC"));
    }

    #[test]
    fn matched_by_file_and_line_is_not_duplicated() {
        let prior = vec![issue(Some("OLD"), "src/auth.go", "42", "null-check")];
        let new = vec![issue(Some("NEW"), "auth.go", "42", "still missing")];
        let out = reconcile_previous_issues(&prior, new, None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id.as_deref(), Some("NEW"));
    }

    #[test]
    fn unmatched_prior_is_carried_forward_with_fix_metadata() {
        let prior = vec![issue(Some("ABC"), "auth.go", "42", "missing null-check")];
        let out = reconcile_previous_issues(&prior, vec![], None);

        assert_eq!(out.len(), 1);
        let carried = &out[0];
        assert_eq!(carried.id.as_deref(), Some("ABC"));
        assert!(!carried.is_resolved);
        assert_eq!(carried.line, "42");
        assert!(carried.suggested_fix_diff.as_deref().unwrap().contains("auth.go"));
        assert_eq!(carried.suggested_fix_description, "add a null-check");
    }

    #[test]
    fn unparsable_line_collapses_to_one() {
        let prior = vec![issue(Some("X"), "a.py", "line forty-two", "weird line")];
        let out = reconcile_previous_issues(&prior, vec![], None);
        assert_eq!(out[0].line, "1");
    }

    #[test]
    fn untouched_file_is_always_carried_forward() {
        let delta = DiffProcessor::process(
            "diff --git a/other.py b/other.py\n--- a/other.py\n+++ b/other.py\n@@ -1 +1 @@\n+changed = True\n",
        );
        let prior = vec![issue(Some("KEEP"), "untouched.py", "7", "still there")];
        let out = reconcile_previous_issues(&prior, vec![], Some(&delta));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id.as_deref(), Some("KEEP"));
    }
}
