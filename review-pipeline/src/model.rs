//! Review data model.
//!
//! These types are the single authoritative schema: serde drives both
//! request validation and LLM structured-output decoding (via the
//! [`crate::schema`] implementations). Closed sets are enums; anything the
//! upstream provider may omit is `Option` or defaulted.

use serde::{Deserialize, Serialize};

/* ----------------------------- request ------------------------------ */

/// Review mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnalysisMode {
    #[default]
    Full,
    Incremental,
}

/// Precomputed relationship between two changed files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRelationship {
    pub source_file: String,
    pub target_file: String,
    pub relationship_type: String,
    #[serde(default)]
    pub matched_on: Option<String>,
}

/// Per-file structure facts supplied with a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub path: String,
    #[serde(default)]
    pub extends_classes: Vec<String>,
    #[serde(default)]
    pub implements_interfaces: Vec<String>,
    #[serde(default)]
    pub imports: Vec<String>,
}

/// Upstream-computed enrichment so the core need not rediscover structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentData {
    #[serde(default)]
    pub relationships: Vec<FileRelationship>,
    #[serde(default)]
    pub file_metadata: Vec<FileMetadata>,
}

impl EnrichmentData {
    /// Enrichment "wins" over discovery only when it actually has content.
    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty() && self.file_metadata.is_empty()
    }
}

/// A full review request as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub workspace: String,
    pub project: String,
    /// The PR's source branch (what is being reviewed).
    pub branch: String,
    /// The merge target (base) branch, when known.
    #[serde(default)]
    pub target_branch: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub pull_request_id: Option<i64>,
    #[serde(default)]
    pub pr_title: Option<String>,
    #[serde(default)]
    pub pr_description: Option<String>,
    #[serde(default)]
    pub changed_files: Vec<String>,
    #[serde(default)]
    pub deleted_files: Vec<String>,
    /// Full unified diff of the PR.
    #[serde(default)]
    pub diff: String,
    /// Diff since the previous review; drives INCREMENTAL mode.
    #[serde(default)]
    pub delta_diff: Option<String>,
    #[serde(default)]
    pub analysis_mode: AnalysisMode,
    /// Issues reported by earlier reviews of this PR.
    #[serde(default)]
    pub previous_issues: Vec<Issue>,
    #[serde(default)]
    pub enrichment: Option<EnrichmentData>,
}

impl ReviewRequest {
    /// Basic shape validation; content problems surface later per stage.
    pub fn validate(&self) -> Result<(), crate::errors::ReviewError> {
        if self.workspace.trim().is_empty() {
            return Err(crate::errors::ReviewError::Validation(
                "workspace must not be empty".into(),
            ));
        }
        if self.project.trim().is_empty() {
            return Err(crate::errors::ReviewError::Validation(
                "project must not be empty".into(),
            ));
        }
        if self.branch.trim().is_empty() {
            return Err(crate::errors::ReviewError::Validation(
                "branch must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Whether this run reviews the delta diff against prior findings.
    pub fn is_incremental(&self) -> bool {
        self.analysis_mode == AnalysisMode::Incremental
            && self.delta_diff.as_deref().is_some_and(|d| !d.trim().is_empty())
    }
}

/* ------------------------------ plan -------------------------------- */

/// Review priority for a file group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

/// One file scheduled for review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewFile {
    pub path: String,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub estimated_issues: Option<u32>,
}

/// A prioritized group of files in the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileGroup {
    pub group_id: String,
    pub priority: Priority,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub files: Vec<ReviewFile>,
}

/// A file the planner decided not to review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    #[serde(default)]
    pub reason: String,
}

/// Stage 0 output: the review plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewPlan {
    #[serde(default)]
    pub analysis_summary: String,
    #[serde(default)]
    pub file_groups: Vec<FileGroup>,
    #[serde(default)]
    pub files_to_skip: Vec<SkippedFile>,
    #[serde(default)]
    pub cross_file_concerns: Vec<String>,
}

impl ReviewPlan {
    pub fn empty() -> Self {
        Self {
            analysis_summary: String::new(),
            file_groups: Vec::new(),
            files_to_skip: Vec::new(),
            cross_file_concerns: Vec::new(),
        }
    }

    pub fn file_count(&self) -> usize {
        self.file_groups.iter().map(|g| g.files.len()).sum()
    }
}

/* ------------------------------ issues ------------------------------- */

/// Issue severity (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

/// Issue category (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Security,
    Performance,
    CodeQuality,
    BugRisk,
    Style,
    Documentation,
    BestPractices,
    ErrorHandling,
    Testing,
    Architecture,
}

/// One review finding.
///
/// `line` refers to the new file version and is carried as a string for
/// provider compatibility; [`Issue::line_number`] normalizes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(default)]
    pub id: Option<String>,
    pub severity: Severity,
    pub category: Category,
    pub file: String,
    #[serde(default = "default_line")]
    pub line: String,
    pub reason: String,
    #[serde(default)]
    pub suggested_fix_description: String,
    #[serde(default)]
    pub suggested_fix_diff: Option<String>,
    #[serde(default)]
    pub is_resolved: bool,
    #[serde(default)]
    pub code_snippet: Option<String>,
    #[serde(default)]
    pub resolved_in_pr: Option<String>,

    /// Prior-issue history fields, present only on issues supplied with an
    /// incremental request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_version: Option<i64>,
}

fn default_line() -> String {
    "1".to_string()
}

impl Issue {
    /// Parsed line number; unparsable lines collapse to 1.
    pub fn line_number(&self) -> u32 {
        self.line.trim().parse::<u32>().unwrap_or(1).max(1)
    }
}

/// Per-file result inside a Stage 1 batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReview {
    pub path: String,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

/// Stage 1 output for one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReviewBatchOutput {
    #[serde(default)]
    pub reviews: Vec<FileReview>,
}

/* ---------------------------- cross-file ----------------------------- */

/// Merge recommendation (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Pass,
    PassWithWarnings,
    Fail,
}

/// One finding spanning at least two files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossFileIssue {
    pub severity: Severity,
    pub category: Category,
    #[serde(default)]
    pub affected_files: Vec<String>,
    pub reason: String,
    #[serde(default)]
    pub suggested_fix_description: String,
}

/// Stage 2 output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossFileResult {
    #[serde(default)]
    pub pr_risk_level: String,
    #[serde(default)]
    pub cross_file_issues: Vec<CrossFileIssue>,
    #[serde(default)]
    pub data_flow_concerns: Vec<String>,
    pub pr_recommendation: Recommendation,
    #[serde(default)]
    pub confidence: f32,
}

impl CrossFileResult {
    /// A pass verdict used when there is nothing to analyze.
    pub fn trivial_pass() -> Self {
        Self {
            pr_risk_level: "LOW".to_string(),
            cross_file_issues: Vec::new(),
            data_flow_concerns: Vec::new(),
            pr_recommendation: Recommendation::Pass,
            confidence: 1.0,
        }
    }
}

/* ------------------------------ outcome ------------------------------ */

/// Final review response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    /// Executive report, markdown.
    pub comment: String,
    pub issues: Vec<Issue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_sets_serialize_uppercase() {
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"CRITICAL\""
        );
        assert_eq!(
            serde_json::to_string(&Category::BugRisk).unwrap(),
            "\"BUG_RISK\""
        );
        assert_eq!(
            serde_json::to_string(&Recommendation::PassWithWarnings).unwrap(),
            "\"PASS_WITH_WARNINGS\""
        );
        assert_eq!(
            serde_json::to_string(&AnalysisMode::Incremental).unwrap(),
            "\"INCREMENTAL\""
        );
    }

    #[test]
    fn issue_line_normalization() {
        let mut issue: Issue = serde_json::from_value(serde_json::json!({
            "severity": "HIGH",
            "category": "SECURITY",
            "file": "src/db/query.py",
            "line": "42",
            "reason": "possible SQL injection"
        }))
        .unwrap();
        assert_eq!(issue.line_number(), 42);

        issue.line = "not-a-number".into();
        assert_eq!(issue.line_number(), 1);

        issue.line = "0".into();
        assert_eq!(issue.line_number(), 1);
    }

    #[test]
    fn incremental_requires_delta_diff() {
        let mut req = ReviewRequest {
            workspace: "w".into(),
            project: "p".into(),
            branch: "feature/x".into(),
            target_branch: None,
            commit: None,
            pull_request_id: None,
            pr_title: None,
            pr_description: None,
            changed_files: vec![],
            deleted_files: vec![],
            diff: String::new(),
            delta_diff: None,
            analysis_mode: AnalysisMode::Incremental,
            previous_issues: vec![],
            enrichment: None,
        };
        assert!(!req.is_incremental());

        req.delta_diff = Some("--- a/x\n+++ b/x\n@@ -1 +1 @@\n+y\n".into());
        assert!(req.is_incremental());
    }

    #[test]
    fn request_deserializes_from_camel_case() {
        let req: ReviewRequest = serde_json::from_value(serde_json::json!({
            "workspace": "acme",
            "project": "billing",
            "branch": "feature/tokens",
            "targetBranch": "main",
            "pullRequestId": 7,
            "changedFiles": ["src/auth.py"],
            "diff": "",
            "analysisMode": "FULL"
        }))
        .unwrap();
        assert_eq!(req.target_branch.as_deref(), Some("main"));
        assert_eq!(req.pull_request_id, Some(7));
        assert!(req.validate().is_ok());
    }
}
