//! Stage 2: cross-file and architectural analysis.
//!
//! A single structured call over the slimmed Stage 1 findings, the
//! enrichment-derived architecture context, and the migration files
//! detected in the diff. Findings that do not span at least two files are
//! dropped — they belong to Stage 1.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::diff::ProcessedDiff;
use crate::errors::ReviewResult;
use crate::model::{CrossFileResult, EnrichmentData, Issue, ReviewPlan, ReviewRequest};
use crate::parser::parse_with_repair;
use crate::prompt::build_stage_2_cross_file_prompt;
use crate::stages::ReviewDeps;

/// Path markers identifying database migration files.
const MIGRATION_PATH_MARKERS: &[&str] = &[
    "/db/migrate/",
    "/migrations/",
    "/migration/",
    "/migrate/",
    "/flyway/",
    "/liquibase/",
    "/alembic/",
    "/changeset/",
];

/// Cap on migration paths listed in the prompt.
const MAX_MIGRATIONS_LISTED: usize = 15;

/// Fields stripped from issues before Stage 2 sees them; cross-file
/// detection needs location + severity + reason, not fix bodies.
const STAGE_2_STRIP_FIELDS: &[&str] = &[
    "suggestedFixDiff",
    "suggestedFixDescription",
    "codeSnippet",
    "resolvedDescription",
    "resolvedInPr",
    "status",
    "prVersion",
];

/// Runs the cross-file analysis call.
pub async fn execute_stage_2(
    deps: &ReviewDeps,
    request: &ReviewRequest,
    stage_1_issues: &[Issue],
    plan: &ReviewPlan,
    processed: &ProcessedDiff,
) -> ReviewResult<CrossFileResult> {
    let findings_json = slim_issues(stage_1_issues);
    let architecture = build_architecture_context(request.enrichment.as_ref(), &request.changed_files);
    let migrations = detect_migration_paths(processed);

    let prompt = build_stage_2_cross_file_prompt(
        request,
        &findings_json,
        &architecture,
        &migrations,
        &plan.cross_file_concerns,
    );

    let mut result = match deps.llm.invoke_structured::<CrossFileResult>(&prompt).await {
        Ok(r) => {
            info!("stage2: cross-file analysis completed via structured output");
            r
        }
        Err(e) => {
            warn!(error = %e, "stage2: structured output failed, falling back to manual parse");
            let raw = deps.llm.generate_slow(&prompt).await?;
            parse_with_repair::<CrossFileResult>(&deps.llm, &raw).await?
        }
    };

    // Enforce the ≥ 2 affected files contract.
    let before = result.cross_file_issues.len();
    result.cross_file_issues.retain(|i| i.affected_files.len() >= 2);
    if result.cross_file_issues.len() < before {
        debug!(
            dropped = before - result.cross_file_issues.len(),
            "stage2: dropped single-file findings"
        );
    }

    Ok(result)
}

/// Serializes issues for Stage 2 with bulky fields stripped.
pub fn slim_issues(issues: &[Issue]) -> String {
    let slim: Vec<Value> = issues
        .iter()
        .filter_map(|i| serde_json::to_value(i).ok())
        .map(|mut v| {
            if let Some(obj) = v.as_object_mut() {
                for field in STAGE_2_STRIP_FIELDS {
                    obj.remove(*field);
                }
            }
            v
        })
        .collect();
    serde_json::to_string_pretty(&slim).unwrap_or_else(|_| "[]".to_string())
}

/// Synthesizes the architecture-reference section from enrichment data.
pub fn build_architecture_context(
    enrichment: Option<&EnrichmentData>,
    changed_files: &[String],
) -> String {
    let Some(enrichment) = enrichment.filter(|e| !e.is_empty()) else {
        return "No architecture context available (enrichment data not provided).".to_string();
    };

    let mut sections: Vec<String> = Vec::new();

    if !enrichment.relationships.is_empty() {
        let lines: Vec<String> = enrichment
            .relationships
            .iter()
            .map(|r| {
                let matched = r
                    .matched_on
                    .as_deref()
                    .map(|m| format!("  (matched on: {m})"))
                    .unwrap_or_default();
                format!(
                    "  {} --[{}]--> {}{}",
                    r.source_file, r.relationship_type, r.target_file, matched
                )
            })
            .collect();
        sections.push(format!(
            "### Inter-file relationships (from dependency analysis)\n{}",
            lines.join("\n")
        ));
    }

    let hierarchy: Vec<String> = enrichment
        .file_metadata
        .iter()
        .filter_map(|meta| {
            let mut parts = Vec::new();
            if !meta.extends_classes.is_empty() {
                parts.push(format!("extends {}", meta.extends_classes.join(", ")));
            }
            if !meta.implements_interfaces.is_empty() {
                parts.push(format!("implements {}", meta.implements_interfaces.join(", ")));
            }
            if parts.is_empty() {
                None
            } else {
                Some(format!("  {}: {}", meta.path, parts.join("; ")))
            }
        })
        .collect();
    if !hierarchy.is_empty() {
        sections.push(format!(
            "### Class hierarchy in changed files\n{}",
            hierarchy.join("\n")
        ));
    }

    // Imports among changed files only — external imports add noise.
    if !changed_files.is_empty() {
        let import_lines: Vec<String> = enrichment
            .file_metadata
            .iter()
            .filter_map(|meta| {
                let cross: Vec<&String> = meta
                    .imports
                    .iter()
                    .filter(|imp| {
                        changed_files
                            .iter()
                            .any(|cf| cf.contains(imp.as_str()) || imp.contains(cf.as_str()))
                    })
                    .take(10)
                    .collect();
                if cross.is_empty() {
                    None
                } else {
                    Some(format!(
                        "  {} imports: {}",
                        meta.path,
                        cross.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                    ))
                }
            })
            .collect();
        if !import_lines.is_empty() {
            sections.push(format!(
                "### Cross-file imports among changed files\n{}",
                import_lines.join("\n")
            ));
        }
    }

    if sections.is_empty() {
        return "No architecture context available (enrichment data not provided).".to_string();
    }
    sections.join("\n\n")
}

/// Lists migration file paths found in the diff.
///
/// Stage 1 already reviewed each migration in detail; Stage 2 only needs to
/// know which files are migrations to reason about cross-file DB concerns.
pub fn detect_migration_paths(processed: &ProcessedDiff) -> String {
    let migration_files: Vec<&str> = processed
        .files
        .iter()
        .filter(|f| {
            let lower = f.path.to_lowercase();
            lower.ends_with(".sql") || MIGRATION_PATH_MARKERS.iter().any(|m| lower.contains(m))
        })
        .map(|f| f.path.as_str())
        .collect();

    if migration_files.is_empty() {
        return "No migration scripts detected in this PR.".to_string();
    }

    let listing: Vec<String> = migration_files
        .iter()
        .take(MAX_MIGRATIONS_LISTED)
        .map(|p| format!("- {p}"))
        .collect();
    format!(
        "Migration files in this PR ({}):\n{}",
        migration_files.len(),
        listing.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffProcessor;
    use crate::model::{Category, FileMetadata, FileRelationship, Severity};

    fn issue_with_fix() -> Issue {
        Issue {
            id: Some("X".into()),
            severity: Severity::High,
            category: Category::Security,
            file: "src/db/query.py".into(),
            line: "12".into(),
            reason: "string-built SQL".into(),
            suggested_fix_description: "use bind parameters".into(),
            suggested_fix_diff: Some("--- a\n+++ b\n".into()),
            is_resolved: false,
            code_snippet: Some("cursor.execute(q)".into()),
            resolved_in_pr: None,
            status: None,
            resolved_description: None,
            pr_version: None,
        }
    }

    #[test]
    fn slimming_strips_fix_bodies_but_keeps_location() {
        let json = slim_issues(&[issue_with_fix()]);
        assert!(json.contains("src/db/query.py"));
        assert!(json.contains("string-built SQL"));
        assert!(!json.contains("suggestedFixDiff"));
        assert!(!json.contains("use bind parameters"));
        assert!(!json.contains("codeSnippet"));
    }

    #[test]
    fn migration_detection_matches_markers_and_sql() {
        let diff = DiffProcessor::process(
            "diff --git a/db/migrations/V3__add_col.sql b/db/migrations/V3__add_col.sql\n\
             new file mode 100644\n--- /dev/null\n+++ b/db/migrations/V3__add_col.sql\n\
             @@ -0,0 +1 @@\n+ALTER TABLE users ADD COLUMN age INT;\n\
             diff --git a/src/app.py b/src/app.py\n--- a/src/app.py\n+++ b/src/app.py\n\
             @@ -1 +1 @@\n+print('hi')\n",
        );
        let out = detect_migration_paths(&diff);
        assert!(out.contains("db/migrations/V3__add_col.sql"));
        assert!(!out.contains("src/app.py"));
    }

    #[test]
    fn no_migrations_message() {
        let diff = DiffProcessor::process(
            "diff --git a/src/app.py b/src/app.py\n--- a/src/app.py\n+++ b/src/app.py\n@@ -1 +1 @@\n+x\n",
        );
        assert!(detect_migration_paths(&diff).contains("No migration scripts"));
    }

    #[test]
    fn architecture_context_from_enrichment() {
        let enrichment = EnrichmentData {
            relationships: vec![FileRelationship {
                source_file: "src/api/handler.py".into(),
                target_file: "src/db/queries.py".into(),
                relationship_type: "IMPORTS".into(),
                matched_on: Some("run_query".into()),
            }],
            file_metadata: vec![FileMetadata {
                path: "src/api/handler.py".into(),
                extends_classes: vec!["BaseHandler".into()],
                implements_interfaces: vec![],
                imports: vec!["db.queries".into()],
            }],
        };
        let out = build_architecture_context(
            Some(&enrichment),
            &["src/api/handler.py".into(), "src/db/queries.py".into()],
        );
        assert!(out.contains("--[IMPORTS]-->"));
        assert!(out.contains("extends BaseHandler"));
    }

    #[test]
    fn missing_enrichment_yields_fixed_line() {
        let out = build_architecture_context(None, &[]);
        assert!(out.contains("No architecture context available"));
    }
}
