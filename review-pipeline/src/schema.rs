//! JSON schemas for structured LLM output.
//!
//! One schema per stage output, kept next to the serde types they decode
//! into. The schema text is also embedded into repair prompts, so it stays
//! deliberately explicit about required fields and closed sets.

use serde_json::{Value, json};

use llm_gateway::LlmSchema;

use crate::model::{CrossFileResult, FileReviewBatchOutput, ReviewPlan};

fn severity_values() -> Value {
    json!(["CRITICAL", "HIGH", "MEDIUM", "LOW", "INFO"])
}

fn category_values() -> Value {
    json!([
        "SECURITY",
        "PERFORMANCE",
        "CODE_QUALITY",
        "BUG_RISK",
        "STYLE",
        "DOCUMENTATION",
        "BEST_PRACTICES",
        "ERROR_HANDLING",
        "TESTING",
        "ARCHITECTURE"
    ])
}

fn issue_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": ["string", "null"] },
            "severity": { "type": "string", "enum": severity_values() },
            "category": { "type": "string", "enum": category_values() },
            "file": { "type": "string" },
            "line": { "type": "string", "description": "Line number in the new file version" },
            "reason": { "type": "string" },
            "suggestedFixDescription": { "type": "string" },
            "suggestedFixDiff": { "type": ["string", "null"], "description": "Unified diff of the fix" },
            "isResolved": { "type": "boolean" },
            "codeSnippet": { "type": ["string", "null"] }
        },
        "required": ["severity", "category", "file", "line", "reason"]
    })
}

impl LlmSchema for ReviewPlan {
    const NAME: &'static str = "ReviewPlan";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "analysis_summary": { "type": "string" },
                "file_groups": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "group_id": { "type": "string" },
                            "priority": { "type": "string", "enum": ["CRITICAL", "HIGH", "MEDIUM", "LOW"] },
                            "rationale": { "type": "string" },
                            "files": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "path": { "type": "string" },
                                        "focus_areas": { "type": "array", "items": { "type": "string" } },
                                        "risk_level": { "type": ["string", "null"] },
                                        "estimated_issues": { "type": ["integer", "null"] }
                                    },
                                    "required": ["path"]
                                }
                            }
                        },
                        "required": ["group_id", "priority", "files"]
                    }
                },
                "files_to_skip": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": { "type": "string" },
                            "reason": { "type": "string" }
                        },
                        "required": ["path"]
                    }
                },
                "cross_file_concerns": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["analysis_summary", "file_groups", "files_to_skip"]
        })
    }
}

impl LlmSchema for FileReviewBatchOutput {
    const NAME: &'static str = "FileReviewBatchOutput";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "reviews": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": { "type": "string" },
                            "issues": { "type": "array", "items": issue_schema() }
                        },
                        "required": ["path", "issues"]
                    }
                }
            },
            "required": ["reviews"]
        })
    }
}

impl LlmSchema for CrossFileResult {
    const NAME: &'static str = "CrossFileResult";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "pr_risk_level": { "type": "string", "enum": ["CRITICAL", "HIGH", "MEDIUM", "LOW"] },
                "cross_file_issues": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "severity": { "type": "string", "enum": severity_values() },
                            "category": { "type": "string", "enum": category_values() },
                            "affected_files": {
                                "type": "array",
                                "items": { "type": "string" },
                                "minItems": 2,
                                "description": "Cross-file issues must span at least two files"
                            },
                            "reason": { "type": "string" },
                            "suggested_fix_description": { "type": "string" }
                        },
                        "required": ["severity", "category", "affected_files", "reason"]
                    }
                },
                "data_flow_concerns": { "type": "array", "items": { "type": "string" } },
                "pr_recommendation": { "type": "string", "enum": ["PASS", "PASS_WITH_WARNINGS", "FAIL"] },
                "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
            },
            "required": ["pr_risk_level", "pr_recommendation"]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_are_objects_with_required_fields() {
        for schema in [
            ReviewPlan::json_schema(),
            FileReviewBatchOutput::json_schema(),
            CrossFileResult::json_schema(),
        ] {
            assert_eq!(schema["type"], "object");
            assert!(schema["required"].is_array());
        }
    }

    #[test]
    fn sample_plan_matches_serde_model() {
        let sample = json!({
            "analysis_summary": "Two auth files changed",
            "file_groups": [{
                "group_id": "GROUP_AUTH",
                "priority": "HIGH",
                "rationale": "security sensitive",
                "files": [{ "path": "src/auth.py", "focus_areas": ["SECURITY"] }]
            }],
            "files_to_skip": [{ "path": "README.md", "reason": "docs only" }],
            "cross_file_concerns": ["token handling spans auth and session"]
        });
        let plan: ReviewPlan = serde_json::from_value(sample).unwrap();
        assert_eq!(plan.file_count(), 1);
    }
}
