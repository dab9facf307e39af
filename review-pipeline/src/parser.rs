//! Response parsing with LLM-assisted repair.
//!
//! Every stage asks for structured output first; this module is the
//! fallback path when the provider returns raw (or broken) text. The
//! repair loop is an explicit bounded state machine — Parse, then up to
//! `MAX_REPAIR_ATTEMPTS` rounds of RepairRequest → Parse — never recursion.

use std::sync::Arc;

use tracing::{debug, info, warn};

use llm_gateway::{LlmSchema, LlmServiceProfiles};

use crate::errors::ParseError;

/// Maximum LLM repair rounds before giving up.
const MAX_REPAIR_ATTEMPTS: u32 = 2;

/// Broken payloads are truncated to this many characters in repair prompts.
const REPAIR_PAYLOAD_CHARS: usize = 3000;

/// Cleans markdown fences and trims to the outermost JSON object span.
pub fn clean_json_text(text: &str) -> String {
    let mut text = text.trim().to_string();

    // Fenced block with a language tag.
    if let Some(start) = text.find("```json") {
        let after = &text[start + 7..];
        text = match after.find("```") {
            Some(end) => after[..end].trim().to_string(),
            None => after.trim().to_string(),
        };
    } else if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        // Skip a possible language identifier on the fence line.
        let after = match after.find('\n') {
            Some(nl) if after[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
                &after[nl + 1..]
            }
            _ => after,
        };
        text = match after.find("```") {
            Some(end) => after[..end].trim().to_string(),
            None => after.trim().to_string(),
        };
    }

    // Trim to the outermost `{…}` span.
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return text[start..=end].to_string();
        }
    }
    text
}

/// Parses cleaned text into `T`, reporting schema-aware errors.
pub fn parse_cleaned<T: LlmSchema>(raw: &str) -> Result<T, ParseError> {
    let cleaned = clean_json_text(raw);
    if !cleaned.trim_start().starts_with('{') {
        return Err(ParseError::NoJsonObject { schema: T::NAME });
    }
    serde_json::from_str::<T>(&cleaned).map_err(|e| ParseError::Invalid {
        schema: T::NAME,
        detail: e.to_string(),
    })
}

/// Repair loop state.
enum RepairState {
    Parse { payload: String, attempt: u32 },
    Repair { payload: String, error: String, attempt: u32 },
}

/// Parses raw LLM text into `T`, asking the fast model to repair broken
/// payloads at most [`MAX_REPAIR_ATTEMPTS`] times.
pub async fn parse_with_repair<T: LlmSchema>(
    llm: &Arc<LlmServiceProfiles>,
    raw: &str,
) -> Result<T, ParseError> {
    let mut state = RepairState::Parse {
        payload: raw.to_string(),
        attempt: 0,
    };
    let mut last_error = String::new();

    loop {
        state = match state {
            RepairState::Parse { payload, attempt } => match parse_cleaned::<T>(&payload) {
                Ok(value) => {
                    if attempt > 0 {
                        info!(schema = T::NAME, attempt, "repaired payload parsed");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt >= MAX_REPAIR_ATTEMPTS {
                        return Err(ParseError::RepairExhausted {
                            schema: T::NAME,
                            attempts: attempt,
                            last_error,
                        });
                    }
                    warn!(schema = T::NAME, attempt, error = %last_error, "parse failed, requesting repair");
                    RepairState::Repair {
                        payload,
                        error: last_error.clone(),
                        attempt,
                    }
                }
            },

            RepairState::Repair {
                payload,
                error,
                attempt,
            } => {
                let prompt = build_repair_prompt::<T>(&payload, &error);
                match llm.generate_fast(&prompt).await {
                    Ok(repaired) => {
                        debug!(schema = T::NAME, attempt = attempt + 1, "repair response received");
                        RepairState::Parse {
                            payload: repaired,
                            attempt: attempt + 1,
                        }
                    }
                    Err(e) => {
                        return Err(ParseError::RepairExhausted {
                            schema: T::NAME,
                            attempts: attempt,
                            last_error: format!("repair call failed: {e} (prior: {last_error})"),
                        });
                    }
                }
            }
        };
    }
}

/// Prompt asking for nothing but a corrected JSON object.
fn build_repair_prompt<T: LlmSchema>(broken: &str, error: &str) -> String {
    let truncated: String = broken.chars().take(REPAIR_PAYLOAD_CHARS).collect();
    let schema = serde_json::to_string_pretty(&T::json_schema()).unwrap_or_default();

    format!(
        "You are a JSON repair expert.\n\
        The following JSON failed to parse/validate:\n\
        Error: {error}\n\n\
        Broken JSON:\n{truncated}\n\n\
        Required schema (the output MUST be a JSON object, not an array):\n{schema}\n\n\
        CRITICAL INSTRUCTIONS:\n\
        1. Return ONLY the fixed valid JSON object\n\
        2. The response MUST start with {{ and end with }}\n\
        3. All property names MUST be enclosed in double quotes\n\
        4. No markdown code blocks (no ```)\n\
        5. No explanatory text before or after the JSON\n\
        6. Ensure all required fields from the schema are present\n\n\
        Output the corrected JSON object now:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReviewPlan;

    #[test]
    fn strips_json_fences() {
        let raw = "Here is the plan:\n```json\n{\"analysis_summary\": \"ok\", \"file_groups\": [], \"files_to_skip\": []}\n```\nDone.";
        let cleaned = clean_json_text(raw);
        assert!(cleaned.starts_with('{'));
        assert!(cleaned.ends_with('}'));
        assert!(!cleaned.contains("```"));
    }

    #[test]
    fn strips_bare_fences_with_language_line() {
        let raw = "```\n{\"analysis_summary\": \"x\", \"file_groups\": [], \"files_to_skip\": []}\n```";
        let cleaned = clean_json_text(raw);
        assert!(cleaned.starts_with('{'));
    }

    #[test]
    fn trims_to_outermost_object() {
        let raw = "noise before {\"a\": {\"b\": 1}} noise after";
        assert_eq!(clean_json_text(raw), "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn parse_cleaned_validates_against_model() {
        let ok = r#"{"analysis_summary": "fine", "file_groups": [], "files_to_skip": []}"#;
        assert!(parse_cleaned::<ReviewPlan>(ok).is_ok());

        let bad = "just words, no json";
        match parse_cleaned::<ReviewPlan>(bad) {
            Err(ParseError::NoJsonObject { schema }) => assert_eq!(schema, "ReviewPlan"),
            other => panic!("unexpected: {other:?}"),
        }

        let invalid = r#"{"file_groups": "not-an-array"}"#;
        assert!(matches!(
            parse_cleaned::<ReviewPlan>(invalid),
            Err(ParseError::Invalid { .. })
        ));
    }

    #[test]
    fn repair_prompt_embeds_error_and_schema() {
        let prompt = build_repair_prompt::<ReviewPlan>("{broken", "expected value at line 1");
        assert!(prompt.contains("expected value at line 1"));
        assert!(prompt.contains("{broken"));
        assert!(prompt.contains("file_groups"));
    }
}
