//! Structured-output schema contract.
//!
//! One authoritative definition per output type: the serde model drives
//! decoding and `json_schema()` drives the provider's structured-output
//! mode and the repair prompts. Implementors live next to their models.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// A type the LLM can be asked to produce directly.
pub trait LlmSchema: DeserializeOwned {
    /// Short schema name, used in provider payloads and error messages.
    const NAME: &'static str;

    /// JSON-schema object describing the expected output.
    fn json_schema() -> Value;
}

/// Decodes a raw provider payload into `T`, mapping failures to a
/// schema-violation error carrying the serde detail.
pub fn decode_structured<T: LlmSchema>(raw: &str) -> Result<T, crate::errors::LlmError> {
    serde_json::from_str::<T>(raw).map_err(|e| crate::errors::LlmError::SchemaViolation {
        schema: T::NAME,
        detail: e.to_string(),
    })
}
