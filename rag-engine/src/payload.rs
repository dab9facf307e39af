//! Typed point payload and conversions to/from Qdrant values.
//!
//! Every point carries the full [`ChunkPayload`]; optional fields are
//! explicitly nullable rather than dynamically present, so readers never
//! guess at the shape.

use std::collections::HashMap;

use qdrant_client::Payload;
use qdrant_client::qdrant::Value as QValue;
use qdrant_client::qdrant::value::Kind;
use serde::{Deserialize, Serialize};

use code_splitter::{CodeChunk, ContentType};

use crate::errors::RagError;

/// Payload stored with each indexed chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub path: String,
    pub language: String,
    pub workspace: String,
    pub project: String,
    pub branch: String,
    pub commit: String,
    /// RFC 3339 timestamp of the indexing run.
    pub indexed_at: String,
    pub content: String,
    pub content_type: String,

    #[serde(default)]
    pub semantic_names: Vec<String>,
    #[serde(default)]
    pub primary_name: Option<String>,
    #[serde(default)]
    pub parent_context: Vec<String>,
    #[serde(default)]
    pub parent_class: Option<String>,
    #[serde(default)]
    pub start_line: usize,
    #[serde(default)]
    pub end_line: usize,
    #[serde(default)]
    pub docstring: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub implements: Vec<String>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub parent_chunk_id: Option<String>,

    /// Set only on PR-scoped hybrid points; removed after the review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<i64>,
}

impl ChunkPayload {
    /// Builds the payload for a split chunk in the given index scope.
    pub fn from_chunk(
        chunk: &CodeChunk,
        workspace: &str,
        project: &str,
        branch: &str,
        commit: &str,
        indexed_at: &str,
    ) -> Self {
        Self {
            path: chunk.path.clone(),
            language: chunk.language.clone(),
            workspace: workspace.to_string(),
            project: project.to_string(),
            branch: branch.to_string(),
            commit: commit.to_string(),
            indexed_at: indexed_at.to_string(),
            content: chunk.content.clone(),
            content_type: chunk.content_type.as_str().to_string(),
            semantic_names: chunk.semantic_names.clone(),
            primary_name: chunk.primary_name.clone(),
            parent_context: chunk.parent_context.clone(),
            parent_class: chunk.parent_class.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            docstring: chunk.docstring.clone(),
            signature: chunk.signature.clone(),
            extends: chunk.extends.clone(),
            implements: chunk.implements.clone(),
            imports: chunk.imports.clone(),
            namespace: chunk.namespace.clone(),
            parent_chunk_id: chunk.parent_chunk_id.clone(),
            pr_number: None,
        }
    }

    /// Converts into a Qdrant payload.
    pub fn to_qdrant(&self) -> Result<Payload, RagError> {
        let json = serde_json::to_value(self).map_err(|e| RagError::Payload(e.to_string()))?;
        Payload::try_from(json).map_err(|e| RagError::Payload(e.to_string()))
    }

    /// Parses a Qdrant payload map back into the typed form.
    pub fn from_qdrant(map: &HashMap<String, QValue>) -> Result<Self, RagError> {
        let json = qmap_to_json(map);
        serde_json::from_value(json).map_err(|e| RagError::Payload(e.to_string()))
    }

    /// Typed content kind, used for reranking coefficients.
    pub fn content_type_enum(&self) -> Option<ContentType> {
        match self.content_type.as_str() {
            "functions_classes" => Some(ContentType::FunctionsClasses),
            "simplified_code" => Some(ContentType::SimplifiedCode),
            "fallback" => Some(ContentType::Fallback),
            "oversized_split" => Some(ContentType::OversizedSplit),
            _ => None,
        }
    }
}

/// One retrieval hit: the typed payload plus the (reranked) score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub score: f32,
    pub payload: ChunkPayload,
}

/// Converts a Qdrant payload map into JSON, recursively.
///
/// Unlike a flat conversion, lists and nested structs survive — the payload
/// stores `semantic_names` and `imports` as real lists.
pub fn qmap_to_json(map: &HashMap<String, QValue>) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    for (k, v) in map {
        out.insert(k.clone(), qvalue_to_json(v));
    }
    serde_json::Value::Object(out)
}

fn qvalue_to_json(v: &QValue) -> serde_json::Value {
    match &v.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::IntegerValue(i)) => serde_json::Value::Number((*i).into()),
        Some(Kind::DoubleValue(f)) => serde_json::json!(f),
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(qvalue_to_json).collect())
        }
        Some(Kind::StructValue(s)) => {
            let mut out = serde_json::Map::new();
            for (k, v) in &s.fields {
                out.insert(k.clone(), qvalue_to_json(v));
            }
            serde_json::Value::Object(out)
        }
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use code_splitter::{CodeSplitter, SplitterConfig};

    fn sample_payload() -> ChunkPayload {
        let splitter = CodeSplitter::new(SplitterConfig::default());
        let chunks = splitter.split_file(
            "src/auth.py",
            "import jwt\n\nclass TokenService:\n    def issue(self, user):\n        return jwt.encode({'sub': user.id}, KEY)\n\n    def verify(self, token):\n        return jwt.decode(token, KEY)\n\ndef noop():\n    pass\n",
        );
        ChunkPayload::from_chunk(
            &chunks[0],
            "acme",
            "billing",
            "feature/tokens",
            "abc123",
            "2025-01-01T00:00:00Z",
        )
    }

    #[test]
    fn qdrant_round_trip_preserves_lists() {
        let payload = sample_payload();
        let qdrant: Payload = payload.to_qdrant().unwrap();
        let map: HashMap<String, QValue> = qdrant.into();
        let back = ChunkPayload::from_qdrant(&map).unwrap();

        assert_eq!(back.path, payload.path);
        assert_eq!(back.branch, "feature/tokens");
        assert_eq!(back.semantic_names, payload.semantic_names);
        assert_eq!(back.imports, payload.imports);
        assert_eq!(back.content_type, payload.content_type);
    }

    #[test]
    fn pr_number_is_absent_unless_set() {
        let payload = sample_payload();
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("pr_number").is_none());
    }
}
