//! Engine configuration, loaded strictly from environment variables.

use crate::errors::RagError;

/// High-level configuration for the Qdrant-backed engine.
#[derive(Clone, Debug)]
pub struct RagConfig {
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    /// Prefix for every project alias (e.g. `ragrev`).
    pub collection_prefix: String,
    /// Expected embedding dimensionality; must match the embedding model.
    pub embedding_dim: usize,

    /// Files processed per indexing batch.
    pub document_batch_size: usize,
    /// Points per upsert call.
    pub insert_batch_size: usize,

    /// Reject indexing when the repository has more files than this (0 = off).
    pub max_files_per_index: usize,
    /// Reject indexing when the estimated chunk count exceeds this (0 = off).
    pub max_chunks_per_index: usize,
    /// Per-file size cap during scanning.
    pub max_file_bytes: u64,

    /// Splitter chunk size in characters.
    pub chunk_size: usize,
    /// Splitter overlap in characters.
    pub chunk_overlap: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".to_string(),
            qdrant_api_key: None,
            collection_prefix: "ragrev".to_string(),
            embedding_dim: 1024,
            document_batch_size: 50,
            insert_batch_size: 50,
            max_files_per_index: 10_000,
            max_chunks_per_index: 100_000,
            max_file_bytes: 1_000_000,
            chunk_size: 2000,
            chunk_overlap: 200,
        }
    }
}

impl RagConfig {
    /// Build `RagConfig` from environment variables.
    ///
    /// Recognized vars:
    /// - `QDRANT_URL` (required), `QDRANT_API_KEY` (optional)
    /// - `RAG_COLLECTION_PREFIX` (default: `ragrev`)
    /// - `EMBEDDING_DIM` (default: 1024)
    /// - `RAG_MAX_FILES`, `RAG_MAX_CHUNKS`, `RAG_MAX_FILE_BYTES`
    /// - `RAG_CHUNK_SIZE`, `RAG_CHUNK_OVERLAP`
    pub fn from_env() -> Result<Self, RagError> {
        use std::env;

        let url = env::var("QDRANT_URL")
            .map_err(|_| RagError::Config("QDRANT_URL is required".into()))?;

        let defaults = Self::default();
        let parse_usize = |name: &str, default: usize| -> usize {
            env::var(name)
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(default)
        };

        let cfg = Self {
            qdrant_url: url,
            qdrant_api_key: env::var("QDRANT_API_KEY").ok().filter(|s| !s.is_empty()),
            collection_prefix: env::var("RAG_COLLECTION_PREFIX")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.collection_prefix),
            embedding_dim: parse_usize("EMBEDDING_DIM", defaults.embedding_dim),
            document_batch_size: defaults.document_batch_size,
            insert_batch_size: defaults.insert_batch_size,
            max_files_per_index: parse_usize("RAG_MAX_FILES", defaults.max_files_per_index),
            max_chunks_per_index: parse_usize("RAG_MAX_CHUNKS", defaults.max_chunks_per_index),
            max_file_bytes: env::var("RAG_MAX_FILE_BYTES")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(defaults.max_file_bytes),
            chunk_size: parse_usize("RAG_CHUNK_SIZE", defaults.chunk_size),
            chunk_overlap: parse_usize("RAG_CHUNK_OVERLAP", defaults.chunk_overlap),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates mandatory fields.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.qdrant_url.trim().is_empty() {
            return Err(RagError::Config("empty QDRANT_URL".into()));
        }
        if self.collection_prefix.trim().is_empty() {
            return Err(RagError::Config("empty RAG_COLLECTION_PREFIX".into()));
        }
        if self.embedding_dim == 0 {
            return Err(RagError::Config("EMBEDDING_DIM must be > 0".into()));
        }
        Ok(())
    }
}
