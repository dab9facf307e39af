//! RAG engine: code-aware retrieval over Qdrant.
//!
//! One collection per (workspace, project), addressed through a stable
//! alias. Reindexing writes a fresh versioned collection and atomically
//! swaps the alias, so readers never observe a partial index. Branch
//! identity lives in point payloads, which lets one collection serve
//! multi-branch PR queries.
//!
//! Public surface:
//! - [`indexer::Indexer`] — repository indexing, branch-scoped updates,
//!   PR-scoped hybrid points, budget enforcement.
//! - [`retriever::Retriever`] — multi-query PR context retrieval with
//!   priority reranking and deterministic lookups.

pub mod config;
pub mod errors;
pub mod facade;
pub mod filters;
pub mod indexer;
pub mod instructions;
pub mod locks;
pub mod naming;
pub mod payload;
pub mod rerank;
pub mod retriever;
pub mod scan;

pub use config::RagConfig;
pub use errors::RagError;
pub use facade::QdrantFacade;
pub use indexer::{IndexStats, Indexer};
pub use payload::{ChunkPayload, ScoredChunk};
pub use retriever::{PrContext, PrContextRequest, Retriever};
