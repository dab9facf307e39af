//! Thin adapter around `qdrant-client` to isolate API usage.
//!
//! This facade concentrates all Qdrant interactions behind a minimal API,
//! hiding the verbose builder pattern and keeping the rest of the engine
//! decoupled from `qdrant-client`. Everything here is collection-name
//! agnostic; alias resolution and naming policy live with the callers.

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    AliasOperations, ChangeAliases, CountPointsBuilder, CreateAlias, CreateCollectionBuilder,
    DeleteAlias, DeletePointsBuilder, Distance, Filter, PointId, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
    alias_operations::Action, vectors_config, vectors_output,
};
use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::errors::{RagError, RagResult};

/// A point read back from a scroll, with enough to re-insert it elsewhere.
#[derive(Debug, Clone)]
pub struct CopiedPoint {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: std::collections::HashMap<String, qdrant_client::qdrant::Value>,
}

/// A raw search hit: score plus payload map.
#[derive(Debug, Clone)]
pub struct RawHit {
    pub score: f32,
    pub payload: std::collections::HashMap<String, qdrant_client::qdrant::Value>,
}

/// Facade over the Qdrant client.
pub struct QdrantFacade {
    client: Qdrant,
}

impl QdrantFacade {
    /// Connects using the engine configuration.
    ///
    /// Vector-store calls get a short timeout; slow operations here stall
    /// the whole pipeline, unlike LLM calls which are expected to be slow.
    pub fn new(cfg: &RagConfig) -> RagResult<Self> {
        cfg.validate()?;

        let mut builder =
            Qdrant::from_url(&cfg.qdrant_url).timeout(std::time::Duration::from_secs(30));
        if let Some(key) = &cfg.qdrant_api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Qdrant(e.to_string()))?;

        Ok(Self { client })
    }

    /// Creates a collection with a cosine vector space of the given size.
    pub async fn create_collection(&self, name: &str, dim: usize) -> RagResult<()> {
        info!(collection = name, dim, "creating collection");
        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dim as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(())
    }

    /// Deletes a collection; missing collections are logged, not errors.
    pub async fn delete_collection(&self, name: &str) -> RagResult<()> {
        match self.client.delete_collection(name).await {
            Ok(_) => {
                info!(collection = name, "collection deleted");
                Ok(())
            }
            Err(e) => {
                warn!(collection = name, error = %e, "delete_collection failed");
                Ok(())
            }
        }
    }

    /// Lists plain collection names (aliases excluded).
    pub async fn list_collections(&self) -> RagResult<Vec<String>> {
        let res = self
            .client
            .list_collections()
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(res.collections.into_iter().map(|c| c.name).collect())
    }

    /// True when a plain collection with this exact name exists.
    pub async fn collection_exists(&self, name: &str) -> RagResult<bool> {
        Ok(self.list_collections().await?.iter().any(|c| c == name))
    }

    /// Points count of a collection (or alias), `None` when unavailable.
    pub async fn points_count(&self, name: &str) -> RagResult<Option<u64>> {
        match self.client.collection_info(name).await {
            Ok(info) => Ok(info.result.and_then(|r| r.points_count)),
            Err(e) => {
                debug!(collection = name, error = %e, "collection_info failed");
                Ok(None)
            }
        }
    }

    /// Vector dimensionality configured on a collection, when readable.
    pub async fn vector_dim(&self, name: &str) -> RagResult<Option<u64>> {
        let info = match self.client.collection_info(name).await {
            Ok(i) => i,
            Err(_) => return Ok(None),
        };
        let dim = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|c| match c {
                vectors_config::Config::Params(p) => Some(p.size),
                vectors_config::Config::ParamsMap(_) => None,
            });
        Ok(dim)
    }

    /// Upserts a batch of points. Same id = replace, never duplicate.
    pub async fn upsert_points(&self, collection: &str, points: Vec<PointStruct>) -> RagResult<()> {
        if points.is_empty() {
            debug!("no points provided for upsert");
            return Ok(());
        }
        debug!(collection, count = points.len(), "upserting points");
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points))
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(())
    }

    /// Deletes every point matching the filter.
    pub async fn delete_by_filter(&self, collection: &str, filter: Filter) -> RagResult<()> {
        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(filter))
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(())
    }

    /// Exact count of points matching the filter.
    pub async fn count_by_filter(&self, collection: &str, filter: Filter) -> RagResult<u64> {
        let res = self
            .client
            .count(
                CountPointsBuilder::new(collection)
                    .filter(filter)
                    .exact(true),
            )
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(res.result.map(|r| r.count).unwrap_or(0))
    }

    /// Similarity search with an optional filter. Payloads included.
    pub async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<Filter>,
    ) -> RagResult<Vec<RawHit>> {
        let mut builder = SearchPointsBuilder::new(collection, vector, limit).with_payload(true);
        if let Some(f) = filter {
            builder = builder.filter(f);
        }

        let res = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;

        Ok(res
            .result
            .into_iter()
            .map(|p| RawHit {
                score: p.score,
                payload: p.payload,
            })
            .collect())
    }

    /// Scrolls every point matching the filter, payload + vectors included.
    ///
    /// Pages of `page_size` until exhaustion; intended for branch-preserving
    /// copies, not user queries.
    pub async fn scroll_all(
        &self,
        collection: &str,
        filter: Option<Filter>,
        page_size: u32,
        with_vectors: bool,
    ) -> RagResult<Vec<CopiedPoint>> {
        let mut out = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(collection)
                .limit(page_size)
                .with_payload(true)
                .with_vectors(with_vectors);
            if let Some(f) = filter.clone() {
                builder = builder.filter(f);
            }
            if let Some(off) = offset.clone() {
                builder = builder.offset(off);
            }

            let res = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| RagError::Qdrant(e.to_string()))?;

            let page_len = res.result.len();
            for p in res.result {
                let id = match p.id {
                    Some(id) => id,
                    None => continue,
                };
                let vector = p.vectors.and_then(dense_vector).unwrap_or_default();
                out.push(CopiedPoint {
                    id,
                    vector,
                    payload: p.payload,
                });
            }

            offset = res.next_page_offset;
            if offset.is_none() || page_len < page_size as usize {
                break;
            }
        }

        Ok(out)
    }

    /* --------------------------- aliases --------------------------- */

    /// Resolves an alias to its underlying collection name.
    pub async fn resolve_alias(&self, alias: &str) -> RagResult<Option<String>> {
        let res = self
            .client
            .list_aliases()
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(res
            .aliases
            .into_iter()
            .find(|a| a.alias_name == alias)
            .map(|a| a.collection_name))
    }

    /// True when an alias with this name exists.
    pub async fn alias_exists(&self, alias: &str) -> RagResult<bool> {
        Ok(self.resolve_alias(alias).await?.is_some())
    }

    /// Atomically repoints `alias` at `collection`.
    ///
    /// Delete-old and create-new run inside one alias-change request, which
    /// Qdrant applies atomically — readers always see exactly one target.
    pub async fn swap_alias(
        &self,
        alias: &str,
        collection: &str,
        delete_existing: bool,
    ) -> RagResult<()> {
        let mut actions: Vec<AliasOperations> = Vec::new();
        if delete_existing {
            actions.push(AliasOperations {
                action: Some(Action::DeleteAlias(DeleteAlias {
                    alias_name: alias.to_string(),
                })),
            });
        }
        actions.push(AliasOperations {
            action: Some(Action::CreateAlias(CreateAlias {
                collection_name: collection.to_string(),
                alias_name: alias.to_string(),
            })),
        });

        self.client
            .update_collection_aliases(ChangeAliases {
                actions,
                timeout: None,
            })
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;

        info!(alias, collection, "alias swap completed");
        Ok(())
    }

    /// Deletes an alias, leaving its collection in place.
    pub async fn delete_alias(&self, alias: &str) -> RagResult<()> {
        self.client
            .update_collection_aliases(ChangeAliases {
                actions: vec![AliasOperations {
                    action: Some(Action::DeleteAlias(DeleteAlias {
                        alias_name: alias.to_string(),
                    })),
                }],
                timeout: None,
            })
            .await
            .map_err(|e| RagError::Qdrant(e.to_string()))?;
        Ok(())
    }

    /// True when either a collection or an alias answers to this name.
    pub async fn collection_or_alias_exists(&self, name: &str) -> RagResult<bool> {
        if self.collection_exists(name).await? {
            return Ok(true);
        }
        self.alias_exists(name).await
    }
}

/// Extracts the dense vector from a scroll's vector output, if present.
fn dense_vector(v: qdrant_client::qdrant::VectorsOutput) -> Option<Vec<f32>> {
    match v.vectors_options? {
        vectors_output::VectorsOptions::Vector(vec) => Some(vec.data),
        vectors_output::VectorsOptions::Vectors(_) => None,
    }
}
