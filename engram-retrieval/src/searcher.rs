//! Cross-shard hybrid search orchestration.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use engram_core::config::EngramConfig;
use engram_core::errors::EngramResult;
use engram_core::memory::MemoryRecord;
use engram_core::tag::ContainerTag;
use engram_embeddings::EmbeddingService;
use engram_storage::{ShardManager, ShardStore};

use crate::fusion;

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub record: MemoryRecord,
    /// Normalized fused score in `[0, 1]`.
    pub similarity: f32,
}

/// Fans queries out over the shard set and fuses the results.
pub struct HybridSearcher {
    config: Arc<EngramConfig>,
    shards: Arc<ShardManager>,
    embeddings: Arc<EmbeddingService>,
}

impl HybridSearcher {
    pub fn new(
        config: Arc<EngramConfig>,
        shards: Arc<ShardManager>,
        embeddings: Arc<EmbeddingService>,
    ) -> Self {
        Self {
            config,
            shards,
            embeddings,
        }
    }

    /// Hybrid search: up to `k` memories ranked best first.
    ///
    /// An embedding failure degrades to an empty result; a broken shard
    /// is skipped. Only registry-level failures propagate.
    pub async fn search(
        &self,
        query: &str,
        container_tag: Option<&str>,
        k: usize,
    ) -> EngramResult<Vec<SearchHit>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = match self.embeddings.embed_with_timeout(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed, returning empty result");
                return Ok(Vec::new());
            }
        };

        let targets = self.resolve_targets(container_tag)?;
        debug!(targets = targets.len(), query, "hybrid search fan-out");

        let per_shard_k = self.config.max_memories.max(k);
        let tasks = targets.into_iter().map(|(store, tag)| {
            let query_vector = query_vector.clone();
            let query_text = query.to_string();
            tokio::task::spawn_blocking(move || {
                let tag_filter = tag.as_deref();
                let vector = store.vector_search(&query_vector, tag_filter, per_shard_k);
                let fts = store.fts_search(&query_text, tag_filter, per_shard_k);
                (vector, fts)
            })
        });

        let mut vector_list: Vec<(MemoryRecord, f32)> = Vec::new();
        let mut fts_list: Vec<(MemoryRecord, f32)> = Vec::new();
        for joined in join_all(tasks).await {
            let (vector, fts) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "shard search task panicked, skipping shard");
                    continue;
                }
            };
            match vector {
                Ok(hits) => vector_list.extend(hits),
                Err(e) => warn!(error = %e, "per-shard vector search failed, skipping"),
            }
            match fts {
                Ok(hits) => fts_list.extend(hits),
                Err(e) => warn!(error = %e, "per-shard FTS search failed, skipping"),
            }
        }

        // Global best-first ordering before fusion assigns ranks.
        vector_list.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        fts_list.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let threshold = self.config.similarity_threshold;
        let hits: Vec<SearchHit> = fusion::fuse(&vector_list, &fts_list)
            .into_iter()
            .filter(|hit| hit.fused_score >= threshold)
            .take(k)
            .map(|hit| SearchHit {
                record: hit.record,
                similarity: hit.fused_score,
            })
            .collect();

        debug!(results = hits.len(), "hybrid search complete");
        Ok(hits)
    }

    /// Resolve the `(store, tag filter)` pairs the query fans out over.
    ///
    /// With an explicit tag the fan-out covers its `(scope, hash)` shard
    /// set; without one, every shard is searched once per distinct
    /// container tag it holds.
    fn resolve_targets(
        &self,
        container_tag: Option<&str>,
    ) -> EngramResult<Vec<(ShardStore, Option<String>)>> {
        let mut targets = Vec::new();

        match container_tag {
            Some(tag) => {
                let parsed = ContainerTag::parse(tag);
                for shard in self.shards.get_all_shards(parsed.scope, &parsed.hash)? {
                    match self.shards.shard_store(&shard) {
                        Ok(store) => targets.push((store, Some(tag.to_string()))),
                        Err(e) => {
                            warn!(shard_id = shard.id, error = %e, "shard unopenable, skipping")
                        }
                    }
                }
            }
            None => {
                for shard in self.shards.all_shards()? {
                    let store = match self.shards.shard_store(&shard) {
                        Ok(store) => store,
                        Err(e) => {
                            warn!(shard_id = shard.id, error = %e, "shard unopenable, skipping");
                            continue;
                        }
                    };
                    match store.distinct_tags() {
                        Ok(tags) => {
                            for tag in tags {
                                targets.push((store.clone(), Some(tag.container_tag)));
                            }
                        }
                        Err(e) => {
                            warn!(shard_id = shard.id, error = %e, "tag listing failed, skipping")
                        }
                    }
                }
            }
        }

        Ok(targets)
    }
}
