//! Weighted reciprocal-rank fusion.
//!
//! Each ranked list contributes `w / (rank + 1)` per item to a per-id
//! score. Scores are normalized by the total weight so 1.0 means "rank
//! one in every list", which is the scale the similarity threshold
//! applies on.

use std::collections::HashMap;

use engram_core::memory::MemoryRecord;

/// Weight of the dense vector ranking.
pub const W_VECTOR: f32 = 0.6;
/// Weight of the full-text ranking.
pub const W_FTS: f32 = 0.4;

/// A candidate after fusion, with per-source provenance.
#[derive(Debug, Clone)]
pub struct FusedHit {
    pub record: MemoryRecord,
    /// Normalized fused score in `[0, 1]`.
    pub fused_score: f32,
    /// Raw cosine similarity when the vector search saw this id.
    pub vector_similarity: Option<f32>,
    /// Positional rank in the vector list.
    pub vector_rank: Option<usize>,
    /// Positional rank in the FTS list.
    pub fts_rank: Option<usize>,
}

/// Fuse the two ranked lists, best-first in, best-first out.
///
/// When an id appears in both lists, the row carrying the higher raw
/// vector similarity is kept as the representative; ids colliding across
/// shards keep the most recently updated row. Ties in fused score break
/// on `updated_at` descending.
pub fn fuse(
    vector_list: &[(MemoryRecord, f32)],
    fts_list: &[(MemoryRecord, f32)],
) -> Vec<FusedHit> {
    let mut hits: HashMap<String, FusedHit> = HashMap::new();

    for (rank, (record, similarity)) in vector_list.iter().enumerate() {
        let contribution = W_VECTOR / (rank as f32 + 1.0);
        match hits.get_mut(&record.id) {
            Some(hit) => {
                hit.fused_score += contribution;
                hit.vector_rank = Some(hit.vector_rank.map_or(rank, |r| r.min(rank)));
                // Cross-shard id collision: keep the freshest row and the
                // best similarity.
                if hit.vector_similarity.unwrap_or(f32::MIN) < *similarity {
                    hit.vector_similarity = Some(*similarity);
                }
                if record.updated_at > hit.record.updated_at {
                    hit.record = record.clone();
                }
            }
            None => {
                hits.insert(
                    record.id.clone(),
                    FusedHit {
                        record: record.clone(),
                        fused_score: contribution,
                        vector_similarity: Some(*similarity),
                        vector_rank: Some(rank),
                        fts_rank: None,
                    },
                );
            }
        }
    }

    for (rank, (record, _score)) in fts_list.iter().enumerate() {
        let contribution = W_FTS / (rank as f32 + 1.0);
        match hits.get_mut(&record.id) {
            Some(hit) => {
                hit.fused_score += contribution;
                hit.fts_rank = Some(hit.fts_rank.map_or(rank, |r| r.min(rank)));
                // The vector row (carrying raw similarity) stays the
                // representative unless the FTS copy is strictly newer.
                if record.updated_at > hit.record.updated_at {
                    hit.record = record.clone();
                }
            }
            None => {
                hits.insert(
                    record.id.clone(),
                    FusedHit {
                        record: record.clone(),
                        fused_score: contribution,
                        vector_similarity: None,
                        vector_rank: None,
                        fts_rank: Some(rank),
                    },
                );
            }
        }
    }

    let total_weight = W_VECTOR + W_FTS;
    let mut fused: Vec<FusedHit> = hits
        .into_values()
        .map(|mut hit| {
            hit.fused_score /= total_weight;
            hit
        })
        .collect();

    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.record.updated_at.cmp(&a.record.updated_at))
    });
    fused
}
