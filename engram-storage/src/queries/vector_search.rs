//! Cosine k-NN over the per-shard embedding rows.
//!
//! Brute-force scan with an in-SQL container-tag filter and a cheap
//! dimension pre-check before deserializing each candidate. This is the
//! embedded path; no ANN structure is maintained.

use rusqlite::{params, Connection};

use engram_core::errors::StoreError;
use engram_core::memory::MemoryRecord;
use engram_core::vector;

use crate::to_store_err;

use super::memory_crud::{get_memory, MEMORY_COLUMNS};

/// Top-k nearest memories by cosine similarity, optionally filtered to
/// one container tag. Similarity is clamped to `[0, 1]`.
pub fn vector_search(
    conn: &Connection,
    query: &[f32],
    container_tag: Option<&str>,
    k: usize,
) -> Result<Vec<(MemoryRecord, f32)>, StoreError> {
    if k == 0 || query.iter().all(|x| *x == 0.0) {
        return Ok(Vec::new());
    }
    let query_len = query.len();

    let mut stmt = conn
        .prepare(
            "SELECT v.memory_id, v.embedding
             FROM vec_memories v
             JOIN memories m ON m.id = v.memory_id
             WHERE (?1 IS NULL OR m.container_tag = ?1)",
        )
        .map_err(to_store_err)?;

    let rows = stmt
        .query_map(params![container_tag], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })
        .map_err(to_store_err)?;

    let mut scored: Vec<(String, f32)> = Vec::new();
    for row in rows {
        let (memory_id, blob) = row.map_err(to_store_err)?;
        // Skip dimension mismatches without deserializing the vector.
        if blob.len() != query_len * 4 {
            continue;
        }
        let stored = vector::from_blob(&blob);
        let similarity = vector::cosine_similarity(query, &stored).clamp(0.0, 1.0);
        scored.push((memory_id, similarity));
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);

    let mut results = Vec::with_capacity(scored.len());
    for (memory_id, similarity) in scored {
        if let Some(record) = get_memory(conn, &memory_id)? {
            results.push((record, similarity));
        }
    }
    Ok(results)
}

/// Neighbors of one stored memory within the same container tag, for
/// near-duplicate detection. Excludes the memory itself.
pub fn neighbors_of(
    conn: &Connection,
    record: &MemoryRecord,
    min_similarity: f32,
) -> Result<Vec<(MemoryRecord, f32)>, StoreError> {
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories
         WHERE container_tag = ?1 AND id != ?2"
    );
    let mut stmt = conn.prepare(&sql).map_err(to_store_err)?;
    let rows = stmt
        .query_map(
            params![record.container_tag, record.id],
            super::memory_crud::row_to_record,
        )
        .map_err(to_store_err)?;

    let mut neighbors = Vec::new();
    for row in rows {
        let candidate = row.map_err(to_store_err)?;
        if candidate.vector.len() != record.vector.len() {
            continue;
        }
        let similarity = vector::cosine_similarity(&record.vector, &candidate.vector);
        if similarity >= min_similarity {
            neighbors.push((candidate, similarity));
        }
    }
    Ok(neighbors)
}
