//! Retention eviction SQL. Pinned rows are never touched.

use rusqlite::{params, Connection};

use engram_core::errors::StoreError;

use crate::to_store_err;

/// Delete unpinned rows in one container tag older than `cutoff_millis`.
/// Returns the number deleted. Embedding rows cascade; FTS triggers fire.
pub fn delete_expired(
    conn: &Connection,
    container_tag: &str,
    cutoff_millis: i64,
) -> Result<usize, StoreError> {
    conn.execute(
        "DELETE FROM memories
         WHERE container_tag = ?1 AND is_pinned = 0 AND created_at < ?2",
        params![container_tag, cutoff_millis],
    )
    .map_err(to_store_err)
}

/// Full retention pass for one shard: for every container tag, drop
/// expired unpinned rows and enforce the per-tag cap, all in one
/// transaction so a crash never leaves a tag half-evicted.
pub fn retention_pass(
    conn: &Connection,
    cutoff_millis: i64,
    cap: usize,
) -> Result<usize, StoreError> {
    let tx = conn.unchecked_transaction().map_err(to_store_err)?;

    let tags: Vec<String> = {
        let mut stmt = tx
            .prepare("SELECT DISTINCT container_tag FROM memories")
            .map_err(to_store_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(to_store_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(to_store_err)?
    };

    let mut deleted = 0;
    for tag in &tags {
        deleted += delete_expired(&tx, tag, cutoff_millis)?;
        deleted += delete_over_cap(&tx, tag, cap)?;
    }

    tx.commit().map_err(to_store_err)?;
    Ok(deleted)
}

/// Enforce a per-tag cap by deleting the oldest unpinned rows beyond it.
/// Pinned rows count toward the cap but are never deleted.
pub fn delete_over_cap(
    conn: &Connection,
    container_tag: &str,
    cap: usize,
) -> Result<usize, StoreError> {
    let total: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM memories WHERE container_tag = ?1",
            params![container_tag],
            |row| row.get(0),
        )
        .map_err(to_store_err)?;

    let excess = total - cap as i64;
    if excess <= 0 {
        return Ok(0);
    }

    conn.execute(
        "DELETE FROM memories
         WHERE id IN (
             SELECT id FROM memories
             WHERE container_tag = ?1 AND is_pinned = 0
             ORDER BY created_at ASC, id
             LIMIT ?2
         )",
        params![container_tag, excess],
    )
    .map_err(to_store_err)
}
