//! Insert, get, list, delete, pin for memory rows.

use rusqlite::{params, Connection, OptionalExtension};

use engram_core::errors::StoreError;
use engram_core::memory::{MemoryKind, MemoryRecord, Scope, TagInfo};
use engram_core::tag::ContainerTag;
use engram_core::vector;

use crate::to_store_err;

/// Column list shared by every row-producing query.
pub(crate) const MEMORY_COLUMNS: &str = "id, content, container_tag, type, tags, created_at, \
     updated_at, metadata, display_name, user_name, user_email, project_path, project_name, \
     git_repo_url, is_pinned, vector, tags_vector";

/// Insert a memory row plus both embedding rows in one transaction.
/// The FTS index is kept in sync by triggers on `memories`.
pub fn insert_memory(
    conn: &Connection,
    record: &MemoryRecord,
    expected_dims: usize,
) -> Result<(), StoreError> {
    if record.vector.len() != expected_dims {
        return Err(StoreError::DimensionMismatch {
            expected: expected_dims,
            actual: record.vector.len(),
        });
    }
    if let Some(tags_vector) = &record.tags_vector {
        if tags_vector.len() != expected_dims {
            return Err(StoreError::DimensionMismatch {
                expected: expected_dims,
                actual: tags_vector.len(),
            });
        }
    }

    let tx = conn.unchecked_transaction().map_err(to_store_err)?;
    match insert_memory_inner(&tx, record) {
        Ok(()) => tx.commit().map_err(to_store_err),
        Err(e) => {
            let _ = tx.rollback();
            Err(e)
        }
    }
}

fn insert_memory_inner(conn: &Connection, record: &MemoryRecord) -> Result<(), StoreError> {
    let tags_json = serde_json::to_string(&record.tags)
        .map_err(|e| StoreError::sqlite(format!("serialize tags: {e}")))?;
    let vector_blob = vector::to_blob(&record.vector);
    let tags_vector_blob = record.tags_vector.as_deref().map(vector::to_blob);

    let inserted = conn.execute(
        "INSERT INTO memories (
            id, content, container_tag, type, tags, created_at, updated_at, metadata,
            display_name, user_name, user_email, project_path, project_name, git_repo_url,
            is_pinned, vector, tags_vector
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            record.id,
            record.content,
            record.container_tag,
            record.kind.map(|k| k.as_str()),
            tags_json,
            record.created_at,
            record.updated_at,
            record.metadata,
            record.display_name,
            record.user_name,
            record.user_email,
            record.project_path,
            record.project_name,
            record.git_repo_url,
            record.is_pinned as i64,
            vector_blob,
            tags_vector_blob,
        ],
    );

    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(StoreError::IdExists {
                id: record.id.clone(),
            })
        }
        Err(e) => return Err(to_store_err(e)),
    }

    conn.execute(
        "INSERT INTO vec_memories (memory_id, embedding) VALUES (?1, ?2)",
        params![record.id, vector::to_blob(&record.vector)],
    )
    .map_err(to_store_err)?;

    if let Some(tags_vector) = &record.tags_vector {
        conn.execute(
            "INSERT INTO vec_tags (memory_id, embedding) VALUES (?1, ?2)",
            params![record.id, vector::to_blob(tags_vector)],
        )
        .map_err(to_store_err)?;
    }

    Ok(())
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Get a single memory by id.
pub fn get_memory(conn: &Connection, id: &str) -> Result<Option<MemoryRecord>, StoreError> {
    let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1");
    let mut stmt = conn.prepare(&sql).map_err(to_store_err)?;
    stmt.query_row(params![id], row_to_record)
        .optional()
        .map_err(to_store_err)
}

/// Newest-first listing for one container tag.
pub fn list_by_tag(
    conn: &Connection,
    container_tag: &str,
    limit: usize,
) -> Result<Vec<MemoryRecord>, StoreError> {
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories
         WHERE container_tag = ?1
         ORDER BY created_at DESC, id
         LIMIT ?2"
    );
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(&sql).map_err(to_store_err)?;
    let rows = stmt
        .query_map(params![container_tag, limit], row_to_record)
        .map_err(to_store_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(to_store_err)
}

/// Every row in the shard, newest first.
pub fn list_all(conn: &Connection) -> Result<Vec<MemoryRecord>, StoreError> {
    let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories ORDER BY created_at DESC, id");
    let mut stmt = conn.prepare(&sql).map_err(to_store_err)?;
    let rows = stmt.query_map([], row_to_record).map_err(to_store_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(to_store_err)
}

/// A page of rows in stable id order, for batch streaming. Re-run per
/// batch so concurrent growth is observed.
pub fn list_page(
    conn: &Connection,
    after_id: Option<&str>,
    limit: usize,
) -> Result<Vec<MemoryRecord>, StoreError> {
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories
         WHERE id > ?1
         ORDER BY id
         LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql).map_err(to_store_err)?;
    let rows = stmt
        .query_map(params![after_id.unwrap_or(""), limit as i64], row_to_record)
        .map_err(to_store_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(to_store_err)
}

/// Delete a memory and its embedding rows in one transaction.
///
/// The embedding tables cascade on the row delete and the FTS trigger
/// fires on it, so a single DELETE covers all four sub-tables.
pub fn delete_memory(conn: &Connection, id: &str) -> Result<(), StoreError> {
    let deleted = conn
        .execute("DELETE FROM memories WHERE id = ?1", params![id])
        .map_err(to_store_err)?;
    if deleted == 0 {
        return Err(StoreError::NotFound { id: id.to_string() });
    }
    Ok(())
}

/// Set or clear the pin flag.
pub fn set_pinned(conn: &Connection, id: &str, pinned: bool) -> Result<(), StoreError> {
    let updated = conn
        .execute(
            "UPDATE memories SET is_pinned = ?2 WHERE id = ?1",
            params![id, pinned as i64],
        )
        .map_err(to_store_err)?;
    if updated == 0 {
        return Err(StoreError::NotFound { id: id.to_string() });
    }
    Ok(())
}

/// Total row count.
pub fn count(conn: &Connection) -> Result<u64, StoreError> {
    conn.query_row("SELECT COUNT(*) FROM memories", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|n| n as u64)
    .map_err(to_store_err)
}

/// Distinct container tags with denormalized display fields and counts.
pub fn distinct_tags(conn: &Connection) -> Result<Vec<TagInfo>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT container_tag, MAX(display_name), MAX(project_name), COUNT(*)
             FROM memories
             GROUP BY container_tag
             ORDER BY container_tag",
        )
        .map_err(to_store_err)?;
    let rows = stmt
        .query_map([], |row| {
            let raw: String = row.get(0)?;
            let display_name: Option<String> = row.get(1)?;
            let project_name: Option<String> = row.get(2)?;
            let count: i64 = row.get(3)?;
            Ok((raw, display_name, project_name, count))
        })
        .map_err(to_store_err)?;

    let mut tags = Vec::new();
    for row in rows {
        let (raw, display_name, project_name, count) = row.map_err(to_store_err)?;
        let parsed = ContainerTag::parse(&raw);
        tags.push(TagInfo {
            container_tag: raw,
            scope: parsed.scope,
            display_name,
            project_name,
            count: count as u64,
        });
    }
    Ok(tags)
}

/// Row counts per scope, derived from the stored container tags.
pub fn count_by_scope(conn: &Connection) -> Result<(u64, u64), StoreError> {
    let mut stmt = conn
        .prepare("SELECT container_tag, COUNT(*) FROM memories GROUP BY container_tag")
        .map_err(to_store_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .map_err(to_store_err)?;

    let mut user = 0u64;
    let mut project = 0u64;
    for row in rows {
        let (raw, n) = row.map_err(to_store_err)?;
        match ContainerTag::parse(&raw).scope {
            Scope::User => user += n as u64,
            Scope::Project => project += n as u64,
        }
    }
    Ok((user, project))
}

/// Row counts per memory kind.
pub fn count_by_kind(conn: &Connection) -> Result<Vec<(MemoryKind, u64)>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT COALESCE(type, 'other'), COUNT(*) FROM memories GROUP BY 1")
        .map_err(to_store_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .map_err(to_store_err)?;

    let mut counts = std::collections::BTreeMap::new();
    for row in rows {
        let (kind, n) = row.map_err(to_store_err)?;
        *counts.entry(MemoryKind::parse(&kind).as_str()).or_insert(0) += n as u64;
    }
    Ok(counts
        .into_iter()
        .map(|(kind, n)| (MemoryKind::parse(kind), n))
        .collect())
}

/// Parse one row of `MEMORY_COLUMNS` into a record.
pub(crate) fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let kind: Option<String> = row.get(3)?;
    let tags_json: String = row.get(4)?;
    let vector_blob: Vec<u8> = row.get(15)?;
    let tags_vector_blob: Option<Vec<u8>> = row.get(16)?;

    Ok(MemoryRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        container_tag: row.get(2)?,
        kind: kind.as_deref().map(MemoryKind::parse),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        metadata: row.get(7)?,
        display_name: row.get(8)?,
        user_name: row.get(9)?,
        user_email: row.get(10)?,
        project_path: row.get(11)?,
        project_name: row.get(12)?,
        git_repo_url: row.get(13)?,
        is_pinned: row.get::<_, i64>(14)? != 0,
        vector: vector::from_blob(&vector_blob),
        tags_vector: tags_vector_blob.as_deref().map(vector::from_blob),
    })
}
