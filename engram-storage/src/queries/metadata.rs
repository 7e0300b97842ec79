//! Shard metadata key/value access.

use rusqlite::{params, Connection, OptionalExtension};

use engram_core::errors::StoreError;

use crate::schema::{META_EMBEDDING_DIMENSIONS, META_EMBEDDING_MODEL};
use crate::to_store_err;

pub fn get(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    conn.query_row(
        "SELECT value FROM shard_metadata WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .map_err(to_store_err)
}

pub fn set(conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO shard_metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )
    .map_err(to_store_err)?;
    Ok(())
}

/// The embedding width this shard was created with.
pub fn embedding_dimensions(conn: &Connection) -> Result<Option<usize>, StoreError> {
    Ok(get(conn, META_EMBEDDING_DIMENSIONS)?.and_then(|v| v.parse().ok()))
}

/// The embedding model this shard was created with.
pub fn embedding_model(conn: &Connection) -> Result<Option<String>, StoreError> {
    get(conn, META_EMBEDDING_MODEL)
}

/// Stamp a fresh shard with the current embedding settings.
pub fn init_embedding_info(
    conn: &Connection,
    dimensions: usize,
    model: &str,
) -> Result<(), StoreError> {
    set(conn, META_EMBEDDING_DIMENSIONS, &dimensions.to_string())?;
    set(conn, META_EMBEDDING_MODEL, model)
}
