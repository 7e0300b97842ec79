//! Shard registry and routing.
//!
//! One registry row per shard file. For a given `(scope, hash)` exactly
//! one shard is the write target at a time; a shard seals once its
//! vector count reaches the configured maximum and a successor is
//! allocated on the next write.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::{params, Connection};
use tracing::info;

use engram_core::config::EngramConfig;
use engram_core::errors::{EngramError, EngramResult, ShardError, StoreError};
use engram_core::memory::Scope;

use crate::manager::{ConnectionManager, Database, SchemaKind};
use crate::queries::metadata;
use crate::store::ShardStore;
use crate::to_store_err;

/// One registry row.
#[derive(Debug, Clone)]
pub struct ShardRecord {
    pub id: i64,
    pub scope: Scope,
    pub hash: String,
    pub db_path: PathBuf,
    pub vector_count: u64,
    pub created_at: i64,
}

impl ShardRecord {
    /// Whether this shard still accepts writes under the given seal
    /// threshold.
    pub fn is_writable(&self, max_vectors: u64) -> bool {
        self.vector_count < max_vectors
    }
}

/// Registry of shards plus routing and lifecycle.
pub struct ShardManager {
    config: Arc<EngramConfig>,
    connections: Arc<ConnectionManager>,
    registry: Arc<Database>,
}

impl ShardManager {
    /// Open (or create) the registry database and the shards directory.
    pub fn open(
        config: Arc<EngramConfig>,
        connections: Arc<ConnectionManager>,
    ) -> EngramResult<Self> {
        std::fs::create_dir_all(config.shards_dir())?;
        let registry = connections.get(&config.registry_db_path(), SchemaKind::Registry)?;
        Ok(Self {
            config,
            connections,
            registry,
        })
    }

    /// The youngest non-sealed shard for `(scope, hash)`, allocating a
    /// fresh one when none exists or all are sealed.
    pub fn get_write_shard(&self, scope: Scope, hash: &str) -> EngramResult<ShardRecord> {
        self.get_write_shard_excluding(scope, hash, &[])
    }

    /// `get_write_shard` skipping specific shard ids. The migration
    /// engine excludes mismatched shards so re-embedded rows always land
    /// in a current-dimension shard.
    pub fn get_write_shard_excluding(
        &self,
        scope: Scope,
        hash: &str,
        exclude_ids: &[i64],
    ) -> EngramResult<ShardRecord> {
        let max_vectors = self.config.max_vectors_per_shard;
        let candidates = self.registry.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, scope, hash, db_path, vector_count, created_at
                     FROM shards
                     WHERE scope = ?1 AND hash = ?2 AND vector_count < ?3
                     ORDER BY created_at DESC, id DESC",
                )
                .map_err(to_store_err)?;
            let rows = stmt
                .query_map(params![scope.as_str(), hash, max_vectors as i64], row_to_shard)
                .map_err(to_store_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(to_store_err)
        })?;

        match candidates
            .into_iter()
            .find(|shard| !exclude_ids.contains(&shard.id))
        {
            Some(shard) => Ok(shard),
            None => self.allocate_shard(scope, hash),
        }
    }

    fn allocate_shard(&self, scope: Scope, hash: &str) -> EngramResult<ShardRecord> {
        let created_at = engram_core::now_millis();
        let shards_dir = self.config.shards_dir();

        let record = self.registry.with_write(|conn| {
            let tx = conn.unchecked_transaction().map_err(to_store_err)?;
            tx.execute(
                "INSERT INTO shards (scope, hash, db_path, vector_count, created_at)
                 VALUES (?1, ?2, '', 0, ?3)",
                params![scope.as_str(), hash, created_at],
            )
            .map_err(to_store_err)?;
            let id = tx.last_insert_rowid();
            let db_path = shards_dir.join(format!("{}_{}_{}.db", scope.as_str(), hash, id));
            tx.execute(
                "UPDATE shards SET db_path = ?2 WHERE id = ?1",
                params![id, db_path.to_string_lossy()],
            )
            .map_err(to_store_err)?;
            tx.commit().map_err(to_store_err)?;
            Ok(ShardRecord {
                id,
                scope,
                hash: hash.to_string(),
                db_path,
                vector_count: 0,
                created_at,
            })
        })?;

        // Initialize the shard database with schema and embedding info.
        self.shard_store(&record)?;
        info!(
            shard_id = record.id,
            path = %record.db_path.display(),
            scope = %scope,
            hash,
            "shard allocated"
        );
        Ok(record)
    }

    /// All shards for a scope; an empty hash matches the whole scope.
    pub fn get_all_shards(&self, scope: Scope, hash: &str) -> EngramResult<Vec<ShardRecord>> {
        Ok(self.registry.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, scope, hash, db_path, vector_count, created_at
                     FROM shards
                     WHERE scope = ?1 AND (?2 = '' OR hash = ?2)
                     ORDER BY created_at DESC, id DESC",
                )
                .map_err(to_store_err)?;
            let rows = stmt
                .query_map(params![scope.as_str(), hash], row_to_shard)
                .map_err(to_store_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(to_store_err)
        })?)
    }

    /// Every shard in the registry, both scopes.
    pub fn all_shards(&self) -> EngramResult<Vec<ShardRecord>> {
        Ok(self.registry.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, scope, hash, db_path, vector_count, created_at
                     FROM shards
                     ORDER BY created_at DESC, id DESC",
                )
                .map_err(to_store_err)?;
            let rows = stmt.query_map([], row_to_shard).map_err(to_store_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(to_store_err)
        })?)
    }

    /// Look up one shard by id.
    pub fn get_shard(&self, id: i64) -> EngramResult<ShardRecord> {
        let found = self.registry.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, scope, hash, db_path, vector_count, created_at
                     FROM shards WHERE id = ?1",
                )
                .map_err(to_store_err)?;
            stmt.query_row(params![id], row_to_shard)
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(to_store_err(other)),
                })
        })?;
        found.ok_or_else(|| EngramError::Shard(ShardError::Missing { id }))
    }

    /// Atomic vector-count bump after a successful insert.
    pub fn increment_vector_count(&self, id: i64) -> EngramResult<()> {
        Ok(self.registry.with_write(|conn| {
            conn.execute(
                "UPDATE shards SET vector_count = vector_count + 1 WHERE id = ?1",
                params![id],
            )
            .map_err(to_store_err)?;
            Ok(())
        })?)
    }

    /// Atomic vector-count drop after a delete. Never goes below zero.
    pub fn decrement_vector_count(&self, id: i64) -> EngramResult<()> {
        Ok(self.registry.with_write(|conn| {
            conn.execute(
                "UPDATE shards SET vector_count = MAX(vector_count - 1, 0) WHERE id = ?1",
                params![id],
            )
            .map_err(to_store_err)?;
            Ok(())
        })?)
    }

    /// Rewrite a shard's vector count outright (maintenance passes that
    /// delete in bulk re-count instead of decrementing per row).
    pub fn set_vector_count(&self, id: i64, count: u64) -> EngramResult<()> {
        Ok(self.registry.with_write(|conn| {
            conn.execute(
                "UPDATE shards SET vector_count = ?2 WHERE id = ?1",
                params![id, count as i64],
            )
            .map_err(to_store_err)?;
            Ok(())
        })?)
    }

    /// Remove a shard: registry row, cached handle, and database files.
    pub fn delete_shard(&self, id: i64) -> EngramResult<()> {
        let shard = self.get_shard(id)?;
        self.registry.with_write(|conn| {
            conn.execute("DELETE FROM shards WHERE id = ?1", params![id])
                .map_err(to_store_err)?;
            Ok(())
        })?;
        self.connections.evict(&shard.db_path);
        remove_db_files(&shard.db_path);
        info!(shard_id = id, path = %shard.db_path.display(), "shard deleted");
        Ok(())
    }

    /// Open the store for a shard via the connection manager.
    pub fn shard_store(&self, shard: &ShardRecord) -> EngramResult<ShardStore> {
        let db = self.connections.get(&shard.db_path, SchemaKind::Shard)?;
        Ok(ShardStore::open(
            db,
            self.config.embedding_dimensions,
            &self.config.embedding_model,
        )?)
    }

    /// Stored embedding info for a shard, read from its metadata table.
    pub fn shard_embedding_info(
        &self,
        shard: &ShardRecord,
    ) -> EngramResult<(Option<usize>, Option<String>)> {
        let db = self.connections.get(&shard.db_path, SchemaKind::Shard)?;
        Ok(db.with_read(|conn: &Connection| {
            Ok((
                metadata::embedding_dimensions(conn)?,
                metadata::embedding_model(conn)?,
            ))
        })?)
    }
}

/// Best-effort removal of the database file and its WAL siblings.
fn remove_db_files(path: &std::path::Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut target = path.as_os_str().to_os_string();
        target.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(target));
    }
}

fn row_to_shard(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShardRecord> {
    let scope_str: String = row.get(1)?;
    let path_str: String = row.get(3)?;
    Ok(ShardRecord {
        id: row.get(0)?,
        scope: Scope::parse(&scope_str).unwrap_or(Scope::User),
        hash: row.get(2)?,
        db_path: PathBuf::from(path_str),
        vector_count: row.get::<_, i64>(4)? as u64,
        created_at: row.get(5)?,
    })
}
