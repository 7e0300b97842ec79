//! Per-shard store: binds one database handle to the query modules and
//! enforces the shard's embedding width on writes.

use std::sync::Arc;

use engram_core::errors::StoreError;
use engram_core::memory::{MemoryKind, MemoryRecord, TagInfo};

use crate::manager::Database;
use crate::queries::{cleanup, memory_crud, memory_search, metadata, vector_search};

/// Handle to one shard's tables.
#[derive(Clone)]
pub struct ShardStore {
    db: Arc<Database>,
    /// Embedding width recorded in this shard's metadata.
    dimensions: usize,
}

impl ShardStore {
    /// Wrap an open shard database. Reads the stored embedding width,
    /// stamping `dimensions`/`model` first if this is a fresh shard.
    pub fn open(db: Arc<Database>, dimensions: usize, model: &str) -> Result<Self, StoreError> {
        let stored = db.with_write(|conn| {
            if let Some(dims) = metadata::embedding_dimensions(conn)? {
                return Ok(dims);
            }
            metadata::init_embedding_info(conn, dimensions, model)?;
            Ok(dimensions)
        })?;
        Ok(Self {
            db,
            dimensions: stored,
        })
    }

    /// The shard's embedding width.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Atomic insert of row + embeddings (+ FTS via trigger).
    pub fn insert(&self, record: &MemoryRecord) -> Result<(), StoreError> {
        let dims = self.dimensions;
        self.db
            .with_write(|conn| memory_crud::insert_memory(conn, record, dims))
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<MemoryRecord>, StoreError> {
        self.db.with_read(|conn| memory_crud::get_memory(conn, id))
    }

    pub fn list(&self, container_tag: &str, limit: usize) -> Result<Vec<MemoryRecord>, StoreError> {
        self.db
            .with_read(|conn| memory_crud::list_by_tag(conn, container_tag, limit))
    }

    pub fn list_all(&self) -> Result<Vec<MemoryRecord>, StoreError> {
        self.db.with_read(memory_crud::list_all)
    }

    /// Stable-ordered page for batch streaming; re-queries each call.
    pub fn list_page(
        &self,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        self.db
            .with_read(|conn| memory_crud::list_page(conn, after_id, limit))
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.db
            .with_write(|conn| memory_crud::delete_memory(conn, id))
    }

    pub fn pin(&self, id: &str) -> Result<(), StoreError> {
        self.db
            .with_write(|conn| memory_crud::set_pinned(conn, id, true))
    }

    pub fn unpin(&self, id: &str) -> Result<(), StoreError> {
        self.db
            .with_write(|conn| memory_crud::set_pinned(conn, id, false))
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        self.db.with_read(memory_crud::count)
    }

    pub fn distinct_tags(&self) -> Result<Vec<TagInfo>, StoreError> {
        self.db.with_read(memory_crud::distinct_tags)
    }

    pub fn count_by_scope(&self) -> Result<(u64, u64), StoreError> {
        self.db.with_read(memory_crud::count_by_scope)
    }

    pub fn count_by_kind(&self) -> Result<Vec<(MemoryKind, u64)>, StoreError> {
        self.db.with_read(memory_crud::count_by_kind)
    }

    /// k-NN over this shard, similarity in `[0, 1]`.
    pub fn vector_search(
        &self,
        query: &[f32],
        container_tag: Option<&str>,
        k: usize,
    ) -> Result<Vec<(MemoryRecord, f32)>, StoreError> {
        self.db
            .with_read(|conn| vector_search::vector_search(conn, query, container_tag, k))
    }

    /// Same-tag neighborhood of a stored memory, for near-dup detection.
    pub fn neighbors_of(
        &self,
        record: &MemoryRecord,
        min_similarity: f32,
    ) -> Result<Vec<(MemoryRecord, f32)>, StoreError> {
        self.db
            .with_read(|conn| vector_search::neighbors_of(conn, record, min_similarity))
    }

    /// BM25-ranked full-text search, score higher-is-better.
    pub fn fts_search(
        &self,
        query: &str,
        container_tag: Option<&str>,
        k: usize,
    ) -> Result<Vec<(MemoryRecord, f32)>, StoreError> {
        self.db
            .with_read(|conn| memory_search::fts_search(conn, query, container_tag, k))
    }

    /// Retention: drop unpinned rows older than the cutoff for one tag.
    pub fn delete_expired(&self, container_tag: &str, cutoff_millis: i64) -> Result<usize, StoreError> {
        self.db
            .with_write(|conn| cleanup::delete_expired(conn, container_tag, cutoff_millis))
    }

    /// Retention: one-transaction eviction pass over every tag in this
    /// shard. Returns the number of rows deleted.
    pub fn retention_pass(&self, cutoff_millis: i64, cap: usize) -> Result<usize, StoreError> {
        self.db
            .with_write(|conn| cleanup::retention_pass(conn, cutoff_millis, cap))
    }

    /// Retention: enforce the per-tag cap, oldest unpinned first.
    pub fn delete_over_cap(&self, container_tag: &str, cap: usize) -> Result<usize, StoreError> {
        self.db
            .with_write(|conn| cleanup::delete_over_cap(conn, container_tag, cap))
    }

    /// Run several deletions in one transaction (crash-safe maintenance).
    pub fn delete_many(&self, ids: &[String]) -> Result<usize, StoreError> {
        self.db.with_write(|conn| {
            let tx = conn.unchecked_transaction().map_err(crate::to_store_err)?;
            let mut deleted = 0;
            for id in ids {
                match memory_crud::delete_memory(&tx, id) {
                    Ok(()) => deleted += 1,
                    Err(StoreError::NotFound { .. }) => {}
                    Err(e) => {
                        let _ = tx.rollback();
                        return Err(e);
                    }
                }
            }
            tx.commit().map_err(crate::to_store_err)?;
            Ok(deleted)
        })
    }

    /// Stored embedding model identifier, if stamped.
    pub fn embedding_model(&self) -> Result<Option<String>, StoreError> {
        self.db.with_read(metadata::embedding_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{ConnectionManager, SchemaKind};
    use engram_core::vector::normalize_l2;
    use engram_core::now_millis;

    fn test_store(dir: &std::path::Path) -> ShardStore {
        let manager = ConnectionManager::new();
        let db = manager
            .get(&dir.join("shard.db"), SchemaKind::Shard)
            .unwrap();
        ShardStore::open(db, 4, "test-model").unwrap()
    }

    fn record(id: &str, content: &str, tag: &str, vector: Vec<f32>) -> MemoryRecord {
        let now = now_millis();
        MemoryRecord {
            id: id.to_string(),
            content: content.to_string(),
            container_tag: tag.to_string(),
            kind: Some(MemoryKind::Preference),
            tags: vec!["style".to_string()],
            vector: normalize_l2(vector),
            tags_vector: None,
            display_name: Some("Test Project".to_string()),
            user_name: None,
            user_email: None,
            project_path: None,
            project_name: Some("test".to_string()),
            git_repo_url: None,
            metadata: None,
            created_at: now,
            updated_at: now,
            is_pinned: false,
        }
    }

    #[test]
    fn insert_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        let rec = record("mem_1", "the apple", "opencode_project_abc", vec![1.0, 2.0, 3.0, 0.5]);

        store.insert(&rec).unwrap();
        let got = store.get_by_id("mem_1").unwrap().unwrap();
        assert_eq!(got.content, "the apple");
        assert_eq!(got.vector.len(), 4);
        let norm: f32 = got.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);

        store.delete("mem_1").unwrap();
        assert!(store.get_by_id("mem_1").unwrap().is_none());
        assert!(matches!(
            store.delete("mem_1"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        let rec = record("mem_dup", "a", "opencode_user_u", vec![1.0, 0.0, 0.0, 0.0]);
        store.insert(&rec).unwrap();
        assert!(matches!(
            store.insert(&rec),
            Err(StoreError::IdExists { .. })
        ));
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        let rec = record("mem_bad", "a", "opencode_user_u", vec![1.0, 0.0]);
        assert!(matches!(
            store.insert(&rec),
            Err(StoreError::DimensionMismatch { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn embeddings_and_row_stay_paired() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        for i in 0..5 {
            let rec = record(
                &format!("mem_{i}"),
                &format!("content {i}"),
                "opencode_user_u",
                vec![i as f32 + 1.0, 1.0, 0.0, 0.0],
            );
            store.insert(&rec).unwrap();
        }
        store.delete("mem_2").unwrap();

        store
            .database()
            .with_read(|conn| {
                let rows: i64 = conn
                    .query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))
                    .unwrap();
                let vecs: i64 = conn
                    .query_row("SELECT COUNT(*) FROM vec_memories", [], |r| r.get(0))
                    .unwrap();
                let orphans: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM vec_memories v
                         LEFT JOIN memories m ON m.id = v.memory_id
                         WHERE m.id IS NULL",
                        [],
                        |r| r.get(0),
                    )
                    .unwrap();
                assert_eq!(rows, 4);
                assert_eq!(vecs, 4);
                assert_eq!(orphans, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn fts_index_follows_row_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        let rec = record(
            "mem_fts",
            "use postgres in production",
            "opencode_project_p",
            vec![1.0, 0.0, 0.0, 0.0],
        );
        store.insert(&rec).unwrap();

        let hits = store.fts_search("postgres", None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, "mem_fts");

        store.delete("mem_fts").unwrap();
        assert!(store.fts_search("postgres", None, 10).unwrap().is_empty());
    }

    #[test]
    fn vector_search_ranks_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        store
            .insert(&record("mem_a", "a", "opencode_user_u", vec![1.0, 0.0, 0.0, 0.0]))
            .unwrap();
        store
            .insert(&record("mem_b", "b", "opencode_user_u", vec![1.0, 1.0, 0.0, 0.0]))
            .unwrap();
        store
            .insert(&record("mem_c", "c", "opencode_user_u", vec![0.0, 0.0, 1.0, 0.0]))
            .unwrap();

        let query = normalize_l2(vec![1.0, 0.0, 0.0, 0.0]);
        let hits = store.vector_search(&query, Some("opencode_user_u"), 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id, "mem_a");
        assert!((hits[0].1 - 1.0).abs() < 1e-5);
        assert_eq!(hits[1].0.id, "mem_b");
        assert!(hits[1].1 > 0.5 && hits[1].1 < 1.0);
    }

    #[test]
    fn vector_search_respects_tag_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        store
            .insert(&record("mem_u", "u", "opencode_user_u", vec![1.0, 0.0, 0.0, 0.0]))
            .unwrap();
        store
            .insert(&record("mem_p", "p", "opencode_project_p", vec![1.0, 0.0, 0.0, 0.0]))
            .unwrap();

        let query = normalize_l2(vec![1.0, 0.0, 0.0, 0.0]);
        let hits = store
            .vector_search(&query, Some("opencode_project_p"), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, "mem_p");
    }

    #[test]
    fn pin_unpin_and_cleanup_interaction() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        let mut old = record("mem_old", "old", "opencode_user_u", vec![1.0, 0.0, 0.0, 0.0]);
        old.created_at = 1_000;
        let mut pinned = record("mem_pin", "pinned", "opencode_user_u", vec![0.0, 1.0, 0.0, 0.0]);
        pinned.created_at = 1_000;
        store.insert(&old).unwrap();
        store.insert(&pinned).unwrap();
        store.pin("mem_pin").unwrap();

        let deleted = store.delete_expired("opencode_user_u", 2_000).unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_by_id("mem_old").unwrap().is_none());
        assert!(store.get_by_id("mem_pin").unwrap().unwrap().is_pinned);
    }

    #[test]
    fn over_cap_evicts_oldest_unpinned() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        for i in 0..5 {
            let mut rec = record(
                &format!("mem_{i}"),
                &format!("content {i}"),
                "opencode_user_u",
                vec![1.0, i as f32, 0.0, 0.0],
            );
            rec.created_at = i;
            store.insert(&rec).unwrap();
        }
        store.pin("mem_0").unwrap();

        let deleted = store.delete_over_cap("opencode_user_u", 3).unwrap();
        assert_eq!(deleted, 2);
        // Oldest unpinned (mem_1, mem_2) evicted; pinned mem_0 survives.
        assert!(store.get_by_id("mem_0").unwrap().is_some());
        assert!(store.get_by_id("mem_1").unwrap().is_none());
        assert!(store.get_by_id("mem_2").unwrap().is_none());
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn distinct_tags_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        for (id, tag) in [
            ("mem_1", "opencode_user_u"),
            ("mem_2", "opencode_user_u"),
            ("mem_3", "opencode_project_p"),
        ] {
            store
                .insert(&record(id, "x", tag, vec![1.0, 0.0, 0.0, 0.0]))
                .unwrap();
        }
        let tags = store.distinct_tags().unwrap();
        assert_eq!(tags.len(), 2);
        let user_tag = tags
            .iter()
            .find(|t| t.container_tag == "opencode_user_u")
            .unwrap();
        assert_eq!(user_tag.count, 2);
    }
}
