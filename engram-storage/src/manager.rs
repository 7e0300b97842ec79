//! Connection manager: one cached handle bundle per database file.
//!
//! Every database file gets a single write connection plus a small pool
//! of read-only connections, shared process-wide through a map keyed by
//! canonical path. First open applies pragmas and the idempotent DDL for
//! the file's schema kind. Writes serialize on the write connection;
//! cross-process writers serialize on the WAL file lock.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::debug;

use engram_core::errors::StoreError;

use crate::schema;
use crate::to_store_err;

/// Number of read-only connections per database file.
const READ_POOL_SIZE: usize = 2;

/// Which idempotent DDL a file receives on first open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Shard,
    Registry,
    Prompts,
    Profiles,
    Sessions,
}

impl SchemaKind {
    fn ddl(self) -> &'static str {
        match self {
            SchemaKind::Shard => schema::SHARD_SCHEMA,
            SchemaKind::Registry => schema::REGISTRY_SCHEMA,
            SchemaKind::Prompts => schema::PROMPTS_SCHEMA,
            SchemaKind::Profiles => schema::PROFILES_SCHEMA,
            SchemaKind::Sessions => schema::SESSIONS_SCHEMA,
        }
    }
}

/// Pragmas for the write connection. WAL is set here, before any
/// reader opens.
fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA foreign_keys = ON;
        ",
    )
    .map_err(to_store_err)
}

/// Pragmas for read-only connections; journal mode is already WAL and
/// cannot be (re)set without write access.
fn apply_read_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA foreign_keys = ON;
        ",
    )
    .map_err(to_store_err)
}

/// A single database file's handles: one writer, a few readers.
pub struct Database {
    path: PathBuf,
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl Database {
    fn open(path: &Path, kind: SchemaKind) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(path).map_err(to_store_err)?;
        apply_pragmas(&writer)?;
        writer.execute_batch(kind.ddl()).map_err(to_store_err)?;

        let mut readers = Vec::with_capacity(READ_POOL_SIZE);
        for _ in 0..READ_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(to_store_err)?;
            apply_read_pragmas(&conn)?;
            readers.push(Mutex::new(conn));
        }

        debug!(path = %path.display(), ?kind, "database opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a read-only closure on the next pool connection (round-robin).
    pub fn with_read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let idx = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx].lock();
        f(&conn)
    }

    /// Run a closure on the write connection.
    pub fn with_write<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.writer.lock();
        f(&conn)
    }

    /// Truncate-checkpoint the WAL.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        self.with_write(|conn| {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")
                .map_err(to_store_err)
        })
    }

    /// `PRAGMA integrity_check` on the write connection.
    pub fn integrity_check(&self) -> Result<bool, StoreError> {
        self.with_write(|conn| {
            let result: String = conn
                .query_row("PRAGMA integrity_check", [], |row| row.get(0))
                .map_err(to_store_err)?;
            Ok(result == "ok")
        })
    }
}

/// Process-wide registry of open database handles.
#[derive(Default)]
pub struct ConnectionManager {
    handles: DashMap<PathBuf, Arc<Database>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or open and cache) the handle bundle for `path`.
    ///
    /// A failed open leaves the cache untouched so a later call can
    /// retry.
    pub fn get(&self, path: &Path, kind: SchemaKind) -> Result<Arc<Database>, StoreError> {
        let key = canonical_key(path);
        if let Some(existing) = self.handles.get(&key) {
            return Ok(existing.clone());
        }
        let db = Arc::new(Database::open(path, kind)?);
        // Another task may have raced the open; keep whichever landed first.
        let entry = self.handles.entry(key).or_insert(db);
        Ok(entry.clone())
    }

    /// Drop the cached handle for `path`, if any. In-flight users keep
    /// their `Arc` until the last one drops.
    pub fn evict(&self, path: &Path) {
        self.handles.remove(&canonical_key(path));
    }

    /// Checkpoint every open database's WAL.
    pub fn checkpoint_all(&self) -> Result<(), StoreError> {
        for entry in self.handles.iter() {
            entry.value().checkpoint()?;
        }
        Ok(())
    }

    /// Drop every cached handle.
    pub fn close_all(&self) {
        self.handles.clear();
    }

    /// Number of open database files.
    pub fn open_count(&self) -> usize {
        self.handles.len()
    }
}

/// Canonicalize where possible; files that do not exist yet fall back to
/// the cleaned absolute path so pre- and post-creation lookups agree.
fn canonical_key(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_caches_handles() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConnectionManager::new();
        let path = dir.path().join("a.db");

        let first = manager.get(&path, SchemaKind::Registry).unwrap();
        let second = manager.get(&path, SchemaKind::Registry).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.open_count(), 1);
    }

    #[test]
    fn failed_open_does_not_poison_cache() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConnectionManager::new();
        // A directory path cannot be opened as a database file.
        let bad = dir.path().to_path_buf();
        assert!(manager.get(&bad, SchemaKind::Registry).is_err());
        assert_eq!(manager.open_count(), 0);

        let good = dir.path().join("ok.db");
        assert!(manager.get(&good, SchemaKind::Registry).is_ok());
    }

    #[test]
    fn wal_mode_is_active() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConnectionManager::new();
        let db = manager
            .get(&dir.path().join("wal.db"), SchemaKind::Shard)
            .unwrap();
        db.with_write(|conn| {
            let mode: String = conn
                .pragma_query_value(None, "journal_mode", |row| row.get(0))
                .map_err(to_store_err)?;
            assert!(mode.eq_ignore_ascii_case("wal"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn checkpoint_and_close_all() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConnectionManager::new();
        manager
            .get(&dir.path().join("one.db"), SchemaKind::Prompts)
            .unwrap();
        manager
            .get(&dir.path().join("two.db"), SchemaKind::Sessions)
            .unwrap();
        manager.checkpoint_all().unwrap();
        manager.close_all();
        assert_eq!(manager.open_count(), 0);
    }

    #[test]
    fn reads_see_writes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConnectionManager::new();
        let db = manager
            .get(&dir.path().join("rw.db"), SchemaKind::Profiles)
            .unwrap();

        db.with_write(|conn| {
            conn.execute(
                "INSERT INTO user_profiles (key, value, updated_at) VALUES ('k', 'v', 1)",
                [],
            )
            .map_err(to_store_err)?;
            Ok(())
        })
        .unwrap();

        let value: String = db
            .with_read(|conn| {
                conn.query_row(
                    "SELECT value FROM user_profiles WHERE key = 'k'",
                    [],
                    |row| row.get(0),
                )
                .map_err(to_store_err)
            })
            .unwrap();
        assert_eq!(value, "v");
    }
}
