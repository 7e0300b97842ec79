//! Auxiliary databases under the same storage root.
//!
//! These live outside the search engine: prompt history (interleaved
//! into timeline listings), the user profile key/value table, and AI
//! session summaries. Each is a single idempotent table opened through
//! the connection manager.

use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use engram_core::errors::StoreError;

use crate::manager::{ConnectionManager, Database, SchemaKind};
use crate::to_store_err;

/// One recorded user prompt, optionally linked to a memory.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRow {
    pub id: String,
    pub memory_id: Option<String>,
    pub content: String,
    pub created_at: i64,
}

/// Prompt history (`user-prompts.db`).
pub struct PromptStore {
    db: Arc<Database>,
}

impl PromptStore {
    pub fn open(
        connections: &ConnectionManager,
        storage_path: &Path,
    ) -> Result<Self, StoreError> {
        let db = connections.get(&storage_path.join("user-prompts.db"), SchemaKind::Prompts)?;
        Ok(Self { db })
    }

    /// Record a prompt, returning its id.
    pub fn record(
        &self,
        memory_id: Option<&str>,
        content: &str,
        created_at: i64,
    ) -> Result<String, StoreError> {
        let id = format!("prm_{}", Uuid::new_v4().simple());
        self.db.with_write(|conn| {
            conn.execute(
                "INSERT INTO user_prompts (id, memory_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, memory_id, content, created_at],
            )
            .map_err(to_store_err)?;
            Ok(())
        })?;
        Ok(id)
    }

    /// Prompts linked to any of the given memory ids.
    pub fn for_memories(&self, memory_ids: &[String]) -> Result<Vec<PromptRow>, StoreError> {
        let mut rows = Vec::new();
        self.db.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, memory_id, content, created_at
                     FROM user_prompts WHERE memory_id = ?1",
                )
                .map_err(to_store_err)?;
            for memory_id in memory_ids {
                let found = stmt
                    .query_map(params![memory_id], row_to_prompt)
                    .map_err(to_store_err)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(to_store_err)?;
                rows.extend(found);
            }
            Ok(())
        })?;
        Ok(rows)
    }

    /// Drop the prompt linked to a memory, if any. Returns the count.
    pub fn delete_for_memory(&self, memory_id: &str) -> Result<usize, StoreError> {
        self.db.with_write(|conn| {
            conn.execute(
                "DELETE FROM user_prompts WHERE memory_id = ?1",
                params![memory_id],
            )
            .map_err(to_store_err)
        })
    }
}

fn row_to_prompt(row: &rusqlite::Row<'_>) -> rusqlite::Result<PromptRow> {
    Ok(PromptRow {
        id: row.get(0)?,
        memory_id: row.get(1)?,
        content: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// User profile key/value store (`user-profiles.db`).
pub struct ProfileStore {
    db: Arc<Database>,
}

impl ProfileStore {
    pub fn open(
        connections: &ConnectionManager,
        storage_path: &Path,
    ) -> Result<Self, StoreError> {
        let db = connections.get(&storage_path.join("user-profiles.db"), SchemaKind::Profiles)?;
        Ok(Self { db })
    }

    pub fn set(&self, key: &str, value: &str, updated_at: i64) -> Result<(), StoreError> {
        self.db.with_write(|conn| {
            conn.execute(
                "INSERT INTO user_profiles (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, updated_at],
            )
            .map_err(to_store_err)?;
            Ok(())
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.db.with_read(|conn: &Connection| {
            conn.query_row(
                "SELECT value FROM user_profiles WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(to_store_err)
        })
    }

    /// Most recently updated profile items, capped.
    pub fn list(&self, limit: usize) -> Result<Vec<(String, String)>, StoreError> {
        self.db.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT key, value FROM user_profiles
                     ORDER BY updated_at DESC LIMIT ?1",
                )
                .map_err(to_store_err)?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .map_err(to_store_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(to_store_err)
        })
    }
}

/// AI session summaries (`ai-sessions.db`).
pub struct SessionStore {
    db: Arc<Database>,
}

impl SessionStore {
    pub fn open(
        connections: &ConnectionManager,
        storage_path: &Path,
    ) -> Result<Self, StoreError> {
        let db = connections.get(&storage_path.join("ai-sessions.db"), SchemaKind::Sessions)?;
        Ok(Self { db })
    }

    pub fn record(&self, id: &str, summary: Option<&str>, started_at: i64) -> Result<(), StoreError> {
        self.db.with_write(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO ai_sessions (id, summary, started_at)
                 VALUES (?1, ?2, ?3)",
                params![id, summary, started_at],
            )
            .map_err(to_store_err)?;
            Ok(())
        })
    }
}
