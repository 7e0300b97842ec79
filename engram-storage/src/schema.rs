//! Idempotent DDL for every database kind.

/// Per-shard schema: the memory rows, both embedding tables, the FTS5
/// index with its sync triggers, and the shard metadata table.
pub const SHARD_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY NOT NULL,
    content TEXT NOT NULL,
    container_tag TEXT NOT NULL,
    type TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    metadata TEXT,
    display_name TEXT,
    user_name TEXT,
    user_email TEXT,
    project_path TEXT,
    project_name TEXT,
    git_repo_url TEXT,
    is_pinned INTEGER NOT NULL DEFAULT 0,
    vector BLOB NOT NULL,
    tags_vector BLOB
);

CREATE INDEX IF NOT EXISTS idx_memories_tag_created
ON memories(container_tag, created_at DESC);

CREATE TABLE IF NOT EXISTS vec_memories (
    memory_id TEXT PRIMARY KEY NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS vec_tags (
    memory_id TEXT PRIMARY KEY NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    content,
    content='memories',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS memories_fts_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, content) VALUES (new.rowid, new.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_fts_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content)
    VALUES ('delete', old.rowid, old.content);
END;

CREATE TRIGGER IF NOT EXISTS memories_fts_au AFTER UPDATE OF content ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content)
    VALUES ('delete', old.rowid, old.content);
    INSERT INTO memories_fts(rowid, content) VALUES (new.rowid, new.content);
END;

CREATE TABLE IF NOT EXISTS shard_metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;

/// Shard registry schema, one row per shard file.
pub const REGISTRY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS shards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scope TEXT NOT NULL,
    hash TEXT NOT NULL,
    db_path TEXT NOT NULL,
    vector_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_shards_scope_hash
ON shards(scope, hash, created_at DESC);
"#;

/// Auxiliary prompt-history schema (`user-prompts.db`).
pub const PROMPTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS user_prompts (
    id TEXT PRIMARY KEY NOT NULL,
    memory_id TEXT,
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_user_prompts_memory
ON user_prompts(memory_id);
"#;

/// Auxiliary profile schema (`user-profiles.db`).
pub const PROFILES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS user_profiles (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#;

/// Auxiliary session schema (`ai-sessions.db`).
pub const SESSIONS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ai_sessions (
    id TEXT PRIMARY KEY NOT NULL,
    summary TEXT,
    started_at INTEGER NOT NULL
);
"#;

/// Shard metadata key for the embedding width.
pub const META_EMBEDDING_DIMENSIONS: &str = "embedding_dimensions";

/// Shard metadata key for the embedding model identifier.
pub const META_EMBEDDING_MODEL: &str = "embedding_model";
