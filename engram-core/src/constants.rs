/// Engram system version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model identifier.
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Default embedding output width.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// Default shard seal threshold.
pub const DEFAULT_MAX_VECTORS_PER_SHARD: u64 = 10_000;

/// Default floor for inclusion in hybrid search results.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.3;

/// Default cosine similarity at which two memories count as near-duplicates.
pub const DEFAULT_NEAR_DUP_THRESHOLD: f32 = 0.95;

/// Default retention window for unpinned memories, in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 365;

/// Default per-scope cap enforced by cleanup.
pub const DEFAULT_MAX_MEMORIES_PER_SCOPE: usize = 1_000;

/// Default number of rows re-embedded per migration batch.
pub const DEFAULT_MIGRATION_BATCH_SIZE: usize = 100;

/// First segment of every container tag unless configured otherwise.
pub const DEFAULT_CONTAINER_TAG_PREFIX: &str = "opencode";

/// Per-embedding-call timeout.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Overall budget for one admin API request.
pub const API_REQUEST_TIMEOUT_SECS: u64 = 60;
