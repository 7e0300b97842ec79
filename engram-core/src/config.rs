//! Runtime configuration.
//!
//! A single immutable snapshot is loaded at process start: hard-coded
//! defaults, overlaid by a JSON/JSONC file in the user config directory,
//! overlaid by environment variables for the API-key fields. Malformed
//! config falls back to defaults; invalid keyword regexes are dropped.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants;
use crate::errors::ConfigError;

/// Environment override for the remote embedding API URL.
pub const ENV_EMBEDDING_API_URL: &str = "ENGRAM_EMBEDDING_API_URL";
/// Environment override for the remote embedding API key.
pub const ENV_EMBEDDING_API_KEY: &str = "ENGRAM_EMBEDDING_API_KEY";

/// Resolved, immutable runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngramConfig {
    /// Root directory for all databases and the model cache.
    pub storage_path: PathBuf,
    /// Selected embedding model.
    pub embedding_model: String,
    /// Output width of the embedding model.
    pub embedding_dimensions: usize,
    /// Remote embedding endpoint; both URL and key must be present to
    /// route through the API instead of the local model.
    pub embedding_api_url: Option<String>,
    pub embedding_api_key: Option<String>,
    /// Floor for inclusion in hybrid search, 0..1.
    pub similarity_threshold: f32,
    /// Query-time cap on returned memories.
    pub max_memories: usize,
    /// Injection cap for project-scope memories.
    pub max_project_memories: usize,
    /// Injection cap for profile items.
    pub max_profile_items: usize,
    /// Shard seal threshold.
    pub max_vectors_per_shard: u64,
    /// First segment of every container tag.
    pub container_tag_prefix: String,
    /// Regex alternations consumed by the host's nudge detector.
    pub keyword_patterns: Vec<String>,
    /// Retention window for unpinned memories, in days.
    pub retention_days: u32,
    /// Per-scope cap enforced by cleanup.
    pub max_memories_per_scope: usize,
    /// Cosine similarity at which two memories count as near-duplicates.
    pub near_dup_threshold: f32,
    /// Whether deduplication deletes near-duplicate groups or only
    /// reports them.
    pub auto_merge_duplicates: bool,
    /// Rows re-embedded per migration batch.
    pub migration_batch_size: usize,
}

impl Default for EngramConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            storage_path: home.join(".opencode-mem").join("data"),
            embedding_model: constants::DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: constants::DEFAULT_EMBEDDING_DIMENSIONS,
            embedding_api_url: None,
            embedding_api_key: None,
            similarity_threshold: constants::DEFAULT_SIMILARITY_THRESHOLD,
            max_memories: 10,
            max_project_memories: 10,
            max_profile_items: 10,
            max_vectors_per_shard: constants::DEFAULT_MAX_VECTORS_PER_SHARD,
            container_tag_prefix: constants::DEFAULT_CONTAINER_TAG_PREFIX.to_string(),
            keyword_patterns: Vec::new(),
            retention_days: constants::DEFAULT_RETENTION_DAYS,
            max_memories_per_scope: constants::DEFAULT_MAX_MEMORIES_PER_SCOPE,
            near_dup_threshold: constants::DEFAULT_NEAR_DUP_THRESHOLD,
            auto_merge_duplicates: false,
            migration_batch_size: constants::DEFAULT_MIGRATION_BATCH_SIZE,
        }
    }
}

impl EngramConfig {
    /// Load the layered config: defaults ← user config file ← env.
    ///
    /// Never fails: a missing or malformed file yields defaults.
    pub fn load() -> Self {
        let mut config = match Self::config_file_path() {
            Some(path) if path.exists() => match Self::load_from_path(&path) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "config file ignored, using defaults");
                    Self::default()
                }
            },
            _ => Self::default(),
        };
        config.apply_env_overrides();
        config
    }

    /// Parse a specific config file, JSONC comments allowed.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let stripped = strip_jsonc_comments(&raw);
        serde_json::from_str(&stripped).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// The well-known config file location.
    pub fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("engram").join("config.json"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_EMBEDDING_API_URL) {
            if !url.is_empty() {
                self.embedding_api_url = Some(url);
            }
        }
        if let Ok(key) = std::env::var(ENV_EMBEDDING_API_KEY) {
            if !key.is_empty() {
                self.embedding_api_key = Some(key);
            }
        }
    }

    /// Whether embedding routes through the remote API.
    pub fn uses_remote_embedding(&self) -> bool {
        self.embedding_api_url.is_some() && self.embedding_api_key.is_some()
    }

    /// Compile `keyword_patterns`, silently dropping invalid regexes.
    pub fn compiled_keyword_patterns(&self) -> Vec<Regex> {
        self.keyword_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "invalid keyword pattern dropped");
                    None
                }
            })
            .collect()
    }

    /// Directory holding the per-shard database files.
    pub fn shards_dir(&self) -> PathBuf {
        self.storage_path.join("shards")
    }

    /// Path of the shard registry database.
    pub fn registry_db_path(&self) -> PathBuf {
        self.storage_path.join("registry.db")
    }

    /// Embedding-model cache directory.
    pub fn model_cache_dir(&self) -> PathBuf {
        self.storage_path.join(".cache")
    }

    /// Path of the cross-process web lock file, in the parent of the
    /// storage root so every process sharing the tree agrees on it.
    pub fn web_lock_path(&self) -> PathBuf {
        self.storage_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.storage_path.clone())
            .join("webserver.lock")
    }
}

/// Strip `//` line comments and `/* */` block comments outside strings.
fn strip_jsonc_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}
