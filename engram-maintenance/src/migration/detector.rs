//! Embedding model/dimension mismatch detection.
//!
//! Compares each shard's stored `embedding_dimensions` and
//! `embedding_model` against the current configuration.

use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use engram_core::config::EngramConfig;
use engram_core::errors::EngramResult;

use engram_storage::ShardManager;

/// One shard whose stored embedding settings differ from config.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MismatchedShard {
    pub shard_id: i64,
    pub db_path: PathBuf,
    pub stored_dimensions: Option<usize>,
    pub stored_model: Option<String>,
    pub vector_count: u64,
}

/// Result of mismatch detection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationPlan {
    pub needs_migration: bool,
    pub current_dimensions: usize,
    pub current_model: String,
    pub mismatched: Vec<MismatchedShard>,
}

/// Scan every shard's metadata for a mismatch with the current config.
///
/// A shard with unreadable metadata counts as mismatched: its vectors
/// cannot be trusted to have the configured width.
pub fn detect(config: &EngramConfig, shards: &ShardManager) -> EngramResult<MigrationPlan> {
    let mut mismatched = Vec::new();

    for shard in shards.all_shards()? {
        let (stored_dimensions, stored_model) = shards.shard_embedding_info(&shard)?;
        let dims_match = stored_dimensions == Some(config.embedding_dimensions);
        let model_match = stored_model.as_deref() == Some(config.embedding_model.as_str());
        if !dims_match || !model_match {
            mismatched.push(MismatchedShard {
                shard_id: shard.id,
                db_path: shard.db_path.clone(),
                stored_dimensions,
                stored_model,
                vector_count: shard.vector_count,
            });
        }
    }

    if !mismatched.is_empty() {
        info!(
            shards = mismatched.len(),
            current_dims = config.embedding_dimensions,
            current_model = %config.embedding_model,
            "embedding mismatch detected, migration required"
        );
    }

    Ok(MigrationPlan {
        needs_migration: !mismatched.is_empty(),
        current_dimensions: config.embedding_dimensions,
        current_model: config.embedding_model.clone(),
        mismatched,
    })
}
