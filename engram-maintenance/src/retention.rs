//! Time- and count-based retention cleanup. Pinned memories survive
//! regardless of age.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use engram_core::config::EngramConfig;
use engram_core::errors::EngramResult;

use engram_storage::ShardManager;

/// Outcome of one cleanup run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub deleted: u64,
    pub user_count_after: u64,
    pub project_count_after: u64,
}

/// Periodic or on-demand eviction over every shard.
pub struct RetentionService {
    config: Arc<EngramConfig>,
    shards: Arc<ShardManager>,
}

impl RetentionService {
    pub fn new(config: Arc<EngramConfig>, shards: Arc<ShardManager>) -> Self {
        Self { config, shards }
    }

    /// Run the full pass. Per-shard failures are logged and skipped so
    /// one broken shard cannot block cleanup of the rest.
    pub fn run(&self) -> EngramResult<CleanupReport> {
        let retention_millis = i64::from(self.config.retention_days) * 24 * 60 * 60 * 1000;
        let cutoff = engram_core::now_millis() - retention_millis;
        let cap = self.config.max_memories_per_scope;

        let mut report = CleanupReport::default();
        for shard in self.shards.all_shards()? {
            let store = match self.shards.shard_store(&shard) {
                Ok(store) => store,
                Err(e) => {
                    warn!(shard_id = shard.id, error = %e, "shard unopenable, skipping cleanup");
                    continue;
                }
            };

            match store.retention_pass(cutoff, cap) {
                Ok(deleted) => report.deleted += deleted as u64,
                Err(e) => {
                    warn!(shard_id = shard.id, error = %e, "retention pass failed, skipping shard");
                    continue;
                }
            }

            // Bulk deletions re-count rather than decrement per row.
            match store.count() {
                Ok(count) => {
                    if let Err(e) = self.shards.set_vector_count(shard.id, count) {
                        warn!(shard_id = shard.id, error = %e, "vector count refresh failed");
                    }
                }
                Err(e) => warn!(shard_id = shard.id, error = %e, "post-cleanup count failed"),
            }

            match store.count_by_scope() {
                Ok((user, project)) => {
                    report.user_count_after += user;
                    report.project_count_after += project;
                }
                Err(e) => warn!(shard_id = shard.id, error = %e, "post-cleanup scope count failed"),
            }
        }

        info!(
            deleted = report.deleted,
            user_after = report.user_count_after,
            project_after = report.project_count_after,
            "cleanup complete"
        );
        Ok(report)
    }
}
