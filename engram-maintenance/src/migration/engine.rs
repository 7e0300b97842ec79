//! The migration engine.
//!
//! `fresh_start` deletes every mismatched shard. `re_embed` streams each
//! mismatched shard's rows in batches, re-embeds them with the current
//! model, routes them to a current-dimension write shard, and deletes
//! the drained shard. One migration runs per process at a time; per-row
//! failures are counted, never fatal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use engram_core::config::EngramConfig;
use engram_core::errors::{EngramResult, MigrationError, StoreError};
use engram_core::memory::MemoryRecord;
use engram_core::tag::ContainerTag;
use engram_embeddings::EmbeddingService;
use engram_storage::ShardManager;

use super::detector::{detect, MigrationPlan};

/// Process-wide "migration running" flag.
static MIGRATION_RUNNING: AtomicBool = AtomicBool::new(false);

/// How to resolve a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    /// Drop mismatched shards outright.
    FreshStart,
    /// Re-embed every row into fresh shards.
    ReEmbed,
}

/// Progress events emitted during a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum MigrationEvent {
    Preparing,
    Cleanup,
    ReEmbedding {
        processed: u64,
        total: u64,
        current_shard: i64,
    },
    Complete,
}

/// Final counts of a run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOutcome {
    pub deleted_shards: u64,
    pub re_embedded_memories: u64,
    pub failed_rows: u64,
}

/// Clears the running flag when a run ends, however it ends.
struct RunningGuard;

impl Drop for RunningGuard {
    fn drop(&mut self) {
        MIGRATION_RUNNING.store(false, Ordering::SeqCst);
    }
}

pub struct MigrationEngine {
    config: Arc<EngramConfig>,
    shards: Arc<ShardManager>,
    embeddings: Arc<EmbeddingService>,
}

impl MigrationEngine {
    pub fn new(
        config: Arc<EngramConfig>,
        shards: Arc<ShardManager>,
        embeddings: Arc<EmbeddingService>,
    ) -> Self {
        Self {
            config,
            shards,
            embeddings,
        }
    }

    /// Detect mismatches without mutating anything.
    pub fn detect(&self) -> EngramResult<MigrationPlan> {
        detect(&self.config, &self.shards)
    }

    /// Run a migration. Fails with `AlreadyRunning` when another run is
    /// in flight in this process.
    pub async fn run(
        &self,
        strategy: MigrationStrategy,
        on_event: impl Fn(MigrationEvent),
    ) -> EngramResult<MigrationOutcome> {
        if MIGRATION_RUNNING
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MigrationError::AlreadyRunning.into());
        }
        let _guard = RunningGuard;

        on_event(MigrationEvent::Preparing);
        let plan = self.detect()?;
        if !plan.needs_migration {
            on_event(MigrationEvent::Complete);
            return Ok(MigrationOutcome::default());
        }

        let outcome = match strategy {
            MigrationStrategy::FreshStart => self.run_fresh_start(&plan, &on_event)?,
            MigrationStrategy::ReEmbed => self.run_re_embed(&plan, &on_event).await?,
        };

        on_event(MigrationEvent::Complete);
        info!(
            deleted_shards = outcome.deleted_shards,
            re_embedded = outcome.re_embedded_memories,
            failed_rows = outcome.failed_rows,
            ?strategy,
            "migration complete"
        );
        Ok(outcome)
    }

    fn run_fresh_start(
        &self,
        plan: &MigrationPlan,
        on_event: &impl Fn(MigrationEvent),
    ) -> EngramResult<MigrationOutcome> {
        on_event(MigrationEvent::Cleanup);
        let mut outcome = MigrationOutcome::default();
        for shard in &plan.mismatched {
            self.shards.delete_shard(shard.shard_id)?;
            outcome.deleted_shards += 1;
        }
        Ok(outcome)
    }

    async fn run_re_embed(
        &self,
        plan: &MigrationPlan,
        on_event: &impl Fn(MigrationEvent),
    ) -> EngramResult<MigrationOutcome> {
        let mut outcome = MigrationOutcome::default();
        let exclude: Vec<i64> = plan.mismatched.iter().map(|s| s.shard_id).collect();
        let total: u64 = plan.mismatched.iter().map(|s| s.vector_count).sum();
        let batch_size = self.config.migration_batch_size.max(1);
        let mut processed = 0u64;

        for mismatched in &plan.mismatched {
            let shard = self.shards.get_shard(mismatched.shard_id)?;
            let store = self.shards.shard_store(&shard)?;

            let mut after_id: Option<String> = None;
            loop {
                // Re-read each batch so rows written concurrently are seen.
                let batch = store.list_page(after_id.as_deref(), batch_size)?;
                if batch.is_empty() {
                    break;
                }
                after_id = batch.last().map(|r| r.id.clone());

                for row in batch {
                    processed += 1;
                    match self.re_embed_row(&row, &exclude).await {
                        Ok(()) => outcome.re_embedded_memories += 1,
                        Err(e) => {
                            outcome.failed_rows += 1;
                            warn!(
                                memory_id = %row.id,
                                shard_id = shard.id,
                                error = %e,
                                "row re-embed failed, skipping"
                            );
                        }
                    }
                }

                on_event(MigrationEvent::ReEmbedding {
                    processed,
                    total: total.max(processed),
                    current_shard: shard.id,
                });
            }

            self.shards.delete_shard(shard.id)?;
            outcome.deleted_shards += 1;
        }

        Ok(outcome)
    }

    /// Re-embed one row and insert it into a current-dimension shard,
    /// preserving id, created_at, and pinned state.
    async fn re_embed_row(&self, row: &MemoryRecord, exclude: &[i64]) -> EngramResult<()> {
        let vector = self.embeddings.embed_with_timeout(&row.content).await?;
        let tags_vector = self.embeddings.embed_tags(&row.tags).await?;

        let parsed = ContainerTag::parse(&row.container_tag);
        let target = self
            .shards
            .get_write_shard_excluding(parsed.scope, &parsed.hash, exclude)?;
        let target_store = self.shards.shard_store(&target)?;

        let migrated = MemoryRecord {
            vector,
            tags_vector,
            updated_at: engram_core::now_millis(),
            ..row.clone()
        };

        match target_store.insert(&migrated) {
            Ok(()) => {
                self.shards.increment_vector_count(target.id)?;
                Ok(())
            }
            // Already routed by an earlier (interrupted) run.
            Err(StoreError::IdExists { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
