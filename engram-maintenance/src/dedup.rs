//! Exact and near-duplicate detection.
//!
//! Exact pass: rows grouped by SHA-256 of content; the pinned row wins,
//! otherwise the oldest, and the rest are deleted. Near pass: vector
//! neighborhoods within the same container tag at or above the
//! configured cosine threshold form candidate groups, reported always
//! and deleted only under `auto_merge`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use engram_core::config::EngramConfig;
use engram_core::errors::EngramResult;
use engram_core::memory::MemoryRecord;

use engram_storage::{ShardManager, ShardStore};

/// One proposed (or applied) duplicate group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupGroup {
    pub container_tag: String,
    pub kept_id: String,
    pub duplicate_ids: Vec<String>,
    /// Minimum pairwise similarity inside the group; 1.0 for exact.
    pub similarity: f32,
    pub exact: bool,
}

/// Outcome of one deduplication run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupReport {
    pub scanned: u64,
    pub exact_removed: u64,
    pub near_removed: u64,
    /// Near-duplicate groups found (deleted only under auto-merge).
    pub near_groups: Vec<DedupGroup>,
}

pub struct DedupService {
    config: Arc<EngramConfig>,
    shards: Arc<ShardManager>,
}

impl DedupService {
    pub fn new(config: Arc<EngramConfig>, shards: Arc<ShardManager>) -> Self {
        Self { config, shards }
    }

    /// Run both passes over every shard. Broken shards are skipped.
    pub fn run(&self) -> EngramResult<DedupReport> {
        let mut report = DedupReport::default();

        for shard in self.shards.all_shards()? {
            let store = match self.shards.shard_store(&shard) {
                Ok(store) => store,
                Err(e) => {
                    warn!(shard_id = shard.id, error = %e, "shard unopenable, skipping dedup");
                    continue;
                }
            };
            if let Err(e) = self.dedup_shard(&store, &mut report) {
                warn!(shard_id = shard.id, error = %e, "dedup failed for shard, skipping");
                continue;
            }
            match store.count() {
                Ok(count) => {
                    if let Err(e) = self.shards.set_vector_count(shard.id, count) {
                        warn!(shard_id = shard.id, error = %e, "vector count refresh failed");
                    }
                }
                Err(e) => warn!(shard_id = shard.id, error = %e, "post-dedup count failed"),
            }
        }

        info!(
            scanned = report.scanned,
            exact_removed = report.exact_removed,
            near_groups = report.near_groups.len(),
            near_removed = report.near_removed,
            "deduplication complete"
        );
        Ok(report)
    }

    fn dedup_shard(&self, store: &ShardStore, report: &mut DedupReport) -> EngramResult<()> {
        let rows = store.list_all()?;
        report.scanned += rows.len() as u64;

        // Exact pass.
        let mut by_hash: HashMap<String, Vec<&MemoryRecord>> = HashMap::new();
        for row in &rows {
            by_hash.entry(content_sha256(&row.content)).or_default().push(row);
        }

        let mut removed_ids: HashSet<String> = HashSet::new();
        for group in by_hash.values() {
            if group.len() < 2 {
                continue;
            }
            let keeper = pick_keeper(group);
            let losers: Vec<String> = group
                .iter()
                .filter(|r| r.id != keeper.id)
                .map(|r| r.id.clone())
                .collect();
            let deleted = store.delete_many(&losers)?;
            report.exact_removed += deleted as u64;
            removed_ids.extend(losers);
        }

        // Near pass over the survivors.
        let threshold = self.config.near_dup_threshold;
        let survivors: Vec<&MemoryRecord> =
            rows.iter().filter(|r| !removed_ids.contains(&r.id)).collect();
        let mut grouped: HashSet<String> = HashSet::new();

        for row in &survivors {
            if grouped.contains(&row.id) {
                continue;
            }
            let neighbors = store.neighbors_of(row, threshold)?;
            let fresh: Vec<(MemoryRecord, f32)> = neighbors
                .into_iter()
                .filter(|(n, _)| !grouped.contains(&n.id) && !removed_ids.contains(&n.id))
                .collect();
            if fresh.is_empty() {
                continue;
            }

            let mut members: Vec<&MemoryRecord> = vec![*row];
            members.extend(fresh.iter().map(|(n, _)| n));
            let keeper = pick_keeper(&members);
            let duplicate_ids: Vec<String> = members
                .iter()
                .filter(|r| r.id != keeper.id)
                .map(|r| r.id.clone())
                .collect();
            let min_similarity = fresh
                .iter()
                .map(|(_, s)| *s)
                .fold(f32::INFINITY, f32::min);

            for member in &members {
                grouped.insert(member.id.clone());
            }

            if self.config.auto_merge_duplicates {
                let deleted = store.delete_many(&duplicate_ids)?;
                report.near_removed += deleted as u64;
                removed_ids.extend(duplicate_ids.iter().cloned());
            }

            report.near_groups.push(DedupGroup {
                container_tag: row.container_tag.clone(),
                kept_id: keeper.id.clone(),
                duplicate_ids,
                similarity: min_similarity,
                exact: false,
            });
        }

        Ok(())
    }
}

/// The pinned row if any, otherwise the oldest (ties on id).
fn pick_keeper<'a>(group: &[&'a MemoryRecord]) -> &'a MemoryRecord {
    group
        .iter()
        .min_by_key(|r| (!r.is_pinned, r.created_at, r.id.clone()))
        .expect("dedup groups are non-empty")
}

/// Hex SHA-256 of the content text.
pub fn content_sha256(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
