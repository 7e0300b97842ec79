//! The memory engine: write path, read path, and maintenance entry
//! points, bound to one storage root.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use engram_core::config::EngramConfig;
use engram_core::errors::{EngramResult, StoreError};
use engram_core::memory::{MemoryRecord, Scope, TagInfo};
use engram_core::tag::ContainerTag;
use engram_embeddings::{EmbeddingService, ServiceState};
use engram_maintenance::{
    CleanupReport, DedupReport, DedupService, MigrationEngine, MigrationEvent, MigrationOutcome,
    MigrationPlan, MigrationStrategy, RetentionService,
};
use engram_retrieval::{HybridSearcher, SearchHit};
use engram_storage::aux::{ProfileStore, PromptStore, SessionStore};
use engram_storage::{ConnectionManager, ShardManager, ShardRecord};

use crate::types::{ListedPage, NewMemory, StatsReport, TagListing, TimelineItem, UpdateMemory};

/// Application root. Constructed once, handed out behind an `Arc`.
pub struct MemoryEngine {
    config: Arc<EngramConfig>,
    connections: Arc<ConnectionManager>,
    shards: Arc<ShardManager>,
    embeddings: Arc<EmbeddingService>,
    searcher: HybridSearcher,
    retention: RetentionService,
    dedup: DedupService,
    migration: MigrationEngine,
    prompts: PromptStore,
    profiles: ProfileStore,
    sessions: SessionStore,
}

impl MemoryEngine {
    /// Open the engine over the configured storage root, using the
    /// process-wide embedding service.
    pub fn open(config: EngramConfig) -> EngramResult<Self> {
        let embeddings = EmbeddingService::global(&config)?;
        Self::open_with_service(config, embeddings)
    }

    /// Open with an explicit embedding service (tests, embedded hosts).
    pub fn open_with_service(
        config: EngramConfig,
        embeddings: Arc<EmbeddingService>,
    ) -> EngramResult<Self> {
        std::fs::create_dir_all(&config.storage_path)?;
        let config = Arc::new(config);
        let connections = Arc::new(ConnectionManager::new());
        let shards = Arc::new(ShardManager::open(config.clone(), connections.clone())?);

        let searcher = HybridSearcher::new(config.clone(), shards.clone(), embeddings.clone());
        let retention = RetentionService::new(config.clone(), shards.clone());
        let dedup = DedupService::new(config.clone(), shards.clone());
        let migration = MigrationEngine::new(config.clone(), shards.clone(), embeddings.clone());

        let prompts = PromptStore::open(&connections, &config.storage_path)?;
        let profiles = ProfileStore::open(&connections, &config.storage_path)?;
        let sessions = SessionStore::open(&connections, &config.storage_path)?;

        info!(storage = %config.storage_path.display(), "memory engine opened");
        Ok(Self {
            config,
            connections,
            shards,
            embeddings,
            searcher,
            retention,
            dedup,
            migration,
            prompts,
            profiles,
            sessions,
        })
    }

    pub fn config(&self) -> &EngramConfig {
        &self.config
    }

    pub fn prompts(&self) -> &PromptStore {
        &self.prompts
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn embedding_state(&self) -> ServiceState {
        self.embeddings.state()
    }

    /// Embed and persist a new memory; returns the stored record.
    pub async fn add_memory(&self, new: NewMemory) -> EngramResult<MemoryRecord> {
        let vector = self.embeddings.embed_with_timeout(&new.content).await?;
        let tags_vector = self.embeddings.embed_tags(&new.tags).await?;

        let parsed = ContainerTag::parse(&new.container_tag);
        let shard = self.shards.get_write_shard(parsed.scope, &parsed.hash)?;
        let store = self.shards.shard_store(&shard)?;

        let now = engram_core::now_millis();
        let record = MemoryRecord {
            id: MemoryRecord::new_id(),
            content: new.content,
            container_tag: new.container_tag,
            kind: new.kind,
            tags: new.tags,
            vector,
            tags_vector,
            display_name: new.display_name,
            user_name: new.user_name,
            user_email: new.user_email,
            project_path: new.project_path,
            project_name: new.project_name,
            git_repo_url: new.git_repo_url,
            metadata: new.metadata.map(|v| v.to_string()),
            created_at: now,
            updated_at: now,
            is_pinned: false,
        };

        store.insert(&record)?;
        self.shards.increment_vector_count(shard.id)?;
        debug!(id = %record.id, shard_id = shard.id, "memory added");
        Ok(record)
    }

    /// Find a memory anywhere in the store.
    pub fn get_memory(&self, id: &str) -> EngramResult<Option<MemoryRecord>> {
        Ok(self.locate(id)?.map(|(_, record)| record))
    }

    /// Replace a memory's content/kind/tags with fresh vectors,
    /// preserving `id` and `created_at`. Delete-then-insert.
    pub async fn update_memory(&self, id: &str, update: UpdateMemory) -> EngramResult<MemoryRecord> {
        let (old_shard, existing) = self
            .locate(id)?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        let content = update.content.unwrap_or_else(|| existing.content.clone());
        let tags = update.tags.unwrap_or_else(|| existing.tags.clone());
        let kind = update.kind.or(existing.kind);

        let vector = self.embeddings.embed_with_timeout(&content).await?;
        let tags_vector = self.embeddings.embed_tags(&tags).await?;

        // Delete-then-insert; updated_at strictly advances even within
        // one millisecond tick.
        let updated_at = engram_core::now_millis().max(existing.created_at + 1);
        let replacement = MemoryRecord {
            content,
            tags,
            kind,
            vector,
            tags_vector,
            updated_at,
            ..existing.clone()
        };

        let old_store = self.shards.shard_store(&old_shard)?;
        old_store.delete(id)?;
        self.shards.decrement_vector_count(old_shard.id)?;

        let parsed = ContainerTag::parse(&replacement.container_tag);
        let shard = self.shards.get_write_shard(parsed.scope, &parsed.hash)?;
        let store = self.shards.shard_store(&shard)?;
        store.insert(&replacement)?;
        self.shards.increment_vector_count(shard.id)?;

        debug!(id = %id, "memory updated");
        Ok(replacement)
    }

    /// Delete a memory; `cascade` also drops its linked prompt.
    pub fn delete_memory(&self, id: &str, cascade: bool) -> EngramResult<()> {
        let (shard, _record) = self
            .locate(id)?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        let store = self.shards.shard_store(&shard)?;
        store.delete(id)?;
        self.shards.decrement_vector_count(shard.id)?;
        if cascade {
            self.prompts.delete_for_memory(id)?;
        }
        debug!(id = %id, cascade, "memory deleted");
        Ok(())
    }

    /// Bulk delete; returns how many of the ids were found and removed.
    pub fn bulk_delete(&self, ids: &[String], cascade: bool) -> EngramResult<usize> {
        let mut deleted = 0;
        for id in ids {
            match self.delete_memory(id, cascade) {
                Ok(()) => deleted += 1,
                Err(engram_core::errors::EngramError::Store(StoreError::NotFound { .. })) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }

    pub fn pin_memory(&self, id: &str) -> EngramResult<()> {
        self.set_pinned(id, true)
    }

    pub fn unpin_memory(&self, id: &str) -> EngramResult<()> {
        self.set_pinned(id, false)
    }

    fn set_pinned(&self, id: &str, pinned: bool) -> EngramResult<()> {
        let (shard, _) = self
            .locate(id)?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        let store = self.shards.shard_store(&shard)?;
        if pinned {
            store.pin(id)?;
        } else {
            store.unpin(id)?;
        }
        Ok(())
    }

    /// Hybrid search, trimmed to one page.
    pub async fn search(
        &self,
        query: &str,
        container_tag: Option<&str>,
        page: usize,
        page_size: usize,
    ) -> EngramResult<Vec<SearchHit>> {
        let wanted = page_size.saturating_mul(page + 1);
        let hits = self.searcher.search(query, container_tag, wanted).await?;
        Ok(hits
            .into_iter()
            .skip(page * page_size)
            .take(page_size)
            .collect())
    }

    /// Paged timeline, newest first, optionally interleaving linked
    /// prompts right after their memories.
    pub fn list_memories(
        &self,
        container_tag: Option<&str>,
        page: usize,
        page_size: usize,
        include_prompts: bool,
    ) -> EngramResult<ListedPage> {
        let mut memories: Vec<MemoryRecord> = Vec::new();
        for shard in self.relevant_shards(container_tag)? {
            let store = self.shards.shard_store(&shard)?;
            match container_tag {
                Some(tag) => memories.extend(store.list(tag, usize::MAX)?),
                None => memories.extend(store.list_all()?),
            }
        }
        memories.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = memories.len() as u64;

        let page_rows: Vec<MemoryRecord> = memories
            .into_iter()
            .skip(page * page_size)
            .take(page_size)
            .collect();

        let mut items = Vec::with_capacity(page_rows.len() * 2);
        if include_prompts {
            let ids: Vec<String> = page_rows.iter().map(|r| r.id.clone()).collect();
            let mut by_memory: BTreeMap<String, Vec<engram_storage::aux::PromptRow>> =
                BTreeMap::new();
            for prompt in self.prompts.for_memories(&ids)? {
                if let Some(memory_id) = prompt.memory_id.clone() {
                    by_memory.entry(memory_id).or_default().push(prompt);
                }
            }
            for record in page_rows {
                let linked = by_memory.remove(&record.id).unwrap_or_default();
                items.push(TimelineItem::Memory(record));
                items.extend(linked.into_iter().map(TimelineItem::Prompt));
            }
        } else {
            items.extend(page_rows.into_iter().map(TimelineItem::Memory));
        }

        Ok(ListedPage {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Distinct container tags across all shards, merged and split by
    /// scope.
    pub fn list_tags(&self) -> EngramResult<TagListing> {
        let mut merged: BTreeMap<String, TagInfo> = BTreeMap::new();
        for shard in self.shards.all_shards()? {
            let store = self.shards.shard_store(&shard)?;
            for tag in store.distinct_tags()? {
                merged
                    .entry(tag.container_tag.clone())
                    .and_modify(|existing| {
                        existing.count += tag.count;
                        if existing.display_name.is_none() {
                            existing.display_name = tag.display_name.clone();
                        }
                        if existing.project_name.is_none() {
                            existing.project_name = tag.project_name.clone();
                        }
                    })
                    .or_insert(tag);
            }
        }

        let mut listing = TagListing::default();
        for tag in merged.into_values() {
            match tag.scope {
                Scope::User => listing.user.push(tag),
                Scope::Project => listing.project.push(tag),
            }
        }
        Ok(listing)
    }

    /// Totals by scope and type across every shard.
    pub fn stats(&self) -> EngramResult<StatsReport> {
        let mut report = StatsReport::default();
        for shard in self.shards.all_shards()? {
            report.shard_count += 1;
            let store = self.shards.shard_store(&shard)?;
            let (user, project) = store.count_by_scope()?;
            report.user += user;
            report.project += project;
            for (kind, count) in store.count_by_kind()? {
                *report.by_type.entry(kind.as_str().to_string()).or_insert(0) += count;
            }
        }
        report.total = report.user + report.project;
        Ok(report)
    }

    pub fn run_cleanup(&self) -> EngramResult<CleanupReport> {
        self.retention.run()
    }

    pub fn run_deduplication(&self) -> EngramResult<DedupReport> {
        self.dedup.run()
    }

    pub fn detect_migration(&self) -> EngramResult<MigrationPlan> {
        self.migration.detect()
    }

    pub async fn run_migration(
        &self,
        strategy: MigrationStrategy,
        on_event: impl Fn(MigrationEvent),
    ) -> EngramResult<MigrationOutcome> {
        self.migration.run(strategy, on_event).await
    }

    /// Flush every WAL to the main database files.
    pub fn checkpoint(&self) -> EngramResult<()> {
        Ok(self.connections.checkpoint_all()?)
    }

    /// Checkpoint and release every handle.
    pub fn shutdown(&self) -> EngramResult<()> {
        self.checkpoint()?;
        self.connections.close_all();
        info!("memory engine shut down");
        Ok(())
    }

    /// Scan the relevant shards for a memory id.
    fn locate(&self, id: &str) -> EngramResult<Option<(ShardRecord, MemoryRecord)>> {
        for shard in self.shards.all_shards()? {
            let store = self.shards.shard_store(&shard)?;
            if let Some(record) = store.get_by_id(id)? {
                return Ok(Some((shard, record)));
            }
        }
        Ok(None)
    }

    fn relevant_shards(
        &self,
        container_tag: Option<&str>,
    ) -> EngramResult<Vec<ShardRecord>> {
        match container_tag {
            Some(tag) => {
                let parsed = ContainerTag::parse(tag);
                self.shards.get_all_shards(parsed.scope, &parsed.hash)
            }
            None => self.shards.all_shards(),
        }
    }
}
