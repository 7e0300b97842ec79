//! Engine-level scenarios: the write path, delete-then-insert updates,
//! pin-aware cleanup, and store-wide stats.

use std::sync::Arc;

use async_trait::async_trait;

use engram_core::config::EngramConfig;
use engram_core::errors::{EmbedError, EngramError, StoreError};
use engram_core::memory::MemoryKind;
use engram_core::traits::EmbeddingProvider;
use engram_core::vector::normalize_l2;
use engram_embeddings::EmbeddingService;
use engram_engine::{MemoryEngine, NewMemory, TimelineItem, UpdateMemory};

/// The stub embedder of the add/get/delete scenario: character counts
/// of `a`, `the`, plus length, normalized.
struct CountingStub;

#[async_trait]
impl EmbeddingProvider for CountingStub {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let a_count = text.matches('a').count() as f32;
        let the_count = text.matches("the").count() as f32;
        Ok(normalize_l2(vec![text.len() as f32, a_count, the_count, 0.5]))
    }
    async fn warm_up(&self) -> Result<(), EmbedError> {
        Ok(())
    }
    fn dimensions(&self) -> usize {
        4
    }
    fn model_name(&self) -> &str {
        "counting-stub"
    }
}

fn engine_at(dir: &std::path::Path) -> MemoryEngine {
    let config = EngramConfig {
        storage_path: dir.to_path_buf(),
        embedding_dimensions: 4,
        embedding_model: "counting-stub".to_string(),
        similarity_threshold: 0.0,
        ..Default::default()
    };
    let embeddings = Arc::new(EmbeddingService::with_provider(Arc::new(CountingStub), 4));
    MemoryEngine::open_with_service(config, embeddings).unwrap()
}

fn new_memory(content: &str, tag: &str) -> NewMemory {
    NewMemory {
        content: content.to_string(),
        container_tag: tag.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn add_get_delete_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let record = engine
        .add_memory(new_memory("the apple", "opencode_project_abc"))
        .await
        .unwrap();
    assert!(record.id.starts_with("mem_"));
    assert_eq!(record.vector.len(), 4);

    let listed = engine
        .list_memories(Some("opencode_project_abc"), 0, 50, false)
        .unwrap();
    assert_eq!(listed.total, 1);
    match &listed.items[0] {
        TimelineItem::Memory(m) => assert_eq!(m.content, "the apple"),
        other => panic!("expected a memory item, got {other:?}"),
    }

    engine.delete_memory(&record.id, false).unwrap();
    assert!(engine.get_memory(&record.id).unwrap().is_none());
    assert!(matches!(
        engine.delete_memory(&record.id, false),
        Err(EngramError::Store(StoreError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn update_preserves_identity_and_advances_updated_at() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let original = engine
        .add_memory(new_memory("use tabs", "opencode_user_u"))
        .await
        .unwrap();

    let updated = engine
        .update_memory(
            &original.id,
            UpdateMemory {
                content: Some("use spaces instead".to_string()),
                kind: Some(MemoryKind::Preference),
                tags: Some(vec!["style".to_string()]),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.id, original.id);
    assert_eq!(updated.created_at, original.created_at);
    assert!(updated.updated_at > updated.created_at);
    assert_ne!(updated.vector, original.vector);

    let fetched = engine.get_memory(&original.id).unwrap().unwrap();
    assert_eq!(fetched.content, "use spaces instead");
    assert_eq!(fetched.kind, Some(MemoryKind::Preference));
    assert_eq!(fetched.tags, vec!["style".to_string()]);
    assert!(fetched.tags_vector.is_some());
}

#[tokio::test]
async fn update_of_missing_memory_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());
    let result = engine
        .update_memory("mem_missing", UpdateMemory::default())
        .await;
    assert!(matches!(
        result,
        Err(EngramError::Store(StoreError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn pinned_memory_survives_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let keep = engine
        .add_memory(new_memory("keep me forever", "opencode_user_u"))
        .await
        .unwrap();
    engine
        .add_memory(new_memory("let me fade", "opencode_user_u"))
        .await
        .unwrap();
    engine.pin_memory(&keep.id).unwrap();

    // Cleanup with a zero-day window evicts everything unpinned.
    let dir2 = dir.path().to_path_buf();
    drop(engine);
    let config = EngramConfig {
        storage_path: dir2,
        embedding_dimensions: 4,
        embedding_model: "counting-stub".to_string(),
        retention_days: 0,
        ..Default::default()
    };
    let embeddings = Arc::new(EmbeddingService::with_provider(Arc::new(CountingStub), 4));
    let engine = MemoryEngine::open_with_service(config, embeddings).unwrap();

    // Let the clock tick past the insert timestamps.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let report = engine.run_cleanup().unwrap();
    assert_eq!(report.deleted, 1);

    let stats = engine.stats().unwrap();
    assert_eq!(stats.total, 1);
    assert!(engine.get_memory(&keep.id).unwrap().unwrap().is_pinned);
}

#[tokio::test]
async fn stats_split_by_scope_and_type() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let mut pref = new_memory("prefer rebase", "opencode_user_u");
    pref.kind = Some(MemoryKind::Preference);
    engine.add_memory(pref).await.unwrap();

    let mut arch = new_memory("hexagonal architecture", "opencode_project_p");
    arch.kind = Some(MemoryKind::Architecture);
    engine.add_memory(arch).await.unwrap();

    engine
        .add_memory(new_memory("untyped note", "opencode_project_p"))
        .await
        .unwrap();

    let stats = engine.stats().unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.user, 1);
    assert_eq!(stats.project, 2);
    assert_eq!(stats.by_type.get("preference"), Some(&1));
    assert_eq!(stats.by_type.get("architecture"), Some(&1));
    assert_eq!(stats.by_type.get("other"), Some(&1));
}

#[tokio::test]
async fn timeline_interleaves_linked_prompts() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let record = engine
        .add_memory(new_memory("summary of the discussion", "opencode_user_u"))
        .await
        .unwrap();
    engine
        .prompts()
        .record(Some(&record.id), "original raw prompt", record.created_at)
        .unwrap();

    let page = engine
        .list_memories(Some("opencode_user_u"), 0, 10, true)
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert!(matches!(page.items[0], TimelineItem::Memory(_)));
    match &page.items[1] {
        TimelineItem::Prompt(p) => assert_eq!(p.content, "original raw prompt"),
        other => panic!("expected the linked prompt, got {other:?}"),
    }

    // Cascade delete drops the prompt too.
    engine.delete_memory(&record.id, true).unwrap();
    assert!(engine
        .prompts()
        .for_memories(&[record.id.clone()])
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn bulk_delete_skips_missing_ids() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());

    let a = engine
        .add_memory(new_memory("first", "opencode_user_u"))
        .await
        .unwrap();
    let b = engine
        .add_memory(new_memory("second", "opencode_user_u"))
        .await
        .unwrap();

    let deleted = engine
        .bulk_delete(
            &[a.id.clone(), "mem_ghost".to_string(), b.id.clone()],
            false,
        )
        .unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(engine.stats().unwrap().total, 0);
}
