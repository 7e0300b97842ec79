//! Route handlers. Thin request → engine dispatch, no business logic.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use engram_core::tag::ContainerTag;
use engram_engine::{ListedPage, NewMemory, StatsReport, TagListing, UpdateMemory};
use engram_maintenance::{
    CleanupReport, DedupReport, MigrationOutcome, MigrationPlan, MigrationStrategy,
};

use super::envelope::ApiResponse;
use super::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub tag: Option<String>,
    #[serde(default)]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub include_prompts: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub q: String,
    pub tag: Option<String>,
    #[serde(default)]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    #[serde(default)]
    pub cascade: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteBody {
    pub ids: Vec<String>,
    #[serde(default)]
    pub cascade: bool,
}

#[derive(Debug, Deserialize)]
pub struct MigrationRunBody {
    pub strategy: MigrationStrategy,
}

/// A search hit with the similarity flattened to an integer percent.
#[derive(Debug, Serialize)]
pub struct SearchHitDto {
    #[serde(flatten)]
    pub memory: engram_core::memory::MemoryRecord,
    pub similarity: u8,
}

fn default_page_size() -> usize {
    20
}

pub async fn list_tags(State(engine): State<AppState>) -> ApiResponse<TagListing> {
    ApiResponse::from_result(engine.list_tags())
}

pub async fn list_memories(
    State(engine): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResponse<ListedPage> {
    ApiResponse::from_result(engine.list_memories(
        query.tag.as_deref(),
        query.page,
        query.page_size.clamp(1, 200),
        query.include_prompts,
    ))
}

pub async fn add_memory(
    State(engine): State<AppState>,
    Json(body): Json<NewMemory>,
) -> ApiResponse<serde_json::Value> {
    if body.content.trim().is_empty() {
        return ApiResponse::rejected("content must not be empty");
    }
    let prefix = &engine.config().container_tag_prefix;
    if !ContainerTag::is_well_formed(&body.container_tag, prefix) {
        return ApiResponse::rejected(format!(
            "malformed container tag: expected {prefix}_{{user|project}}_{{hash}}"
        ));
    }
    match engine.add_memory(body).await {
        Ok(record) => ApiResponse::ok(json!({ "id": record.id })),
        Err(e) => ApiResponse::internal(&e),
    }
}

pub async fn update_memory(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateMemory>,
) -> ApiResponse<serde_json::Value> {
    match engine.update_memory(&id, body).await {
        Ok(record) => ApiResponse::ok(json!({
            "id": record.id,
            "updatedAt": record.updated_at,
        })),
        Err(e) if is_not_found(&e) => ApiResponse::rejected(e.to_string()),
        Err(e) => ApiResponse::internal(&e),
    }
}

pub async fn delete_memory(
    State(engine): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> ApiResponse<serde_json::Value> {
    match engine.delete_memory(&id, query.cascade) {
        Ok(()) => ApiResponse::ok(json!({ "deleted": 1 })),
        Err(e) if is_not_found(&e) => ApiResponse::rejected(e.to_string()),
        Err(e) => ApiResponse::internal(&e),
    }
}

pub async fn bulk_delete(
    State(engine): State<AppState>,
    Json(body): Json<BulkDeleteBody>,
) -> ApiResponse<serde_json::Value> {
    match engine.bulk_delete(&body.ids, body.cascade) {
        Ok(deleted) => ApiResponse::ok(json!({ "deleted": deleted })),
        Err(e) => ApiResponse::internal(&e),
    }
}

pub async fn pin_memory(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse<serde_json::Value> {
    match engine.pin_memory(&id) {
        Ok(()) => ApiResponse::ok(json!({ "pinned": true })),
        Err(e) if is_not_found(&e) => ApiResponse::rejected(e.to_string()),
        Err(e) => ApiResponse::internal(&e),
    }
}

pub async fn unpin_memory(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse<serde_json::Value> {
    match engine.unpin_memory(&id) {
        Ok(()) => ApiResponse::ok(json!({ "pinned": false })),
        Err(e) if is_not_found(&e) => ApiResponse::rejected(e.to_string()),
        Err(e) => ApiResponse::internal(&e),
    }
}

pub async fn search(
    State(engine): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResponse<Vec<SearchHitDto>> {
    let result = engine
        .search(
            &query.q,
            query.tag.as_deref(),
            query.page,
            query.page_size.clamp(1, 200),
        )
        .await
        .map(|hits| {
            hits.into_iter()
                .map(|hit| SearchHitDto {
                    similarity: (hit.similarity * 100.0).round().clamp(0.0, 100.0) as u8,
                    memory: hit.record,
                })
                .collect()
        });
    ApiResponse::from_result(result)
}

pub async fn stats(State(engine): State<AppState>) -> ApiResponse<StatsReport> {
    ApiResponse::from_result(engine.stats())
}

pub async fn run_cleanup(State(engine): State<AppState>) -> ApiResponse<CleanupReport> {
    ApiResponse::from_result(engine.run_cleanup())
}

pub async fn run_deduplication(State(engine): State<AppState>) -> ApiResponse<DedupReport> {
    ApiResponse::from_result(engine.run_deduplication())
}

pub async fn detect_migration(State(engine): State<AppState>) -> ApiResponse<MigrationPlan> {
    ApiResponse::from_result(engine.detect_migration())
}

pub async fn run_migration(
    State(engine): State<AppState>,
    Json(body): Json<MigrationRunBody>,
) -> ApiResponse<MigrationOutcome> {
    let result = engine
        .run_migration(body.strategy, |event| {
            info!(event = ?event, "migration progress");
        })
        .await;
    ApiResponse::from_result(result)
}

pub async fn health(State(engine): State<AppState>) -> ApiResponse<serde_json::Value> {
    let shard_count = engine.stats().map(|s| s.shard_count).unwrap_or(0);
    ApiResponse::ok(json!({
        "embeddingState": engine.embedding_state(),
        "shardCount": shard_count,
    }))
}

fn is_not_found(e: &engram_core::errors::EngramError) -> bool {
    matches!(
        e,
        engram_core::errors::EngramError::Store(
            engram_core::errors::StoreError::NotFound { .. }
        )
    )
}
