//! Admin API smoke tests driven through the router without a socket.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use engram_core::config::EngramConfig;
use engram_core::errors::EmbedError;
use engram_core::traits::EmbeddingProvider;
use engram_core::vector::normalize_l2;
use engram_embeddings::EmbeddingService;
use engram_engine::MemoryEngine;
use engram_server::router;

struct LengthStub;

#[async_trait]
impl EmbeddingProvider for LengthStub {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let words = text.split_whitespace().count() as f32;
        Ok(normalize_l2(vec![text.len() as f32, words, 1.0, 0.5]))
    }
    async fn warm_up(&self) -> Result<(), EmbedError> {
        Ok(())
    }
    fn dimensions(&self) -> usize {
        4
    }
    fn model_name(&self) -> &str {
        "length-stub"
    }
}

fn test_app(dir: &std::path::Path) -> axum::Router {
    let config = EngramConfig {
        storage_path: dir.to_path_buf(),
        embedding_dimensions: 4,
        embedding_model: "length-stub".to_string(),
        similarity_threshold: 0.0,
        ..Default::default()
    };
    let embeddings = Arc::new(EmbeddingService::with_provider(Arc::new(LengthStub), 4));
    let engine = Arc::new(MemoryEngine::open_with_service(config, embeddings).unwrap());
    router(engine)
}

async fn call(app: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn add_search_stats_flow() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let (status, body) = call(
        &app,
        post_json(
            "/api/memories",
            serde_json::json!({
                "content": "use postgres in production",
                "containerTag": "opencode_project_abc",
                "type": "configuration"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("mem_"));

    let (status, body) = call(
        &app,
        get("/api/search?q=postgres%20production&tag=opencode_project_abc"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let hits = body["data"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["id"], id.as_str());
    let similarity = hits[0]["similarity"].as_u64().unwrap();
    assert!(similarity <= 100);

    let (status, body) = call(&app, get("/api/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["project"], 1);
    assert_eq!(body["data"]["byType"]["configuration"], 1);

    let (status, body) = call(&app, get("/api/tags")).await;
    assert_eq!(status, StatusCode::OK);
    let project_tags = body["data"]["project"].as_array().unwrap();
    assert_eq!(project_tags.len(), 1);
    assert_eq!(project_tags[0]["containerTag"], "opencode_project_abc");
}

#[tokio::test]
async fn add_rejects_malformed_tag_without_500() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let (status, body) = call(
        &app,
        post_json(
            "/api/memories",
            serde_json::json!({
                "content": "something",
                "containerTag": "not-a-tag"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("container tag"));

    let (_, body) = call(
        &app,
        post_json(
            "/api/memories",
            serde_json::json!({
                "content": "   ",
                "containerTag": "opencode_user_u"
            }),
        ),
    )
    .await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn pin_delete_lifecycle_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let (_, body) = call(
        &app,
        post_json(
            "/api/memories",
            serde_json::json!({
                "content": "pin me",
                "containerTag": "opencode_user_u"
            }),
        ),
    )
    .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, post_json(&format!("/api/memories/{id}/pin"), serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pinned"], true);

    let (status, body) = call(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/memories/{id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], 1);

    // Deleting again is a handled rejection, not a 500.
    let (status, body) = call(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/memories/{id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn migration_detect_is_clean_on_fresh_store() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let (status, body) = call(&app, get("/api/migration/detect")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["needsMigration"], false);

    let (status, body) = call(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["embeddingState"].is_string());
}
