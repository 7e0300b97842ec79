//! The admin HTTP API: a thin, uniform dispatch over the engine.
//!
//! Every response is a `{success, data?, error?}` envelope, HTTP 200 on
//! success (including handled validation failures) and 500 on internal
//! errors. CORS is permissive; the server binds localhost only.

mod envelope;
mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use engram_core::constants::API_REQUEST_TIMEOUT_SECS;
use engram_engine::MemoryEngine;

pub use envelope::ApiResponse;

/// Shared handler state.
pub type AppState = Arc<MemoryEngine>;

/// Build the admin API router.
pub fn router(engine: AppState) -> Router {
    Router::new()
        .route("/api/tags", get(handlers::list_tags))
        .route(
            "/api/memories",
            get(handlers::list_memories).post(handlers::add_memory),
        )
        .route(
            "/api/memories/:id",
            put(handlers::update_memory).delete(handlers::delete_memory),
        )
        .route("/api/memories/bulk-delete", post(handlers::bulk_delete))
        .route("/api/memories/:id/pin", post(handlers::pin_memory))
        .route("/api/memories/:id/unpin", post(handlers::unpin_memory))
        .route("/api/search", get(handlers::search))
        .route("/api/stats", get(handlers::stats))
        .route("/api/cleanup", post(handlers::run_cleanup))
        .route("/api/deduplicate", post(handlers::run_deduplication))
        .route("/api/migration/detect", get(handlers::detect_migration))
        .route("/api/migration/run", post(handlers::run_migration))
        .route("/api/health", get(handlers::health))
        .layer(TimeoutLayer::new(Duration::from_secs(API_REQUEST_TIMEOUT_SECS)))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}
