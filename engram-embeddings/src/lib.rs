//! # engram-embeddings
//!
//! The embedding service: a process-wide, warm-up-gated singleton that
//! turns text into unit-norm vectors through either a local
//! feature-extraction pipeline or a remote HTTP API, with a bounded L1
//! cache in front.

pub mod cache;
pub mod providers;
pub mod service;

pub use providers::{HashedFeatureProvider, RemoteApiProvider};
pub use service::{EmbeddingService, ServiceState};
