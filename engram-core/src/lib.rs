//! # engram-core
//!
//! Foundation crate for the Engram memory store.
//! Defines the shared types, configuration, error taxonomy, traits, and
//! constants. Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod memory;
pub mod tag;
pub mod traits;
pub mod vector;

// Re-export the most commonly used types at the crate root.
pub use config::EngramConfig;
pub use errors::{EngramError, EngramResult};
pub use memory::{MemoryKind, MemoryRecord, Scope, TagInfo};
pub use tag::ContainerTag;
pub use traits::EmbeddingProvider;

/// Current millisecond epoch, the timestamp unit used everywhere on disk.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
