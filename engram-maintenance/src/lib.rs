//! # engram-maintenance
//!
//! Online maintenance services: time/count retention cleanup,
//! exact and near deduplication, and the embedding migration engine.

pub mod dedup;
pub mod migration;
pub mod retention;

pub use dedup::{DedupGroup, DedupReport, DedupService};
pub use migration::{
    MigrationEngine, MigrationEvent, MigrationOutcome, MigrationPlan, MigrationStrategy,
    MismatchedShard,
};
pub use retention::{CleanupReport, RetentionService};
