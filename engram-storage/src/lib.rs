//! # engram-storage
//!
//! SQLite persistence layer: the process-wide connection manager, the
//! shard registry and routing, the per-shard vector store, and the
//! auxiliary databases. All SQL in the workspace lives here.

pub mod aux;
pub mod manager;
pub mod queries;
pub mod schema;
pub mod shards;
pub mod store;

pub use manager::{ConnectionManager, Database, SchemaKind};
pub use shards::{ShardManager, ShardRecord};
pub use store::ShardStore;

use engram_core::errors::StoreError;

/// Map a rusqlite error into the storage taxonomy.
pub(crate) fn to_store_err(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::DatabaseCorrupt =>
        {
            StoreError::Corrupt {
                details: e.to_string(),
            }
        }
        _ => StoreError::Sqlite {
            message: e.to_string(),
        },
    }
}
