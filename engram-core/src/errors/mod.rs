//! Error taxonomy, one enum per domain.

mod config_error;
mod embed_error;
mod lock_error;
mod migration_error;
mod shard_error;
mod store_error;

pub use config_error::ConfigError;
pub use embed_error::EmbedError;
pub use lock_error::LockError;
pub use migration_error::MigrationError;
pub use shard_error::ShardError;
pub use store_error::StoreError;

/// Result type alias used across the workspace.
pub type EngramResult<T> = std::result::Result<T, EngramError>;

/// Umbrella error carrying every domain failure.
#[derive(Debug, thiserror::Error)]
pub enum EngramError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Shard(#[from] ShardError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
