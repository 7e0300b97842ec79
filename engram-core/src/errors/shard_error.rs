/// Shard allocation and lookup failures.
#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    #[error("all shards sealed for scope={scope} hash={hash}")]
    AllSealed { scope: String, hash: String },

    #[error("shard not found: {id}")]
    Missing { id: i64 },

    #[error("shard registry corrupt: {details}")]
    RegistryCorrupt { details: String },
}
