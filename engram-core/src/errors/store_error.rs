/// Per-shard storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("memory not found: {id}")]
    NotFound { id: String },

    #[error("memory id already exists: {id}")]
    IdExists { id: String },

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("database corruption detected: {details}")]
    Corrupt { details: String },

    #[error("SQLite error: {message}")]
    Sqlite { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Map a rusqlite-shaped error message into the storage taxonomy.
    pub fn sqlite(message: impl Into<String>) -> Self {
        Self::Sqlite {
            message: message.into(),
        }
    }
}
