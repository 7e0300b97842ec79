/// Embedding-service failures.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("embedding API returned HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    #[error("embedding model failed to load: {reason}")]
    ModelLoad { reason: String },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
