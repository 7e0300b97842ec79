//! Traits at the component seams.

use async_trait::async_trait;

use crate::errors::EmbedError;

/// A provider that turns text into fixed-width vectors.
///
/// Implementations must return unit-normalized vectors of exactly
/// `dimensions()` floats; the service layer re-validates both.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed a batch of texts. The default loops over `embed`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Load models, test connections. Called once behind the warm-up gate.
    async fn warm_up(&self) -> Result<(), EmbedError>;

    /// Output width of this provider.
    fn dimensions(&self) -> usize;

    /// Model identifier recorded in shard metadata.
    fn model_name(&self) -> &str;
}
