//! Embedding providers, selected by configuration.

mod local;
mod remote;

pub use local::HashedFeatureProvider;
pub use remote::RemoteApiProvider;

use std::sync::Arc;

use engram_core::config::EngramConfig;
use engram_core::errors::EmbedError;
use engram_core::traits::EmbeddingProvider;

/// Build the provider the config selects: remote when both API URL and
/// key are present, local otherwise.
pub fn create_provider(
    config: &EngramConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbedError> {
    match (&config.embedding_api_url, &config.embedding_api_key) {
        (Some(url), Some(key)) => Ok(Arc::new(RemoteApiProvider::new(
            url.clone(),
            key.clone(),
            config.embedding_model.clone(),
            config.embedding_dimensions,
        )?)),
        _ => Ok(Arc::new(HashedFeatureProvider::new(
            config.embedding_model.clone(),
            config.embedding_dimensions,
            config.model_cache_dir(),
        ))),
    }
}
