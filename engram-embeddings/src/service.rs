//! The warm-up-gated embedding service.
//!
//! Process-wide singleton: repeated initializations converge on one
//! instance through the global accessor, and concurrent warm-ups share a
//! single in-flight attempt. A failed warm-up marks the service failed
//! so embeds fail fast; an explicit `warm_up` retries.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use engram_core::config::EngramConfig;
use engram_core::constants::EMBED_TIMEOUT_SECS;
use engram_core::errors::EmbedError;
use engram_core::traits::EmbeddingProvider;
use engram_core::vector;

use crate::cache::EmbeddingCache;
use crate::providers;

static GLOBAL: OnceLock<Arc<EmbeddingService>> = OnceLock::new();

/// Warm-up lifecycle of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    dimensions: usize,
    cache: EmbeddingCache,
    state: Mutex<ServiceState>,
    /// Serializes warm-up attempts; concurrent callers wait on the same
    /// in-flight attempt instead of racing the provider.
    warm_gate: tokio::sync::Mutex<()>,
}

impl EmbeddingService {
    /// Build a service from config, selecting the configured provider.
    pub fn from_config(config: &EngramConfig) -> Result<Self, EmbedError> {
        let provider = providers::create_provider(config)?;
        Ok(Self::with_provider(provider, config.embedding_dimensions))
    }

    /// Build a service around an explicit provider (tests, stubs).
    pub fn with_provider(provider: Arc<dyn EmbeddingProvider>, dimensions: usize) -> Self {
        Self {
            provider,
            dimensions,
            cache: EmbeddingCache::default(),
            state: Mutex::new(ServiceState::Unloaded),
            warm_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// The process-wide instance. The first caller's config wins;
    /// repeated loads in one runtime converge on the same service.
    pub fn global(config: &EngramConfig) -> Result<Arc<Self>, EmbedError> {
        if let Some(existing) = GLOBAL.get() {
            return Ok(existing.clone());
        }
        let service = Arc::new(Self::from_config(config)?);
        Ok(GLOBAL.get_or_init(|| service).clone())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    /// Output width of the active provider.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Model identifier recorded in shard metadata.
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Load the provider. Concurrent calls share one attempt; a failed
    /// attempt leaves the service `Failed` but retryable.
    pub async fn warm_up(&self) -> Result<(), EmbedError> {
        if self.state() == ServiceState::Ready {
            return Ok(());
        }
        let _gate = self.warm_gate.lock().await;
        // A concurrent attempt may have finished while we waited.
        if self.state() == ServiceState::Ready {
            return Ok(());
        }

        *self.state.lock() = ServiceState::Loading;
        match self.provider.warm_up().await {
            Ok(()) => {
                *self.state.lock() = ServiceState::Ready;
                info!(model = self.provider.model_name(), "embedding service ready");
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = ServiceState::Failed;
                warn!(error = %e, "embedding warm-up failed");
                Err(e)
            }
        }
    }

    /// Embed one text, blocking on warm-up when not yet ready. Fails
    /// fast once the service is `Failed` until a retry succeeds.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        match self.state() {
            ServiceState::Ready => {}
            ServiceState::Failed => {
                return Err(EmbedError::ModelLoad {
                    reason: "embedding service previously failed; call warm_up to retry"
                        .to_string(),
                })
            }
            _ => self.warm_up().await?,
        }

        let key = EmbeddingCache::key(text);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.as_ref().clone());
        }

        let raw = self.provider.embed(text).await?;
        if raw.len() != self.dimensions {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dimensions,
                actual: raw.len(),
            });
        }
        // Providers promise unit norm; renormalize defensively anyway.
        let normalized = vector::normalize_l2(raw);
        let shared = self.cache.put(key, normalized);
        Ok(shared.as_ref().clone())
    }

    /// `embed` wrapped in the standard 30-second budget.
    pub async fn embed_with_timeout(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_with_budget(text, Duration::from_secs(EMBED_TIMEOUT_SECS))
            .await
    }

    /// `embed` wrapped in an explicit budget.
    pub async fn embed_with_budget(
        &self,
        text: &str,
        budget: Duration,
    ) -> Result<Vec<f32>, EmbedError> {
        match tokio::time::timeout(budget, self.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(EmbedError::Timeout {
                seconds: budget.as_secs(),
            }),
        }
    }

    /// Embed a joined tag list; empty tag lists produce no vector.
    pub async fn embed_tags(&self, tags: &[String]) -> Result<Option<Vec<f32>>, EmbedError> {
        if tags.is_empty() {
            return Ok(None);
        }
        self.embed(&tags.join(" ")).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingProvider {
        dims: usize,
        calls: AtomicUsize,
        fail_warmup: AtomicBool,
    }

    impl CountingProvider {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                calls: AtomicUsize::new(0),
                fail_warmup: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut v = vec![0.0; self.dims];
            v[text.len() % self.dims] = 1.0;
            Ok(v)
        }

        async fn warm_up(&self) -> Result<(), EmbedError> {
            if self.fail_warmup.load(Ordering::SeqCst) {
                return Err(EmbedError::ModelLoad {
                    reason: "simulated".to_string(),
                });
            }
            Ok(())
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![1.0])
        }
        async fn warm_up(&self) -> Result<(), EmbedError> {
            Ok(())
        }
        fn dimensions(&self) -> usize {
            1
        }
        fn model_name(&self) -> &str {
            "slow"
        }
    }

    struct WrongWidthProvider;

    #[async_trait]
    impl EmbeddingProvider for WrongWidthProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Ok(vec![1.0, 0.0, 0.0])
        }
        async fn warm_up(&self) -> Result<(), EmbedError> {
            Ok(())
        }
        fn dimensions(&self) -> usize {
            3
        }
        fn model_name(&self) -> &str {
            "wrong-width"
        }
    }

    #[tokio::test]
    async fn embed_warms_up_lazily() {
        let service =
            EmbeddingService::with_provider(Arc::new(CountingProvider::new(8)), 8);
        assert_eq!(service.state(), ServiceState::Unloaded);
        let v = service.embed("hello").await.unwrap();
        assert_eq!(v.len(), 8);
        assert_eq!(service.state(), ServiceState::Ready);
    }

    #[tokio::test]
    async fn failed_warmup_fails_fast_then_retries() {
        let provider = Arc::new(CountingProvider::new(4));
        provider.fail_warmup.store(true, Ordering::SeqCst);
        let service = EmbeddingService::with_provider(provider.clone(), 4);

        assert!(service.warm_up().await.is_err());
        assert_eq!(service.state(), ServiceState::Failed);

        // Fail-fast path: the provider must not be called.
        let before = provider.calls.load(Ordering::SeqCst);
        assert!(matches!(
            service.embed("x").await,
            Err(EmbedError::ModelLoad { .. })
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), before);

        // Explicit retry succeeds once the underlying cause clears.
        provider.fail_warmup.store(false, Ordering::SeqCst);
        service.warm_up().await.unwrap();
        assert_eq!(service.state(), ServiceState::Ready);
        assert!(service.embed("x").await.is_ok());
    }

    #[tokio::test]
    async fn cache_avoids_repeat_provider_calls() {
        let provider = Arc::new(CountingProvider::new(8));
        let service = EmbeddingService::with_provider(provider.clone(), 8);
        let a = service.embed("same text").await.unwrap();
        let b = service.embed("same text").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_maps_to_embed_timeout() {
        let service = EmbeddingService::with_provider(Arc::new(SlowProvider), 1);
        let result = service
            .embed_with_budget("x", Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(EmbedError::Timeout { .. })));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let service = EmbeddingService::with_provider(Arc::new(WrongWidthProvider), 8);
        assert!(matches!(
            service.embed("x").await,
            Err(EmbedError::DimensionMismatch {
                expected: 8,
                actual: 3
            })
        ));
    }

    #[tokio::test]
    async fn empty_tags_have_no_vector() {
        let service =
            EmbeddingService::with_provider(Arc::new(CountingProvider::new(8)), 8);
        assert!(service.embed_tags(&[]).await.unwrap().is_none());
        let tags = vec!["rust".to_string(), "style".to_string()];
        assert!(service.embed_tags(&tags).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn output_is_renormalized() {
        // CountingProvider emits one-hot vectors, already unit norm;
        // scale check still validates the invariant end to end.
        let service =
            EmbeddingService::with_provider(Arc::new(CountingProvider::new(16)), 16);
        let v = service.embed("normalize me").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }
}
