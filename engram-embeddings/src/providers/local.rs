//! Local feature-extraction pipeline.
//!
//! Deterministic hashed token features: terms are bucketed by FNV-1a
//! into the configured width, weighted by term frequency and a length
//! prior, mean-pooled, and L2-normalized. Always available offline;
//! warm-up prepares the model cache directory.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use engram_core::errors::EmbedError;
use engram_core::traits::EmbeddingProvider;

pub struct HashedFeatureProvider {
    model_name: String,
    dimensions: usize,
    cache_dir: PathBuf,
}

impl HashedFeatureProvider {
    pub fn new(model_name: String, dimensions: usize, cache_dir: PathBuf) -> Self {
        Self {
            model_name,
            dimensions,
            cache_dir,
        }
    }

    /// Hash a term into a bucket index using FNV-1a.
    fn hash_term(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= u64::from(*b);
            h = h.wrapping_mul(0x100000001b3);
        }
        (h as usize) % dims
    }

    /// Lowercase alphanumeric terms, single characters included so short
    /// stopword-ish tokens still contribute signal for tiny inputs.
    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    fn feature_vector(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        if tokens.is_empty() {
            return vec![0.0; self.dimensions];
        }

        let mut tf: HashMap<&str, f32> = HashMap::new();
        for tok in &tokens {
            *tf.entry(tok.as_str()).or_default() += 1.0;
        }

        let total = tokens.len() as f32;
        let mut vec = vec![0.0f32; self.dimensions];
        for (term, count) in &tf {
            let freq = count / total;
            // Longer terms carry more information; a log prior stands in
            // for corpus-level IDF.
            let weight = 1.0 + (term.len() as f32).ln();
            let bucket = Self::hash_term(term, self.dimensions);
            vec[bucket] += freq * weight;
        }

        engram_core::vector::normalize_l2(vec)
    }
}

#[async_trait]
impl EmbeddingProvider for HashedFeatureProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.feature_vector(text))
    }

    async fn warm_up(&self) -> Result<(), EmbedError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|e| EmbedError::ModelLoad {
            reason: format!("cannot prepare model cache {}: {e}", self.cache_dir.display()),
        })?;
        Ok(())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
