//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};
use fnv::FnvHasher;
use half::f16;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result. The dimension is taken from the first
    /// vector, or 0 when there are none.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let result = self.embed_texts(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::embedding_gen("no embedding generated for text"))
    }

    /// Generate embeddings for multiple texts, one vector per input in order
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;

    /// Name of the model behind this provider
    fn model_name(&self) -> &str;
}

/// L2-normalize a vector and narrow it to f16.
pub fn normalize_to_f16(embedding: &[f32], normalize: bool) -> Vec<f16> {
    let norm = if normalize {
        embedding.iter().map(|x| x * x).sum::<f32>().sqrt()
    } else {
        0.0
    };
    embedding
        .iter()
        .map(|&v| {
            if norm > 0.0 {
                f16::from_f32(v / norm)
            } else {
                f16::from_f32(v)
            }
        })
        .collect()
}

/// Type alias for cached model entries (model, dimension)
type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, usize);

/// Global cache for initialized embedding models to avoid reloading
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

fn model_cache() -> MutexGuard<'static, HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// FastEmbed-based embedding provider running a local ONNX model.
///
/// Loaded models are shared process-wide, so creating a second provider
/// with the same configuration does not load the weights again.
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Option<Arc<Mutex<TextEmbedding>>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Creates a new uninitialized provider. Call [`initialize`](Self::initialize)
    /// before embedding anything.
    pub fn new(config: EmbedConfig) -> Self {
        let dimension = config.expected_dimension().unwrap_or(0);
        Self {
            config,
            model: None,
            dimension,
        }
    }

    /// Creates and initializes a provider in one step.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let mut provider = Self::new(config);
        provider.initialize().await?;
        Ok(provider)
    }

    /// Loads the embedding model, fetching it on first use.
    pub async fn initialize(&mut self) -> Result<()> {
        self.config.validate()?;
        tracing::info!(
            "Initializing FastEmbed provider for model: {}",
            self.config.model_name()
        );

        let cache_key = self.create_cache_key()?;
        let cached = model_cache()
            .get(&cache_key)
            .map(|(model, dim)| (Arc::clone(model), *dim));

        if let Some((model, dimension)) = cached {
            tracing::info!("Using cached model for: {}", self.config.model_name());
            self.model = Some(model);
            self.dimension = dimension;
            return self.validate_model().await;
        }

        if let Some(dir) = &self.config.cache_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        let config = self.config.clone();
        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                tracing::info!("Loading embedding model: {}", config.model_name());

                let mut init_options = InitOptions::new(config.fastembed_model()?)
                    .with_show_download_progress(config.show_download_progress);
                if let Some(dir) = &config.cache_dir {
                    init_options = init_options.with_cache_dir(dir.clone());
                }

                let mut model = TextEmbedding::try_new(init_options).map_err(EmbedError::model_init)?;

                let probe = model
                    .embed(vec!["test".to_string()], None)
                    .map_err(EmbedError::model_init)?;
                let dimension = probe
                    .first()
                    .map(|emb| emb.len())
                    .ok_or_else(|| EmbedError::model_init("model produced no probe embedding"))?;

                tracing::info!("Model loaded successfully. Dimension: {}", dimension);
                Ok((model, dimension))
            })
            .await??;

        let model = Arc::new(Mutex::new(model));
        model_cache().insert(cache_key, (Arc::clone(&model), dimension));

        self.model = Some(model);
        self.dimension = dimension;
        self.validate_model().await
    }

    /// Cache key derived from the full configuration
    fn create_cache_key(&self) -> Result<String> {
        let config_json = serde_json::to_string(&self.config)
            .map_err(|e| EmbedError::External { source: e.into() })?;

        let mut hasher = FnvHasher::default();
        hasher.write(b"v1:");
        hasher.write(config_json.as_bytes());

        Ok(format!("v1:{:x}", hasher.finish()))
    }

    /// Run one embedding through the model and check its shape
    async fn validate_model(&self) -> Result<()> {
        let embedding = self.embed_text("validation test").await?;

        if embedding.len() != self.dimension {
            return Err(EmbedError::invalid_config(format!(
                "Model validation failed: expected dimension {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }
        if embedding.iter().any(|v| !v.to_f32().is_finite()) {
            return Err(EmbedError::invalid_config(
                "Model validation failed: non-finite values in embedding",
            ));
        }

        tracing::debug!("Model validation passed for: {}", self.config.model_name());
        Ok(())
    }

    /// Clears the process-wide model cache.
    pub fn clear_cache() {
        model_cache().clear();
        tracing::info!("Model cache cleared");
    }

    /// Number of models currently held in the process-wide cache.
    pub fn cache_size() -> usize {
        model_cache().len()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let model = self.model.as_ref().ok_or_else(|| {
            EmbedError::invalid_config("Model not initialized. Call initialize() first.")
        })?;

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            let chunk = chunk.to_vec();
            let model = Arc::clone(model);

            let batch = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut guard = model
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                guard.embed(chunk, None).map_err(EmbedError::embedding_gen)
            })
            .await??;

            all_embeddings.extend(
                batch
                    .iter()
                    .map(|e| normalize_to_f16(e, self.config.normalize)),
            );
        }

        if all_embeddings.len() != texts.len() {
            return Err(EmbedError::embedding_gen(format!(
                "expected {} embeddings, model returned {}",
                texts.len(),
                all_embeddings.len()
            )));
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn model_name(&self) -> &str {
        self.config.model_name()
    }
}

/// Deterministic embedder that works without any model files.
///
/// Lowercased words and their character trigrams are hashed into signed
/// buckets, and the result is L2-normalized. Texts that share vocabulary end
/// up close in cosine distance, which is enough for offline use and tests.
#[derive(Debug, Clone)]
pub struct HashEmbedProvider {
    dimension: usize,
    model_name: String,
}

impl HashEmbedProvider {
    pub const MODEL_NAME: &'static str = "hash-ngram";

    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be positive"));
        }
        Ok(Self {
            dimension,
            model_name: Self::MODEL_NAME.to_string(),
        })
    }

    fn bucket(&self, feature: &str, salt: u8) -> (usize, f32) {
        let mut hasher = FnvHasher::default();
        hasher.write_u8(salt);
        hasher.write(feature.as_bytes());
        let hash = hasher.finish();
        let index = (hash % self.dimension as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    /// Embed synchronously. Empty input yields the zero vector.
    pub fn embed_sync(&self, text: &str) -> Vec<f16> {
        let mut values = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let (index, sign) = self.bucket(word, 0);
            values[index] += sign * 2.0;

            let padded: Vec<char> = format!(" {word} ").chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                let (index, sign) = self.bucket(&trigram, 1);
                values[index] += sign;
            }
        }

        normalize_to_f16(&values, true)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let embeddings = texts.iter().map(|t| self.embed_sync(t)).collect();
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hash"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f16], b: &[f16]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x.to_f32() * y.to_f32()).sum()
    }

    #[test]
    fn test_embedding_result() {
        let embeddings = vec![
            vec![f16::from_f32(0.1), f16::from_f32(0.2), f16::from_f32(0.3)],
            vec![f16::from_f32(0.4), f16::from_f32(0.5), f16::from_f32(0.6)],
        ];
        let result = EmbeddingResult::new(embeddings);

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());
        assert!(EmbeddingResult::new(vec![]).is_empty());
    }

    #[test]
    fn test_normalize_to_f16() {
        let v = normalize_to_f16(&[3.0, 4.0], true);
        assert!((v[0].to_f32() - 0.6).abs() < 1e-3);
        assert!((v[1].to_f32() - 0.8).abs() < 1e-3);

        let raw = normalize_to_f16(&[3.0, 4.0], false);
        assert_eq!(raw[0].to_f32(), 3.0);

        let zero = normalize_to_f16(&[0.0, 0.0], true);
        assert!(zero.iter().all(|v| v.to_f32() == 0.0));
    }

    #[test]
    fn test_fastembed_provider_creation() {
        let provider = FastEmbedProvider::new(EmbedConfig::default());

        assert_eq!(provider.provider_name(), "fastembed");
        assert_eq!(provider.embedding_dimension(), 384);
        assert_eq!(
            provider.model_name(),
            "sentence-transformers/all-MiniLM-L6-v2"
        );
    }

    #[tokio::test]
    async fn test_uninitialized_provider_errors() {
        let provider = FastEmbedProvider::new(EmbedConfig::default());
        let err = provider.embed_text("hello").await.unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_unknown_model_fails_initialization() {
        let result = FastEmbedProvider::create(EmbedConfig::new("made-up-model")).await;
        assert!(matches!(result, Err(EmbedError::UnknownModel { .. })));
    }

    #[test]
    fn test_cache_key_generation() {
        let key1 = FastEmbedProvider::new(EmbedConfig::default())
            .create_cache_key()
            .unwrap();
        let key2 = FastEmbedProvider::new(EmbedConfig::default())
            .create_cache_key()
            .unwrap();
        assert_eq!(key1, key2, "Same config should produce same cache key");
        assert!(key1.starts_with("v1:"));

        let key3 = FastEmbedProvider::new(EmbedConfig::new("BAAI/bge-small-en-v1.5"))
            .create_cache_key()
            .unwrap();
        assert_ne!(key1, key3, "Different model should produce different key");

        let key4 = FastEmbedProvider::new(EmbedConfig::default().with_normalize(false))
            .create_cache_key()
            .unwrap();
        assert_ne!(key1, key4);
    }

    #[tokio::test]
    async fn test_hash_provider_is_deterministic() {
        let provider = HashEmbedProvider::new(64).unwrap();
        let a = provider.embed_text("The quick brown fox").await.unwrap();
        let b = provider.embed_text("The quick brown fox").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-2);
    }

    #[tokio::test]
    async fn test_hash_provider_similarity() {
        let provider = HashEmbedProvider::new(384).unwrap();
        let texts = vec![
            "Photosynthesis converts sunlight into chemical energy in plants".to_string(),
            "Stock markets fell sharply after the interest rate decision".to_string(),
        ];
        let docs = provider.embed_texts(&texts).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs.dimension, 384);

        let query = provider
            .embed_text("How do plants use sunlight for energy?")
            .await
            .unwrap();
        let related = cosine(&query, &docs.embeddings[0]);
        let unrelated = cosine(&query, &docs.embeddings[1]);
        assert!(related > unrelated, "{related} <= {unrelated}");
    }

    #[tokio::test]
    async fn test_hash_provider_empty_text() {
        let provider = HashEmbedProvider::new(16).unwrap();
        let v = provider.embed_text("").await.unwrap();
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|x| x.to_f32() == 0.0));
        assert!(HashEmbedProvider::new(0).is_err());
        assert_eq!(provider.model_name(), HashEmbedProvider::MODEL_NAME);
    }

    #[tokio::test]
    #[ignore] // Downloads all-MiniLM-L6-v2; run with: cargo test test_minilm_embedding -- --ignored
    async fn test_minilm_embedding() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let provider = FastEmbedProvider::create(EmbedConfig::default_with_path(dir.path())).await?;
        assert_eq!(FastEmbedProvider::cache_size(), 1);

        let result = provider
            .embed_texts(&[
                "Machine learning models process natural language.".to_string(),
                "Neural networks learn representations of text.".to_string(),
            ])
            .await?;
        assert_eq!(result.dimension, 384);
        assert!(cosine(&result.embeddings[0], &result.embeddings[1]) > 0.2);

        FastEmbedProvider::clear_cache();
        assert_eq!(FastEmbedProvider::cache_size(), 0);
        Ok(())
    }
}
