//! Text-to-vector embedding.
//!
//! [`EmbeddingProvider`] is the pluggable backend: the ONNX model in [`local`],
//! feature hashing in [`hashed`], or [`NullProvider`] when nothing is available.
//! Callers never hold a provider directly; they go through [`Embedder`], a shared
//! handle that defers building the backend until the first real request and
//! turns every failure into [`MemoryError::EmbeddingUnavailable`].

pub mod hashed;
pub mod local;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Result;

use crate::config::EmbeddingConfig;
use crate::error::MemoryError;

/// Number of dimensions in stored embedding vectors (all-MiniLM-L6-v2).
pub const EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// Implementations must be pure functions of their input and safe to call from
/// several threads. All methods are synchronous; async callers go through
/// [`embed_with_timeout`].
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Provider used when embeddings are switched off or cannot be loaded.
pub struct NullProvider;

impl EmbeddingProvider for NullProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("no embedding provider configured")
    }
}

/// Build a provider from config. This is the expensive step for `local`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => Ok(Arc::new(local::OnnxProvider::new(config)?)),
        "hash" => Ok(Arc::new(hashed::HashingProvider)),
        "none" => Ok(Arc::new(NullProvider)),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local, hash, none"),
    }
}

type ProviderFactory = Box<dyn Fn() -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync>;

/// Process-wide, lazily initialized embedding handle.
///
/// The backend is built on the first call to [`Embedder::embed`]; status
/// queries ([`Embedder::is_loaded`], [`Embedder::model_id`]) never trigger it.
/// A backend that fails to build stays unavailable for the life of the handle.
pub struct Embedder {
    model_id: String,
    factory: ProviderFactory,
    provider: OnceLock<Option<Arc<dyn EmbeddingProvider>>>,
}

impl Embedder {
    /// Defer provider construction from config until first use.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let config = config.clone();
        let model_id = match config.provider.as_str() {
            "local" => config.model.clone(),
            other => other.to_string(),
        };
        Self {
            model_id,
            factory: Box::new(move || create_provider(&config)),
            provider: OnceLock::new(),
        }
    }

    /// Wrap an already-built provider.
    pub fn with_provider(model_id: impl Into<String>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Some(provider));
        Self {
            model_id: model_id.into(),
            factory: Box::new(|| Ok(Arc::new(NullProvider) as Arc<dyn EmbeddingProvider>)),
            provider: cell,
        }
    }

    /// A handle that always reports unavailable; every caller takes the keyword path.
    pub fn unavailable() -> Self {
        Self::with_provider("none", Arc::new(NullProvider))
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Whether the backend has been built. Does not build it.
    pub fn is_loaded(&self) -> bool {
        matches!(self.provider.get(), Some(Some(_)))
    }

    fn provider(&self) -> Option<&Arc<dyn EmbeddingProvider>> {
        self.provider
            .get_or_init(|| match (self.factory)() {
                Ok(provider) => {
                    tracing::info!(model = %self.model_id, "embedding provider loaded");
                    Some(provider)
                }
                Err(e) => {
                    tracing::warn!(model = %self.model_id, error = %e, "embedding provider unavailable, using keyword fallback");
                    None
                }
            })
            .as_ref()
    }

    /// Embed `text`, returning an L2-normalized vector of [`EMBEDDING_DIM`] floats.
    ///
    /// Wrong dimensionality and all-zero output count as unavailable.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let provider = self
            .provider()
            .ok_or_else(|| MemoryError::EmbeddingUnavailable("provider not loaded".into()))?;

        let vector = provider
            .embed(text)
            .map_err(|e| MemoryError::EmbeddingUnavailable(e.to_string()))?;

        if vector.len() != EMBEDDING_DIM {
            return Err(MemoryError::EmbeddingUnavailable(format!(
                "expected {EMBEDDING_DIM} dimensions, got {}",
                vector.len()
            )));
        }
        if is_zero(&vector) {
            return Err(MemoryError::EmbeddingUnavailable("zero vector".into()));
        }
        Ok(l2_normalize(&vector))
    }
}

/// Embed on the blocking pool, giving up after `timeout`.
///
/// A timed-out call is reported as unavailable; the underlying inference is
/// left to finish in the background and its result is dropped.
pub async fn embed_with_timeout(
    embedder: Arc<Embedder>,
    text: String,
    timeout: Duration,
) -> Result<Vec<f32>, MemoryError> {
    let task = tokio::task::spawn_blocking(move || embedder.embed(&text));
    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined?,
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "embedding timed out");
            Err(MemoryError::EmbeddingUnavailable("timed out".into()))
        }
    }
}

fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0 || !x.is_finite())
}

/// L2-normalize a vector. Returns a zero vector if the input norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(Vec<f32>);

    impl EmbeddingProvider for Fixed {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct Slow;

    impl EmbeddingProvider for Slow {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(vec![1.0; EMBEDDING_DIM])
        }
    }

    #[test]
    fn test_l2_normalize() {
        let normalized = l2_normalize(&[3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn zero_vector_is_unavailable() {
        let embedder = Embedder::with_provider("fixed", Arc::new(Fixed(vec![0.0; EMBEDDING_DIM])));
        assert!(matches!(
            embedder.embed("anything"),
            Err(MemoryError::EmbeddingUnavailable(_))
        ));
    }

    #[test]
    fn wrong_dimensions_are_unavailable() {
        let embedder = Embedder::with_provider("fixed", Arc::new(Fixed(vec![1.0; 12])));
        assert!(embedder.embed("anything").is_err());
    }

    #[test]
    fn output_is_normalized() {
        let embedder = Embedder::with_provider("fixed", Arc::new(Fixed(vec![2.0; EMBEDDING_DIM])));
        let v = embedder.embed("x").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn status_queries_do_not_load_the_model() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let embedder = Embedder {
            model_id: "counting".into(),
            factory: Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(hashed::HashingProvider) as Arc<dyn EmbeddingProvider>)
            }),
            provider: OnceLock::new(),
        };

        assert!(!embedder.is_loaded());
        assert_eq!(embedder.model_id(), "counting");
        assert_eq!(builds.load(Ordering::SeqCst), 0);

        embedder.embed("first call").unwrap();
        embedder.embed("second call").unwrap();
        assert!(embedder.is_loaded());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_falls_back_to_unavailable() {
        let config = EmbeddingConfig {
            provider: "local".into(),
            cache_dir: "/nonexistent/mnemograph-models".into(),
            ..EmbeddingConfig::default()
        };
        let embedder = Embedder::from_config(&config);
        assert!(matches!(
            embedder.embed("hello"),
            Err(MemoryError::EmbeddingUnavailable(_))
        ));
        assert!(!embedder.is_loaded());
    }

    #[tokio::test]
    async fn timeout_reports_unavailable() {
        let embedder = Arc::new(Embedder::with_provider("slow", Arc::new(Slow)));
        let res = embed_with_timeout(embedder, "text".into(), Duration::from_millis(20)).await;
        assert!(matches!(res, Err(MemoryError::EmbeddingUnavailable(_))));
    }
}
