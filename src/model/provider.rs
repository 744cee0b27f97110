//! Model shape provider: resolves a model reference to its [`ModelShape`].
//!
//! Shapes come from one of two [`ShapeSource`]s (remote store or local model
//! server) and are cached in memory for the lifetime of the provider.
//! Concurrent misses for the same model share a single fetch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::model::disk_cache::DiskCache;
use crate::model::hub::HubSource;
use crate::model::ollama::OllamaSource;
use crate::model::shape::ModelShape;
use crate::model::source::ModelRef;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to fetch {url}: {reason}")]
    ConfigFetch { url: String, reason: String },

    #[error("Failed to parse {document} for {model}: {source}")]
    ConfigParse {
        model: String,
        document: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid model identifier: {0}")]
    InvalidModelId(String),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A place model shapes can be read from.
#[async_trait]
pub trait ShapeSource: Send + Sync {
    /// Fetch the shape of `model_id`. Called at most once per model per provider.
    async fn fetch(&self, model_id: &str, token: Option<&str>) -> Result<ModelShape, ProviderError>;
}

/// Shapes held in memory, keyed by model id. Useful offline and in tests.
#[derive(Debug, Default)]
pub struct StaticSource {
    shapes: HashMap<String, ModelShape>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shape(mut self, model_id: impl Into<String>, shape: ModelShape) -> Self {
        self.shapes.insert(model_id.into(), shape);
        self
    }
}

#[async_trait]
impl ShapeSource for StaticSource {
    async fn fetch(&self, model_id: &str, _token: Option<&str>) -> Result<ModelShape, ProviderError> {
        self.shapes
            .get(model_id)
            .cloned()
            .ok_or_else(|| ProviderError::ConfigFetch {
                url: format!("static://{model_id}"),
                reason: "model not registered".to_string(),
            })
    }
}

/// Resolves and caches model shapes.
pub struct ModelConfigProvider {
    remote: Box<dyn ShapeSource>,
    local: Box<dyn ShapeSource>,
    shapes: RwLock<HashMap<String, Arc<OnceCell<ModelShape>>>>,
}

impl ModelConfigProvider {
    /// Provider backed by the remote store (with disk mirror) and the local server.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("vram-estimator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::ConfigFetch {
                url: config.hub_endpoint.clone(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        let remote = HubSource::new(
            client.clone(),
            &config.hub_endpoint,
            &config.hub_revision,
            DiskCache::new(&config.cache_dir),
        );
        let local = OllamaSource::new(client, &config.ollama_host);

        Ok(Self::with_sources(Box::new(remote), Box::new(local)))
    }

    /// Provider over explicit sources.
    pub fn with_sources(remote: Box<dyn ShapeSource>, local: Box<dyn ShapeSource>) -> Self {
        Self {
            remote,
            local,
            shapes: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a model's shape, fetching it on first use.
    ///
    /// Failed fetches are not cached. A caller-supplied layer count on a
    /// local reference replaces whatever the server reported.
    pub async fn resolve(
        &self,
        model: &ModelRef,
        token: Option<&str>,
    ) -> Result<ModelShape, ProviderError> {
        let cell = self.cell_for(&model.cache_key()).await;

        let shape = cell
            .get_or_try_init(|| async {
                let source = if model.is_local() { &self.local } else { &self.remote };
                let shape = source.fetch(model.id(), token).await?;
                debug!(
                    model = %model,
                    params_b = shape.num_params,
                    layers = shape.num_hidden_layers,
                    max_context = shape.max_context_length,
                    "Resolved model shape"
                );
                Ok::<_, ProviderError>(shape)
            })
            .await?;

        let mut shape = shape.clone();
        if let ModelRef::Local {
            layers: Some(layers),
            ..
        } = model
        {
            shape.num_hidden_layers = *layers;
        }
        Ok(shape)
    }

    /// Whether a model's shape is already held in memory.
    pub async fn is_cached(&self, model: &ModelRef) -> bool {
        let shapes = self.shapes.read().await;
        shapes
            .get(&model.cache_key())
            .is_some_and(|cell| cell.initialized())
    }

    /// Find or insert the once-cell for a key. Reads take the shared lock.
    async fn cell_for(&self, key: &str) -> Arc<OnceCell<ModelShape>> {
        {
            let shapes = self.shapes.read().await;
            if let Some(cell) = shapes.get(key) {
                if cell.initialized() {
                    debug!(key, "Shape cache hit");
                }
                return cell.clone();
            }
        }

        let mut shapes = self.shapes.write().await;
        shapes
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::shape::stub_shape_llama3_8b;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts fetches and fails the first `fail_first` of them.
    struct CountingSource {
        calls: Arc<AtomicUsize>,
        fail_first: usize,
    }

    #[async_trait]
    impl ShapeSource for CountingSource {
        async fn fetch(&self, model_id: &str, _token: Option<&str>) -> Result<ModelShape, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if n < self.fail_first {
                return Err(ProviderError::ConfigFetch {
                    url: model_id.to_string(),
                    reason: "503".to_string(),
                });
            }
            Ok(stub_shape_llama3_8b())
        }
    }

    fn counting_provider(fail_first: usize) -> (ModelConfigProvider, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let remote = CountingSource {
            calls: calls.clone(),
            fail_first,
        };
        let provider =
            ModelConfigProvider::with_sources(Box::new(remote), Box::new(StaticSource::new()));
        (provider, calls)
    }

    #[tokio::test]
    async fn test_second_resolve_is_cached() {
        let (provider, calls) = counting_provider(0);
        let model = ModelRef::remote("org/model");

        assert!(!provider.is_cached(&model).await);
        let a = provider.resolve(&model, None).await.unwrap();
        let b = provider.resolve(&model, None).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(provider.is_cached(&model).await);
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let (provider, calls) = counting_provider(0);
        let model = ModelRef::remote("org/model");

        let (a, b, c) = tokio::join!(
            provider.resolve(&model, None),
            provider.resolve(&model, None),
            provider.resolve(&model, None),
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_not_cached() {
        let (provider, calls) = counting_provider(1);
        let model = ModelRef::remote("org/model");

        assert!(matches!(
            provider.resolve(&model, None).await,
            Err(ProviderError::ConfigFetch { .. })
        ));
        assert!(!provider.is_cached(&model).await);

        assert!(provider.resolve(&model, None).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_local_layer_override() {
        let mut shape = stub_shape_llama3_8b();
        shape.num_hidden_layers = 0;
        let local = StaticSource::new().with_shape("llama3:8b", shape);
        let provider =
            ModelConfigProvider::with_sources(Box::new(StaticSource::new()), Box::new(local));

        let bare = provider.resolve(&ModelRef::local("llama3:8b"), None).await.unwrap();
        assert_eq!(bare.num_hidden_layers, 0);

        let model = ModelRef::local("llama3:8b").with_layers(32);
        let fixed = provider.resolve(&model, None).await.unwrap();
        assert_eq!(fixed.num_hidden_layers, 32);
    }

    #[tokio::test]
    async fn test_sources_are_dispatched_by_reference() {
        let remote = StaticSource::new().with_shape("org/model", stub_shape_llama3_8b());
        let provider =
            ModelConfigProvider::with_sources(Box::new(remote), Box::new(StaticSource::new()));

        assert!(provider.resolve(&ModelRef::remote("org/model"), None).await.is_ok());
        assert!(provider.resolve(&ModelRef::local("org/model"), None).await.is_err());
    }
}
