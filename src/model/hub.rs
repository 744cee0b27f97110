//! Remote model-hosting store source.
//!
//! Fetches two documents per model:
//! - `config.json`: the architecture document
//! - `model.safetensors.index.json`: tensor index whose `metadata.total_size`
//!   is the serialized byte size of all parameter tensors
//!
//! Both are mirrored to disk (see [`DiskCache`]) and read from there on
//! later runs. The parameter count assumes 2 bytes per stored element.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::model::disk_cache::{DiskCache, CONFIG_FILE, INDEX_FILE};
use crate::model::provider::{ProviderError, ShapeSource};
use crate::model::shape::ModelShape;

/// Remote name of the tensor-index document.
const REMOTE_INDEX_FILE: &str = "model.safetensors.index.json";

/// Bytes per stored tensor element assumed when deriving the parameter count.
const BYTES_PER_STORED_PARAM: f64 = 2.0;

/// Fields read from the architecture document.
#[derive(Debug, Deserialize)]
pub struct HubConfig {
    #[serde(default, alias = "n_positions", alias = "max_sequence_length")]
    pub max_position_embeddings: u32,

    pub num_hidden_layers: u32,

    pub hidden_size: u32,

    pub num_attention_heads: u32,

    /// Absent on plain multi-head attention models.
    #[serde(default)]
    pub num_key_value_heads: Option<u32>,

    pub intermediate_size: u32,

    pub vocab_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct TensorIndex {
    pub metadata: TensorIndexMetadata,
}

#[derive(Debug, Deserialize)]
pub struct TensorIndexMetadata {
    /// Serialized size of all parameter tensors, in bytes.
    pub total_size: f64,
}

/// Build a shape from the two parsed documents.
pub fn shape_from_documents(config: &HubConfig, index: &TensorIndex) -> ModelShape {
    ModelShape {
        num_params: index.metadata.total_size / BYTES_PER_STORED_PARAM / 1e9,
        max_context_length: config.max_position_embeddings,
        num_hidden_layers: config.num_hidden_layers,
        hidden_size: config.hidden_size,
        num_attention_heads: config.num_attention_heads,
        num_key_value_heads: config
            .num_key_value_heads
            .unwrap_or(config.num_attention_heads),
        intermediate_size: config.intermediate_size,
        vocab_size: config.vocab_size,
    }
}

/// Shape source backed by the remote store.
pub struct HubSource {
    client: Client,
    endpoint: String,
    revision: String,
    disk: DiskCache,
}

impl HubSource {
    pub fn new(client: Client, endpoint: &str, revision: &str, disk: DiskCache) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            revision: revision.to_string(),
            disk,
        }
    }

    /// URL of a file at the configured revision.
    pub fn file_url(&self, model_id: &str, file: &str) -> String {
        format!("{}/{model_id}/resolve/{}/{file}", self.endpoint, self.revision)
    }

    /// Load a document from the mirror, or download, validate and mirror it.
    async fn document<T: serde::de::DeserializeOwned>(
        &self,
        model_id: &str,
        remote_file: &str,
        local_file: &str,
        token: Option<&str>,
    ) -> Result<T, ProviderError> {
        let parse = |data: &[u8]| {
            serde_json::from_slice::<T>(data).map_err(|source| ProviderError::ConfigParse {
                model: model_id.to_string(),
                document: local_file.to_string(),
                source,
            })
        };

        let mut corrupt = false;
        if let Some(data) = self.disk.read(model_id, local_file).await? {
            match parse(&data) {
                Ok(doc) => return Ok(doc),
                Err(e) => {
                    warn!(model_id, file = local_file, error = %e, "Mirrored document unreadable, downloading again");
                    corrupt = true;
                }
            }
        }

        let data = self.download(model_id, remote_file, token).await?;
        // Parse before mirroring so a malformed body is never cached.
        let doc = parse(&data)?;
        if corrupt {
            self.disk.replace(model_id, local_file, &data).await?;
        } else {
            self.disk.write(model_id, local_file, &data).await?;
        }
        Ok(doc)
    }

    async fn download(
        &self,
        model_id: &str,
        file: &str,
        token: Option<&str>,
    ) -> Result<Vec<u8>, ProviderError> {
        let url = self.file_url(model_id, file);
        let fetch_error = |reason: String| ProviderError::ConfigFetch {
            url: url.clone(),
            reason,
        };

        let mut request = self.client.get(&url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| fetch_error(e.to_string()))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(fetch_error(format!("HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        debug!(url = %url, size = body.len(), "Downloaded model document");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl ShapeSource for HubSource {
    async fn fetch(&self, model_id: &str, token: Option<&str>) -> Result<ModelShape, ProviderError> {
        // Validates the id before any network traffic.
        self.disk.model_dir(model_id)?;

        let config: HubConfig = self
            .document(model_id, CONFIG_FILE, CONFIG_FILE, token)
            .await?;
        let index: TensorIndex = self
            .document(model_id, REMOTE_INDEX_FILE, INDEX_FILE, token)
            .await?;

        debug!(model_id, total_size = index.metadata.total_size, "Parsed model documents");

        Ok(shape_from_documents(&config, &index))
    }
}
