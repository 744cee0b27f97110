//! Local model server source.
//!
//! Reads shape fields from the server's `POST /api/show` response. Keys in
//! `model_info` are prefixed by the architecture name reported under
//! `general.architecture` (e.g. `llama.embedding_length`).
//!
//! Missing fields are left at zero rather than failing here; the shape is
//! validated before any estimate is made.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::model::provider::{ProviderError, ShapeSource};
use crate::model::shape::ModelShape;

#[derive(Debug, Serialize)]
struct ShowRequest<'a> {
    model: &'a str,
}

/// The part of the show response we read; everything else is ignored.
#[derive(Debug, Deserialize)]
pub struct ShowResponse {
    #[serde(default)]
    pub model_info: Map<String, Value>,
}

/// Build a shape from a `model_info` map.
pub fn shape_from_model_info(model: &str, info: &Map<String, Value>) -> ModelShape {
    let arch = info
        .get("general.architecture")
        .and_then(Value::as_str)
        .unwrap_or("llama");

    let field = |key: &str| -> Option<u64> {
        let value = info.get(&format!("{arch}.{key}"))?;
        value.as_u64().or_else(|| value.as_f64().map(|f| f as u64))
    };
    let required = |key: &str| -> u32 {
        match field(key) {
            Some(v) => u32::try_from(v).unwrap_or(u32::MAX),
            None => {
                warn!(model, field = %format!("{arch}.{key}"), "Local model metadata missing field");
                0
            }
        }
    };

    let num_params = match info.get("general.parameter_count").and_then(Value::as_f64) {
        Some(count) => count / 1e9,
        None => {
            warn!(model, field = "general.parameter_count", "Local model metadata missing field");
            0.0
        }
    };

    let num_attention_heads = required("attention.head_count");
    let num_key_value_heads = field("attention.head_count_kv")
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
        .unwrap_or(num_attention_heads);
    // Not every server build reports the layer count; zero is caught by validation.
    let num_hidden_layers = field("block_count")
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
        .unwrap_or(0);

    ModelShape {
        num_params,
        max_context_length: required("context_length"),
        num_hidden_layers,
        hidden_size: required("embedding_length"),
        num_attention_heads,
        num_key_value_heads,
        intermediate_size: required("feed_forward_length"),
        vocab_size: required("vocab_size"),
    }
}

/// Shape source backed by the local model server.
pub struct OllamaSource {
    client: Client,
    host: String,
}

impl OllamaSource {
    pub fn new(client: Client, host: &str) -> Self {
        Self {
            client,
            host: host.trim_end_matches('/').to_string(),
        }
    }

    pub fn show_url(&self) -> String {
        format!("{}/api/show", self.host)
    }
}

#[async_trait]
impl ShapeSource for OllamaSource {
    async fn fetch(&self, model_id: &str, _token: Option<&str>) -> Result<ModelShape, ProviderError> {
        let url = self.show_url();
        let fetch_error = |reason: String| ProviderError::ConfigFetch {
            url: url.clone(),
            reason,
        };

        let response = self
            .client
            .post(&url)
            .json(&ShowRequest { model: model_id })
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(fetch_error(format!("HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let show: ShowResponse =
            serde_json::from_slice(&body).map_err(|source| ProviderError::ConfigParse {
                model: model_id.to_string(),
                document: "api/show".to_string(),
                source,
            })?;

        debug!(model_id, fields = show.model_info.len(), "Read local model metadata");

        Ok(shape_from_model_info(model_id, &show.model_info))
    }
}
