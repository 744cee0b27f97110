//! In-process mock servers for the remote model store and the local model server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use vram_estimator::config::ProviderConfig;

pub const LLAMA_CONFIG: &str = r#"{
    "architectures": ["LlamaForCausalLM"],
    "hidden_size": 4096,
    "intermediate_size": 14336,
    "max_position_embeddings": 131072,
    "num_attention_heads": 32,
    "num_hidden_layers": 32,
    "num_key_value_heads": 8,
    "torch_dtype": "bfloat16",
    "vocab_size": 128256
}"#;

/// 16e9 bytes at 2 bytes/param = 8.0B parameters.
pub const LLAMA_INDEX: &str = r#"{"metadata": {"total_size": 16000000000}, "weight_map": {}}"#;

/// Path → (status, body) document store.
#[derive(Default)]
pub struct MockStore {
    docs: HashMap<String, (u16, String)>,
    pub hits: AtomicUsize,
    pub last_auth: Mutex<Option<String>>,
}

impl MockStore {
    pub fn with_doc(mut self, path: &str, status: u16, body: &str) -> Self {
        self.docs.insert(path.to_string(), (status, body.to_string()));
        self
    }

    /// Both documents for a model at revision `main`.
    pub fn with_model(self, model_id: &str, config: &str, index: &str) -> Self {
        self.with_doc(&format!("/{model_id}/resolve/main/config.json"), 200, config)
            .with_doc(
                &format!("/{model_id}/resolve/main/model.safetensors.index.json"),
                200,
                index,
            )
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn serve_doc(
    State(store): State<Arc<MockStore>>,
    uri: Uri,
    headers: HeaderMap,
) -> (StatusCode, String) {
    store.hits.fetch_add(1, Ordering::SeqCst);
    if let Some(auth) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        *store.last_auth.lock().unwrap() = Some(auth.to_string());
    }
    match store.docs.get(uri.path()) {
        Some((status, body)) => (StatusCode::from_u16(*status).unwrap(), body.clone()),
        None => (StatusCode::NOT_FOUND, "not found".to_string()),
    }
}

/// Serve a mock store on an ephemeral port; returns its base URL.
pub async fn spawn_store(store: Arc<MockStore>) -> String {
    let router = Router::new().fallback(serve_doc).with_state(store);
    spawn(router).await
}

/// Model name → `model_info` map.
#[derive(Default)]
pub struct MockOllama {
    models: HashMap<String, Value>,
    pub hits: AtomicUsize,
}

impl MockOllama {
    pub fn with_model(mut self, name: &str, model_info: Value) -> Self {
        self.models.insert(name.to_string(), model_info);
        self
    }
}

async fn show(
    State(server): State<Arc<MockOllama>>,
    Json(request): Json<Value>,
) -> (StatusCode, Json<Value>) {
    server.hits.fetch_add(1, Ordering::SeqCst);
    let name = request["model"].as_str().unwrap_or_default();
    match server.models.get(name) {
        Some(info) => (
            StatusCode::OK,
            Json(json!({
                "modelfile": "# Modelfile",
                "details": {"format": "gguf", "quantization_level": "Q4_K_M"},
                "model_info": info,
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("model '{name}' not found")})),
        ),
    }
}

pub async fn spawn_ollama(server: Arc<MockOllama>) -> String {
    let router = Router::new().route("/api/show", post(show)).with_state(server);
    spawn(router).await
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn provider_config(hub: &str, ollama: &str, cache_dir: &Path) -> ProviderConfig {
    ProviderConfig {
        hub_endpoint: hub.to_string(),
        hub_revision: "main".to_string(),
        ollama_host: ollama.to_string(),
        cache_dir: cache_dir.to_path_buf(),
        timeout_secs: 5,
    }
}

pub fn llama_model_info() -> Value {
    json!({
        "general.architecture": "llama",
        "general.parameter_count": 8000000000u64,
        "llama.context_length": 131072,
        "llama.embedding_length": 4096,
        "llama.attention.head_count": 32,
        "llama.attention.head_count_kv": 8,
        "llama.feed_forward_length": 14336,
        "llama.vocab_size": 128256,
        "llama.block_count": 32
    })
}
