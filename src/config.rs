//! Runtime configuration for vram-estimator.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! Memory-model constants, provider endpoints and search knobs all live here.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::quant::catalog::QuantCatalog;
use crate::quant::precision::KvCacheQuant;

/// What the CLI computes.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Estimate VRAM for a quantisation and context.
    Vram,
    /// Largest context that fits the memory budget.
    Context,
    /// Most precise quantisation that fits the memory budget.
    Bpw,
    /// Estimate, max context and best quantisation together.
    All,
    /// Estimates across the catalogue × context grid.
    Table,
}

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "vram-estimator", about = "Estimate LLM inference VRAM usage")]
pub struct Cli {
    /// Model identifier: a remote repo id (`org/name`, or `hf:<id>`) or a
    /// local model (`llama3:8b`, or `ollama:<name>`).
    pub model: String,

    /// Calculation mode.
    #[arg(long, value_enum, default_value = "vram")]
    pub mode: Mode,

    /// Weight quantisation: a catalogue key (Q4_K_M) or a literal BPW (4.85).
    #[arg(short, long, default_value = "Q4_K_M")]
    pub quant: String,

    /// KV cache quantisation (fp16, q8_0, q4_0).
    #[arg(long, default_value = "fp16")]
    pub kv_cache: KvCacheQuant,

    /// Available memory budget in GB.
    #[arg(short, long)]
    pub memory: Option<f64>,

    /// Context length in tokens (0 = model maximum).
    #[arg(long, default_value_t = 0)]
    pub context: u32,

    /// Quantisation catalogue searched in `bpw`/`all`/`table` modes.
    #[arg(long, default_value = "gguf")]
    pub catalog: QuantCatalog,

    /// Access token for the remote config store (falls back to HF_TOKEN).
    #[arg(long)]
    pub token: Option<String>,

    /// Transformer layer count for local models whose server does not report it.
    #[arg(long)]
    pub layers: Option<u32>,

    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "vram-estimator.json")]
    pub config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Memory-model constants.
    pub memory: MemoryConfig,

    /// Model shape resolution.
    pub provider: ProviderConfig,

    /// Search settings.
    pub search: SearchConfig,
}

/// Constants of the memory model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Fixed runtime allocation per GPU, in bytes.
    pub per_gpu_overhead_bytes: u64,

    /// Weight BPW above which the LM head is held at `lm_head_high_bpw`.
    pub lm_head_threshold_bpw: f64,

    /// LM-head BPW for high-precision weights.
    pub lm_head_high_bpw: f64,

    /// LM-head BPW otherwise.
    pub lm_head_low_bpw: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            per_gpu_overhead_bytes: 500 * 1024 * 1024, // 500 MiB
            lm_head_threshold_bpw: 6.0,
            lm_head_high_bpw: 8.0,
            lm_head_low_bpw: 6.0,
        }
    }
}

/// Where model shapes come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the remote model-hosting store.
    pub hub_endpoint: String,

    /// Revision the two documents are fetched from.
    pub hub_revision: String,

    /// Base URL of the local model server.
    pub ollama_host: String,

    /// Root of the on-disk document mirror.
    pub cache_dir: PathBuf,

    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            hub_endpoint: "https://huggingface.co".to_string(),
            hub_revision: "main".to_string(),
            ollama_host: "http://127.0.0.1:11434".to_string(),
            cache_dir: default_cache_dir(),
            timeout_secs: 30,
        }
    }
}

/// Default mirror root: `<user cache dir>/vram-estimator/models`.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("vram-estimator")
        .join("models")
}

/// Search and estimate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// GPUs the model is spread across (per-GPU overhead multiplier).
    pub num_gpus: u32,

    /// Scale the KV cache by the KV-head sharing ratio.
    pub grouped_query_attention: bool,

    /// Lower bound of the context search.
    pub min_context: u32,

    /// Step of the forward refinement after the binary search.
    pub refine_step: u32,

    /// Context sizes shown in the result table.
    pub table_contexts: Vec<u32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_gpus: 1,
            grouped_query_attention: true,
            min_context: 512,
            refine_step: 100,
            table_contexts: vec![2048, 8192, 16384, 32768, 49152, 65536],
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            serde_json::from_str::<Config>(&data)?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };

        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            if !host.is_empty() {
                config.provider.ollama_host = normalize_host(&host);
            }
        }

        Ok(config)
    }
}

/// `OLLAMA_HOST` may omit the scheme (`0.0.0.0:11434`).
fn normalize_host(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", host.trim_end_matches('/'))
    }
}

/// Resolve the remote-store access token.
///
/// Priority: explicit value, `HF_TOKEN`, `~/.huggingface/token`.
pub fn resolve_token(explicit: Option<String>) -> Option<String> {
    if let Some(token) = explicit.filter(|t| !t.is_empty()) {
        return Some(token);
    }

    if let Ok(token) = std::env::var("HF_TOKEN") {
        if !token.is_empty() {
            return Some(token);
        }
    }

    let path = dirs::home_dir()?.join(".huggingface").join("token");
    let token = std::fs::read_to_string(path).ok()?;
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}
