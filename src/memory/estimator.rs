//! Inference VRAM model.
//!
//! Sums five groups, each in bytes:
//! - fixed per-GPU runtime overhead
//! - parameter storage at the weight BPW
//! - KV cache at the KV-cache BPW (scaled by the KV-head ratio under GQA)
//! - one forward pass of attention, feed-forward and layer-norm activations
//! - the output (LM-head) projection
//!
//! The total is reported in GiB (bytes / 2^30). Term order is fixed so
//! results stay bit-identical with previously published estimates.

use serde::Serialize;

use crate::config::MemoryConfig;
use crate::model::shape::ModelShape;
use crate::quant::precision::{KvCacheQuant, Precision};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Estimate split by term group, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryBreakdown {
    pub overhead: f64,
    pub parameters: f64,
    pub activations: f64,
    pub output: f64,
    pub kv_cache: f64,
}

impl MemoryBreakdown {
    /// Sum in bytes.
    pub fn total_bytes(&self) -> f64 {
        self.overhead + self.parameters + self.activations + self.output + self.kv_cache
    }

    /// Sum in GiB.
    pub fn total_gb(&self) -> f64 {
        self.total_bytes() / BYTES_PER_GIB
    }
}

/// The memory model. Pure: no I/O, no errors.
///
/// Callers validate the shape first ([`ModelShape::validate`]); zero heads or
/// hidden size produce NaN/inf here.
#[derive(Debug, Clone, Default)]
pub struct MemoryModel {
    config: MemoryConfig,
}

impl MemoryModel {
    pub fn new(config: MemoryConfig) -> Self {
        Self { config }
    }

    /// Precision triple for a weight BPW and KV-cache level.
    pub fn precision(&self, weight_bpw: f64, kv_cache: KvCacheQuant) -> Precision {
        Precision::derive(weight_bpw, kv_cache, &self.config)
    }

    /// Estimated VRAM in GiB.
    pub fn estimate(
        &self,
        shape: &ModelShape,
        precision: &Precision,
        context: u32,
        num_gpus: u32,
        grouped_query_attention: bool,
    ) -> f64 {
        self.breakdown(shape, precision, context, num_gpus, grouped_query_attention)
            .total_gb()
    }

    /// Estimated VRAM split by term group.
    pub fn breakdown(
        &self,
        shape: &ModelShape,
        precision: &Precision,
        context: u32,
        num_gpus: u32,
        grouped_query_attention: bool,
    ) -> MemoryBreakdown {
        let ctx = f64::from(context);
        let hidden = f64::from(shape.hidden_size);
        let heads = f64::from(shape.num_attention_heads);
        let kv_heads = f64::from(shape.num_key_value_heads);
        let layers = f64::from(shape.num_hidden_layers);
        let intermediate = f64::from(shape.intermediate_size);
        let vocab = f64::from(shape.vocab_size);

        let bytes_per_param = precision.weight_bpw() / 8.0;
        let lm_head_bytes = precision.lm_head_bpw() / 8.0;
        let head_dim = shape.head_dim();

        let overhead = self.config.per_gpu_overhead_bytes as f64 * f64::from(num_gpus);
        let parameters = shape.num_params * 1e9 * bytes_per_param;

        let mut kv_cache = ctx * 2.0 * layers * hidden * (precision.kv_cache_bpw() / 8.0);
        if grouped_query_attention {
            kv_cache *= kv_heads / heads;
        }

        // Attention block.
        let attention_input = bytes_per_param * ctx * hidden;
        let q = bytes_per_param * ctx * head_dim * heads;
        let k = bytes_per_param * ctx * head_dim * kv_heads;
        let v = bytes_per_param * ctx * head_dim * kv_heads;
        let softmax_output = lm_head_bytes * heads * ctx;
        let softmax_dropout_mask = lm_head_bytes * heads * ctx;
        let dropout_output = lm_head_bytes * heads * ctx;
        let out_proj_input = lm_head_bytes * ctx * heads * head_dim;
        // Unscaled element count: one byte per element.
        let attention_dropout = ctx * hidden;
        let attention_block = attention_input
            + q
            + k
            + softmax_output
            + v
            + out_proj_input
            + softmax_dropout_mask
            + dropout_output
            + attention_dropout;

        // Feed-forward block.
        let mlp_input = bytes_per_param * ctx * hidden;
        let activation_input = bytes_per_param * ctx * intermediate;
        let down_proj_input = bytes_per_param * ctx * intermediate;
        let dropout_mask = ctx * hidden;
        let mlp_block = mlp_input + activation_input + down_proj_input + dropout_mask;

        let layer_norms = bytes_per_param * ctx * hidden * 2.0;

        let activations = attention_block + mlp_block + layer_norms;
        let output = lm_head_bytes * ctx * vocab;

        MemoryBreakdown {
            overhead,
            parameters,
            activations,
            output,
            kv_cache,
        }
    }
}
