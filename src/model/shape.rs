//! Architectural shape of a transformer model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("Invalid shape for {model}: {field} {reason}")]
    InvariantViolation {
        model: String,
        field: &'static str,
        reason: String,
    },
}

/// The dimensions of a transformer needed to estimate its memory use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelShape {
    /// Parameter count in billions.
    pub num_params: f64,

    /// Context length the model was trained with.
    pub max_context_length: u32,

    /// Number of transformer layers.
    pub num_hidden_layers: u32,

    /// Embedding / hidden dimension.
    pub hidden_size: u32,

    /// Number of query heads.
    pub num_attention_heads: u32,

    /// Number of KV heads (< query heads under GQA/MQA).
    pub num_key_value_heads: u32,

    /// Feed-forward inner dimension.
    pub intermediate_size: u32,

    /// Vocabulary size.
    pub vocab_size: u32,
}

impl ModelShape {
    /// Check the invariants the memory model depends on.
    ///
    /// Heads and hidden size are divisors; a zero layer count (the local
    /// metadata gap) silently zeroes the KV cache and is rejected too.
    pub fn validate(&self, model: &str) -> Result<(), ShapeError> {
        let violation = |field: &'static str, reason: String| ShapeError::InvariantViolation {
            model: model.to_string(),
            field,
            reason,
        };

        if self.num_attention_heads == 0 {
            return Err(violation("num_attention_heads", "must be > 0".into()));
        }
        if self.hidden_size == 0 {
            return Err(violation("hidden_size", "must be > 0".into()));
        }
        if self.num_hidden_layers == 0 {
            return Err(violation(
                "num_hidden_layers",
                "must be > 0 (not reported by the source; supply it explicitly)".into(),
            ));
        }
        if self.num_key_value_heads > self.num_attention_heads {
            return Err(violation(
                "num_key_value_heads",
                format!(
                    "({}) exceeds num_attention_heads ({})",
                    self.num_key_value_heads, self.num_attention_heads
                ),
            ));
        }
        if !self.num_params.is_finite() || self.num_params < 0.0 {
            return Err(violation("num_params", format!("({}) is not a valid count", self.num_params)));
        }

        Ok(())
    }

    /// Head dimension (`hidden_size / num_attention_heads`).
    pub fn head_dim(&self) -> f64 {
        f64::from(self.hidden_size) / f64::from(self.num_attention_heads)
    }
}

/// Shape of Llama-3.1-8B, for testing without network access.
pub fn stub_shape_llama3_8b() -> ModelShape {
    ModelShape {
        num_params: 8.0,
        max_context_length: 131072,
        num_hidden_layers: 32,
        hidden_size: 4096,
        num_attention_heads: 32,
        num_key_value_heads: 8,
        intermediate_size: 14336,
        vocab_size: 128256,
    }
}

/// Shape of Qwen2.5-14B.
pub fn stub_shape_qwen25_14b() -> ModelShape {
    ModelShape {
        num_params: 14.77,
        max_context_length: 32768,
        num_hidden_layers: 48,
        hidden_size: 5120,
        num_attention_heads: 40,
        num_key_value_heads: 8,
        intermediate_size: 13824,
        vocab_size: 152064,
    }
}
