//! KV-cache precision levels and the derived per-estimate precision triple.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::MemoryConfig;

/// Quantisation applied to the KV cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KvCacheQuant {
    /// 16-bit float (unquantised).
    Fp16,
    /// 8-bit block quantisation.
    Q8_0,
    /// 4-bit block quantisation.
    Q4_0,
}

impl KvCacheQuant {
    /// All levels, most precise first.
    pub const ALL: [KvCacheQuant; 3] = [KvCacheQuant::Fp16, KvCacheQuant::Q8_0, KvCacheQuant::Q4_0];

    /// Bits stored per KV element.
    pub fn bits(&self) -> u32 {
        match self {
            KvCacheQuant::Fp16 => 16,
            KvCacheQuant::Q8_0 => 8,
            KvCacheQuant::Q4_0 => 4,
        }
    }
}

impl fmt::Display for KvCacheQuant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvCacheQuant::Fp16 => write!(f, "fp16"),
            KvCacheQuant::Q8_0 => write!(f, "q8_0"),
            KvCacheQuant::Q4_0 => write!(f, "q4_0"),
        }
    }
}

impl FromStr for KvCacheQuant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fp16" | "f16" => Ok(KvCacheQuant::Fp16),
            "q8_0" | "q8" => Ok(KvCacheQuant::Q8_0),
            "q4_0" | "q4" => Ok(KvCacheQuant::Q4_0),
            other => Err(format!(
                "unknown KV cache quantisation '{other}' (expected fp16, q8_0 or q4_0)"
            )),
        }
    }
}

/// Weight, LM-head and KV-cache bits per element for one estimate.
///
/// Only built through [`Precision::derive`]; the LM-head width follows the
/// weight width and is never chosen independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Precision {
    weight_bpw: f64,
    lm_head_bpw: f64,
    kv_cache_bpw: f64,
}

impl Precision {
    /// Derive the triple from a weight BPW and KV-cache level.
    ///
    /// Weights above `lm_head_threshold_bpw` get the high-precision LM head.
    pub fn derive(weight_bpw: f64, kv_cache: KvCacheQuant, config: &MemoryConfig) -> Self {
        let lm_head_bpw = if weight_bpw > config.lm_head_threshold_bpw {
            config.lm_head_high_bpw
        } else {
            config.lm_head_low_bpw
        };

        Self {
            weight_bpw,
            lm_head_bpw,
            kv_cache_bpw: f64::from(kv_cache.bits()),
        }
    }

    pub fn weight_bpw(&self) -> f64 {
        self.weight_bpw
    }

    pub fn lm_head_bpw(&self) -> f64 {
        self.lm_head_bpw
    }

    pub fn kv_cache_bpw(&self) -> f64 {
        self.kv_cache_bpw
    }
}
