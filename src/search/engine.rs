//! Search engine: VRAM estimate, context-for-budget and quantisation-for-budget.
//!
//! Every operation resolves the model shape through the provider (cached),
//! validates it, and evaluates the pure [`MemoryModel`]. The searches are
//! plain loops over in-memory arithmetic and always run to completion.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::config::SearchConfig;
use crate::memory::estimator::{MemoryBreakdown, MemoryModel};
use crate::model::provider::{ModelConfigProvider, ProviderError};
use crate::model::shape::{ModelShape, ShapeError};
use crate::model::source::ModelRef;
use crate::quant::catalog::{resolve_bpw, QuantCatalog, QuantError};
use crate::quant::precision::{KvCacheQuant, Precision};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Quant(#[from] QuantError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("Invalid memory budget: {0} GB")]
    InvalidBudget(f64),

    #[error("No {what} fits in {budget_gb:.2} GB (smallest tried: {smallest} needs {vram_gb:.2} GB)")]
    SearchExhausted {
        what: &'static str,
        smallest: String,
        vram_gb: f64,
        budget_gb: f64,
    },
}

/// Outcome of a budget search.
///
/// When nothing fits, `value` is the cheapest candidate tried and `fits` is
/// false.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult<T> {
    pub value: T,
    pub vram_gb: f64,
    pub fits: bool,
}

/// Estimate, max context and best quantisation for one model/budget pair.
#[derive(Debug, Clone, Serialize)]
pub struct EstimateSummary {
    pub model: String,
    pub context: u32,
    pub vram_gb: f64,
    pub budget_gb: f64,
    pub max_context: SearchResult<u32>,
    pub best_quant: SearchResult<String>,
}

/// An estimate at the resolved context, with its per-term breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct VramEstimate {
    pub context: u32,
    pub vram_gb: f64,
    pub breakdown_bytes: MemoryBreakdown,
}

/// Estimates and searches over resolved model shapes.
pub struct SearchEngine {
    provider: Arc<ModelConfigProvider>,
    memory: MemoryModel,
    settings: SearchConfig,
}

impl SearchEngine {
    pub fn new(provider: Arc<ModelConfigProvider>, memory: MemoryModel, settings: SearchConfig) -> Self {
        Self {
            provider,
            memory,
            settings,
        }
    }

    pub fn settings(&self) -> &SearchConfig {
        &self.settings
    }

    pub fn memory(&self) -> &MemoryModel {
        &self.memory
    }

    /// Resolve and validate a model's shape.
    pub async fn resolve_shape(
        &self,
        model: &ModelRef,
        token: Option<&str>,
    ) -> Result<ModelShape, EngineError> {
        let shape = self.provider.resolve(model, token).await?;
        shape.validate(model.id())?;
        Ok(shape)
    }

    /// Estimated VRAM (GiB). `context == 0` means the model's maximum.
    pub async fn estimate_vram(
        &self,
        model: &ModelRef,
        bpw: &str,
        context: u32,
        kv_cache: KvCacheQuant,
        token: Option<&str>,
    ) -> Result<f64, EngineError> {
        Ok(self
            .estimate_detailed(model, bpw, context, kv_cache, token)
            .await?
            .vram_gb)
    }

    /// Like [`estimate_vram`](Self::estimate_vram), also reporting the
    /// context actually used and the per-term breakdown.
    pub async fn estimate_detailed(
        &self,
        model: &ModelRef,
        bpw: &str,
        context: u32,
        kv_cache: KvCacheQuant,
        token: Option<&str>,
    ) -> Result<VramEstimate, EngineError> {
        let weight_bpw = resolve_bpw(bpw)?;
        let shape = self.resolve_shape(model, token).await?;
        let context = effective_context(model, &shape, context)?;

        let precision = self.memory.precision(weight_bpw, kv_cache);
        let breakdown = self.breakdown_shape(&shape, &precision, context);
        Ok(VramEstimate {
            context,
            vram_gb: breakdown.total_gb(),
            breakdown_bytes: breakdown,
        })
    }

    /// Largest context whose estimate fits `budget_gb`.
    pub async fn max_context_for_budget(
        &self,
        model: &ModelRef,
        budget_gb: f64,
        bpw: &str,
        kv_cache: KvCacheQuant,
        token: Option<&str>,
    ) -> Result<SearchResult<u32>, EngineError> {
        check_budget(budget_gb)?;
        let weight_bpw = resolve_bpw(bpw)?;
        let shape = self.resolve_shape(model, token).await?;

        let precision = self.memory.precision(weight_bpw, kv_cache);
        let result = self.max_context_for_shape(model, &shape, &precision, budget_gb)?;
        found(result, "context", budget_gb)
    }

    /// Most precise catalogue entry whose estimate fits `budget_gb`.
    /// `context == 0` means the model's maximum.
    pub async fn best_quantisation_for_budget(
        &self,
        model: &ModelRef,
        budget_gb: f64,
        context: u32,
        kv_cache: KvCacheQuant,
        catalog: QuantCatalog,
        token: Option<&str>,
    ) -> Result<SearchResult<String>, EngineError> {
        check_budget(budget_gb)?;
        let shape = self.resolve_shape(model, token).await?;
        let context = effective_context(model, &shape, context)?;

        let result = self.best_quant_for_shape(&shape, kv_cache, context, budget_gb, catalog);
        found(result, "quantisation", budget_gb)
    }

    /// Estimate, max context and best quantisation in one call.
    ///
    /// Unlike the individual searches, an exhausted search is reported as
    /// `fits: false` rather than an error.
    #[allow(clippy::too_many_arguments)]
    pub async fn estimate_all(
        &self,
        model: &ModelRef,
        budget_gb: f64,
        bpw: &str,
        context: u32,
        kv_cache: KvCacheQuant,
        catalog: QuantCatalog,
        token: Option<&str>,
    ) -> Result<EstimateSummary, EngineError> {
        check_budget(budget_gb)?;
        let weight_bpw = resolve_bpw(bpw)?;
        let shape = self.resolve_shape(model, token).await?;
        let context = effective_context(model, &shape, context)?;

        let precision = self.memory.precision(weight_bpw, kv_cache);
        let vram_gb = self.estimate_shape(&shape, &precision, context);
        let max_context = self.max_context_for_shape(model, &shape, &precision, budget_gb)?;
        let best_quant = self.best_quant_for_shape(&shape, kv_cache, context, budget_gb, catalog);

        Ok(EstimateSummary {
            model: model.to_string(),
            context,
            vram_gb,
            budget_gb,
            max_context,
            best_quant,
        })
    }

    /// Estimate for an already-resolved shape, using the configured GPU
    /// count and GQA setting.
    pub fn estimate_shape(&self, shape: &ModelShape, precision: &Precision, context: u32) -> f64 {
        self.memory.estimate(
            shape,
            precision,
            context,
            self.settings.num_gpus,
            self.settings.grouped_query_attention,
        )
    }

    pub fn breakdown_shape(&self, shape: &ModelShape, precision: &Precision, context: u32) -> MemoryBreakdown {
        self.memory.breakdown(
            shape,
            precision,
            context,
            self.settings.num_gpus,
            self.settings.grouped_query_attention,
        )
    }

    /// Binary search over `[min_context, max_context_length]` for the largest
    /// fitting context, then step forward by `refine_step` while the next
    /// step still fits.
    ///
    /// Relies on the estimate being non-decreasing in context.
    pub fn max_context_for_shape(
        &self,
        model: &ModelRef,
        shape: &ModelShape,
        precision: &Precision,
        budget_gb: f64,
    ) -> Result<SearchResult<u32>, EngineError> {
        let max = shape.max_context_length;
        if max == 0 {
            return Err(missing_max_context(model).into());
        }
        let min = self.settings.min_context.min(max);
        let estimate = |context: u32| self.estimate_shape(shape, precision, context);

        let floor_gb = estimate(min);
        if floor_gb > budget_gb {
            debug!(model = %model, min, floor_gb, budget_gb, "No context fits");
            return Ok(SearchResult {
                value: min,
                vram_gb: floor_gb,
                fits: false,
            });
        }

        let (mut low, mut high) = (min, max);
        while low < high {
            let mid = low + (high - low + 1) / 2;
            if estimate(mid) > budget_gb {
                high = mid - 1;
            } else {
                low = mid;
            }
        }

        let step = self.settings.refine_step.max(1);
        let mut context = low;
        while let Some(next) = context.checked_add(step).filter(|&n| n <= max) {
            if estimate(next) > budget_gb {
                break;
            }
            context = next;
        }

        let vram_gb = estimate(context);
        debug!(model = %model, context, vram_gb, budget_gb, "Max context found");

        Ok(SearchResult {
            value: context,
            vram_gb,
            fits: true,
        })
    }

    /// First catalogue entry (highest BPW first) that fits.
    pub fn best_quant_for_shape(
        &self,
        shape: &ModelShape,
        kv_cache: KvCacheQuant,
        context: u32,
        budget_gb: f64,
        catalog: QuantCatalog,
    ) -> SearchResult<String> {
        let mut cheapest = SearchResult {
            value: String::new(),
            vram_gb: f64::INFINITY,
            fits: false,
        };

        for entry in catalog.entries() {
            let precision = self.memory.precision(entry.bpw, kv_cache);
            let vram_gb = self.estimate_shape(shape, &precision, context);
            if vram_gb <= budget_gb {
                debug!(quant = %entry.name, vram_gb, budget_gb, "Best quantisation found");
                return SearchResult {
                    value: entry.name.clone(),
                    vram_gb,
                    fits: true,
                };
            }
            cheapest.value.clone_from(&entry.name);
            cheapest.vram_gb = vram_gb;
        }

        cheapest
    }
}

/// Resolve the `0 = model maximum` context sentinel.
fn effective_context(model: &ModelRef, shape: &ModelShape, context: u32) -> Result<u32, ShapeError> {
    match context {
        0 if shape.max_context_length == 0 => Err(missing_max_context(model)),
        0 => Ok(shape.max_context_length),
        c => Ok(c),
    }
}

fn missing_max_context(model: &ModelRef) -> ShapeError {
    ShapeError::InvariantViolation {
        model: model.to_string(),
        field: "max_context_length",
        reason: "must be > 0 to search or default the context".to_string(),
    }
}

fn check_budget(budget_gb: f64) -> Result<(), EngineError> {
    if budget_gb.is_finite() && budget_gb > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidBudget(budget_gb))
    }
}

/// Turn a non-fitting result into `SearchExhausted`.
fn found<T: ToString>(
    result: SearchResult<T>,
    what: &'static str,
    budget_gb: f64,
) -> Result<SearchResult<T>, EngineError> {
    if result.fits {
        Ok(result)
    } else {
        Err(EngineError::SearchExhausted {
            what,
            smallest: result.value.to_string(),
            vram_gb: result.vram_gb,
            budget_gb,
        })
    }
}
