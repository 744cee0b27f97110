//! Result table: estimates over a quantisation × context grid.
//!
//! One row per catalogue entry (highest BPW first), one cell per context
//! size, each cell carrying the estimate at all three KV-cache levels.
//! Rendering is left to the caller.

use serde::Serialize;

use crate::model::source::ModelRef;
use crate::quant::catalog::QuantCatalog;
use crate::quant::precision::KvCacheQuant;
use crate::search::engine::{EngineError, SearchEngine};

/// Estimate at one KV-cache level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KvEstimate {
    pub kv_cache: KvCacheQuant,
    pub vram_gb: f64,
    /// `None` when no budget was given.
    pub fits: Option<bool>,
}

/// One context column of a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCell {
    pub context: u32,
    pub estimates: Vec<KvEstimate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub quant: String,
    pub bpw: f64,
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    pub model: String,
    pub catalog: QuantCatalog,
    pub budget_gb: Option<f64>,
    pub contexts: Vec<u32>,
    pub rows: Vec<TableRow>,
}

impl ResultTable {
    /// Build the grid for a model. Context sizes above the model's maximum
    /// are dropped.
    pub async fn build(
        engine: &SearchEngine,
        model: &ModelRef,
        catalog: QuantCatalog,
        budget_gb: Option<f64>,
        token: Option<&str>,
    ) -> Result<Self, EngineError> {
        let shape = engine.resolve_shape(model, token).await?;

        let contexts: Vec<u32> = engine
            .settings()
            .table_contexts
            .iter()
            .copied()
            .filter(|&c| shape.max_context_length == 0 || c <= shape.max_context_length)
            .collect();

        let rows = catalog
            .entries()
            .iter()
            .map(|entry| {
                let cells = contexts
                    .iter()
                    .map(|&context| {
                        let estimates = KvCacheQuant::ALL
                            .iter()
                            .map(|&kv_cache| {
                                let precision = engine.memory().precision(entry.bpw, kv_cache);
                                let vram_gb = engine.estimate_shape(&shape, &precision, context);
                                KvEstimate {
                                    kv_cache,
                                    vram_gb,
                                    fits: budget_gb.map(|b| vram_gb <= b),
                                }
                            })
                            .collect();
                        TableCell { context, estimates }
                    })
                    .collect();

                TableRow {
                    quant: entry.name.clone(),
                    bpw: entry.bpw,
                    cells,
                }
            })
            .collect();

        Ok(Self {
            model: model.to_string(),
            catalog,
            budget_gb,
            contexts,
            rows,
        })
    }

    /// Find the row for a catalogue key.
    pub fn row(&self, quant: &str) -> Option<&TableRow> {
        self.rows.iter().find(|r| r.quant.eq_ignore_ascii_case(quant))
    }
}
