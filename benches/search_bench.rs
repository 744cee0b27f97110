//! Benchmarks for the memory model and budget searches.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use vram_estimator::config::SearchConfig;
use vram_estimator::memory::estimator::MemoryModel;
use vram_estimator::model::provider::{ModelConfigProvider, StaticSource};
use vram_estimator::model::shape::stub_shape_llama3_8b;
use vram_estimator::model::source::ModelRef;
use vram_estimator::quant::catalog::QuantCatalog;
use vram_estimator::quant::precision::KvCacheQuant;
use vram_estimator::search::engine::SearchEngine;

fn engine() -> SearchEngine {
    let provider = ModelConfigProvider::with_sources(
        Box::new(StaticSource::new()),
        Box::new(StaticSource::new()),
    );
    SearchEngine::new(Arc::new(provider), MemoryModel::default(), SearchConfig::default())
}

fn bench_estimate(c: &mut Criterion) {
    let model = MemoryModel::default();
    let shape = stub_shape_llama3_8b();
    let precision = model.precision(4.85, KvCacheQuant::Fp16);

    c.bench_function("estimate_llama3_8b_8k", |b| {
        b.iter(|| {
            let gb = model.estimate(black_box(&shape), &precision, black_box(8192), 1, true);
            black_box(gb);
        })
    });
}

fn bench_max_context(c: &mut Criterion) {
    let engine = engine();
    let shape = stub_shape_llama3_8b();
    let model = ModelRef::remote("meta-llama/Llama-3.1-8B");
    let precision = engine.memory().precision(4.85, KvCacheQuant::Q8_0);

    c.bench_function("max_context_12gb", |b| {
        b.iter(|| {
            let result = engine.max_context_for_shape(&model, &shape, &precision, black_box(12.0));
            black_box(result.ok());
        })
    });
}

fn bench_best_quant(c: &mut Criterion) {
    let engine = engine();
    let shape = stub_shape_llama3_8b();

    for catalog in [QuantCatalog::Gguf, QuantCatalog::Exl2] {
        c.bench_function(&format!("best_quant_{catalog}_8gb"), |b| {
            b.iter(|| {
                let result = engine.best_quant_for_shape(
                    &shape,
                    KvCacheQuant::Fp16,
                    8192,
                    black_box(8.0),
                    catalog,
                );
                black_box(result);
            })
        });
    }
}

criterion_group!(benches, bench_estimate, bench_max_context, bench_best_quant);
criterion_main!(benches);
