//! vram-estimator command-line entry point.
//!
//! Resolves the model, runs the selected calculation and prints the result
//! as JSON on stdout. Diagnostics go to stderr via tracing.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing::info;

use vram_estimator::config::{resolve_token, Cli, Config, Mode};
use vram_estimator::memory::estimator::MemoryModel;
use vram_estimator::model::provider::ModelConfigProvider;
use vram_estimator::model::source::ModelRef;
use vram_estimator::search::engine::SearchEngine;
use vram_estimator::search::table::ResultTable;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "vram_estimator=debug"
    } else {
        "vram_estimator=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("vram-estimator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Config::load(&cli.config)?;

    info!(
        cache_dir = %config.provider.cache_dir.display(),
        num_gpus = config.search.num_gpus,
        gqa = config.search.grouped_query_attention,
        "Configuration loaded"
    );

    let mut model = ModelRef::parse(&cli.model);
    if let Some(layers) = cli.layers {
        model = model.with_layers(layers);
    }
    let token = if model.is_local() {
        None
    } else {
        resolve_token(cli.token.clone())
    };
    let token = token.as_deref();

    let provider = Arc::new(ModelConfigProvider::new(&config.provider)?);
    let engine = SearchEngine::new(
        provider,
        MemoryModel::new(config.memory.clone()),
        config.search.clone(),
    );

    let budget = || cli.memory.context("--memory (GB) is required for this mode");

    let output = match cli.mode {
        Mode::Vram => {
            let estimate = engine
                .estimate_detailed(&model, &cli.quant, cli.context, cli.kv_cache, token)
                .await?;
            json!({
                "model": model.to_string(),
                "quant": cli.quant,
                "kv_cache": cli.kv_cache,
                "estimate": estimate,
            })
        }
        Mode::Context => {
            let result = engine
                .max_context_for_budget(&model, budget()?, &cli.quant, cli.kv_cache, token)
                .await?;
            json!({
                "model": model.to_string(),
                "quant": cli.quant,
                "kv_cache": cli.kv_cache,
                "max_context": result,
            })
        }
        Mode::Bpw => {
            let result = engine
                .best_quantisation_for_budget(
                    &model,
                    budget()?,
                    cli.context,
                    cli.kv_cache,
                    cli.catalog,
                    token,
                )
                .await?;
            json!({
                "model": model.to_string(),
                "catalog": cli.catalog,
                "kv_cache": cli.kv_cache,
                "best_quant": result,
            })
        }
        Mode::All => {
            let summary = engine
                .estimate_all(
                    &model,
                    budget()?,
                    &cli.quant,
                    cli.context,
                    cli.kv_cache,
                    cli.catalog,
                    token,
                )
                .await?;
            serde_json::to_value(summary)?
        }
        Mode::Table => {
            let table = ResultTable::build(&engine, &model, cli.catalog, cli.memory, token).await?;
            serde_json::to_value(table)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
