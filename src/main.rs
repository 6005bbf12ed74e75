//! Runs the spatial pattern learning experiment:
//! 1. learn 100 scalar inputs until the Spatial Pooler's output is stable,
//! 2. save the trained pooler,
//! 3. reconstruct every input from its active columns and write one heatmap per input.
//!
//! Usage: `htm-pattern-learning [config.json]`. Without a file the built-in defaults are used.
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::{Context, Result};
use htm_pattern_learning::{
    config::ExperimentConfig,
    core::{homeostatic_plasticity::HomeostaticPlasticityController, spatial_pooler::SpatialPooler},
    encoder::scalar::ScalarEncoder,
    experiment::{
        cycle::CycleLoop,
        heatmap::{HeatmapExporter, ImageHeatmapRenderer},
        reconstruct_inputs,
        reconstruction::Reconstructor,
    },
};
use std::fs;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ExperimentConfig::from_json_file(&path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => {
            let config = ExperimentConfig::default();
            config.validate()?;
            config
        }
    };

    info!("Spatial pattern learning experiment");

    let encoder = ScalarEncoder::new(config.encoder.clone())?;
    let inputs: Vec<f64> = (config.encoder.min.ceil() as i64..config.encoder.max.ceil() as i64)
        .map(|v| v as f64)
        .collect();

    info!(
        inputs = inputs.len(),
        columns = config.htm.num_columns,
        input_bits = config.htm.input_bit_width,
        "initializing spatial pooler"
    );

    let controller = HomeostaticPlasticityController::new(inputs.len(), config.stability.clone())?;
    let sp = SpatialPooler::new(&config.htm)?.with_homeostatic_controller(controller);

    let trained = CycleLoop::new(config.cycle.clone())?.run(sp, &encoder, &inputs)?;
    let report = &trained.report;

    info!(
        cycles = report.cycles_run,
        converged = report.converged,
        stable_cycles = report.stable_cycles,
        anomalies = report.anomalies.len(),
        "learning finished"
    );
    for anomaly in &report.anomalies {
        warn!(
            cycle = anomaly.cycle,
            input = anomaly.input,
            patterns = anomaly.num_patterns_seen,
            "stability regression"
        );
    }

    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating {}", config.output_dir.display()))?;

    let model_path = config.output_dir.join("spatial_pooler.bin");
    match trained.engine.save(&model_path) {
        Ok(()) => info!(path = %model_path.display(), "trained spatial pooler saved"),
        Err(error) => warn!(%error, "could not save the trained spatial pooler"),
    }

    let reconstructor = Reconstructor::new(config.threshold)?;
    let exporter = HeatmapExporter::new(ImageHeatmapRenderer, config.heatmap.clone())?;
    let mut engine = trained.engine;

    let outcome = reconstruct_inputs(
        &mut engine,
        &encoder,
        &inputs,
        &reconstructor,
        &exporter,
        config.grid_shape,
        &config.output_dir,
    )?;

    info!(
        written = outcome.written.len(),
        failed = outcome.failures.len(),
        out_dir = %config.output_dir.display(),
        "reconstruction finished"
    );

    Ok(())
}
