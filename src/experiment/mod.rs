//! The spatial pattern learning experiment: learn until stable, then reconstruct every input
//! from the columns it activates and export the result as a heatmap.

pub mod cycle;
pub mod heatmap;
pub mod reconstruction;
pub mod similarity;

use crate::{
    core::PoolingEngine,
    encoder::Encoder,
    error::{Error, Result},
};
use heatmap::{heatmap_path, GridShape, HeatmapExporter, HeatmapRenderer};
use reconstruction::Reconstructor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An input whose heatmap could not be written.
#[derive(Debug)]
pub struct ExportFailure {
    pub input: f64,
    pub error: Error,
}

/// Files written by `reconstruct_inputs` and the inputs that failed.
#[derive(Debug, Default)]
pub struct ReconstructionReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<ExportFailure>,
}

/// Reconstructs every input through the trained engine (without learning) and exports one
/// heatmap per input into `out_dir`.
///
/// A failed export is recorded and the remaining inputs are still processed.
pub fn reconstruct_inputs<E, C, R>(
    engine: &mut E,
    encoder: &C,
    inputs: &[f64],
    reconstructor: &Reconstructor,
    exporter: &HeatmapExporter<R>,
    shape: GridShape,
    out_dir: &Path,
) -> Result<ReconstructionReport>
where
    E: PoolingEngine,
    C: Encoder<f64> + ?Sized,
    R: HeatmapRenderer,
{
    if encoder.width() != engine.num_inputs() {
        return Err(Error::config(format!(
            "encoder width {} does not match engine input width {}",
            encoder.width(),
            engine.num_inputs()
        )));
    }

    let num_columns = engine.num_columns();
    if shape.len() != num_columns {
        return Err(Error::ShapeMismatch {
            expected: shape.len(),
            actual: num_columns,
        });
    }

    let mut report = ReconstructionReport::default();

    for &value in inputs {
        let bits = encoder.encode(value)?;
        let active = engine.compute_step(&bits, false).active_columns;
        let thresholded = reconstructor.reconstruct(&*engine, &active, num_columns);

        debug!(
            input = value,
            cols = active.len(),
            active_positions = thresholded.iter().filter(|&&v| v > 0.0).count(),
            "reconstructed"
        );

        let path = heatmap_path(out_dir, value);
        match exporter.export(&thresholded, shape, &path) {
            Ok(()) => report.written.push(path),
            Err(error) => {
                warn!(input = value, path = ?path, %error, "heatmap export failed");
                report.failures.push(ExportFailure {
                    input: value,
                    error,
                });
            }
        }
    }

    Ok(report)
}
