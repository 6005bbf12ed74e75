//! HTM building blocks: the Spatial Pooler, its synapse pool and topology, and the
//! homeostatic plasticity controller that watches it learn.

pub mod homeostatic_plasticity;
pub mod spatial_pooler;
pub mod synapses;
pub mod topology;

use fxhash::FxHashMap;
use homeostatic_plasticity::StabilityState;

/// Result of one pass of an input through a pooling engine.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// Active columns, ascending and unique.
    pub active_columns: Vec<usize>,

    /// Stability reported for this step. Only present for learning steps of an engine with a controller.
    pub stability: Option<StabilityState>,
}

/// The seam between the experiment and the algorithm that maps input bits onto columns.
///
/// Every call mutates shared learning state, so calls must never overlap.
pub trait PoolingEngine {
    fn num_inputs(&self) -> usize;

    fn num_columns(&self) -> usize;

    /// Feeds one encoded pattern through the engine.
    fn compute_step(&mut self, input: &[bool], learn: bool) -> StepOutput;

    /// Sparse probability map over the reconstruction domain for the given columns.
    fn reconstruct(&self, active_columns: &[usize]) -> FxHashMap<usize, f64>;
}
