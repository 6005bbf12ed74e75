//! The learning loop: presents the whole input set to the pooling engine, cycle after cycle,
//! until the engine's stability controller has reported a stable output for enough cycles.
//!
//! Inputs are processed strictly in the given order, one learning step at a time, because every
//! step mutates the engine's synaptic state.

use super::similarity::similarity;
use crate::{
    core::{
        homeostatic_plasticity::{StabilityState, Transition},
        PoolingEngine,
    },
    encoder::Encoder,
    error::{Error, Result},
};
use fxhash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Termination policy of the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Upper bound on the number of cycles.
    pub max_cycles: usize,

    /// The loop stops once more than this many cycles have seen a stable output.
    pub required_stable_cycles: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            max_cycles: 1000,
            required_stable_cycles: 5,
        }
    }
}

impl CycleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_cycles == 0 {
            return Err(Error::config("max_cycles must be > 0"));
        }
        Ok(())
    }
}

/// Latest output of the engine for one input value.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRecord {
    pub value: f64,
    pub active_columns: Vec<usize>,

    /// Similarity of `active_columns` to the SDR of the previous cycle.
    pub similarity: f64,
}

/// A stability transition, as recorded in the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityEvent {
    pub cycle: usize,
    pub input: f64,
    pub state: StabilityState,
}

/// A stable engine became unstable again.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityAnomaly {
    pub cycle: usize,
    pub input: f64,
    pub num_patterns_seen: u64,
}

/// What happened during a run of the loop.
#[derive(Debug, Clone, Default)]
pub struct LearningReport {
    pub cycles_run: usize,

    /// The stable-cycle counter exceeded the required count before `max_cycles` ran out.
    pub converged: bool,

    /// Cycles in which the engine reported a stable output at least once.
    pub stable_cycles: usize,

    /// Stability flag of the most recent evaluation.
    pub in_stable_state: bool,

    /// Every `EnteredStable` and `Regressed` transition, in order.
    pub events: Vec<StabilityEvent>,

    pub anomalies: Vec<StabilityAnomaly>,
    pub last_state: Option<StabilityState>,

    /// Keyed by `f64::to_bits` of the input value.
    pub history: FxHashMap<u64, InputRecord>,
}

impl LearningReport {
    pub fn record(&self, value: f64) -> Option<&InputRecord> {
        self.history.get(&value.to_bits())
    }
}

/// An engine after learning, with the report of how it got there.
#[derive(Debug)]
pub struct Trained<E> {
    pub engine: E,
    pub report: LearningReport,
}

/// Drives learning cycles over a fixed input set.
#[derive(Debug, Clone, Default)]
pub struct CycleLoop {
    pub config: CycleConfig,
}

impl CycleLoop {
    pub fn new(config: CycleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Runs learning cycles until convergence or `max_cycles`.
    ///
    /// The engine is returned whether or not it converged; `report.converged` and the audit
    /// trail tell which. Per-input values are matched exactly, so every input must be a distinct,
    /// finite value that is reused verbatim on every cycle.
    pub fn run<E, C>(&self, mut engine: E, encoder: &C, inputs: &[f64]) -> Result<Trained<E>>
    where
        E: PoolingEngine,
        C: Encoder<f64> + ?Sized,
    {
        self.config.validate()?;
        validate_inputs(inputs)?;
        if encoder.width() != engine.num_inputs() {
            return Err(Error::config(format!(
                "encoder width {} does not match engine input width {}",
                encoder.width(),
                engine.num_inputs()
            )));
        }

        let mut report = LearningReport {
            history: inputs
                .iter()
                .map(|&value| {
                    let record = InputRecord {
                        value,
                        active_columns: Vec::new(),
                        similarity: 0.0,
                    };
                    (value.to_bits(), record)
                })
                .collect(),
            ..LearningReport::default()
        };

        for cycle in 0..self.config.max_cycles {
            debug!(cycle, stable = report.in_stable_state, "cycle started");
            let mut stable_this_cycle = false;

            for &value in inputs {
                let bits = encoder.encode(value)?;
                let output = engine.compute_step(&bits, true);

                if let Some(record) = report.history.get_mut(&value.to_bits()) {
                    record.similarity = similarity(&output.active_columns, &record.active_columns);
                    debug!(
                        cycle,
                        input = value,
                        cols = output.active_columns.len(),
                        similarity = record.similarity,
                        sdr = ?output.active_columns,
                        "learned"
                    );
                    record.active_columns = output.active_columns;
                }

                if let Some(state) = output.stability {
                    match state.transition {
                        Transition::EnteredStable => {
                            info!(
                                cycle,
                                input = value,
                                patterns = state.num_patterns_seen,
                                avg_active_columns = state.avg_active_columns,
                                "stable state entered"
                            );
                            report.events.push(StabilityEvent {
                                cycle,
                                input: value,
                                state: state.clone(),
                            });
                        }
                        Transition::Regressed => {
                            warn!(
                                cycle,
                                input = value,
                                patterns = state.num_patterns_seen,
                                "unstable state after stable state"
                            );
                            report.anomalies.push(StabilityAnomaly {
                                cycle,
                                input: value,
                                num_patterns_seen: state.num_patterns_seen,
                            });
                            report.events.push(StabilityEvent {
                                cycle,
                                input: value,
                                state: state.clone(),
                            });
                        }
                        Transition::None => {}
                    }

                    report.in_stable_state = state.is_stable;
                    stable_this_cycle |= state.is_stable;
                    report.last_state = Some(state);
                }
            }

            report.cycles_run = cycle + 1;
            if stable_this_cycle {
                report.stable_cycles += 1;
            }

            info!(
                cycle,
                stable = stable_this_cycle,
                stable_cycles = report.stable_cycles,
                "cycle finished"
            );

            if report.stable_cycles > self.config.required_stable_cycles {
                report.converged = true;
                break;
            }
        }

        if !report.converged {
            warn!(
                cycles = report.cycles_run,
                stable_cycles = report.stable_cycles,
                "learning stopped without convergence"
            );
        }

        Ok(Trained { engine, report })
    }
}

/// Inputs are keyed by their exact bit pattern, so they must be finite and distinct.
fn validate_inputs(inputs: &[f64]) -> Result<()> {
    if inputs.is_empty() {
        return Err(Error::config("the input set is empty"));
    }

    let mut seen = FxHashSet::default();
    for &value in inputs {
        if !value.is_finite() {
            return Err(Error::config(format!("input {value} is not finite")));
        }
        if !seen.insert(value.to_bits()) {
            return Err(Error::config(format!("input {value} appears more than once")));
        }
    }
    Ok(())
}
