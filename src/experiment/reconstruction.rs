//! Turns the sparse permanence probabilities of a set of active columns into a dense,
//! thresholded vector that can be drawn as a heatmap.

use crate::{
    core::PoolingEngine,
    error::{Error, Result},
};
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Rule separating confidently active from confidently inactive positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ThresholdRule {
    /// `p >= threshold` becomes 1.0, everything else 0.0.
    Binary { threshold: f64 },
    /// `p >= threshold` keeps its probability, everything else becomes 0.0.
    Clip { threshold: f64 },
}

impl Default for ThresholdRule {
    fn default() -> Self {
        ThresholdRule::Binary { threshold: 0.52 }
    }
}

impl ThresholdRule {
    pub fn threshold(&self) -> f64 {
        match *self {
            ThresholdRule::Binary { threshold } | ThresholdRule::Clip { threshold } => threshold,
        }
    }

    /// The threshold must lie in (0, 1] for the rule to be idempotent.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.threshold();
        if threshold > 0.0 && threshold <= 1.0 {
            Ok(())
        } else {
            Err(Error::config(format!(
                "reconstruction threshold must be in (0, 1], got {threshold}"
            )))
        }
    }

    pub fn apply_one(&self, p: f64) -> f64 {
        match *self {
            ThresholdRule::Binary { threshold } => {
                if p >= threshold {
                    1.0
                } else {
                    0.0
                }
            }
            ThresholdRule::Clip { threshold } => {
                if p >= threshold {
                    p
                } else {
                    0.0
                }
            }
        }
    }

    pub fn apply(&self, probabilities: &[f64]) -> Vec<f64> {
        probabilities.iter().map(|&p| self.apply_one(p)).collect()
    }
}

/// Expands a sparse map into `len` positions, defaulting absent ones to 0.0.
///
/// Keys outside `[0, len)` are dropped.
pub fn densify(sparse: &FxHashMap<usize, f64>, len: usize) -> Vec<f64> {
    let mut dense = vec![0.0; len];
    let mut dropped = 0usize;

    for (&index, &p) in sparse {
        match dense.get_mut(index) {
            Some(slot) => *slot = p,
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(dropped, len, "reconstruction entries outside the dense range");
    }

    dense
}

/// Reconstructs and thresholds the permanence map of active columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconstructor {
    pub rule: ThresholdRule,
}

impl Reconstructor {
    pub fn new(rule: ThresholdRule) -> Result<Self> {
        rule.validate()?;
        Ok(Self { rule })
    }

    /// Returns exactly `num_columns` thresholded values, position = index.
    pub fn reconstruct<E: PoolingEngine + ?Sized>(
        &self,
        engine: &E,
        active_columns: &[usize],
        num_columns: usize,
    ) -> Vec<f64> {
        let sparse = engine.reconstruct(active_columns);
        let dense = densify(&sparse, num_columns);
        self.rule.apply(&dense)
    }
}
