//! The `HomeostaticPlasticityController` decides when the Spatial Pooler's output has stabilized.
//!
//! A freshly initialized pooler is in its "new-born" stage: boosting dominates, so the same input
//! may map to very different SDRs from one presentation to the next. As more patterns are seen,
//! the controller fades boosting out and starts watching every distinct input:
//! - the SDR produced for the input must match the previous SDR for that input,
//! - the number of active columns for the input must sit within tolerance of its moving average.
//!
//! Once enough patterns have been presented and every input satisfies both conditions, the pooler
//! is declared stable. Every evaluation returns a `StabilityState` to the caller, who owns any
//! latching or counting on top of it. A stable pooler that later becomes unstable is reported as a
//! `Transition::Regressed`, which a correctly working pooler should never produce.

use crate::{
    error::{Error, Result},
    experiment::similarity::similarity,
};
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Options of the stability policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeostaticConfig {
    /// Patterns to observe before stability may be declared, as a multiple of the input count.
    pub min_cycles_multiplier: usize,

    /// Number of presentations per input kept in the moving average of active columns.
    pub window: usize,

    /// Largest allowed distance of any windowed count from its moving average.
    pub tolerance: f64,

    /// Minimal similarity between consecutive SDRs of the same input.
    pub required_similarity: f64,
}

impl Default for HomeostaticConfig {
    fn default() -> Self {
        Self {
            min_cycles_multiplier: 40,
            window: 5,
            tolerance: 0.0,
            required_similarity: 1.0,
        }
    }
}

impl HomeostaticConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(Error::config("stability window must be > 0"));
        }
        if self.min_cycles_multiplier == 0 {
            return Err(Error::config("min_cycles_multiplier must be > 0"));
        }
        // Each input is presented `min_cycles_multiplier` times before the threshold; one of
        // those only seeds the previous SDR, the rest must fill the window.
        if self.window >= self.min_cycles_multiplier {
            return Err(Error::config(format!(
                "stability window ({}) must be smaller than min_cycles_multiplier ({})",
                self.window, self.min_cycles_multiplier
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(Error::config(format!(
                "stability tolerance must be finite and >= 0, got {}",
                self.tolerance
            )));
        }
        if !(self.required_similarity > 0.0 && self.required_similarity <= 1.0) {
            return Err(Error::config(format!(
                "required_similarity must be in (0, 1], got {}",
                self.required_similarity
            )));
        }
        Ok(())
    }
}

/// Learning stage of the pooler as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// The first pass over the inputs. Boosting at full strength.
    NewBorn,
    /// Boosting fades out while the controller waits for the output to settle.
    Stabilizing,
    /// Every input maps to a settled SDR.
    Stable,
}

/// Change of the stability flag caused by one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    None,
    EnteredStable,
    /// Stable before this evaluation, unstable after it.
    Regressed,
}

/// Outcome of a single evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityState {
    pub is_stable: bool,
    pub phase: Phase,
    pub transition: Transition,

    /// Learning steps observed so far.
    pub num_patterns_seen: u64,

    /// Mean over all inputs of their windowed average of active columns.
    pub avg_active_columns: f64,

    /// Distinct inputs observed so far.
    pub num_distinct_inputs: usize,
}

/// What the controller remembers about one distinct input.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InputTrace {
    last_output: Vec<usize>,
    similarity: f64,
    counts: VecDeque<usize>,
}

impl InputTrace {
    fn moving_average(&self) -> f64 {
        if self.counts.is_empty() {
            return 0.0;
        }
        self.counts.iter().sum::<usize>() as f64 / self.counts.len() as f64
    }

    fn is_settled(&self, config: &HomeostaticConfig) -> bool {
        if self.counts.len() < config.window || self.similarity < config.required_similarity {
            return false;
        }
        let avg = self.moving_average();
        self.counts
            .iter()
            .all(|&count| (count as f64 - avg).abs() <= config.tolerance)
    }
}

/// Tracks per-input output stability across learning steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeostaticPlasticityController {
    config: HomeostaticConfig,
    num_inputs: usize,
    min_patterns: u64,
    num_patterns_seen: u64,
    is_stable: bool,
    regressions: u32,
    traces: FxHashMap<u64, InputTrace>,
}

impl HomeostaticPlasticityController {
    /// Creates a controller for an experiment presenting `num_inputs` distinct inputs per cycle.
    pub fn new(num_inputs: usize, config: HomeostaticConfig) -> Result<Self> {
        config.validate()?;
        if num_inputs == 0 {
            return Err(Error::config("the stability controller needs at least one input"));
        }

        let min_patterns = (num_inputs * config.min_cycles_multiplier) as u64;

        Ok(Self {
            config,
            num_inputs,
            min_patterns,
            num_patterns_seen: 0,
            is_stable: false,
            regressions: 0,
            traces: FxHashMap::default(),
        })
    }

    /// Records one learning step and returns the resulting stability state.
    ///
    /// `input` is the encoded pattern that was presented, `active_columns` the pooler's output for it.
    pub fn evaluate(&mut self, input: &[bool], active_columns: &[usize]) -> StabilityState {
        self.num_patterns_seen += 1;

        let key = input_key(input);
        let window = self.config.window;
        let trace = self.traces.entry(key).or_insert_with(|| InputTrace {
            last_output: Vec::new(),
            similarity: 0.0,
            counts: VecDeque::with_capacity(window),
        });

        // Two empty SDRs in a row are unchanged output, not dissimilar output.
        let repeated_silence = !trace.counts.is_empty()
            && active_columns.is_empty()
            && trace.last_output.is_empty();
        trace.similarity = if repeated_silence {
            1.0
        } else {
            similarity(active_columns, &trace.last_output)
        };
        trace.last_output.clear();
        trace.last_output.extend_from_slice(active_columns);
        if trace.counts.len() == window {
            trace.counts.pop_front();
        }
        trace.counts.push_back(active_columns.len());

        let stable = self.num_patterns_seen >= self.min_patterns
            && self
                .traces
                .values()
                .all(|trace| trace.is_settled(&self.config));

        let transition = match (self.is_stable, stable) {
            (false, true) => Transition::EnteredStable,
            (true, false) => {
                self.regressions += 1;
                Transition::Regressed
            }
            _ => Transition::None,
        };
        self.is_stable = stable;

        StabilityState {
            is_stable: stable,
            phase: self.phase(),
            transition,
            num_patterns_seen: self.num_patterns_seen,
            avg_active_columns: self.avg_active_columns(),
            num_distinct_inputs: self.traces.len(),
        }
    }

    pub fn phase(&self) -> Phase {
        if self.is_stable {
            Phase::Stable
        } else if self.traces.len() < self.num_inputs
            && self.num_patterns_seen < self.min_patterns
        {
            Phase::NewBorn
        } else {
            Phase::Stabilizing
        }
    }

    /// Fraction of the configured boosting still in effect, in [0, 1].
    ///
    /// Full strength while new-born, then fading linearly to zero at the stability threshold.
    pub fn boost_scale(&self) -> f32 {
        match self.phase() {
            Phase::NewBorn => 1.0,
            Phase::Stable => 0.0,
            Phase::Stabilizing => {
                (1.0 - self.num_patterns_seen as f64 / self.min_patterns as f64).max(0.0) as f32
            }
        }
    }

    /// Learning steps required before stability may be declared.
    pub fn min_patterns(&self) -> u64 {
        self.min_patterns
    }

    pub fn num_patterns_seen(&self) -> u64 {
        self.num_patterns_seen
    }

    pub fn is_stable(&self) -> bool {
        self.is_stable
    }

    /// Number of stable-to-unstable regressions observed so far.
    pub fn regressions(&self) -> u32 {
        self.regressions
    }

    fn avg_active_columns(&self) -> f64 {
        if self.traces.is_empty() {
            return 0.0;
        }
        self.traces
            .values()
            .map(InputTrace::moving_average)
            .sum::<f64>()
            / self.traces.len() as f64
    }
}

/// Hashes the indices of the active bits, so identical patterns share a trace.
fn input_key(input: &[bool]) -> u64 {
    let active: Vec<usize> = input
        .iter()
        .enumerate()
        .filter_map(|(i, &bit)| bit.then_some(i))
        .collect();
    fxhash::hash64(&active)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(width: usize, index: usize) -> Vec<bool> {
        (0..width).map(|bit| bit == index).collect()
    }

    #[test]
    fn degenerate_window_fails_fast() {
        let config = HomeostaticConfig {
            window: 0,
            ..HomeostaticConfig::default()
        };
        assert!(matches!(
            HomeostaticPlasticityController::new(10, config),
            Err(Error::Config(_))
        ));
        assert!(HomeostaticPlasticityController::new(0, HomeostaticConfig::default()).is_err());
    }

    #[test]
    fn window_must_fit_before_threshold() {
        let config = HomeostaticConfig {
            min_cycles_multiplier: 2,
            window: 5,
            ..HomeostaticConfig::default()
        };
        assert!(matches!(
            HomeostaticPlasticityController::new(10, config),
            Err(Error::Config(_))
        ));

        let config = HomeostaticConfig {
            min_cycles_multiplier: 2,
            window: 1,
            ..HomeostaticConfig::default()
        };
        let mut hpc = HomeostaticPlasticityController::new(10, config).unwrap();
        let first_stable = (1..=20u64).find(|&step| {
            let input = (step as usize - 1) % 10;
            hpc.evaluate(&pattern(10, input), &[input]).is_stable
        });
        assert_eq!(first_stable, Some(20));
    }

    #[test]
    fn silent_input_does_not_block_stability() {
        let mut hpc =
            HomeostaticPlasticityController::new(2, HomeostaticConfig::default()).unwrap();
        let threshold = hpc.min_patterns();

        let mut first_stable = None;
        for step in 1..=threshold {
            let state = if step % 2 == 1 {
                hpc.evaluate(&pattern(4, 0), &[])
            } else {
                hpc.evaluate(&pattern(4, 1), &[3, 4])
            };
            if state.is_stable {
                first_stable.get_or_insert(step);
            }
        }

        assert_eq!(first_stable, Some(threshold));
    }

    #[test]
    fn stable_by_threshold_when_output_never_varies() {
        let num_inputs = 10;
        let mut hpc =
            HomeostaticPlasticityController::new(num_inputs, HomeostaticConfig::default()).unwrap();
        let threshold = hpc.min_patterns();
        assert_eq!(threshold, 400);

        let mut first_stable = None;
        for step in 1..=threshold {
            let input = (step as usize - 1) % num_inputs;
            let state = hpc.evaluate(&pattern(num_inputs, input), &[input, input + 20]);

            assert_eq!(state.num_patterns_seen, step);
            if state.is_stable {
                assert!(state.num_patterns_seen >= threshold);
                first_stable.get_or_insert(step);
            }
        }

        assert_eq!(first_stable, Some(threshold));
        assert_eq!(hpc.phase(), Phase::Stable);
        assert_eq!(hpc.boost_scale(), 0.0);
    }

    #[test]
    fn never_stable_before_threshold() {
        let mut hpc = HomeostaticPlasticityController::new(
            2,
            HomeostaticConfig {
                min_cycles_multiplier: 10,
                window: 2,
                ..HomeostaticConfig::default()
            },
        )
        .unwrap();

        for step in 1..=19u64 {
            let state = hpc.evaluate(&pattern(2, (step % 2) as usize), &[1, 2, 3]);
            assert!(!state.is_stable, "stable at step {step}");
        }
        assert!(hpc.evaluate(&pattern(2, 0), &[1, 2, 3]).is_stable);
    }

    #[test]
    fn phases_and_boost_fade() {
        let mut hpc = HomeostaticPlasticityController::new(
            4,
            HomeostaticConfig {
                min_cycles_multiplier: 2,
                window: 1,
                ..HomeostaticConfig::default()
            },
        )
        .unwrap();

        assert_eq!(hpc.phase(), Phase::NewBorn);
        assert_eq!(hpc.boost_scale(), 1.0);

        // Repeating one input does not leave the new-born stage.
        hpc.evaluate(&pattern(4, 0), &[0]);
        hpc.evaluate(&pattern(4, 0), &[0]);
        assert_eq!(hpc.phase(), Phase::NewBorn);

        hpc.evaluate(&pattern(4, 1), &[1]);
        hpc.evaluate(&pattern(4, 2), &[2]);
        assert_eq!(hpc.phase(), Phase::NewBorn);
        hpc.evaluate(&pattern(4, 3), &[3]);
        assert_eq!(hpc.phase(), Phase::Stabilizing);
        assert!((hpc.boost_scale() - 3.0 / 8.0).abs() < 1e-6);
    }

    #[test]
    fn regression_is_reported_distinctly() {
        let mut hpc = HomeostaticPlasticityController::new(
            1,
            HomeostaticConfig {
                min_cycles_multiplier: 3,
                window: 2,
                ..HomeostaticConfig::default()
            },
        )
        .unwrap();
        let input = pattern(8, 3);

        for _ in 0..2 {
            assert_eq!(hpc.evaluate(&input, &[4, 5]).transition, Transition::None);
        }
        let entered = hpc.evaluate(&input, &[4, 5]);
        assert!(entered.is_stable);
        assert_eq!(entered.transition, Transition::EnteredStable);

        let regressed = hpc.evaluate(&input, &[4, 6]);
        assert!(!regressed.is_stable);
        assert_eq!(regressed.transition, Transition::Regressed);
        assert_eq!(regressed.phase, Phase::Stabilizing);
        assert_eq!(hpc.regressions(), 1);
    }

    #[test]
    fn activity_spread_beyond_tolerance_blocks_stability() {
        let mut hpc = HomeostaticPlasticityController::new(
            1,
            HomeostaticConfig {
                min_cycles_multiplier: 4,
                window: 3,
                tolerance: 0.5,
                required_similarity: 0.5,
            },
        )
        .unwrap();
        let input = pattern(4, 0);

        hpc.evaluate(&input, &[1, 2]);
        hpc.evaluate(&input, &[1, 2, 3, 4]);
        let state = hpc.evaluate(&input, &[1, 2, 3, 4]);

        assert!(!state.is_stable);
        assert!((state.avg_active_columns - 10.0 / 3.0).abs() < 1e-9);
        assert_eq!(state.num_distinct_inputs, 1);
    }
}
