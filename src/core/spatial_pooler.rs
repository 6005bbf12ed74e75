//! The `SpatialPooler` maps encoded input patterns onto a fixed population of columns:
//! - Every column owns potential synapses into a neighborhood of the input space.
//! - The overlap of a column is the number of its connected synapses on active input bits.
//! - Inhibition keeps only the strongest columns active, globally or within local neighborhoods.
//! - Learning moves permanences of the winners toward the current input (Hebbian-like).
//!
//! Homeostasis:
//! - Duty cycles are rolling averages of how often a column overlaps the input (ODC) and wins (ADC).
//! - Columns with a low ADC get their overlap boosted, columns with a low ODC get their synapses bumped.
//! - An attached `HomeostaticPlasticityController` fades both mechanisms out as learning progresses,
//!   and reports after every learning step whether the output has become stable.
//!
//! Reconstruction runs the mapping backwards: the permanences of a set of active columns are summed
//! per input bit and normalized, giving the probability that each input bit was part of the pattern.

use super::{
    homeostatic_plasticity::{HomeostaticPlasticityController, StabilityState},
    synapses::{PermanenceOptions, Synapses},
    topology::Topology,
    PoolingEngine, StepOutput,
};
use crate::{
    config::HtmConfig,
    error::{Error, Result},
};
use fxhash::FxHashMap;
use rand::{
    rngs::StdRng,
    seq::{IteratorRandom, SliceRandom},
    Rng, SeedableRng,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};
use tracing::debug;

/// A Spatial Pooler with its learned state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialPooler {
    /// Seeded once from `config.rng_seed`. Not persisted, reseeded on load.
    #[serde(skip, default = "placeholder_rng")]
    pub rand: StdRng,

    pub config: HtmConfig,

    /// Compute iterations performed so far, with or without learning.
    pub iteration_num: u32,

    /// Compute iterations performed so far with learning enabled.
    pub iteration_learn_num: u32,

    pub num_inputs: usize,
    pub num_columns: usize,

    /// Potential radius resolved against the input size.
    pub potential_radius: usize,

    /// Current radius of the local inhibition neighborhoods.
    pub inhibition_radius: usize,

    pub permanence: PermanenceOptions,
    pub column_topology: Topology,
    pub input_topology: Topology,
    pub synapses: Synapses,

    /// Local inhibition neighborhood of every column, without the column itself.
    #[serde(skip)]
    pub neighbors: Vec<Vec<usize>>,

    pub overlap_duty_cycles: Vec<f32>,
    pub active_duty_cycles: Vec<f32>,
    pub min_overlap_duty_cycles: Vec<f32>,
    pub min_active_duty_cycles: Vec<f32>,
    pub boost_factors: Vec<f32>,

    /// Boosted overlap of each column in the current iteration.
    pub overlaps: Vec<f32>,

    /// Small fixed per-column offsets that break ties between equal overlaps.
    pub tie_breakers: Vec<f32>,

    /// Active columns of the current iteration, ascending.
    pub winner_columns: Vec<usize>,

    pub homeostatic: Option<HomeostaticPlasticityController>,

    /// State reported by the controller after the latest learning step.
    pub last_stability: Option<StabilityState>,
}

fn placeholder_rng() -> StdRng {
    StdRng::seed_from_u64(0)
}

impl SpatialPooler {
    /// Builds and initializes a pooler from a validated configuration.
    pub fn new(config: &HtmConfig) -> Result<Self> {
        config.validate()?;

        let num_inputs = config.input_bit_width;
        let num_columns = config.num_columns;
        let potential_radius = if config.potential_radius < 0 {
            num_inputs
        } else {
            config.potential_radius as usize
        };

        let mut sp = Self {
            rand: StdRng::seed_from_u64(config.rng_seed),
            config: config.clone(),
            iteration_num: 0,
            iteration_learn_num: 0,
            num_inputs,
            num_columns,
            potential_radius,
            inhibition_radius: 0,
            permanence: PermanenceOptions::new(
                config.syn_perm_active_inc,
                config.syn_perm_inactive_dec,
                config.syn_perm_connected,
            ),
            column_topology: Topology::new(&[num_columns]),
            input_topology: Topology::new(&[num_inputs]),
            synapses: Synapses::new(num_columns, num_inputs),
            neighbors: Vec::new(),
            overlap_duty_cycles: vec![0.0; num_columns],
            active_duty_cycles: vec![0.0; num_columns],
            min_overlap_duty_cycles: vec![0.0; num_columns],
            min_active_duty_cycles: vec![0.0; num_columns],
            boost_factors: vec![1.0; num_columns],
            overlaps: vec![0.0; num_columns],
            tie_breakers: Vec::with_capacity(num_columns),
            winner_columns: Vec::with_capacity(num_columns),
            homeostatic: None,
            last_stability: None,
        };

        sp.connect_and_configure_inputs();
        sp.tie_breakers = (0..num_columns)
            .map(|_| 0.001 * sp.rand.random::<f32>())
            .collect();
        sp.update_inhibition_radius();

        debug!(
            num_inputs,
            num_columns,
            inhibition_radius = sp.inhibition_radius,
            "spatial pooler initialized"
        );

        Ok(sp)
    }

    /// Attaches the controller that fades boosting out and reports output stability.
    pub fn with_homeostatic_controller(mut self, controller: HomeostaticPlasticityController) -> Self {
        self.homeostatic = Some(controller);
        self
    }

    /// Processes one input pattern and returns the active columns.
    ///
    /// With `learn` the winners adapt their synapses, duty cycles and boost factors are updated,
    /// and the attached controller evaluates the result.
    pub fn compute(&mut self, input: &[bool], learn: bool) -> &[usize] {
        debug_assert_eq!(input.len(), self.num_inputs, "input width mismatch");

        self.update_iteration_number(learn);
        self.calculate_overlaps(input);
        self.boost(learn);
        self.inhibit_columns();

        if learn {
            self.adapt_synapses(input);
            self.update_duty_cycles();
            self.bump_up_weak_columns();
            self.update_boost_factors();
            if self.iteration_num % self.config.update_period == 0 {
                self.update_inhibition_radius();
                self.update_min_duty_cycles();
            }

            if let Some(controller) = self.homeostatic.as_mut() {
                self.last_stability = Some(controller.evaluate(input, &self.winner_columns));
            }
        }

        &self.winner_columns
    }

    /// Probability per input bit that it belongs to the pattern represented by `active_columns`.
    ///
    /// Permanences are summed per input over the potential synapses of the given columns and
    /// divided by the largest sum. Inputs without any support are left out of the map.
    pub fn reconstruct(&self, active_columns: &[usize]) -> FxHashMap<usize, f64> {
        let mut support: FxHashMap<usize, f64> = FxHashMap::default();

        for &col in active_columns.iter().filter(|&&col| col < self.num_columns) {
            for syn in self.synapses.column(col) {
                if syn.permanence > 0.0 {
                    *support.entry(syn.input).or_insert(0.0) += syn.permanence as f64;
                }
            }
        }

        let max = support.values().copied().fold(0.0, f64::max);
        if max > 0.0 {
            support.values_mut().for_each(|p| *p /= max);
        }

        support
    }

    /// Fraction of the configured boosting currently in effect.
    pub fn boost_scale(&self) -> f32 {
        self.homeostatic
            .as_ref()
            .map_or(1.0, HomeostaticPlasticityController::boost_scale)
    }

    /// Writes the learned state to `path` (bincode).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::resource(path, e))?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Restores a pooler written by `save`. The random source restarts from `rng_seed`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::resource(path, e))?;
        let mut sp: Self = bincode::deserialize_from(BufReader::new(file))?;
        sp.rand = StdRng::seed_from_u64(sp.config.rng_seed);
        sp.neighbors = sp.local_neighborhoods(sp.inhibition_radius);
        Ok(sp)
    }

    pub fn update_iteration_number(&mut self, learn: bool) {
        self.iteration_num += 1;
        if learn {
            self.iteration_learn_num += 1;
        }
    }

    /// Counts, per column, the connected synapses that land on active input bits.
    pub fn calculate_overlaps(&mut self, input: &[bool]) {
        for (col, overlap) in self.overlaps.iter_mut().enumerate() {
            *overlap = self
                .synapses
                .connected(col)
                .iter()
                .filter(|syn| input[syn.input])
                .count() as f32;
        }
    }

    /// Scales overlaps by the boost factors while learning.
    pub fn boost(&mut self, learn: bool) {
        if learn {
            for (overlap, boost) in self.overlaps.iter_mut().zip(&self.boost_factors) {
                *overlap *= *boost;
            }
        }
    }

    /// Density of winners within one inhibition area.
    pub fn inhibition_density(&self) -> f32 {
        if self.config.num_active_columns_per_inh_area > 0.0 {
            let area = if self.config.global_inhibition {
                self.num_columns
            } else {
                self.column_topology
                    .dims()
                    .iter()
                    .map(|&dim| (2 * self.inhibition_radius + 1).min(dim))
                    .product()
            };
            (self.config.num_active_columns_per_inh_area / area as f32).min(0.5)
        } else {
            self.config.local_area_density
        }
    }

    /// Selects the winner columns from the boosted overlaps.
    pub fn inhibit_columns(&mut self) {
        let density = self.inhibition_density();
        let threshold = self.config.stimulus_threshold;
        let ranked = |col: usize| self.overlaps[col] + self.tie_breakers[col];
        let eligible = |col: usize| self.overlaps[col] > 0.0 && self.overlaps[col] >= threshold;

        let winners: Vec<usize> = if self.config.global_inhibition {
            let mut candidates: Vec<usize> = (0..self.num_columns).filter(|&c| eligible(c)).collect();
            candidates.sort_unstable_by(|&a, &b| ranked(b).total_cmp(&ranked(a)));
            let quota = ((density * self.num_columns as f32).round() as usize).max(1);
            candidates.truncate(quota);
            candidates
        } else {
            (0..self.num_columns)
                .filter(|&col| eligible(col))
                .filter(|&col| {
                    let hood = &self.neighbors[col];
                    let quota = ((hood.len() + 1) as f32 * density).ceil() as usize;
                    let stronger = hood.iter().filter(|&&n| ranked(n) > ranked(col)).count();
                    stronger < quota
                })
                .collect()
        };

        self.winner_columns.clear();
        self.winner_columns.extend(winners);
        self.winner_columns.sort_unstable();
    }

    /// Hebbian update of the winners' permanences toward `input`.
    pub fn adapt_synapses(&mut self, input: &[bool]) {
        let stimulus = (self.config.stimulus_threshold + 0.5) as usize;

        for &col in &self.winner_columns {
            for syn in self.synapses.column_mut(col) {
                if input[syn.input] {
                    syn.permanence += self.permanence.active_increment;
                } else {
                    syn.permanence -= self.permanence.inactive_decrement;
                }
            }
            self.synapses
                .settle_column(col, true, stimulus, &self.permanence);
        }
    }

    /// Exponential moving averages of overlap and activity per column.
    pub fn update_duty_cycles(&mut self) {
        let period = self.iteration_num.min(self.config.duty_cycle_period) as f32;
        let decay = (period - 1.0) / period;

        for (duty, &overlap) in self.overlap_duty_cycles.iter_mut().zip(&self.overlaps) {
            *duty = *duty * decay + if overlap > 0.0 { 1.0 / period } else { 0.0 };
        }
        self.active_duty_cycles.iter_mut().for_each(|duty| *duty *= decay);
        for &col in &self.winner_columns {
            self.active_duty_cycles[col] += 1.0 / period;
        }
    }

    /// Raises all permanences of columns whose overlap duty cycle fell below the minimum.
    pub fn bump_up_weak_columns(&mut self) {
        let scale = self.boost_scale();
        if scale <= 0.0 {
            return;
        }
        let stimulus = (self.config.stimulus_threshold + 0.5) as usize;

        for col in 0..self.num_columns {
            if self.min_overlap_duty_cycles[col] * scale > self.overlap_duty_cycles[col] {
                for syn in self.synapses.column_mut(col) {
                    syn.permanence += self.permanence.below_stimulus_increment;
                }
                self.synapses
                    .settle_column(col, true, stimulus, &self.permanence);
            }
        }
    }

    /// Linear boost in `[1, max_boost]` for columns whose activity is below the minimum.
    ///
    /// The effective maximum shrinks with the controller's boost scale, down to no boosting at all.
    pub fn update_boost_factors(&mut self) {
        let scale = self.boost_scale();
        if scale <= 0.0 {
            self.boost_factors.fill(1.0);
            return;
        }
        let max_boost = 1.0 + (self.config.max_boost - 1.0) * scale;

        if self.min_active_duty_cycles.iter().any(|&min| min > 0.0) {
            for ((boost, &min), &active) in self
                .boost_factors
                .iter_mut()
                .zip(&self.min_active_duty_cycles)
                .zip(&self.active_duty_cycles)
            {
                *boost = if active > min {
                    1.0
                } else {
                    ((1.0 - max_boost) / min.max(f32::EPSILON)) * active + max_boost
                };
            }
        }
    }

    /// Sets the minimum duty cycles to a fraction of the layer-wide maxima.
    pub fn update_min_duty_cycles(&mut self) {
        let max_overlap = self.overlap_duty_cycles.iter().fold(0.0f32, |m, &x| m.max(x));
        let max_active = self.active_duty_cycles.iter().fold(0.0f32, |m, &x| m.max(x));

        self.min_overlap_duty_cycles
            .fill(self.config.min_pct_overlap_duty_cycles * max_overlap);
        self.min_active_duty_cycles
            .fill(self.config.min_pct_active_duty_cycles * max_active);
    }

    /// Recomputes the local inhibition radius from the average receptive field size.
    pub fn update_inhibition_radius(&mut self) {
        let radius = if self.config.global_inhibition {
            self.column_topology.dims().iter().copied().max().unwrap_or(1)
        } else {
            let span: f32 = (0..self.num_columns)
                .map(|col| self.avg_connected_span(col))
                .sum::<f32>()
                / self.num_columns as f32;
            let diameter = span * self.avg_columns_per_input();
            (((diameter - 1.0) / 2.0).round().max(1.0)) as usize
        };

        if radius != self.inhibition_radius || self.neighbors.is_empty() {
            self.inhibition_radius = radius;
            self.neighbors = self.local_neighborhoods(radius);
        }
    }

    fn local_neighborhoods(&self, radius: usize) -> Vec<Vec<usize>> {
        if self.config.global_inhibition {
            return vec![Vec::new(); self.num_columns];
        }
        (0..self.num_columns)
            .map(|col| {
                self.column_topology
                    .neighborhood(col, radius, self.config.wrap_around)
                    .filter(|&n| n != col)
                    .collect()
            })
            .collect()
    }

    /// Average extent (per input dimension) of a column's connected synapses.
    fn avg_connected_span(&self, column: usize) -> f32 {
        let connected = self.synapses.connected(column);
        if connected.is_empty() {
            return 0.0;
        }

        let dims = self.input_topology.dims().len();
        let mut low = vec![usize::MAX; dims];
        let mut high = vec![0; dims];

        for syn in connected {
            for (d, c) in self.input_topology.coordinates(syn.input).into_iter().enumerate() {
                low[d] = low[d].min(c);
                high[d] = high[d].max(c);
            }
        }

        low.iter()
            .zip(&high)
            .map(|(&l, &h)| (h - l + 1) as f32)
            .sum::<f32>()
            / dims as f32
    }

    fn avg_columns_per_input(&self) -> f32 {
        let ratios: Vec<f32> = self
            .column_topology
            .dims()
            .iter()
            .zip(self.input_topology.dims())
            .map(|(&c, &i)| c as f32 / i as f32)
            .collect();
        ratios.iter().sum::<f32>() / ratios.len().max(1) as f32
    }

    /// Samples every column's potential pool and initializes its permanences.
    pub fn connect_and_configure_inputs(&mut self) {
        let stimulus = (self.config.stimulus_threshold + 0.5) as usize;

        for column in 0..self.num_columns {
            let potential = self.map_potential(column);
            self.synapses.init_column(
                column,
                &potential,
                self.config.init_connected_pct,
                &self.permanence,
                &mut self.rand,
            );
            self.synapses
                .settle_column(column, true, stimulus, &self.permanence);
        }
    }

    /// Randomly picks `potential_pct` of the inputs within the potential radius of a column.
    pub fn map_potential(&mut self, column: usize) -> Vec<usize> {
        let center = self.map_column(column);
        let hood = self
            .input_topology
            .neighborhood(center, self.potential_radius, self.config.wrap_around);
        let size = ((hood.size_hint().0 as f64 * self.config.potential_pct) + 0.5) as usize;

        let mut sample = hood.choose_multiple(&mut self.rand, size.max(1));
        sample.shuffle(&mut self.rand);
        sample
    }

    /// Maps a column onto the input bit at the proportional position of its center.
    pub fn map_column(&self, column: usize) -> usize {
        let coords: Vec<usize> = self
            .column_topology
            .coordinates(column)
            .into_iter()
            .zip(self.column_topology.dims())
            .zip(self.input_topology.dims())
            .map(|((index, &col_dim), &in_dim)| {
                let scaled = (index as f32 + 0.5) * in_dim as f32 / col_dim as f32;
                (scaled as usize).min(in_dim - 1)
            })
            .collect();
        self.input_topology.index(&coords)
    }
}

impl PoolingEngine for SpatialPooler {
    fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    fn num_columns(&self) -> usize {
        self.num_columns
    }

    fn compute_step(&mut self, input: &[bool], learn: bool) -> StepOutput {
        let active_columns = self.compute(input, learn).to_vec();
        StepOutput {
            active_columns,
            stability: if learn { self.last_stability.clone() } else { None },
        }
    }

    fn reconstruct(&self, active_columns: &[usize]) -> FxHashMap<usize, f64> {
        SpatialPooler::reconstruct(self, active_columns)
    }
}
