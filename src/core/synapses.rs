//! Proximal synapses of the Spatial Pooler, stored in one flat pool.
//!
//! Each column owns a fixed-size block of the pool (`max_per_column` slots) and uses the first
//! `count` slots of it. Within a column's block the connected synapses are kept in front, so the
//! overlap computation only walks the connected prefix and reconstruction walks the whole block.
//!
//! A synapse whose permanence reaches `connected` counts toward the column's overlap. Learning
//! nudges permanences up or down. Values at or below `trim_threshold` are snapped to zero.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A potential connection from a column to one input bit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Synapse {
    /// Index of the input bit.
    pub input: usize,

    /// Strength of the connection, in [min, max].
    pub permanence: f32,
}

/// How permanences move during learning and where they are clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermanenceOptions {
    pub inactive_decrement: f32,
    pub active_increment: f32,
    pub connected: f32,
    pub below_stimulus_increment: f32,
    pub min: f32,
    pub max: f32,
    pub trim_threshold: f32,
}

impl PermanenceOptions {
    /// Derives the bump and trim values from the three learning rates.
    pub fn new(active_increment: f32, inactive_decrement: f32, connected: f32) -> Self {
        Self {
            inactive_decrement,
            active_increment,
            connected,
            below_stimulus_increment: connected / 10.0,
            min: 0.0,
            max: 1.0,
            trim_threshold: active_increment / 2.0,
        }
    }
}

/// Flat pool of potential synapses for all columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synapses {
    synapses: Vec<Synapse>,
    count: Vec<usize>,
    connected_count: Vec<usize>,
    max_per_column: usize,
}

impl Synapses {
    /// Creates an empty pool for `num_columns` columns with room for `max_per_column` synapses each.
    pub fn new(num_columns: usize, max_per_column: usize) -> Self {
        Self {
            synapses: vec![Synapse::default(); num_columns * max_per_column],
            count: vec![0; num_columns],
            connected_count: vec![0; num_columns],
            max_per_column,
        }
    }

    /// Fills a column's block from `potential` input indices with random initial permanences.
    ///
    /// Roughly `init_connected_pct` of the synapses start above the connected threshold.
    pub fn init_column<R: Rng>(
        &mut self,
        column: usize,
        potential: &[usize],
        init_connected_pct: f32,
        options: &PermanenceOptions,
        rng: &mut R,
    ) {
        let len = potential.len().min(self.max_per_column);
        let start = column * self.max_per_column;

        for (slot, &input) in self.synapses[start..start + len]
            .iter_mut()
            .zip(&potential[..len])
        {
            let raw = if rng.random::<f32>() <= init_connected_pct {
                options.connected + (options.max - options.connected) * rng.random::<f32>()
            } else {
                options.connected * rng.random::<f32>()
            };

            *slot = Synapse {
                input,
                permanence: if raw > options.trim_threshold {
                    (raw * 100_000.0).round() / 100_000.0
                } else {
                    0.0
                },
            };
        }

        self.count[column] = len;
        self.partition_connected(column, options.connected);
    }

    /// Moves the connected synapses of a column to the front of its block.
    pub fn partition_connected(&mut self, column: usize, connected: f32) {
        let range = self.range(column);
        let block = &mut self.synapses[range];

        let mut pivot = 0;
        for i in 0..block.len() {
            if block[i].permanence >= connected {
                block.swap(i, pivot);
                pivot += 1;
            }
        }

        self.connected_count[column] = pivot;
    }

    /// Brings a column back into a consistent state after its permanences changed:
    /// - optionally raises permanences until `stimulus_threshold` synapses are connected,
    /// - trims small values to zero and clamps the rest to [min, max],
    /// - re-partitions connected synapses to the front.
    pub fn settle_column(
        &mut self,
        column: usize,
        raise: bool,
        stimulus_threshold: usize,
        options: &PermanenceOptions,
    ) {
        if raise {
            self.raise_to_stimulus(column, stimulus_threshold, options);
        }

        for syn in self.column_mut(column) {
            syn.permanence = if syn.permanence <= options.trim_threshold {
                0.0
            } else {
                syn.permanence.clamp(options.min, options.max)
            };
        }

        self.partition_connected(column, options.connected);
    }

    /// Raises every permanence of a column until at least `stimulus_threshold` are connected.
    ///
    /// Columns with fewer potential synapses than the threshold end up fully connected.
    pub fn raise_to_stimulus(
        &mut self,
        column: usize,
        stimulus_threshold: usize,
        options: &PermanenceOptions,
    ) {
        let block = self.column_mut(column);
        let target = stimulus_threshold.min(block.len());

        if options.below_stimulus_increment <= 0.0 {
            return;
        }

        while block
            .iter()
            .filter(|syn| syn.permanence >= options.connected)
            .count()
            < target
        {
            for syn in block.iter_mut() {
                syn.permanence += options.below_stimulus_increment;
            }
        }
    }

    fn range(&self, column: usize) -> Range<usize> {
        let start = column * self.max_per_column;
        start..start + self.count[column]
    }

    /// All potential synapses of a column, connected ones first.
    pub fn column(&self, column: usize) -> &[Synapse] {
        &self.synapses[self.range(column)]
    }

    pub fn column_mut(&mut self, column: usize) -> &mut [Synapse] {
        let range = self.range(column);
        &mut self.synapses[range]
    }

    /// Only the connected synapses of a column.
    pub fn connected(&self, column: usize) -> &[Synapse] {
        let start = column * self.max_per_column;
        &self.synapses[start..start + self.connected_count[column]]
    }
}
