//! Strongly typed configuration for the pooling engine, the encoder and the experiment.
//!
//! Every option the experiment recognizes is a named field with a validated range.
//! `Default` reproduces the reference experiment: 200 input bits, 1024 columns, 100 scalar
//! inputs, local inhibition with ~2% active columns per inhibition area.

use crate::{
    core::homeostatic_plasticity::HomeostaticConfig,
    encoder::scalar::ScalarEncoderConfig,
    error::{Error, Result},
    experiment::{
        cycle::CycleConfig,
        heatmap::{GridShape, HeatmapStyle},
        reconstruction::ThresholdRule,
    },
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

/// Parameters of the Spatial Pooler and the cortical layer it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmConfig {
    /// Width of the encoded input vector.
    pub input_bit_width: usize,

    /// Number of mini-columns in the pooler.
    pub num_columns: usize,

    /// Cells per column. Carried for a downstream temporal stage, unused by the pooler.
    pub cells_per_column: usize,

    /// Upper bound of the boost factor applied to under-active columns.
    pub max_boost: f32,

    /// Window (in iterations) of the duty cycle moving averages.
    pub duty_cycle_period: u32,

    /// Fraction of the maximum overlap duty cycle below which a column is bumped.
    pub min_pct_overlap_duty_cycles: f32,

    /// Fraction of the maximum active duty cycle below which a column is boosted.
    pub min_pct_active_duty_cycles: f32,

    /// Global inhibition picks winners over the whole layer, local inhibition per neighborhood.
    pub global_inhibition: bool,

    /// Target active columns per inhibition area. Disabled when <= 0.
    pub num_active_columns_per_inh_area: f32,

    /// Radius (in input space) of each column's potential pool. -1 uses the whole input.
    pub potential_radius: i32,

    /// Fraction of the inputs inside the potential radius that become potential synapses.
    pub potential_pct: f64,

    /// Target density of active columns. Disabled when <= 0.
    pub local_area_density: f32,

    /// Segment activation threshold. Carried for a downstream temporal stage.
    pub activation_threshold: usize,

    /// Synapse cap per distal segment. Carried for a downstream temporal stage.
    pub max_synapses_per_segment: usize,

    /// Minimum (boosted) overlap for a column to compete in inhibition.
    pub stimulus_threshold: f32,

    /// Seed of the pooler's random source.
    pub rng_seed: u64,

    /// Fraction of potential synapses that start connected.
    pub init_connected_pct: f32,

    pub syn_perm_active_inc: f32,
    pub syn_perm_inactive_dec: f32,
    pub syn_perm_connected: f32,

    /// How often (in iterations) the inhibition radius and minimum duty cycles are refreshed.
    pub update_period: u32,

    /// Neighborhoods wrap around the input and column space.
    pub wrap_around: bool,
}

impl Default for HtmConfig {
    fn default() -> Self {
        let input_bit_width = 200;
        let num_columns = 1024;

        Self {
            input_bit_width,
            num_columns,
            cells_per_column: 10,
            max_boost: 5.0,
            duty_cycle_period: 100,
            min_pct_overlap_duty_cycles: 1.0,
            min_pct_active_duty_cycles: 0.001,
            global_inhibition: false,
            num_active_columns_per_inh_area: 0.02 * num_columns as f32,
            potential_radius: (0.15 * input_bit_width as f64) as i32,
            potential_pct: 0.5,
            local_area_density: -1.0,
            activation_threshold: 10,
            max_synapses_per_segment: (0.01 * num_columns as f64) as usize,
            stimulus_threshold: 2.0,
            rng_seed: 42,
            init_connected_pct: 0.5,
            syn_perm_active_inc: 0.05,
            syn_perm_inactive_dec: 0.008,
            syn_perm_connected: 0.10,
            update_period: 50,
            wrap_around: true,
        }
    }
}

impl HtmConfig {
    /// Checks every option against its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.input_bit_width == 0 {
            return Err(Error::config("input_bit_width must be > 0"));
        }
        if self.num_columns == 0 {
            return Err(Error::config("num_columns must be > 0"));
        }
        if self.cells_per_column == 0 {
            return Err(Error::config("cells_per_column must be > 0"));
        }
        if !(self.max_boost >= 1.0) {
            return Err(Error::config(format!(
                "max_boost must be >= 1.0, got {}",
                self.max_boost
            )));
        }
        if self.duty_cycle_period == 0 {
            return Err(Error::config("duty_cycle_period must be > 0"));
        }
        if self.update_period == 0 {
            return Err(Error::config("update_period must be > 0"));
        }
        check_fraction("min_pct_overlap_duty_cycles", self.min_pct_overlap_duty_cycles)?;
        check_fraction("min_pct_active_duty_cycles", self.min_pct_active_duty_cycles)?;
        check_fraction("init_connected_pct", self.init_connected_pct)?;
        check_fraction("syn_perm_connected", self.syn_perm_connected)?;
        check_fraction("syn_perm_active_inc", self.syn_perm_active_inc)?;
        check_fraction("syn_perm_inactive_dec", self.syn_perm_inactive_dec)?;

        if !(self.potential_pct > 0.0 && self.potential_pct <= 1.0) {
            return Err(Error::config(format!(
                "potential_pct must be in (0, 1], got {}",
                self.potential_pct
            )));
        }
        if self.potential_radius < -1 || self.potential_radius == 0 {
            return Err(Error::config(format!(
                "potential_radius must be > 0 or -1, got {}",
                self.potential_radius
            )));
        }
        if !(self.stimulus_threshold >= 0.0) {
            return Err(Error::config("stimulus_threshold must be >= 0"));
        }

        let by_count = self.num_active_columns_per_inh_area > 0.0;
        let by_density = self.local_area_density > 0.0;

        match (by_count, by_density) {
            (true, true) => Err(Error::config(
                "only one of num_active_columns_per_inh_area and local_area_density may be set",
            )),
            (false, false) => Err(Error::config(
                "one of num_active_columns_per_inh_area and local_area_density must be > 0",
            )),
            (false, true) if self.local_area_density > 0.5 => Err(Error::config(format!(
                "local_area_density must be in (0, 0.5], got {}",
                self.local_area_density
            ))),
            _ => Ok(()),
        }
    }
}

fn check_fraction(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::config(format!("{name} must be in [0, 1], got {value}")))
    }
}

/// Everything the experiment driver needs, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub htm: HtmConfig,
    pub encoder: ScalarEncoderConfig,
    pub stability: HomeostaticConfig,
    pub cycle: CycleConfig,
    pub threshold: ThresholdRule,
    pub heatmap: HeatmapStyle,
    pub grid_shape: GridShape,
    pub output_dir: PathBuf,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        let htm = HtmConfig::default();
        let encoder = ScalarEncoderConfig {
            width: htm.input_bit_width,
            ..ScalarEncoderConfig::default()
        };

        Self {
            htm,
            encoder,
            stability: HomeostaticConfig::default(),
            cycle: CycleConfig::default(),
            threshold: ThresholdRule::default(),
            heatmap: HeatmapStyle::default(),
            grid_shape: GridShape { rows: 32, cols: 32 },
            output_dir: PathBuf::from("reconstruction"),
        }
    }
}

impl ExperimentConfig {
    /// Reads and validates a configuration file. Missing fields take their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::resource(path, e))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates each section and the consistency between them.
    pub fn validate(&self) -> Result<()> {
        self.htm.validate()?;
        self.encoder.validate()?;
        self.stability.validate()?;
        self.cycle.validate()?;
        self.threshold.validate()?;
        self.heatmap.validate()?;

        if self.encoder.width != self.htm.input_bit_width {
            return Err(Error::config(format!(
                "encoder width {} does not match input_bit_width {}",
                self.encoder.width, self.htm.input_bit_width
            )));
        }
        if self.grid_shape.len() != self.htm.num_columns {
            return Err(Error::ShapeMismatch {
                expected: self.grid_shape.len(),
                actual: self.htm.num_columns,
            });
        }
        Ok(())
    }
}
