//! A `ScalarEncoder` represents a number as a contiguous block of active bits.
//!
//! The input range `[min, max]` is divided into buckets, one per possible start position
//! of the block. Nearby values share most of their active bits, distant values share none.
//! Periodic encoders wrap the block around the end of the vector, so `max` and `min` meet.

use super::Encoder;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Options for a `ScalarEncoder`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalarEncoderConfig {
    /// Total number of bits in the output (N).
    pub width: usize,

    /// Number of active bits per encoding (W).
    pub active_bits: usize,

    pub min: f64,
    pub max: f64,

    /// The range wraps around (e.g. angles).
    pub periodic: bool,

    /// Clamp out-of-range values instead of rejecting them.
    pub clip_input: bool,
}

impl Default for ScalarEncoderConfig {
    fn default() -> Self {
        Self {
            width: 200,
            active_bits: 15,
            min: 0.0,
            max: 100.0,
            periodic: false,
            clip_input: false,
        }
    }
}

impl ScalarEncoderConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.max <= self.min {
            return Err(Error::config(format!(
                "encoder range must satisfy min < max, got [{}, {}]",
                self.min, self.max
            )));
        }
        if self.active_bits == 0 {
            return Err(Error::config("encoder active_bits must be > 0"));
        }
        if self.width <= self.active_bits {
            return Err(Error::config(format!(
                "encoder width {} must exceed active_bits {}",
                self.width, self.active_bits
            )));
        }
        Ok(())
    }
}

/// Encodes scalars into a block of `active_bits` consecutive ones.
#[derive(Debug, Clone)]
pub struct ScalarEncoder {
    config: ScalarEncoderConfig,

    /// Number of distinct start positions of the active block.
    num_buckets: usize,
}

impl ScalarEncoder {
    /// Creates a new encoder after validating `config`.
    pub fn new(config: ScalarEncoderConfig) -> Result<Self> {
        config.validate()?;

        let num_buckets = if config.periodic {
            config.width
        } else {
            config.width - config.active_bits + 1
        };

        Ok(Self {
            config,
            num_buckets,
        })
    }

    /// Returns the start position of the active block for `value`.
    pub fn bucket_index(&self, value: f64) -> Result<usize> {
        let ScalarEncoderConfig { min, max, .. } = self.config;

        if !value.is_finite() {
            return Err(Error::Encoding(format!("cannot encode {value}")));
        }

        let value = if self.config.periodic {
            min + (value - min).rem_euclid(max - min)
        } else if value < min || value > max {
            if !self.config.clip_input {
                return Err(Error::Encoding(format!(
                    "{value} is outside [{min}, {max}] and clipping is disabled"
                )));
            }
            value.clamp(min, max)
        } else {
            value
        };

        let normalized = (value - min) / (max - min);
        let bucket = if self.config.periodic {
            (normalized * self.num_buckets as f64).floor() as usize
        } else {
            (normalized * (self.num_buckets - 1) as f64).round() as usize
        };

        Ok(bucket.min(self.num_buckets - 1))
    }
}

impl Encoder<f64> for ScalarEncoder {
    fn width(&self) -> usize {
        self.config.width
    }

    fn encode(&self, value: f64) -> Result<Vec<bool>> {
        let start = self.bucket_index(value)?;
        let mut bits = vec![false; self.config.width];

        for offset in 0..self.config.active_bits {
            bits[(start + offset) % self.config.width] = true;
        }

        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(bits: &[bool]) -> Vec<usize> {
        bits.iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect()
    }

    #[test]
    fn encodes_range_ends() {
        let encoder = ScalarEncoder::new(ScalarEncoderConfig::default()).unwrap();

        let low = encoder.encode(0.0).unwrap();
        let high = encoder.encode(100.0).unwrap();

        assert_eq!(low.len(), 200);
        assert_eq!(active(&low), (0..15).collect::<Vec<_>>());
        assert_eq!(active(&high), (185..200).collect::<Vec<_>>());
    }

    #[test]
    fn close_values_overlap_more_than_distant_ones() {
        let encoder = ScalarEncoder::new(ScalarEncoderConfig::default()).unwrap();
        let a = encoder.encode(50.0).unwrap();
        let b = encoder.encode(51.0).unwrap();
        let c = encoder.encode(90.0).unwrap();

        let overlap = |x: &[bool], y: &[bool]| x.iter().zip(y).filter(|(p, q)| **p && **q).count();

        assert!(overlap(&a, &b) > overlap(&a, &c));
        assert_eq!(overlap(&a, &c), 0);
    }

    #[test]
    fn rejects_out_of_range_without_clipping() {
        let encoder = ScalarEncoder::new(ScalarEncoderConfig::default()).unwrap();
        assert!(matches!(encoder.encode(101.0), Err(Error::Encoding(_))));
        assert!(encoder.encode(f64::NAN).is_err());

        let clipped = ScalarEncoder::new(ScalarEncoderConfig {
            clip_input: true,
            ..ScalarEncoderConfig::default()
        })
        .unwrap();
        assert_eq!(clipped.encode(150.0).unwrap(), clipped.encode(100.0).unwrap());
    }

    #[test]
    fn periodic_block_wraps() {
        let encoder = ScalarEncoder::new(ScalarEncoderConfig {
            width: 20,
            active_bits: 5,
            min: 0.0,
            max: 20.0,
            periodic: true,
            clip_input: false,
        })
        .unwrap();

        assert_eq!(active(&encoder.encode(18.0).unwrap()), vec![0, 1, 2, 18, 19]);
        assert_eq!(encoder.encode(20.0).unwrap(), encoder.encode(0.0).unwrap());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = ScalarEncoder::new(ScalarEncoderConfig {
            width: 10,
            active_bits: 10,
            ..ScalarEncoderConfig::default()
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
