//! Encoders turn raw values into fixed-width bit vectors the Spatial Pooler can consume.

pub mod scalar;

use crate::error::Result;

/// Deterministic mapping from a value to a bit vector of fixed width.
pub trait Encoder<T> {
    /// Width of every encoded vector.
    fn width(&self) -> usize;

    /// Encodes `value`. The returned vector always has length `self.width()`.
    fn encode(&self, value: T) -> Result<Vec<bool>>;
}
