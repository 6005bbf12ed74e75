//! Spatial pattern learning on an HTM Spatial Pooler.
//!
//! A set of scalar inputs is encoded and presented to the Spatial Pooler over and over, while a
//! homeostatic plasticity controller watches the output settle. Once it is stable, every input is
//! mapped back through the permanences of its active columns, thresholded, and drawn as a heatmap.

pub mod config;
pub mod core;
pub mod encoder;
pub mod error;
pub mod experiment;

pub use error::{Error, Result};
