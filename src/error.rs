//! Error types shared by the pooling engine, the experiment loop and the export path.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring, running or exporting a pattern learning experiment.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or inconsistent parameters. Raised before any learning happens.
    #[error("configuration error: {0}")]
    Config(String),

    /// A vector could not be reshaped into the requested grid.
    #[error("shape mismatch: grid expects {expected} values, vector has {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// A destination directory or file could not be created or written.
    #[error("resource error at {path:?}: {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("persistence error: {0}")]
    Persistence(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for building a configuration error from anything printable.
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub(crate) fn resource(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Resource {
            path: path.into(),
            source,
        }
    }
}
