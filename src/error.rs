use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring or running a training job.
///
/// Nothing is retried: every variant aborts the run and is propagated to the
/// caller. Artifacts written before the failure stay on disk.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing configuration; raised before the run starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// The image folder layout could not be used (no classes, empty class, ...).
    #[error("dataset error: {0}")]
    Dataset(String),

    /// An image file could not be opened or decoded.
    #[error("failed to load image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Tensor shapes do not line up (input width, label range, ragged batch).
    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A data-loading worker thread could not be started or died.
    #[error("data loader worker error: {0}")]
    Worker(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
