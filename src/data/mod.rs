pub mod image_folder;
pub mod loader;
pub mod transforms;

pub use image_folder::{ImageFolder, Sample};
pub use loader::{default_worker_count, DataLoader};
pub use transforms::{Normalize, Pipeline, Transform};

use crate::error::Result;
use crate::math::matrix::Matrix;

/// A group of samples processed together: one input row per label.
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: Matrix,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Batches yielded for a single epoch, in consumption order.
pub type EpochBatches<'a> = Box<dyn Iterator<Item = Result<Batch>> + 'a>;

/// A finite, restartable stream of batches.
pub trait BatchSource {
    /// Number of samples per epoch.
    fn len(&self) -> usize;

    fn num_batches(&self) -> usize;

    /// Starts a new pass over the data. Shuffling sources reorder here.
    fn next_epoch(&mut self) -> Result<EpochBatches<'_>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
