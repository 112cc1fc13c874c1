use std::path::Path;

use crate::error::Result;
use crate::layers::dense::Parameter;
use crate::math::matrix::Matrix;

/// Training mode caches activations for backprop; evaluation mode does not,
/// so no gradient can be computed from an eval-mode forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// What the training loop needs from a classifier.
pub trait Model {
    fn set_mode(&mut self, mode: Mode);

    /// Maps a batch (one sample per row) to class scores (one row per sample).
    fn forward(&mut self, inputs: &Matrix) -> Result<Matrix>;

    fn zero_grad(&mut self);

    /// Accumulates parameter gradients from dL/dscores of the last forward pass.
    fn backward(&mut self, grad_scores: &Matrix) -> Result<()>;

    fn parameters(&mut self) -> Vec<Parameter<'_>>;

    /// Persists the current parameters, replacing any previous file at `path`.
    fn save_checkpoint(&self, path: &Path) -> Result<()>;
}
