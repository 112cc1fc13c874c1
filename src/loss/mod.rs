pub mod cross_entropy;

pub use cross_entropy::CrossEntropyLoss;

use crate::error::Result;
use crate::math::matrix::Matrix;

/// Batch loss value and its gradient w.r.t. the scores.
#[derive(Debug, Clone)]
pub struct LossOutput {
    pub value: f64,
    pub grad: Matrix,
}

/// Loss between class scores (one row per sample) and integer labels.
pub trait Criterion {
    fn compute(&self, scores: &Matrix, targets: &[usize]) -> Result<LossOutput>;
}
