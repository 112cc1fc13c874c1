use crate::error::{Error, Result};
use crate::loss::{Criterion, LossOutput};
use crate::math::matrix::Matrix;

/// Categorical cross-entropy over raw logits with mean reduction.
///
/// The softmax is applied here rather than in the network, using the
/// max-shifted log-sum-exp so large logits do not overflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss;

impl Criterion for CrossEntropyLoss {
    /// `L = mean_i( logsumexp(z_i) - z_i[y_i] )`
    ///
    /// The gradient w.r.t. the logits is `(softmax(z_i) - onehot(y_i)) / n`.
    fn compute(&self, scores: &Matrix, targets: &[usize]) -> Result<LossOutput> {
        if scores.rows != targets.len() {
            return Err(Error::Shape(format!(
                "{} score rows but {} labels", scores.rows, targets.len()
            )));
        }
        if scores.rows == 0 {
            return Err(Error::Shape("cross-entropy over an empty batch".into()));
        }
        if let Some(&bad) = targets.iter().find(|&&t| t >= scores.cols) {
            return Err(Error::Shape(format!(
                "label {} out of range for {} output classes", bad, scores.cols
            )));
        }

        let n = scores.rows as f64;
        let mut total = 0.0;
        let mut grad = Matrix::zeros(scores.rows, scores.cols);

        for ((row, &target), grad_row) in scores.data.iter().zip(targets).zip(grad.data.iter_mut()) {
            let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let exps: Vec<f64> = row.iter().map(|&z| (z - max).exp()).collect();
            let sum: f64 = exps.iter().sum();
            total += sum.ln() + max - row[target];

            for (g, e) in grad_row.iter_mut().zip(exps.iter()) {
                *g = e / sum / n;
            }
            grad_row[target] -= 1.0 / n;
        }

        Ok(LossOutput { value: total / n, grad })
    }
}
