use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Per-epoch training statistics emitted by `Trainer::fit`.
///
/// When a `progress_tx` channel is configured in `TrainerOptions`, the
/// training loop sends one `EpochStats` value at the end of every completed
/// epoch, after the metrics line has been written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Sum of per-batch mean losses divided by the number of training batches.
    pub train_loss: f64,
    /// Correct predictions divided by the number of validation samples.
    pub val_accuracy: f64,
    /// Whether this epoch beat the best accuracy so far and was checkpointed.
    pub improved: bool,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}

impl EpochStats {
    /// The line appended to `train_metrics.txt` for this epoch.
    pub fn metrics_line(&self) -> String {
        format!(
            "epoch: {}, train_loss: {:?}, val_accuracy: {:?}",
            self.epoch, self.train_loss, self.val_accuracy
        )
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Highest validation accuracy reached; `0.0` if no epoch improved on it.
    pub best_accuracy: f64,
    /// Epoch that produced `best_accuracy`, if any epoch improved.
    pub best_epoch: Option<usize>,
    pub history: Vec<EpochStats>,
    pub checkpoint_path: PathBuf,
}

impl TrainingSummary {
    /// True when at least one epoch was saved to `checkpoint_path`.
    pub fn checkpoint_written(&self) -> bool {
        self.best_epoch.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_line_keeps_decimal_point() {
        let stats = EpochStats {
            epoch: 3,
            total_epochs: 5,
            train_loss: 0.25,
            val_accuracy: 1.0,
            improved: true,
            elapsed_ms: 12,
        };
        assert_eq!(stats.metrics_line(), "epoch: 3, train_loss: 0.25, val_accuracy: 1.0");
    }
}
