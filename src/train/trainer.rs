use std::sync::mpsc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::data::BatchSource;
use crate::error::{Error, Result};
use crate::loss::Criterion;
use crate::optim::Optimizer;
use crate::train::artifacts::{write_class_indices, ClassIndexMap, RunArtifacts};
use crate::train::epoch_stats::{EpochStats, TrainingSummary};
use crate::train::model::{Mode, Model};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    WritingClassIndex,
    Training(usize),
    Validating(usize),
    Done,
}

/// Loop settings that are not part of the model or data.
///
/// # Fields
/// - `epochs`:        total number of full passes over the training data
/// - `show_progress`: draw per-batch progress bars on stderr
/// - `progress_tx`:   optional channel sender; one `EpochStats` is sent per
///                    completed epoch. A dropped receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct TrainerOptions {
    pub epochs: usize,
    pub show_progress: bool,
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
}

impl TrainerOptions {
    pub fn new(epochs: usize) -> Self {
        TrainerOptions { epochs, show_progress: false, progress_tx: None }
    }
}

/// Epoch loop: train pass, validation pass, metrics line, and a checkpoint
/// whenever validation accuracy strictly improves on the best so far.
pub struct Trainer<M, O, C> {
    model: M,
    optimizer: O,
    criterion: C,
    options: TrainerOptions,
    phase: Phase,
}

impl<M: Model, O: Optimizer, C: Criterion> Trainer<M, O, C> {
    pub fn new(model: M, optimizer: O, criterion: C, options: TrainerOptions) -> Self {
        Trainer { model, optimizer, criterion, options, phase: Phase::NotStarted }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    fn enter(&mut self, phase: Phase) {
        debug!(?phase, "phase transition");
        self.phase = phase;
    }

    /// Runs every epoch. The class index is written first; the metrics log
    /// gets one line per epoch and the checkpoint holds the best epoch.
    pub fn fit(
        &mut self,
        train: &mut dyn BatchSource,
        val: &mut dyn BatchSource,
        class_index: &ClassIndexMap,
        artifacts: &RunArtifacts,
    ) -> Result<TrainingSummary> {
        let total = self.options.epochs;
        if total == 0 {
            return Err(Error::Config("train.epochs must be positive".into()));
        }

        self.enter(Phase::WritingClassIndex);
        write_class_indices(&artifacts.class_indices, class_index)?;

        let mut best_accuracy = 0.0;
        let mut best_epoch = None;
        let mut history = Vec::with_capacity(total);

        for epoch in 1..=total {
            let started = Instant::now();

            self.enter(Phase::Training(epoch));
            let train_loss = self.train_epoch(epoch, train)?;

            self.enter(Phase::Validating(epoch));
            let val_accuracy = self.validate(epoch, val)?;

            info!("[epoch {epoch}] train_loss: {train_loss:.3}  val_accuracy: {val_accuracy:.3}");

            let improved = val_accuracy > best_accuracy;
            let mut stats = EpochStats {
                epoch,
                total_epochs: total,
                train_loss,
                val_accuracy,
                improved,
                elapsed_ms: 0,
            };
            artifacts.append_metrics(&stats.metrics_line())?;

            if improved {
                best_accuracy = val_accuracy;
                best_epoch = Some(epoch);
                self.model.save_checkpoint(&artifacts.checkpoint)?;
                info!(path = %artifacts.checkpoint.display(), "model saved");
            }

            stats.elapsed_ms = started.elapsed().as_millis() as u64;
            let receiver_gone = self
                .options
                .progress_tx
                .as_ref()
                .is_some_and(|tx| tx.send(stats.clone()).is_err());
            if receiver_gone {
                debug!("progress receiver dropped; no further epoch stats will be sent");
                self.options.progress_tx = None;
            }
            history.push(stats);
        }

        self.enter(Phase::Done);
        info!("Finished Training");

        Ok(TrainingSummary {
            best_accuracy,
            best_epoch,
            history,
            checkpoint_path: artifacts.checkpoint.clone(),
        })
    }

    /// One optimisation pass; returns the mean of the per-batch losses.
    fn train_epoch(&mut self, epoch: usize, source: &mut dyn BatchSource) -> Result<f64> {
        self.model.set_mode(Mode::Train);
        let bar = self.progress_bar(source.num_batches(), format!("train epoch[{epoch}/{}]", self.options.epochs));

        let mut running_loss = 0.0;
        let mut steps = 0usize;
        for batch in source.next_epoch()? {
            let batch = batch?;
            self.model.zero_grad();
            let scores = self.model.forward(&batch.inputs)?;
            let loss = self.criterion.compute(&scores, &batch.labels)?;
            self.model.backward(&loss.grad)?;
            let mut params = self.model.parameters();
            self.optimizer.step(&mut params);

            running_loss += loss.value;
            steps += 1;
            bar.set_message(format!("loss:{:.3}", loss.value));
            bar.inc(1);
        }
        bar.finish_and_clear();

        if steps == 0 {
            return Err(Error::Dataset("training set produced no batches".into()));
        }
        Ok(running_loss / steps as f64)
    }

    /// Fraction of validation samples whose arg-max score equals the label.
    fn validate(&mut self, epoch: usize, source: &mut dyn BatchSource) -> Result<f64> {
        self.model.set_mode(Mode::Eval);
        let samples = source.len();
        if samples == 0 {
            return Err(Error::Dataset("validation set is empty".into()));
        }
        let bar = self.progress_bar(source.num_batches(), format!("valid epoch[{epoch}/{}]", self.options.epochs));

        let mut correct = 0usize;
        for batch in source.next_epoch()? {
            let batch = batch?;
            let scores = self.model.forward(&batch.inputs)?;
            if scores.rows != batch.len() {
                return Err(Error::Shape(format!(
                    "model returned {} score rows for a batch of {}",
                    scores.rows,
                    batch.len()
                )));
            }
            if let Some(&label) = batch.labels.iter().find(|&&l| l >= scores.cols) {
                return Err(Error::Shape(format!(
                    "label {label} is outside the model's {} outputs",
                    scores.cols
                )));
            }
            correct += scores
                .argmax_rows()
                .iter()
                .zip(&batch.labels)
                .filter(|(predicted, label)| predicted == label)
                .count();
            bar.inc(1);
        }
        bar.finish_and_clear();

        Ok(correct as f64 / samples as f64)
    }

    fn progress_bar(&self, len: usize, prefix: String) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_prefix(prefix);
        bar
    }
}
