use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::config::overrides::Override;
use crate::data::loader::default_worker_count;
use crate::error::{Error, Result};
use crate::optim::OptimizerKind;

/// `model.*`: what is trained, on which data, and where results go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    /// Side length of the square network input, in pixels.
    pub image_size: u32,
    pub train_data_path: PathBuf,
    pub val_data_path: PathBuf,
    /// Directory receiving `class_indices.json` and `train_metrics.txt`.
    pub history_path: PathBuf,
    /// Prefix of the checkpoint file; `{ckpt_path}{model_name}Net` is written.
    pub ckpt_path: String,
    pub model_name: String,
    /// Expected number of classes; must match the training folder.
    pub classes: usize,
    #[serde(default = "default_hidden_layers")]
    pub hidden_layers: Vec<usize>,
    #[serde(default)]
    pub activation: ActivationFunction,
}

/// `train.*`: optimisation hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainSection {
    pub batch_size: usize,
    pub epochs: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default)]
    pub optimizer: OptimizerKind,
    /// Loader threads; derived from the machine and batch size when unset.
    #[serde(default)]
    pub num_workers: Option<usize>,
    #[serde(default)]
    pub seed: u64,
}

fn default_hidden_layers() -> Vec<usize> {
    vec![128]
}

fn default_learning_rate() -> f64 {
    1e-4
}

/// Complete run configuration as read from YAML plus overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub model: ModelSection,
    pub train: TrainSection,
}

impl TrainConfig {
    /// Reads `path`, applies `overrides` in order, then deserializes and validates.
    pub fn load(path: impl AsRef<Path>, overrides: &[Override]) -> Result<TrainConfig> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        TrainConfig::from_yaml_str(&text, overrides)
    }

    pub fn from_yaml_str(yaml: &str, overrides: &[Override]) -> Result<TrainConfig> {
        let mut doc: serde_yaml::Value = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("failed to parse YAML config: {e}")))?;
        for o in overrides {
            o.apply(&mut doc)?;
        }
        let config: TrainConfig = serde_yaml::from_value(doc)
            .map_err(|e| Error::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every numeric and naming constraint. Paths are checked when the
    /// run opens them.
    pub fn validate(&self) -> Result<()> {
        let m = &self.model;
        let t = &self.train;
        if m.image_size == 0 {
            return Err(Error::Config("model.image_size must be positive".into()));
        }
        if m.classes == 0 {
            return Err(Error::Config("model.classes must be positive".into()));
        }
        if m.model_name.trim().is_empty() {
            return Err(Error::Config("model.model_name must not be empty".into()));
        }
        if m.hidden_layers.contains(&0) {
            return Err(Error::Config("model.hidden_layers entries must be positive".into()));
        }
        if t.batch_size == 0 {
            return Err(Error::Config("train.batch_size must be positive".into()));
        }
        if t.epochs == 0 {
            return Err(Error::Config("train.epochs must be positive".into()));
        }
        if !(t.learning_rate.is_finite() && t.learning_rate > 0.0) {
            return Err(Error::Config(format!(
                "train.learning_rate must be a positive number, got {}",
                t.learning_rate
            )));
        }
        Ok(())
    }

    /// Flattened network input width: three channels of `image_size²` pixels.
    pub fn input_size(&self) -> usize {
        let side = self.model.image_size as usize;
        3 * side * side
    }

    pub fn worker_count(&self) -> usize {
        self.train
            .num_workers
            .unwrap_or_else(|| default_worker_count(self.train.batch_size))
    }

    /// `{ckpt_path}{model_name}Net`, joined by plain concatenation.
    pub fn checkpoint_path(&self) -> PathBuf {
        PathBuf::from(format!("{}{}Net", self.model.ckpt_path, self.model.model_name))
    }

    pub fn class_indices_path(&self) -> PathBuf {
        self.model.history_path.join("class_indices.json")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.model.history_path.join("train_metrics.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
model:
  image_size: 32
  train_data_path: data/train
  val_data_path: data/val
  history_path: runs/history
  ckpt_path: runs/ckpt/
  model_name: Med
  classes: 5
train:
  batch_size: 16
  epochs: 10
"#;

    fn ov(raw: &str) -> Override {
        raw.parse().unwrap()
    }

    #[test]
    fn parses_with_defaults() {
        let config = TrainConfig::from_yaml_str(YAML, &[]).unwrap();
        assert_eq!(config.model.hidden_layers, vec![128]);
        assert_eq!(config.model.activation, ActivationFunction::ReLU);
        assert_eq!(config.train.optimizer, OptimizerKind::Adam);
        assert_eq!(config.train.learning_rate, 1e-4);
        assert_eq!(config.train.num_workers, None);
        assert_eq!(config.input_size(), 3 * 32 * 32);
    }

    #[test]
    fn derives_artifact_paths() {
        let config = TrainConfig::from_yaml_str(YAML, &[]).unwrap();
        assert_eq!(config.checkpoint_path(), PathBuf::from("runs/ckpt/MedNet"));
        assert_eq!(config.class_indices_path(), Path::new("runs/history").join("class_indices.json"));
        assert_eq!(config.metrics_path(), Path::new("runs/history").join("train_metrics.txt"));
    }

    #[test]
    fn applies_overrides_before_validation() {
        let config = TrainConfig::from_yaml_str(
            YAML,
            &[ov("train.epochs=2"), ov("+train.num_workers=0"), ov("+train.optimizer=sgd")],
        )
        .unwrap();
        assert_eq!(config.train.epochs, 2);
        assert_eq!(config.worker_count(), 0);
        assert_eq!(config.train.optimizer, OptimizerKind::Sgd);
    }

    #[test]
    fn zero_epochs_is_a_config_error() {
        let err = TrainConfig::from_yaml_str(YAML, &[ov("train.epochs=0")]).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("epochs")));
    }

    #[test]
    fn rejects_non_positive_numbers() {
        for bad in ["model.image_size=0", "model.classes=0", "train.batch_size=0"] {
            let err = TrainConfig::from_yaml_str(YAML, &[ov(bad)]).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{bad}");
        }
        let err = TrainConfig::from_yaml_str(YAML, &[ov("+train.learning_rate=-1")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_required_key_is_reported() {
        let yaml = YAML.replace("  classes: 5\n", "");
        let err = TrainConfig::from_yaml_str(&yaml, &[]).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("classes")));
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let config = TrainConfig::load(file.path(), &[]).unwrap();
        assert_eq!(config.train.batch_size, 16);

        let err = TrainConfig::load("/definitely/not/here.yaml", &[]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
