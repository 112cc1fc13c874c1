pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod data;
pub mod config;
pub mod train;
pub mod error;
pub mod logging;

// Convenience re-exports
pub use math::{Device, Matrix};
pub use activation::activation::ActivationFunction;
pub use layers::dense::Layer;
pub use network::network::Network;
pub use loss::{Criterion, CrossEntropyLoss};
pub use optim::{Adam, Optimizer, OptimizerKind, Sgd};
pub use data::{BatchSource, DataLoader, ImageFolder};
pub use config::{Override, TrainConfig};
pub use train::{run, run_with_progress, Model, Trainer, TrainingSummary};
pub use error::{Error, Result};
