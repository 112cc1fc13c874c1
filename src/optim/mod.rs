pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::Sgd;

use serde::{Deserialize, Serialize};

use crate::layers::dense::Parameter;

/// Gradient-based parameter update.
pub trait Optimizer {
    /// Applies one update using the gradients stored next to each parameter.
    fn step(&mut self, params: &mut [Parameter<'_>]);

    fn learning_rate(&self) -> f64;
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn step(&mut self, params: &mut [Parameter<'_>]) {
        (**self).step(params)
    }

    fn learning_rate(&self) -> f64 {
        (**self).learning_rate()
    }
}

/// Optimizer selected by `train.optimizer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

impl OptimizerKind {
    pub fn build(self, learning_rate: f64) -> Box<dyn Optimizer + Send> {
        match self {
            OptimizerKind::Adam => Box::new(Adam::default_params(learning_rate)),
            OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
        }
    }
}
