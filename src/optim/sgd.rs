use crate::layers::dense::Parameter;
use crate::optim::Optimizer;

/// Plain stochastic gradient descent: `θ ← θ - lr · g`.
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [Parameter<'_>]) {
        let lr = self.learning_rate;
        for param in params.iter_mut() {
            *param.value = param.value.zip_map(param.grad, |w, g| w - lr * g);
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::matrix::Matrix;
    use approx::assert_relative_eq;

    #[test]
    fn step_moves_against_gradient() {
        let mut value = Matrix::from_data(vec![vec![1.0, -2.0]]);
        let grad = Matrix::from_data(vec![vec![0.5, -1.0]]);
        let mut sgd = Sgd::new(0.1);
        sgd.step(&mut [Parameter { value: &mut value, grad: &grad }]);
        assert_relative_eq!(value.data[0][0], 0.95, epsilon = 1e-12);
        assert_relative_eq!(value.data[0][1], -1.9, epsilon = 1e-12);
    }
}
