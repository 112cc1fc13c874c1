//! Adam optimizer

use crate::layers::dense::Parameter;
use crate::math::matrix::Matrix;
use crate::optim::Optimizer;

/// Adam (Adaptive Moment Estimation) with bias-corrected moments.
///
/// Moment buffers are keyed by parameter position, so the model must hand
/// over its parameters in the same order on every step.
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    m: Vec<Matrix>, // First moment
    v: Vec<Matrix>, // Second moment
}

impl Adam {
    pub fn new(lr: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Adam with betas (0.9, 0.999) and epsilon 1e-8.
    pub fn default_params(lr: f64) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }

    fn ensure_moments(&mut self, params: &[Parameter<'_>]) {
        let shapes_match = self.m.len() == params.len()
            && self.m.iter().zip(params).all(|(m, p)| m.same_shape(p.value));
        if !shapes_match {
            self.m = params.iter().map(|p| Matrix::zeros(p.value.rows, p.value.cols)).collect();
            self.v = self.m.clone();
            self.t = 0;
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [Parameter<'_>]) {
        self.ensure_moments(params);
        self.t += 1;

        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);
        let bias1 = 1.0 - b1.powi(self.t);
        let bias2 = 1.0 - b2.powi(self.t);
        let step_size = self.lr / bias1;

        for ((param, m), v) in params.iter_mut().zip(self.m.iter_mut()).zip(self.v.iter_mut()) {
            // m_t = β1 * m_{t-1} + (1 - β1) * g
            *m = m.zip_map(param.grad, |m, g| b1 * m + (1.0 - b1) * g);
            // v_t = β2 * v_{t-1} + (1 - β2) * g²
            *v = v.zip_map(param.grad, |v, g| b2 * v + (1.0 - b2) * g * g);

            // θ_t = θ_{t-1} - lr * m̂_t / (√v̂_t + ε)
            let update = m.zip_map(v, |m, v| step_size * m / ((v / bias2).sqrt() + eps));
            *param.value = param.value.zip_map(&update, |w, u| w - u);
        }
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn first_step_moves_by_learning_rate() {
        let mut value = Matrix::from_data(vec![vec![1.0, 1.0, 1.0]]);
        let grad = Matrix::from_data(vec![vec![4.0, -0.01, 0.0]]);
        let mut adam = Adam::default_params(0.001);
        adam.step(&mut [Parameter { value: &mut value, grad: &grad }]);

        // After bias correction the first update is lr * sign(g).
        assert_relative_eq!(value.data[0][0], 0.999, epsilon = 1e-6);
        assert_relative_eq!(value.data[0][1], 1.001, epsilon = 1e-6);
        assert_eq!(value.data[0][2], 1.0);
    }

    #[test]
    fn converges_on_quadratic() {
        // f(x) = x², ∇f = 2x
        let mut value = Matrix::from_data(vec![vec![5.0, -3.0, 2.0]]);
        let mut adam = Adam::default_params(0.1);
        for _ in 0..500 {
            let grad = value.map(|x| 2.0 * x);
            adam.step(&mut [Parameter { value: &mut value, grad: &grad }]);
        }
        for &x in &value.data[0] {
            assert!(x.abs() < 0.1, "did not converge: {x}");
        }
    }
}
