use rand::Rng;

use crate::{
    activation::activation::ActivationFunction,
    error::{Error, Result},
    math::{device::Device, matrix::Matrix},
};

/// A trainable tensor paired with its accumulated gradient, handed to the
/// optimizer for one update.
pub struct Parameter<'a> {
    pub value: &'a mut Matrix,
    pub grad: &'a Matrix,
}

/// Values saved by a training-mode forward pass and consumed by `backward`.
#[derive(Debug, Clone)]
struct ForwardCache {
    input: Matrix,
    pre_activation: Matrix,
}

/// Fully connected layer. Weights are (input_size, size) so a batch of shape
/// (n, input_size) maps to (n, size).
#[derive(Debug, Clone)]
pub struct Layer{
    pub size: usize,
    pub input_size: usize,
    pub weights: Matrix,
    pub biases: Matrix,
    pub activator: ActivationFunction,
    weights_grad: Matrix,
    biases_grad: Matrix,
    cache: Option<ForwardCache>,
}

impl Layer {
    pub fn new<R: Rng>(
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Layer {
        let weights = if activation.prefers_he_init() {
            Matrix::he(input_size, size, rng)
        } else {
            Matrix::xavier(input_size, size, rng)
        };
        Layer::from_parts(weights, Matrix::zeros(1, size), activation)
    }

    /// Rebuilds a layer from stored weights, e.g. when loading a checkpoint.
    pub fn from_parts(weights: Matrix, biases: Matrix, activation: ActivationFunction) -> Layer {
        Layer {
            size: weights.cols,
            input_size: weights.rows,
            weights_grad: Matrix::zeros(weights.rows, weights.cols),
            biases_grad: Matrix::zeros(1, weights.cols),
            weights,
            biases,
            activator: activation,
            cache: None,
        }
    }

    /// Forward pass for a batch. With `track` set, the input and the
    /// pre-activation `z = XW + b` are kept for the backward pass.
    pub fn feed_from(&mut self, input: &Matrix, device: Device, track: bool) -> Matrix {
        let z = input.matmul(&self.weights, device).add_row(&self.biases);
        let a = z.map(|x| self.activator.function(x));
        self.cache = if track {
            Some(ForwardCache { input: input.clone(), pre_activation: z })
        } else {
            None
        };
        a
    }

    /// Backpropagates `grad_output` (dL/da for this layer's activations).
    ///
    /// Gradients are added to the layer's buffers; returns dL/dX for the
    /// previous layer.
    pub fn backward(&mut self, grad_output: &Matrix, device: Device) -> Result<Matrix> {
        let cache = self.cache.as_ref().ok_or_else(|| {
            Error::Model("backward called without a training-mode forward pass".into())
        })?;
        if !grad_output.same_shape(&cache.pre_activation) {
            return Err(Error::Shape(format!(
                "gradient of shape {}x{} does not match layer output {}x{}",
                grad_output.rows, grad_output.cols, cache.pre_activation.rows, cache.pre_activation.cols
            )));
        }

        // δ = dL/da ⊙ σ'(z)
        let act_derivative = cache.pre_activation.map(|x| self.activator.derivative(x));
        let delta = grad_output.hadamard(&act_derivative);

        let weights_grad = cache.input.transpose().matmul(&delta, device);
        self.weights_grad.add_assign(&weights_grad);
        self.biases_grad.add_assign(&delta.sum_rows());

        Ok(delta.matmul(&self.weights.transpose(), device))
    }

    pub fn zero_grad(&mut self) {
        self.weights_grad.fill(0.0);
        self.biases_grad.fill(0.0);
    }

    /// Drops any cached activations.
    pub fn clear_cache(&mut self) {
        self.cache = None;
    }

    pub fn parameters(&mut self) -> (Parameter<'_>, Parameter<'_>) {
        (
            Parameter { value: &mut self.weights, grad: &self.weights_grad },
            Parameter { value: &mut self.biases, grad: &self.biases_grad },
        )
    }

    pub fn weights_grad(&self) -> &Matrix {
        &self.weights_grad
    }

    pub fn biases_grad(&self) -> &Matrix {
        &self.biases_grad
    }
}
