use std::path::Path;

use rand::Rng;

use crate::{
    error::{Error, Result},
    layers::dense::{Layer, Parameter},
    math::{device::Device, matrix::Matrix},
    network::{checkpoint, spec::NetworkSpec},
    train::model::{Mode, Model},
};

/// A stack of dense layers built from a `NetworkSpec`.
pub struct Network {
    pub layers: Vec<Layer>,
    pub spec: NetworkSpec,
    device: Device,
    mode: Mode,
}

impl Network {
    /// Builds a freshly initialized network from a validated spec.
    pub fn from_spec<R: Rng>(spec: &NetworkSpec, rng: &mut R) -> Result<Network> {
        spec.validate()?;
        let layers = spec.layers.iter()
            .map(|l| Layer::new(l.size, l.input_size, l.activation, rng))
            .collect();
        Ok(Network::from_layers(spec.clone(), layers))
    }

    pub(crate) fn from_layers(spec: NetworkSpec, layers: Vec<Layer>) -> Network {
        Network { layers, spec, device: Device::Cpu, mode: Mode::Train }
    }

    /// Moves matrix kernels onto `device`.
    pub fn to_device(&mut self, device: Device) {
        self.device = device;
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn input_size(&self) -> usize {
        self.spec.input_size()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter()
            .map(|l| l.weights.rows * l.weights.cols + l.biases.cols)
            .sum()
    }

    /// Loads a network saved with `Model::save_checkpoint`.
    pub fn load_checkpoint(path: &Path) -> Result<Network> {
        checkpoint::load(path)
    }
}

impl Model for Network {
    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        if mode == Mode::Eval {
            self.layers.iter_mut().for_each(Layer::clear_cache);
        }
    }

    /// Forward pass; in training mode each layer keeps what backprop needs.
    fn forward(&mut self, inputs: &Matrix) -> Result<Matrix> {
        if inputs.cols != self.input_size() {
            return Err(Error::Shape(format!(
                "model '{}' expects {} input features per sample, got {}",
                self.spec.name, self.input_size(), inputs.cols
            )));
        }
        let track = self.mode == Mode::Train;
        let device = self.device;
        let mut current = self.layers
            .first_mut()
            .map(|layer| layer.feed_from(inputs, device, track))
            .ok_or_else(|| Error::Model("network has no layers".into()))?;
        for layer in self.layers.iter_mut().skip(1) {
            current = layer.feed_from(&current, device, track);
        }
        Ok(current)
    }

    fn zero_grad(&mut self) {
        self.layers.iter_mut().for_each(Layer::zero_grad);
    }

    fn backward(&mut self, grad_scores: &Matrix) -> Result<()> {
        if self.mode != Mode::Train {
            return Err(Error::Model("backward called in evaluation mode".into()));
        }
        let device = self.device;
        let mut delta = grad_scores.clone();
        for layer in self.layers.iter_mut().rev() {
            delta = layer.backward(&delta, device)?;
        }
        Ok(())
    }

    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        let mut params = Vec::with_capacity(self.layers.len() * 2);
        for layer in self.layers.iter_mut() {
            let (weights, biases) = layer.parameters();
            params.push(weights);
            params.push(biases);
        }
        params
    }

    fn save_checkpoint(&self, path: &Path) -> Result<()> {
        checkpoint::save(self, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;
    use crate::loss::{Criterion, CrossEntropyLoss};
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn small_net() -> Network {
        let spec = NetworkSpec::classifier("Tiny", 4, &[5], ActivationFunction::Tanh, 3);
        Network::from_spec(&spec, &mut StdRng::seed_from_u64(11)).unwrap()
    }

    fn batch() -> (Matrix, Vec<usize>) {
        let inputs = Matrix::from_data(vec![
            vec![0.2, -0.4, 0.9, 0.1],
            vec![-0.7, 0.3, 0.05, 0.6],
        ]);
        (inputs, vec![2, 0])
    }

    fn loss_at(net: &mut Network, inputs: &Matrix, labels: &[usize]) -> f64 {
        let scores = net.forward(inputs).unwrap();
        CrossEntropyLoss.compute(&scores, labels).unwrap().value
    }

    #[test]
    fn rejects_wrong_input_width() {
        let mut net = small_net();
        let err = net.forward(&Matrix::zeros(2, 5)).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
    }

    #[test]
    fn analytic_gradient_matches_finite_difference() {
        let mut net = small_net();
        let (inputs, labels) = batch();

        net.set_mode(Mode::Train);
        net.zero_grad();
        let scores = net.forward(&inputs).unwrap();
        let out = CrossEntropyLoss.compute(&scores, &labels).unwrap();
        net.backward(&out.grad).unwrap();
        let analytic_w = net.layers[0].weights_grad().data[1][2];
        let analytic_b = net.layers[1].biases_grad().data[0][0];

        let h = 1e-6;
        net.layers[0].weights.data[1][2] += h;
        let plus = loss_at(&mut net, &inputs, &labels);
        net.layers[0].weights.data[1][2] -= 2.0 * h;
        let minus = loss_at(&mut net, &inputs, &labels);
        net.layers[0].weights.data[1][2] += h;
        assert_relative_eq!(analytic_w, (plus - minus) / (2.0 * h), epsilon = 1e-6, max_relative = 1e-4);

        net.layers[1].biases.data[0][0] += h;
        let plus = loss_at(&mut net, &inputs, &labels);
        net.layers[1].biases.data[0][0] -= 2.0 * h;
        let minus = loss_at(&mut net, &inputs, &labels);
        assert_relative_eq!(analytic_b, (plus - minus) / (2.0 * h), epsilon = 1e-6, max_relative = 1e-4);
    }

    #[test]
    fn eval_mode_refuses_backward() {
        let mut net = small_net();
        let (inputs, labels) = batch();
        net.set_mode(Mode::Eval);
        let scores = net.forward(&inputs).unwrap();
        let out = CrossEntropyLoss.compute(&scores, &labels).unwrap();
        assert!(matches!(net.backward(&out.grad), Err(Error::Model(_))));
    }

    #[test]
    fn exposes_two_parameters_per_layer() {
        let mut net = small_net();
        assert_eq!(net.parameter_count(), 4 * 5 + 5 + 5 * 3 + 3);
        assert_eq!(net.parameters().len(), 4);
    }
}
