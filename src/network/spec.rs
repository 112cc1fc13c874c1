use serde::{Serialize, Deserialize};
use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::network::metadata::ModelMetadata;

/// Describes one layer in a network specification.
///
/// Fields:
/// - `size`:       number of neurons in this layer
/// - `input_size`: number of neurons feeding into this layer (i.e. the output
///                 size of the previous layer, or the raw input dimension for
///                 the first layer)
/// - `activation`: activation function applied after the linear transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub size: usize,
    pub input_size: usize,
    pub activation: ActivationFunction,
}

/// A fully serializable description of a network architecture plus optional
/// metadata. Stored alongside the weights in every checkpoint so a
/// checkpoint can be loaded without the training config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Human-readable name, taken from `model.model_name`.
    pub name: String,
    /// Ordered list of layer descriptions (input → output).
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}

impl NetworkSpec {
    /// Image classifier: `input_size` → hidden layers → `classes` logits.
    pub fn classifier(
        name: impl Into<String>,
        input_size: usize,
        hidden: &[usize],
        activation: ActivationFunction,
        classes: usize,
    ) -> NetworkSpec {
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut fan_in = input_size;
        for &size in hidden {
            layers.push(LayerSpec { size, input_size: fan_in, activation });
            fan_in = size;
        }
        layers.push(LayerSpec { size: classes, input_size: fan_in, activation: ActivationFunction::Identity });
        NetworkSpec { name: name.into(), layers, metadata: None }
    }

    pub fn with_metadata(mut self, metadata: ModelMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.input_size)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |l| l.size)
    }

    /// Checks that the layer chain is non-empty and every layer's
    /// `input_size` equals the previous layer's `size`.
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(Error::Model(format!("network '{}' has no layers", self.name)));
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[1].input_size != pair[0].size {
                return Err(Error::Model(format!(
                    "layer {} expects {} inputs but layer {} produces {}",
                    i + 1, pair[1].input_size, i, pair[0].size
                )));
            }
        }
        if self.layers.iter().any(|l| l.size == 0 || l.input_size == 0) {
            return Err(Error::Model("layers must have at least one input and one neuron".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_chains_layers() {
        let spec = NetworkSpec::classifier("Med", 12, &[8, 4], ActivationFunction::ReLU, 3);
        assert_eq!(spec.layers.len(), 3);
        assert_eq!(spec.input_size(), 12);
        assert_eq!(spec.output_size(), 3);
        assert_eq!(spec.layers[2].activation, ActivationFunction::Identity);
        spec.validate().unwrap();
    }

    #[test]
    fn broken_chain_is_rejected() {
        let mut spec = NetworkSpec::classifier("Med", 12, &[8], ActivationFunction::ReLU, 3);
        spec.layers[1].input_size = 7;
        assert!(matches!(spec.validate(), Err(Error::Model(_))));
    }
}
