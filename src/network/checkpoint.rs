//! safetensors persistence for `Network`.
//!
//! Tensors are named `layers.{i}.weight` (input_size × size) and
//! `layers.{i}.bias` (1 × size), stored as little-endian F64. The
//! `NetworkSpec` travels as JSON in the header metadata under `spec`.

use std::collections::HashMap;
use std::path::Path;

use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;

use crate::error::{Error, Result};
use crate::layers::dense::Layer;
use crate::math::matrix::Matrix;
use crate::network::network::Network;
use crate::network::spec::NetworkSpec;

const FORMAT: &str = "ferrite";

pub(crate) fn save(network: &Network, path: &Path) -> Result<()> {
    let mut tensors: Vec<(String, Vec<u8>, Vec<usize>)> = Vec::with_capacity(network.layers.len() * 2);
    for (i, layer) in network.layers.iter().enumerate() {
        tensors.push((
            format!("layers.{i}.weight"),
            to_le_bytes(&layer.weights),
            vec![layer.weights.rows, layer.weights.cols],
        ));
        tensors.push((
            format!("layers.{i}.bias"),
            to_le_bytes(&layer.biases),
            vec![layer.biases.rows, layer.biases.cols],
        ));
    }

    let views = tensors
        .iter()
        .map(|(name, bytes, shape)| {
            TensorView::new(Dtype::F64, shape.clone(), bytes)
                .map(|view| (name.as_str(), view))
                .map_err(|e| Error::Checkpoint(format!("invalid tensor {name}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut metadata = HashMap::new();
    metadata.insert("format".to_string(), FORMAT.to_string());
    metadata.insert("spec".to_string(), serde_json::to_string(&network.spec)?);

    let bytes = safetensors::serialize(views, Some(metadata))
        .map_err(|e| Error::Checkpoint(format!("serialization failed: {e}")))?;
    std::fs::write(path, bytes).map_err(|e| Error::io(path, e))
}

pub(crate) fn load(path: &Path) -> Result<Network> {
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    let spec = read_spec(&bytes)?;
    spec.validate()?;

    let tensors = SafeTensors::deserialize(&bytes)
        .map_err(|e| Error::Checkpoint(format!("{}: {e}", path.display())))?;

    let mut layers = Vec::with_capacity(spec.layers.len());
    for (i, layer_spec) in spec.layers.iter().enumerate() {
        let weights = read_matrix(&tensors, &format!("layers.{i}.weight"))?;
        let biases = read_matrix(&tensors, &format!("layers.{i}.bias"))?;
        if (weights.rows, weights.cols) != (layer_spec.input_size, layer_spec.size)
            || (biases.rows, biases.cols) != (1, layer_spec.size)
        {
            return Err(Error::Checkpoint(format!(
                "layer {i} tensors do not match the stored spec"
            )));
        }
        layers.push(Layer::from_parts(weights, biases, layer_spec.activation));
    }
    Ok(Network::from_layers(spec, layers))
}

fn read_spec(bytes: &[u8]) -> Result<NetworkSpec> {
    let (_, header) = SafeTensors::read_metadata(bytes)
        .map_err(|e| Error::Checkpoint(format!("unreadable header: {e}")))?;
    let metadata = header
        .metadata()
        .as_ref()
        .ok_or_else(|| Error::Checkpoint("missing header metadata".into()))?;
    if metadata.get("format").map(String::as_str) != Some(FORMAT) {
        return Err(Error::Checkpoint("not a ferrite checkpoint".into()));
    }
    let spec = metadata
        .get("spec")
        .ok_or_else(|| Error::Checkpoint("missing network spec".into()))?;
    Ok(serde_json::from_str(spec)?)
}

fn read_matrix(tensors: &SafeTensors<'_>, name: &str) -> Result<Matrix> {
    let view = tensors
        .tensor(name)
        .map_err(|e| Error::Checkpoint(format!("{name}: {e}")))?;
    if view.dtype() != Dtype::F64 {
        return Err(Error::Checkpoint(format!("{name}: expected F64, found {:?}", view.dtype())));
    }
    let (rows, cols) = match view.shape() {
        [rows, cols] => (*rows, *cols),
        other => return Err(Error::Checkpoint(format!("{name}: expected 2-D tensor, found {other:?}"))),
    };
    let values: Vec<f64> = view
        .data()
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect();
    Matrix::from_flat(rows, cols, &values)
        .ok_or_else(|| Error::Checkpoint(format!("{name}: data length does not match shape")))
}

fn to_le_bytes(matrix: &Matrix) -> Vec<u8> {
    matrix.flatten().iter().flat_map(|x| x.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;
    use crate::network::metadata::{InputType, ModelMetadata};
    use crate::train::model::Model;
    use rand::{rngs::StdRng, SeedableRng};
    use tempfile::TempDir;

    #[test]
    fn saved_network_loads_with_identical_weights() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MedNet");
        let spec = NetworkSpec::classifier("Med", 6, &[4], ActivationFunction::ReLU, 2)
            .with_metadata(ModelMetadata {
                description: None,
                input_type: Some(InputType::ImageRgb { width: 1, height: 2 }),
                output_labels: Some(vec!["a".into(), "b".into()]),
            });
        let net = Network::from_spec(&spec, &mut StdRng::seed_from_u64(3)).unwrap();
        net.save_checkpoint(&path).unwrap();

        let loaded = Network::load_checkpoint(&path).unwrap();
        assert_eq!(loaded.spec, spec);
        for (a, b) in net.layers.iter().zip(loaded.layers.iter()) {
            assert_eq!(a.weights, b.weights);
            assert_eq!(a.biases, b.biases);
            assert_eq!(a.activator, b.activator);
        }
    }

    #[test]
    fn garbage_file_is_a_checkpoint_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken");
        std::fs::write(&path, b"not safetensors").unwrap();
        assert!(matches!(Network::load_checkpoint(&path), Err(Error::Checkpoint(_))));
    }
}
