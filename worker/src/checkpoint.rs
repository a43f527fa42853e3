//! Saving and loading trained parameters as safetensors files.
//!
//! Every parameter tensor is stored as little endian `f32` under the name the model gives
//! it, e.g. `conv1.weight` or `fc2.bias`.

use std::{fs, path::Path};

use log::info;
use machine_learning::{ParamStore, arch::Model};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::error::{Result, WorkerErr};

/// Writes the parameters of `model` held in `store` to `path`.
pub fn save<M: Model>(path: &Path, model: &M, store: &ParamStore) -> Result<()> {
    let named = model.named_params();

    let total: usize = named.iter().map(|(_, shape)| shape.iter().product::<usize>()).sum();
    if total != store.len() {
        return Err(WorkerErr::checkpoint(
            path,
            format!("model names {total} parameters but the store holds {}", store.len()),
        ));
    }

    let mut rest = store.params();
    let mut tensors = Vec::with_capacity(named.len());
    for (name, shape) in named {
        let (values, tail) = rest.split_at(shape.iter().product());
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();

        tensors.push((name, shape, bytes));
        rest = tail;
    }

    let views = tensors
        .iter()
        .map(|(name, shape, bytes)| {
            let view = TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map_err(|e| WorkerErr::checkpoint(path, e))?;
            Ok((name.as_str(), view))
        })
        .collect::<Result<Vec<_>>>()?;

    let serialized =
        safetensors::serialize(views, &None).map_err(|e| WorkerErr::checkpoint(path, e))?;
    fs::write(path, serialized).map_err(|e| WorkerErr::checkpoint(path, e))?;

    info!("saved {} parameters to {}", store.len(), path.display());
    Ok(())
}

/// Reads the parameters of `model` back from `path`.
///
/// # Errors
/// `WorkerErr::Checkpoint` if a tensor is missing, is not `f32` or has a different shape
/// than the model expects.
pub fn load<M: Model>(path: &Path, model: &M) -> Result<ParamStore> {
    let bytes = fs::read(path).map_err(|e| WorkerErr::checkpoint(path, e))?;
    let tensors = SafeTensors::deserialize(&bytes).map_err(|e| WorkerErr::checkpoint(path, e))?;

    let mut params = Vec::with_capacity(model.size());
    for (name, shape) in model.named_params() {
        let view = tensors
            .tensor(&name)
            .map_err(|e| WorkerErr::checkpoint(path, format!("{name}: {e}")))?;

        if view.dtype() != Dtype::F32 || view.shape() != shape.as_slice() {
            return Err(WorkerErr::checkpoint(
                path,
                format!(
                    "{name} is {:?} {:?}, expected F32 {shape:?}",
                    view.dtype(),
                    view.shape()
                ),
            ));
        }

        params.extend(
            view.data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
    }

    Ok(ParamStore::from_params(params))
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::{NetConfig, Sequential, layers::Layer};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn tiny_model() -> Sequential {
        Sequential::new([
            Layer::conv2d(1, 2, 2, None),
            Layer::flatten(),
            Layer::dense((8, 3), None),
        ])
    }

    #[test]
    fn parameters_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");

        let model = tiny_model();
        let mut store = ParamStore::new(model.size());
        model
            .init_params(&mut store, &mut StdRng::seed_from_u64(2))
            .unwrap();

        save(&path, &model, &store).unwrap();
        let loaded = load(&path, &model).unwrap();

        assert_eq!(loaded.params(), store.params());
    }

    #[test]
    fn tensors_keep_their_names_and_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");

        let model = tiny_model();
        save(&path, &model, &ParamStore::new(model.size())).unwrap();

        let bytes = fs::read(&path).unwrap();
        let tensors = SafeTensors::deserialize(&bytes).unwrap();

        let conv = tensors.tensor("conv1.weight").unwrap();
        assert_eq!(conv.shape(), &[2, 1, 2, 2]);
        assert_eq!(conv.dtype(), Dtype::F32);
        assert_eq!(tensors.tensor("fc1.bias").unwrap().shape(), &[3]);
    }

    #[test]
    fn loading_into_another_architecture_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");

        let model = tiny_model();
        save(&path, &model, &ParamStore::new(model.size())).unwrap();

        let other = NetConfig::default().build(0).unwrap();
        let err = load(&path, &other).unwrap_err();
        assert!(matches!(err, WorkerErr::Checkpoint { .. }), "{err}");
    }

    #[test]
    fn store_of_the_wrong_size_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");

        let model = tiny_model();
        assert!(save(&path, &model, &ParamStore::new(3)).is_err());
        assert!(!path.exists());
    }
}
