//! Learnable parameters: entity table E, relation table R, projection A.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor, Var};
use indexmap::IndexMap;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::config::TekeConfig;
use crate::error::{Result, TekeError};
use crate::scoring::l2_normalize_rows;

/// Checkpoint key of the entity table.
pub const ENTITY_KEY: &str = "E";
/// Checkpoint key of the relation table.
pub const RELATION_KEY: &str = "R";
/// Checkpoint key of the projection matrix.
pub const PROJECTION_KEY: &str = "A";

/// Normalisation update the caller runs after each optimizer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOp {
    /// Rescale every row of E to unit L2 norm
    NormalizeEntities,
    /// Rescale every row of R to unit L2 norm
    NormalizeRelations,
}

/// The three learnable tensors of a TEKE model.
///
/// Owned by a [`TekeGraph`](super::TekeGraph); the optimizer holds clones of
/// the same `Var`s, so every in-place update here is seen by training.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    entities: Var,
    relations: Var,
    projection: Var,
}

impl ParameterStore {
    /// Sample E, R and A independently from `U[-w, w]`, `w = sqrt(6 / d)`.
    pub fn uniform(config: &TekeConfig, device: &Device) -> Result<Self> {
        let bound = config.init_bound() as f32;
        let dist = Uniform::new_inclusive(-bound, bound);
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let d = config.embedding_size;

        let mut sample = |rows: usize, cols: usize| -> Result<Var> {
            let data: Vec<f32> = (0..rows * cols).map(|_| rng.sample(&dist)).collect();
            let tensor = Tensor::from_vec(data, (rows, cols), device)?;
            Ok(Var::from_tensor(&tensor)?)
        };

        let entities = sample(config.num_entities, d)?;
        let relations = sample(config.num_relations, d)?;
        let projection = sample(d, d)?;

        Ok(Self {
            entities,
            relations,
            projection,
        })
    }

    pub fn entities(&self) -> &Var {
        &self.entities
    }

    pub fn relations(&self) -> &Var {
        &self.relations
    }

    pub fn projection(&self) -> &Var {
        &self.projection
    }

    pub fn num_entities(&self) -> usize {
        self.entities.dims()[0]
    }

    pub fn num_relations(&self) -> usize {
        self.relations.dims()[0]
    }

    pub fn dim(&self) -> usize {
        self.entities.dims()[1]
    }

    /// E, R, A in that order.
    pub fn vars(&self) -> [&Var; 3] {
        [&self.entities, &self.relations, &self.projection]
    }

    /// E, R, A keyed by their checkpoint names, in insertion order.
    pub fn named(&self) -> IndexMap<String, Var> {
        let mut named = IndexMap::new();
        named.insert(ENTITY_KEY.to_string(), self.entities.clone());
        named.insert(RELATION_KEY.to_string(), self.relations.clone());
        named.insert(PROJECTION_KEY.to_string(), self.projection.clone());
        named
    }

    pub fn normalize_entities(&self) -> Result<()> {
        let normalized = l2_normalize_rows(self.entities.as_tensor())?;
        self.entities.set(&normalized)?;
        Ok(())
    }

    pub fn normalize_relations(&self) -> Result<()> {
        let normalized = l2_normalize_rows(self.relations.as_tensor())?;
        self.relations.set(&normalized)?;
        Ok(())
    }

    pub fn apply(&self, op: PostOp) -> Result<()> {
        match op {
            PostOp::NormalizeEntities => self.normalize_entities(),
            PostOp::NormalizeRelations => self.normalize_relations(),
        }
    }

    /// Overwrite E wholesale. `values` must be `(num_entities, d)`.
    pub fn assign_entities(&self, values: &Tensor) -> Result<()> {
        let expected = self.entities.dims();
        if values.dims() != expected {
            return Err(TekeError::shape(expected, values.dims()));
        }
        let values = values
            .to_dtype(DType::F32)?
            .to_device(self.entities.device())?;
        self.entities.set(&values)?;
        Ok(())
    }

    /// Write E, R and A to a safetensors file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let tensors: HashMap<String, Tensor> = self
            .named()
            .into_iter()
            .map(|(name, var)| (name, var.as_tensor().clone()))
            .collect();
        candle_core::safetensors::save(&tensors, path.as_ref())?;
        info!(path = %path.as_ref().display(), "saved checkpoint");
        Ok(())
    }

    /// Restore E, R and A in place from a safetensors file.
    ///
    /// Shapes must match the current tables. The `Var`s are updated rather
    /// than replaced so an existing optimizer keeps tracking them.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let device = self.entities.device().clone();
        let loaded = candle_core::safetensors::load(path.as_ref(), &device)?;

        let mut updates = Vec::with_capacity(3);
        for (name, var) in self.named() {
            let tensor = loaded.get(&name).ok_or_else(|| {
                TekeError::Checkpoint(format!(
                    "tensor '{}' missing from {}",
                    name,
                    path.as_ref().display()
                ))
            })?;
            if tensor.dims() != var.dims() {
                return Err(TekeError::shape(var.dims(), tensor.dims()));
            }
            updates.push((var, tensor.to_dtype(DType::F32)?));
        }
        // all shapes checked before anything is written
        for (var, tensor) in updates {
            var.set(&tensor)?;
        }

        info!(path = %path.as_ref().display(), "loaded checkpoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_norms(var: &Var) -> Vec<f32> {
        var.as_tensor()
            .sqr()
            .unwrap()
            .sum(1)
            .unwrap()
            .sqrt()
            .unwrap()
            .to_vec1()
            .unwrap()
    }

    #[test]
    fn test_uniform_shapes_and_bounds() {
        let config = TekeConfig::new(5, 3, 4, 2).with_seed(7);
        let store = ParameterStore::uniform(&config, &Device::Cpu).unwrap();
        assert_eq!(store.entities().dims(), &[5, 4]);
        assert_eq!(store.relations().dims(), &[3, 4]);
        assert_eq!(store.projection().dims(), &[4, 4]);

        let bound = config.init_bound() as f32;
        for var in store.vars() {
            let values: Vec<f32> = var.as_tensor().flatten_all().unwrap().to_vec1().unwrap();
            assert!(values.iter().all(|v| v.abs() <= bound));
        }
    }

    #[test]
    fn test_seed_is_deterministic() {
        let config = TekeConfig::new(5, 3, 4, 2).with_seed(42);
        let a = ParameterStore::uniform(&config, &Device::Cpu).unwrap();
        let b = ParameterStore::uniform(&config, &Device::Cpu).unwrap();
        let ea: Vec<Vec<f32>> = a.entities().as_tensor().to_vec2().unwrap();
        let eb: Vec<Vec<f32>> = b.entities().as_tensor().to_vec2().unwrap();
        assert_eq!(ea, eb);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let config = TekeConfig::new(6, 3, 4, 2).with_seed(1);
        let store = ParameterStore::uniform(&config, &Device::Cpu).unwrap();

        store.apply(PostOp::NormalizeEntities).unwrap();
        store.apply(PostOp::NormalizeRelations).unwrap();
        for n in row_norms(store.entities()).iter().chain(row_norms(store.relations()).iter()) {
            assert!((n - 1.0).abs() < 1e-5, "norm = {}", n);
        }

        let e1: Vec<Vec<f32>> = store.entities().as_tensor().to_vec2().unwrap();
        let r1: Vec<Vec<f32>> = store.relations().as_tensor().to_vec2().unwrap();
        store.normalize_entities().unwrap();
        store.normalize_relations().unwrap();
        let e2: Vec<Vec<f32>> = store.entities().as_tensor().to_vec2().unwrap();
        let r2: Vec<Vec<f32>> = store.relations().as_tensor().to_vec2().unwrap();
        for (a, b) in e1.iter().flatten().zip(e2.iter().flatten()) {
            assert!((a - b).abs() < 1e-6);
        }
        for (a, b) in r1.iter().flatten().zip(r2.iter().flatten()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_projection_is_not_normalized() {
        let config = TekeConfig::new(4, 2, 3, 2).with_seed(3);
        let store = ParameterStore::uniform(&config, &Device::Cpu).unwrap();
        let before: Vec<Vec<f32>> = store.projection().as_tensor().to_vec2().unwrap();
        store.normalize_entities().unwrap();
        store.normalize_relations().unwrap();
        let after: Vec<Vec<f32>> = store.projection().as_tensor().to_vec2().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_assign_entities() {
        let config = TekeConfig::new(2, 1, 3, 1).with_seed(0);
        let store = ParameterStore::uniform(&config, &Device::Cpu).unwrap();
        let values = Tensor::new(&[[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]], &Device::Cpu).unwrap();
        store.assign_entities(&values).unwrap();
        let e: Vec<Vec<f32>> = store.entities().as_tensor().to_vec2().unwrap();
        assert_eq!(e, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);

        let wrong = Tensor::zeros((3, 3), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            store.assign_entities(&wrong),
            Err(TekeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_named_order() {
        let config = TekeConfig::new(2, 1, 3, 1).with_seed(0);
        let store = ParameterStore::uniform(&config, &Device::Cpu).unwrap();
        let names: Vec<String> = store.named().keys().cloned().collect();
        assert_eq!(names, vec!["E", "R", "A"]);
    }

    #[test]
    fn test_checkpoint_roundtrip_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teke.safetensors");

        let config = TekeConfig::new(4, 2, 3, 2);
        let saved = ParameterStore::uniform(&config.clone().with_seed(11), &Device::Cpu).unwrap();
        saved.save(&path).unwrap();

        let restored = ParameterStore::uniform(&config.with_seed(12), &Device::Cpu).unwrap();
        let handle = restored.entities().clone();
        restored.load(&path).unwrap();

        let want: Vec<Vec<f32>> = saved.entities().as_tensor().to_vec2().unwrap();
        let got: Vec<Vec<f32>> = handle.as_tensor().to_vec2().unwrap();
        assert_eq!(want, got);
    }

    #[test]
    fn test_load_rejects_wrong_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.safetensors");

        let small = ParameterStore::uniform(&TekeConfig::new(2, 2, 3, 1).with_seed(0), &Device::Cpu)
            .unwrap();
        small.save(&path).unwrap();

        let big = ParameterStore::uniform(&TekeConfig::new(5, 2, 3, 1).with_seed(0), &Device::Cpu)
            .unwrap();
        assert!(matches!(big.load(&path), Err(TekeError::ShapeMismatch { .. })));
    }
}
