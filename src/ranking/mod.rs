//! Batch ranking of candidate entities for link prediction.
//!
//! The rankers work on a detached copy of the trained parameters
//! ([`TrainedEmbeddings`]) and score every entity as the missing head or
//! tail of each test query. The [`metrics`] sub-module turns the resulting
//! score matrices into mean rank, MRR and Hits@k.

pub mod metrics;
mod rank;

pub use metrics::{evaluate_left, evaluate_right, rank_of, RankingMetrics};
pub use rank::{rank_left_idx, rank_right_idx};

use candle_core::{DType, Tensor};

use crate::error::{Result, TekeError};

/// Entity table, relation table and projection matrix as plain tensors.
#[derive(Debug, Clone)]
pub struct TrainedEmbeddings {
    entities: Tensor,
    relations: Tensor,
    projection: Tensor,
}

impl TrainedEmbeddings {
    /// Wrap E `(N, d)`, R `(R, d)` and A `(d, d)`.
    pub fn new(entities: Tensor, relations: Tensor, projection: Tensor) -> Result<Self> {
        let (_, d) = entities.dims2()?;
        let (num_relations, d_r) = relations.dims2()?;
        if d_r != d {
            return Err(TekeError::shape([num_relations, d], relations.dims()));
        }
        if projection.dims() != [d, d] {
            return Err(TekeError::shape([d, d], projection.dims()));
        }
        let device = entities.device().clone();
        Ok(Self {
            entities: entities.to_dtype(DType::F32)?,
            relations: relations.to_dtype(DType::F32)?.to_device(&device)?,
            projection: projection.to_dtype(DType::F32)?.to_device(&device)?,
        })
    }

    pub fn entities(&self) -> &Tensor {
        &self.entities
    }

    pub fn relations(&self) -> &Tensor {
        &self.relations
    }

    pub fn projection(&self) -> &Tensor {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_trained_embeddings_shapes() {
        let device = Device::Cpu;
        let e = Tensor::zeros((5, 3), DType::F32, &device).unwrap();
        let r = Tensor::zeros((2, 3), DType::F32, &device).unwrap();
        let a = Tensor::zeros((3, 3), DType::F32, &device).unwrap();
        let emb = TrainedEmbeddings::new(e.clone(), r.clone(), a).unwrap();
        assert_eq!(emb.num_entities(), 5);
        assert_eq!(emb.num_relations(), 2);
        assert_eq!(emb.dim(), 3);

        let bad_a = Tensor::zeros((3, 4), DType::F32, &device).unwrap();
        assert!(matches!(
            TrainedEmbeddings::new(e.clone(), r, bad_a),
            Err(TekeError::ShapeMismatch { .. })
        ));

        let bad_r = Tensor::zeros((2, 4), DType::F32, &device).unwrap();
        let a = Tensor::zeros((3, 3), DType::F32, &device).unwrap();
        assert!(matches!(
            TrainedEmbeddings::new(e, bad_r, a),
            Err(TekeError::ShapeMismatch { .. })
        ));
    }
}
