//! TEKE: TransE with neighbourhood context projected through a learned matrix.
//!
//! Each head/tail embedding is shifted by its context vector mapped through
//! the projection A before the translation score is taken:
//!
//! ```text
//! h' = n_h · A + E[h]
//! t' = n_t · A + E[t]
//! score = fnsim(h' + R[r], t')
//! ```
//!
//! Training minimizes a margin ranking loss between positive and corrupted
//! triplets with AdaGrad.

mod batch;
mod graph;
mod params;

pub use batch::KgBatch;
pub use graph::{Forward, TekeGraph};
pub use params::{ParameterStore, PostOp, ENTITY_KEY, PROJECTION_KEY, RELATION_KEY};

pub(crate) use batch::{check_ids, index_tensor};

use candle_core::{Device, Tensor};
use tracing::info;

use crate::config::TekeConfig;
use crate::error::{Result, TekeError};
use crate::ranking::{self, TrainedEmbeddings};

/// Model definition: sizes and hyper-parameters, plus the batch rankers.
///
/// # Example
/// ```
/// use candle_core::Device;
/// use teke::{KgBatch, Teke, TekeConfig};
///
/// let teke = Teke::new(TekeConfig::new(4, 2, 3, 2).with_seed(0)).unwrap();
/// let mut graph = teke.create_graph(&Device::Cpu).unwrap();
///
/// let batch = KgBatch::with_zero_context(
///     &[(0, 0, 1), (2, 1, 3)],
///     &[(0, 0, 2), (1, 1, 3)],
///     3,
///     &Device::Cpu,
/// )
/// .unwrap();
/// let loss = graph.train(&batch).unwrap();
/// graph.run_post_ops().unwrap();
/// assert!(loss.is_finite());
/// ```
#[derive(Debug, Clone)]
pub struct Teke {
    config: TekeConfig,
}

impl Teke {
    pub fn new(config: TekeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TekeConfig {
        &self.config
    }

    /// Initialize E, R, A and the optimizer on `device`.
    pub fn create_graph(&self, device: &Device) -> Result<TekeGraph> {
        info!(
            num_entities = self.config.num_entities,
            num_relations = self.config.num_relations,
            embedding_size = self.config.embedding_size,
            similarity = ?self.config.similarity,
            "building model"
        );
        TekeGraph::build(&self.config, device)
    }

    /// Score every candidate head for `(?, test_inpo[i], test_inpr[i])`.
    ///
    /// See [`ranking::rank_left_idx`].
    pub fn rank_left_idx(
        &self,
        test_inpr: &[u32],
        test_inpo: &[u32],
        emb: &TrainedEmbeddings,
        n_h: &Tensor,
        n_t: &Tensor,
    ) -> Result<Tensor> {
        self.check_embeddings(emb)?;
        ranking::rank_left_idx(test_inpr, test_inpo, emb, n_h, n_t)
    }

    /// Score every candidate tail for `(test_inpl[i], test_inpo[i], ?)`.
    ///
    /// See [`ranking::rank_right_idx`].
    pub fn rank_right_idx(
        &self,
        test_inpl: &[u32],
        test_inpo: &[u32],
        emb: &TrainedEmbeddings,
        n_h: &Tensor,
        n_t: &Tensor,
    ) -> Result<Tensor> {
        self.check_embeddings(emb)?;
        ranking::rank_right_idx(test_inpl, test_inpo, emb, n_h, n_t)
    }

    fn check_embeddings(&self, emb: &TrainedEmbeddings) -> Result<()> {
        let expected = [
            self.config.num_entities,
            self.config.num_relations,
            self.config.embedding_size,
        ];
        let got = [emb.num_entities(), emb.num_relations(), emb.dim()];
        if expected != got {
            return Err(TekeError::shape(expected, got));
        }
        Ok(())
    }
}
