//! A training minibatch: positive and corrupted triplets plus their contexts.

use candle_core::{DType, Device, Tensor};

use crate::config::TekeConfig;
use crate::error::{Result, TekeError};

/// One minibatch as fed to [`TekeGraph::forward`](super::TekeGraph::forward).
///
/// The six id sequences and the four context tensors are row-aligned: row
/// `i` of every field belongs to the `i`-th positive/negative pair. Each
/// context tensor has shape `(batch_size_kg, embedding_size)`.
#[derive(Debug, Clone)]
pub struct KgBatch {
    pub heads: Vec<u32>,
    pub relations: Vec<u32>,
    pub tails: Vec<u32>,
    pub neg_heads: Vec<u32>,
    pub neg_relations: Vec<u32>,
    pub neg_tails: Vec<u32>,
    pub head_context: Tensor,
    pub tail_context: Tensor,
    pub neg_head_context: Tensor,
    pub neg_tail_context: Tensor,
}

impl KgBatch {
    /// Build a batch from `(head, relation, tail)` triplets and their contexts.
    pub fn from_triples(
        positive: &[(u32, u32, u32)],
        negative: &[(u32, u32, u32)],
        head_context: Tensor,
        tail_context: Tensor,
        neg_head_context: Tensor,
        neg_tail_context: Tensor,
    ) -> Self {
        let (heads, relations, tails) = unzip3(positive);
        let (neg_heads, neg_relations, neg_tails) = unzip3(negative);
        Self {
            heads,
            relations,
            tails,
            neg_heads,
            neg_relations,
            neg_tails,
            head_context,
            tail_context,
            neg_head_context,
            neg_tail_context,
        }
    }

    /// Batch whose context vectors are all zero, reducing TEKE to TransE.
    pub fn with_zero_context(
        positive: &[(u32, u32, u32)],
        negative: &[(u32, u32, u32)],
        embedding_size: usize,
        device: &Device,
    ) -> Result<Self> {
        let zeros = Tensor::zeros((positive.len(), embedding_size), DType::F32, device)?;
        Ok(Self::from_triples(
            positive,
            negative,
            zeros.clone(),
            zeros.clone(),
            zeros.clone(),
            zeros,
        ))
    }

    /// Number of rows in the batch.
    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// Check lengths, id ranges and context shapes against the model sizes.
    pub fn validate(&self, config: &TekeConfig) -> Result<()> {
        let batch = config.batch_size_kg;
        let ids: [(&[u32], &'static str, usize); 6] = [
            (self.heads.as_slice(), "entity", config.num_entities),
            (self.relations.as_slice(), "relation", config.num_relations),
            (self.tails.as_slice(), "entity", config.num_entities),
            (self.neg_heads.as_slice(), "entity", config.num_entities),
            (self.neg_relations.as_slice(), "relation", config.num_relations),
            (self.neg_tails.as_slice(), "entity", config.num_entities),
        ];
        for (seq, kind, bound) in ids {
            if seq.len() != batch {
                return Err(TekeError::shape([batch], [seq.len()]));
            }
            check_ids(seq, kind, bound)?;
        }

        let expected = [batch, config.embedding_size];
        for context in [
            &self.head_context,
            &self.tail_context,
            &self.neg_head_context,
            &self.neg_tail_context,
        ] {
            if context.dims() != expected {
                return Err(TekeError::shape(expected, context.dims()));
            }
        }
        Ok(())
    }
}

/// Fail with `InvalidIndex` on the first id outside `[0, bound)`.
pub(crate) fn check_ids(ids: &[u32], kind: &'static str, bound: usize) -> Result<()> {
    match ids.iter().find(|&&id| id as usize >= bound) {
        Some(&id) => Err(TekeError::InvalidIndex {
            kind,
            index: id as usize,
            bound,
        }),
        None => Ok(()),
    }
}

/// `u32` index tensor for `index_select` / `index_add`.
pub(crate) fn index_tensor(ids: &[u32], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_vec(ids.to_vec(), (ids.len(),), device)?)
}

fn unzip3(triples: &[(u32, u32, u32)]) -> (Vec<u32>, Vec<u32>, Vec<u32>) {
    let mut a = Vec::with_capacity(triples.len());
    let mut b = Vec::with_capacity(triples.len());
    let mut c = Vec::with_capacity(triples.len());
    for &(h, r, t) in triples {
        a.push(h);
        b.push(r);
        c.push(t);
    }
    (a, b, c)
}
