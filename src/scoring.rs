//! Triplet scoring: composition ops, similarity functions and the margin loss.
//!
//! A triplet (h, r, t) is scored as `fnsim(leftop(h, r), rightop(t, r))`.
//! TEKE fixes the compositions to a translation on the left and the bare
//! entity on the right, so with [`Similarity::L2`] the score is the TransE
//! plausibility `-‖h + r - t‖²` (higher = more plausible).

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TekeError};

/// Similarity between composed head and tail vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Similarity {
    /// Inner product `<a, b>`
    Dot,
    /// Negative squared Euclidean distance `-‖a - b‖²`
    #[default]
    L2,
    /// Negative Manhattan distance `-‖a - b‖₁`
    L1,
}

impl Similarity {
    /// Score two `[n, d]` / `[m, d]` tensors.
    ///
    /// With `broadcast = false` rows are paired up (`n == m`) and the result
    /// has shape `[n]`. With `broadcast = true` every row of `a` is scored
    /// against every row of `b`, giving `[n, m]`.
    pub fn score(&self, a: &Tensor, b: &Tensor, broadcast: bool) -> Result<Tensor> {
        let (n, d) = a.dims2()?;
        let (m, d_b) = b.dims2()?;
        if d != d_b {
            return Err(TekeError::shape(a.dims(), b.dims()));
        }
        if broadcast {
            return self.pairwise(a, b);
        }
        if n != m {
            return Err(TekeError::shape((n, d), (m, d_b)));
        }

        let scores = match self {
            // Score row i against its own counterpart: the diagonal of the
            // full product, picked out of the flattened matrix.
            Similarity::Dot => {
                let full = self.pairwise(a, b)?;
                let diag: Vec<u32> = (0..n as u32).map(|i| i * (n as u32 + 1)).collect();
                let diag = Tensor::from_vec(diag, (n,), a.device())?;
                full.flatten_all()?.index_select(&diag, 0)?
            }
            Similarity::L2 => (a - b)?.sqr()?.sum(1)?.neg()?,
            Similarity::L1 => (a - b)?.abs()?.sum(1)?.neg()?,
        };
        Ok(scores)
    }

    fn pairwise(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        let scores = match self {
            Similarity::Dot => a.matmul(&b.t()?)?,
            Similarity::L2 => a
                .unsqueeze(1)?
                .broadcast_sub(&b.unsqueeze(0)?)?
                .sqr()?
                .sum(2)?
                .neg()?,
            Similarity::L1 => a
                .unsqueeze(1)?
                .broadcast_sub(&b.unsqueeze(0)?)?
                .abs()?
                .sum(2)?
                .neg()?,
        };
        Ok(scores)
    }
}

/// Left composition: translate the entity by the relation.
pub fn trans(entity: &Tensor, relation: &Tensor) -> Result<Tensor> {
    Ok(entity.add(relation)?)
}

/// Right composition: the entity vector, relation ignored.
pub fn ident_entity(entity: &Tensor, _relation: &Tensor) -> Result<Tensor> {
    Ok(entity.clone())
}

/// Margin ranking loss `mean(max(0, margin - positive + negative))`.
pub fn max_margin(positive: &Tensor, negative: &Tensor, margin: f64) -> Result<Tensor> {
    if positive.dims() != negative.dims() {
        return Err(TekeError::shape(positive.dims(), negative.dims()));
    }
    Ok((negative - positive)?.affine(1.0, margin)?.relu()?.mean_all()?)
}

/// Penalty on projected context vectors: `max(0, Σ_i (‖x_i‖₂ - 1))`.
pub fn context_penalty(projected: &Tensor) -> Result<Tensor> {
    // eps keeps the sqrt gradient finite for all-zero rows
    let norms = projected.sqr()?.sum(1)?.affine(1.0, 1e-12)?.sqrt()?;
    Ok(norms.affine(1.0, -1.0)?.sum_all()?.relu()?)
}

/// Row-wise L2 normalisation: `x / sqrt(max(Σx², 1e-12))`.
///
/// Zero rows stay zero and the divisor is floored at 1e-6.
pub fn l2_normalize_rows(t: &Tensor) -> Result<Tensor> {
    let norms = t.sqr()?.sum_keepdim(1)?.maximum(1e-12)?.sqrt()?;
    Ok(t.broadcast_div(&norms)?)
}
