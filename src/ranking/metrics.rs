//! Link-prediction metrics over ranker score matrices.

use candle_core::Tensor;
use rustc_hash::FxHashSet;

use crate::error::{Result, TekeError};

/// Aggregate ranking quality over a set of test triplets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RankingMetrics {
    pub count: usize,
    pub mean_rank: f64,
    pub mrr: f64,
    pub hits_at_1: f64,
    pub hits_at_3: f64,
    pub hits_at_10: f64,
}

impl RankingMetrics {
    /// Fold a list of 1-based ranks. Empty input yields all zeros.
    pub fn from_ranks(ranks: &[usize]) -> Self {
        if ranks.is_empty() {
            return Self::default();
        }
        let n = ranks.len() as f64;
        let mut sum_rank = 0.0;
        let mut sum_rr = 0.0;
        let mut hits_1 = 0usize;
        let mut hits_3 = 0usize;
        let mut hits_10 = 0usize;
        for &rank in ranks {
            sum_rank += rank as f64;
            sum_rr += 1.0 / rank as f64;
            if rank == 1 { hits_1 += 1; }
            if rank <= 3 { hits_3 += 1; }
            if rank <= 10 { hits_10 += 1; }
        }
        Self {
            count: ranks.len(),
            mean_rank: sum_rank / n,
            mrr: sum_rr / n,
            hits_at_1: hits_1 as f64 / n,
            hits_at_3: hits_3 as f64 / n,
            hits_at_10: hits_10 as f64 / n,
        }
    }
}

/// 1-based rank of `target` within `scores` (higher is better).
///
/// Only candidates scoring strictly above the target count, so ties resolve
/// in the target's favour. Candidates for which `skip` returns true are
/// ignored (filtered setting).
pub fn rank_of(scores: &[f32], target: usize, skip: impl Fn(usize) -> bool) -> Result<usize> {
    let Some(&true_score) = scores.get(target) else {
        return Err(TekeError::InvalidIndex {
            kind: "entity",
            index: target,
            bound: scores.len(),
        });
    };
    Ok(1 + scores
        .iter()
        .enumerate()
        .filter(|&(e, &s)| e != target && s > true_score && !skip(e))
        .count())
}

fn check_scores(scores: &Tensor, rows: usize) -> Result<Vec<Vec<f32>>> {
    let (m, _) = scores.dims2()?;
    if m != rows {
        return Err(TekeError::shape([rows], [m]));
    }
    Ok(scores.to_vec2()?)
}

/// Metrics for head prediction, `scores` as returned by `rank_left_idx`.
///
/// With `known`, every other head `e` such that `(e, r, t)` is a known true
/// triplet is dropped from the candidate list.
pub fn evaluate_left(
    scores: &Tensor,
    triples: &[(u32, u32, u32)],
    known: Option<&FxHashSet<(u32, u32, u32)>>,
) -> Result<RankingMetrics> {
    let rows = check_scores(scores, triples.len())?;
    let mut ranks = Vec::with_capacity(triples.len());
    for (row, &(h, r, t)) in rows.iter().zip(triples) {
        let rank = rank_of(row, h as usize, |e| {
            known.map_or(false, |k| k.contains(&(e as u32, r, t)))
        })?;
        ranks.push(rank);
    }
    Ok(RankingMetrics::from_ranks(&ranks))
}

/// Metrics for tail prediction, `scores` as returned by `rank_right_idx`.
pub fn evaluate_right(
    scores: &Tensor,
    triples: &[(u32, u32, u32)],
    known: Option<&FxHashSet<(u32, u32, u32)>>,
) -> Result<RankingMetrics> {
    let rows = check_scores(scores, triples.len())?;
    let mut ranks = Vec::with_capacity(triples.len());
    for (row, &(h, r, t)) in rows.iter().zip(triples) {
        let rank = rank_of(row, t as usize, |e| {
            known.map_or(false, |k| k.contains(&(h, r, e as u32)))
        })?;
        ranks.push(rank);
    }
    Ok(RankingMetrics::from_ranks(&ranks))
}
