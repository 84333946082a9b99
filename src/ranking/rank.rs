//! Score every entity as the missing head or tail of a batch of test queries.
//!
//! Scores use the negative squared Euclidean convention (higher = better):
//!
//! ```text
//! left:  S[i, e] = -‖(n_h[i]·A + E[e]) + R[r_i] - (n_t[i]·A + E[t_i])‖²
//! right: S[i, e] = -‖(n_h[i]·A + E[h_i]) + (R[r_i] - (n_t[i]·A + E[e]))‖²
//! ```
//!
//! Test rows are grouped by relation id so that the relation-dependent part
//! of the translation is built once per distinct relation, then each group
//! is scored against the whole entity table in one broadcast.

use std::collections::BTreeMap;

use candle_core::{DType, Tensor};
use tracing::debug;

use super::TrainedEmbeddings;
use crate::error::{Result, TekeError};
use crate::model::{check_ids, index_tensor};

/// Test rows per relation id, relations in ascending order.
fn group_by_relation(test_inpo: &[u32]) -> BTreeMap<u32, Vec<u32>> {
    let mut groups: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for (row, &relation) in test_inpo.iter().enumerate() {
        groups.entry(relation).or_default().push(row as u32);
    }
    groups
}

/// Validate a query batch and return its row count.
fn check_queries(
    entity_ids: &[u32],
    test_inpo: &[u32],
    emb: &TrainedEmbeddings,
    n_h: &Tensor,
    n_t: &Tensor,
) -> Result<usize> {
    let m = entity_ids.len();
    if test_inpo.len() != m {
        return Err(TekeError::shape([m], [test_inpo.len()]));
    }
    check_ids(entity_ids, "entity", emb.num_entities())?;
    check_ids(test_inpo, "relation", emb.num_relations())?;

    let expected = [m, emb.dim()];
    for context in [n_h, n_t] {
        if context.dims() != expected {
            return Err(TekeError::shape(expected, context.dims()));
        }
    }
    Ok(m)
}

/// Rank candidate heads for `(?, test_inpo[i], test_inpr[i])`.
///
/// `n_h` and `n_t` hold one head and one tail context row per test query,
/// shape `(m, d)`. Returns an `(m, num_entities)` score matrix.
pub fn rank_left_idx(
    test_inpr: &[u32],
    test_inpo: &[u32],
    emb: &TrainedEmbeddings,
    n_h: &Tensor,
    n_t: &Tensor,
) -> Result<Tensor> {
    let m = check_queries(test_inpr, test_inpo, emb, n_h, n_t)?;
    let num_entities = emb.num_entities();
    let device = emb.entities().device();
    if m == 0 {
        return Ok(Tensor::zeros((0, num_entities), DType::F32, device)?);
    }

    let a = emb.projection();
    let n_h = n_h.to_dtype(DType::F32)?.to_device(device)?;
    let n_t = n_t.to_dtype(DType::F32)?.to_device(device)?;

    let groups = group_by_relation(test_inpo);
    let unique: Vec<u32> = groups.keys().copied().collect();
    let unique_rel = emb
        .relations()
        .index_select(&index_tensor(&unique, device)?, 0)?;

    // unique_lhs[i, u] = n_h[i]·A + R[unique[u]]      [m, U, d]
    let lhs_context = n_h.matmul(a)?;
    let unique_lhs = lhs_context
        .unsqueeze(1)?
        .broadcast_add(&unique_rel.unsqueeze(0)?)?;
    // the given tail, fixed per row                    [m, d]
    let rhs = (n_t.matmul(a)?
        + emb
            .entities()
            .index_select(&index_tensor(test_inpr, device)?, 0)?)?;
    let candidates = emb.entities().unsqueeze(0)?;

    let mut results = Tensor::zeros((m, num_entities), DType::F32, device)?;
    for (u, rows) in groups.values().enumerate() {
        let rows = index_tensor(rows, device)?;
        let tmp_lhs = unique_lhs.index_select(&rows, 0)?.narrow(1, u, 1)?; // [k, 1, d]
        let heads = candidates.broadcast_add(&tmp_lhs)?; // [k, N, d]
        let diff = heads.broadcast_sub(&rhs.index_select(&rows, 0)?.unsqueeze(1)?)?;
        let scores = diff.sqr()?.sum(2)?.neg()?;
        results = results.index_add(&rows, &scores, 0)?;
    }

    debug!(rows = m, relations = unique.len(), "ranked candidate heads");
    Ok(results)
}

/// Rank candidate tails for `(test_inpl[i], test_inpo[i], ?)`.
///
/// Mirror image of [`rank_left_idx`]: the head is fixed per row and every
/// entity is tried as the tail.
pub fn rank_right_idx(
    test_inpl: &[u32],
    test_inpo: &[u32],
    emb: &TrainedEmbeddings,
    n_h: &Tensor,
    n_t: &Tensor,
) -> Result<Tensor> {
    let m = check_queries(test_inpl, test_inpo, emb, n_h, n_t)?;
    let num_entities = emb.num_entities();
    let device = emb.entities().device();
    if m == 0 {
        return Ok(Tensor::zeros((0, num_entities), DType::F32, device)?);
    }

    let a = emb.projection();
    let n_h = n_h.to_dtype(DType::F32)?.to_device(device)?;
    let n_t = n_t.to_dtype(DType::F32)?.to_device(device)?;

    let groups = group_by_relation(test_inpo);
    let unique: Vec<u32> = groups.keys().copied().collect();
    let unique_rel = emb
        .relations()
        .index_select(&index_tensor(&unique, device)?, 0)?;

    let rhs_context = n_t.matmul(a)?;
    // the given head, fixed per row                    [m, d]
    let lhs = (n_h.matmul(a)?
        + emb
            .entities()
            .index_select(&index_tensor(test_inpl, device)?, 0)?)?;
    let candidates = emb.entities().unsqueeze(0)?;

    let mut results = Tensor::zeros((m, num_entities), DType::F32, device)?;
    for (u, rows) in groups.values().enumerate() {
        let rows = index_tensor(rows, device)?;
        let rel = unique_rel.narrow(0, u, 1)?.unsqueeze(0)?; // [1, 1, d]
        // rhs[i, e] = n_t[i]·A + E[e]                  [k, N, d]
        let rhs = candidates.broadcast_add(&rhs_context.index_select(&rows, 0)?.unsqueeze(1)?)?;
        let tmp_rhs = rel.broadcast_sub(&rhs)?;
        let total = tmp_rhs.broadcast_add(&lhs.index_select(&rows, 0)?.unsqueeze(1)?)?;
        let scores = total.sqr()?.sum(2)?.neg()?;
        results = results.index_add(&rows, &scores, 0)?;
    }

    debug!(rows = m, relations = unique.len(), "ranked candidate tails");
    Ok(results)
}
