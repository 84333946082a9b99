//! Property-based tests for the rankers and the post-step normalization.
//!
//! The batched rankers group test rows by relation; whatever the grouping,
//! every score must match the direct per-(row, entity) formula:
//!
//! S_left[i, e]  = -‖(n_h[i]·A + E[e]) + R[r_i] - (n_t[i]·A + E[t_i])‖²
//! S_right[i, e] = -‖(n_h[i]·A + E[h_i]) + R[r_i] - (n_t[i]·A + E[e])‖²

#![allow(clippy::unwrap_used)]

use candle_core::{DType, Device, Tensor};
use proptest::collection::vec;
use proptest::prelude::*;
use teke::ranking::rank_of;
use teke::{rank_left_idx, rank_right_idx, Teke, TekeConfig, TrainedEmbeddings};

#[derive(Debug, Clone)]
struct Case {
    n: usize,
    r: usize,
    d: usize,
    m: usize,
    e: Vec<f32>,
    rel: Vec<f32>,
    a: Vec<f32>,
    n_h: Vec<f32>,
    n_t: Vec<f32>,
    ents: Vec<u32>,
    rels: Vec<u32>,
}

fn arb_case() -> impl Strategy<Value = Case> {
    (1usize..7, 1usize..4, 1usize..5, 1usize..9).prop_flat_map(|(n, r, d, m)| {
        (
            vec(-1.0f32..1.0, n * d),
            vec(-1.0f32..1.0, r * d),
            vec(-1.0f32..1.0, d * d),
            vec(-1.0f32..1.0, m * d),
            vec(-1.0f32..1.0, m * d),
            vec(0..n as u32, m),
            vec(0..r as u32, m),
        )
            .prop_map(move |(e, rel, a, n_h, n_t, ents, rels)| Case {
                n,
                r,
                d,
                m,
                e,
                rel,
                a,
                n_h,
                n_t,
                ents,
                rels,
            })
    })
}

impl Case {
    fn embeddings(&self) -> TrainedEmbeddings {
        let dev = Device::Cpu;
        TrainedEmbeddings::new(
            Tensor::from_vec(self.e.clone(), (self.n, self.d), &dev).unwrap(),
            Tensor::from_vec(self.rel.clone(), (self.r, self.d), &dev).unwrap(),
            Tensor::from_vec(self.a.clone(), (self.d, self.d), &dev).unwrap(),
        )
        .unwrap()
    }

    fn contexts(&self) -> (Tensor, Tensor) {
        let dev = Device::Cpu;
        (
            Tensor::from_vec(self.n_h.clone(), (self.m, self.d), &dev).unwrap(),
            Tensor::from_vec(self.n_t.clone(), (self.m, self.d), &dev).unwrap(),
        )
    }

    /// Row `i` of a context matrix projected through A, in f64.
    fn project(&self, ctx: &[f32], i: usize) -> Vec<f64> {
        (0..self.d)
            .map(|j| {
                (0..self.d)
                    .map(|k| ctx[i * self.d + k] as f64 * self.a[k * self.d + j] as f64)
                    .sum()
            })
            .collect()
    }

    fn entity(&self, e: usize, k: usize) -> f64 {
        self.e[e * self.d + k] as f64
    }

    fn relation(&self, r: usize, k: usize) -> f64 {
        self.rel[r * self.d + k] as f64
    }

    /// Direct score with `head` and `tail` entity ids for row `i`.
    fn naive(&self, i: usize, head: usize, tail: usize) -> f64 {
        let ch = self.project(&self.n_h, i);
        let ct = self.project(&self.n_t, i);
        let r = self.rels[i] as usize;
        -(0..self.d)
            .map(|k| {
                let h = ch[k] + self.entity(head, k);
                let t = ct[k] + self.entity(tail, k);
                (h + self.relation(r, k) - t).powi(2)
            })
            .sum::<f64>()
    }
}

fn close(got: f32, want: f64) -> bool {
    (got as f64 - want).abs() <= 1e-4 * want.abs().max(1.0)
}

mod ranking_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn left_scores_match_direct_formula(case in arb_case()) {
            let emb = case.embeddings();
            let (n_h, n_t) = case.contexts();
            let scores: Vec<Vec<f32>> = rank_left_idx(&case.ents, &case.rels, &emb, &n_h, &n_t)
                .unwrap()
                .to_vec2()
                .unwrap();
            prop_assert_eq!(scores.len(), case.m);
            for (i, row) in scores.iter().enumerate() {
                prop_assert_eq!(row.len(), case.n);
                for (e, &s) in row.iter().enumerate() {
                    let want = case.naive(i, e, case.ents[i] as usize);
                    prop_assert!(close(s, want), "[{}, {}]: {} vs {}", i, e, s, want);
                    prop_assert!(s <= 0.0);
                }
            }
        }

        #[test]
        fn right_scores_match_direct_formula(case in arb_case()) {
            let emb = case.embeddings();
            let (n_h, n_t) = case.contexts();
            let scores: Vec<Vec<f32>> = rank_right_idx(&case.ents, &case.rels, &emb, &n_h, &n_t)
                .unwrap()
                .to_vec2()
                .unwrap();
            prop_assert_eq!(scores.len(), case.m);
            for (i, row) in scores.iter().enumerate() {
                for (e, &s) in row.iter().enumerate() {
                    let want = case.naive(i, case.ents[i] as usize, e);
                    prop_assert!(close(s, want), "[{}, {}]: {} vs {}", i, e, s, want);
                }
            }
        }

        #[test]
        fn rank_is_within_candidate_count(
            scores in vec(-10.0f32..0.0, 1..50),
            pick in any::<prop::sample::Index>(),
        ) {
            let target = pick.index(scores.len());
            let raw = rank_of(&scores, target, |_| false).unwrap();
            let filtered = rank_of(&scores, target, |e| e % 2 == 0).unwrap();
            prop_assert!(raw >= 1 && raw <= scores.len());
            prop_assert!(filtered >= 1 && filtered <= raw);
        }
    }
}

mod normalization_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn post_ops_give_unit_rows(seed in any::<u64>(), n in 1usize..20, d in 1usize..12) {
            let teke = Teke::new(TekeConfig::new(n, 3, d, 1).with_seed(seed)).unwrap();
            let graph = teke.create_graph(&Device::Cpu).unwrap();
            graph.run_post_ops().unwrap();

            for table in [graph.params().entities(), graph.params().relations()] {
                let norms: Vec<f32> = table
                    .as_tensor()
                    .sqr()
                    .unwrap()
                    .sum(1)
                    .unwrap()
                    .sqrt()
                    .unwrap()
                    .to_dtype(DType::F32)
                    .unwrap()
                    .to_vec1()
                    .unwrap();
                for norm in norms {
                    prop_assert!((norm - 1.0).abs() < 1e-4, "norm {}", norm);
                }
            }
        }
    }
}
