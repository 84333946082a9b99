//! TEKE: Text-Enhanced Knowledge Embedding
//!
//! A TransE-style knowledge graph embedding model where every head and tail
//! entity is shifted by a textual context vector mapped through a learned
//! square projection. The crate covers model construction, margin-loss
//! training with AdaGrad, the post-step normalization ops, and batch
//! ranking of candidate heads/tails for link prediction.
//!
//! # Key Insight
//!
//! With all context vectors set to zero the model is exactly TransE:
//! `score(h, r, t) = -‖E[h] + R[r] - E[t]‖²`.

pub mod config;
pub mod error;
pub mod model;
pub mod optim;
pub mod ranking;
pub mod scoring;

pub use config::TekeConfig;
pub use error::{Result, TekeError};
pub use model::{Forward, KgBatch, ParameterStore, PostOp, Teke, TekeGraph};
pub use optim::{Adagrad, ParamsAdagrad};
pub use ranking::{
    evaluate_left, evaluate_right, rank_left_idx, rank_right_idx, RankingMetrics,
    TrainedEmbeddings,
};
pub use scoring::Similarity;

use candle_core::Device;

/// Metal device when built with the `metal` feature and one is available,
/// CPU otherwise.
pub fn default_device() -> Device {
    #[cfg(feature = "metal")]
    let device = Device::new_metal(0).unwrap_or(Device::Cpu);
    #[cfg(not(feature = "metal"))]
    let device = Device::Cpu;
    device
}
