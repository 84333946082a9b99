//! The trainable computation: lookup, context projection, scoring, loss, step.

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::optim::Optimizer;
use indexmap::IndexMap;
use std::path::Path;
use tracing::debug;

use super::batch::{index_tensor, KgBatch};
use super::params::{ParameterStore, PostOp};
use crate::config::TekeConfig;
use crate::error::Result;
use crate::optim::{Adagrad, ParamsAdagrad};
use crate::ranking::TrainedEmbeddings;
use crate::scoring::{context_penalty, ident_entity, max_margin, trans, Similarity};

/// Tensors produced by one forward pass.
#[derive(Debug, Clone)]
pub struct Forward {
    /// Scalar training loss
    pub loss: Tensor,
    /// Per-row scores of the positive triplets, `[batch]`
    pub positive: Tensor,
    /// Per-row scores of the negative triplets, `[batch]`
    pub negative: Tensor,
    /// Norm penalty on projected positive head contexts (scalar)
    pub reg_head: Tensor,
    /// Norm penalty on projected positive tail contexts (scalar)
    pub reg_tail: Tensor,
}

/// A built TEKE model: parameters plus the AdaGrad optimizer over them.
///
/// Created by [`Teke::create_graph`](super::Teke::create_graph). One
/// optimizer step runs at a time (`train` takes `&mut self`); the caller
/// runs [`post_ops`](Self::post_ops) after each step.
#[derive(Debug)]
pub struct TekeGraph {
    config: TekeConfig,
    params: ParameterStore,
    optimizer: Adagrad,
    device: Device,
}

impl TekeGraph {
    pub(crate) fn build(config: &TekeConfig, device: &Device) -> Result<Self> {
        let params = ParameterStore::uniform(config, device)?;
        let vars: Vec<Var> = params.vars().into_iter().cloned().collect();
        let optimizer = Adagrad::new(
            vars,
            ParamsAdagrad {
                lr: config.init_lr,
                initial_accumulator: config.initial_accumulator,
            },
        )?;
        Ok(Self {
            config: config.clone(),
            params,
            optimizer,
            device: device.clone(),
        })
    }

    pub fn config(&self) -> &TekeConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    /// Score a batch and compute the loss without touching the parameters.
    pub fn forward(&self, batch: &KgBatch) -> Result<Forward> {
        batch.validate(&self.config)?;

        let e = self.params.entities().as_tensor();
        let r = self.params.relations().as_tensor();
        let a = self.params.projection().as_tensor();
        let lookup = |table: &Tensor, ids: &[u32]| -> Result<Tensor> {
            Ok(table.index_select(&index_tensor(ids, &self.device)?, 0)?)
        };
        let project = |context: &Tensor| -> Result<Tensor> {
            let context = context.to_dtype(DType::F32)?.to_device(&self.device)?;
            Ok(context.matmul(a)?)
        };

        let head_proj = project(&batch.head_context)?;
        let tail_proj = project(&batch.tail_context)?;

        // projected = context · A + embedding; relations are not projected
        let lhs = (&head_proj + lookup(e, &batch.heads)?)?;
        let rhs = (&tail_proj + lookup(e, &batch.tails)?)?;
        let rell = lookup(r, &batch.relations)?;

        let lhsn = (project(&batch.neg_head_context)? + lookup(e, &batch.neg_heads)?)?;
        let rhsn = (project(&batch.neg_tail_context)? + lookup(e, &batch.neg_tails)?)?;
        let relln = lookup(r, &batch.neg_relations)?;

        let similarity = self.config.similarity;
        // the dot-product score composes negatives with the positive relation
        let neg_rel = match similarity {
            Similarity::Dot => &rell,
            Similarity::L2 | Similarity::L1 => &relln,
        };
        let positive = similarity.score(&trans(&lhs, &rell)?, &ident_entity(&rhs, &rell)?, false)?;
        let negative =
            similarity.score(&trans(&lhsn, neg_rel)?, &ident_entity(&rhsn, neg_rel)?, false)?;

        let kg_loss = max_margin(&positive, &negative, self.config.margin)?;

        let reg_head = context_penalty(&head_proj)?;
        let reg_tail = context_penalty(&tail_proj)?;
        let loss = if self.config.regularize_context {
            let reg = (&reg_head + &reg_tail)?.affine(self.config.alpha, 0.0)?;
            (kg_loss + reg)?
        } else {
            kg_loss
        };

        Ok(Forward {
            loss,
            positive,
            negative,
            reg_head,
            reg_tail,
        })
    }

    /// Run one AdaGrad step on `batch` and return the loss it minimized.
    ///
    /// Embeddings are not renormalized; run [`post_ops`](Self::post_ops)
    /// before the next forward pass.
    pub fn train(&mut self, batch: &KgBatch) -> Result<f32> {
        let forward = self.forward(batch)?;
        let loss: f32 = forward.loss.to_scalar()?;
        self.optimizer.backward_step(&forward.loss)?;
        debug!(step = self.optimizer.global_step(), loss, "optimizer step");
        Ok(loss)
    }

    /// Number of optimizer steps taken so far.
    pub fn global_step(&self) -> usize {
        self.optimizer.global_step()
    }

    /// The two normalization updates, in the order they should run.
    pub fn post_ops(&self) -> [PostOp; 2] {
        [PostOp::NormalizeEntities, PostOp::NormalizeRelations]
    }

    pub fn run_post_op(&self, op: PostOp) -> Result<()> {
        self.params.apply(op)
    }

    /// Run both post-ops.
    pub fn run_post_ops(&self) -> Result<()> {
        for op in self.post_ops() {
            self.run_post_op(op)?;
        }
        Ok(())
    }

    /// Overwrite the entity table with externally supplied embeddings.
    pub fn assign_initial(&self, values: &Tensor) -> Result<()> {
        self.params.assign_entities(values)
    }

    /// E, R and A, for checkpointing.
    pub fn variables(&self) -> [&Var; 3] {
        self.params.vars()
    }

    pub fn named_variables(&self) -> IndexMap<String, Var> {
        self.params.named()
    }

    /// Copy the current parameters out for the batch ranker.
    pub fn snapshot(&self) -> Result<TrainedEmbeddings> {
        TrainedEmbeddings::new(
            self.params.entities().as_tensor().copy()?,
            self.params.relations().as_tensor().copy()?,
            self.params.projection().as_tensor().copy()?,
        )
    }

    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.params.save(path)
    }

    /// Restore parameters in place; the optimizer state is kept.
    pub fn load_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.params.load(path)
    }

    /// Learning rate the optimizer steps with.
    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }
}
