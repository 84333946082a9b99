//! AdaGrad for candle variables.
//!
//! candle-nn ships SGD and AdamW; this adds AdaGrad behind the same
//! [`Optimizer`] trait so it drives `Var`s through `backward_step` exactly
//! like the built-in optimizers.
//!
//! Update per variable `x` with gradient `g`:
//! - `acc ← acc + g²`
//! - `x ← x - lr · g / √acc`
//!
//! The accumulator starts at a small positive constant so the first step is
//! well defined. The learning rate never decays.

use candle_core::backprop::GradStore;
use candle_core::{Result, Tensor, Var};
use candle_nn::optim::Optimizer;

/// AdaGrad hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamsAdagrad {
    pub lr: f64,
    pub initial_accumulator: f64,
}

impl Default for ParamsAdagrad {
    fn default() -> Self {
        Self {
            lr: 1.0,
            initial_accumulator: 0.1,
        }
    }
}

#[derive(Debug)]
struct VarAdagrad {
    var: Var,
    accumulator: Var,
}

/// AdaGrad optimizer with a fixed learning rate.
#[derive(Debug)]
pub struct Adagrad {
    vars: Vec<VarAdagrad>,
    params: ParamsAdagrad,
    global_step: usize,
}

impl Adagrad {
    /// Number of completed optimizer steps.
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    pub fn params(&self) -> &ParamsAdagrad {
        &self.params
    }
}

impl Optimizer for Adagrad {
    type Config = ParamsAdagrad;

    fn new(vars: Vec<Var>, params: ParamsAdagrad) -> Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| {
                let acc = Tensor::full(params.initial_accumulator, var.dims(), var.device())?
                    .to_dtype(var.dtype())?;
                let accumulator = Var::from_tensor(&acc)?;
                Ok(VarAdagrad { var, accumulator })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            vars,
            params,
            global_step: 0,
        })
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr;
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        let lr = self.params.lr;
        for var in self.vars.iter() {
            let theta = &var.var;
            let acc = &var.accumulator;
            if let Some(g) = grads.get(theta) {
                let next_acc = (acc.as_tensor() + g.sqr()?)?;
                let delta = (g / next_acc.sqrt()?)?.affine(lr, 0.0)?;
                theta.set(&theta.sub(&delta)?)?;
                acc.set(&next_acc)?;
            }
        }
        self.global_step += 1;
        Ok(())
    }
}
