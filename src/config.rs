//! Hyper-parameters for a TEKE model.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TekeError};
use crate::scoring::Similarity;

/// Model sizes and training hyper-parameters.
///
/// Construct with [`TekeConfig::new`] and adjust with the `with_*` builders:
///
/// ```
/// use teke::{Similarity, TekeConfig};
///
/// let config = TekeConfig::new(1000, 20, 64, 128)
///     .with_similarity(Similarity::L2)
///     .with_margin(2.0);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TekeConfig {
    /// Rows of the entity table E
    pub num_entities: usize,
    /// Rows of the relation table R
    pub num_relations: usize,
    /// Embedding dimension d (also the side of the projection matrix A)
    pub embedding_size: usize,
    /// Number of triplets in every training batch
    pub batch_size_kg: usize,
    /// Similarity used by the training objective
    #[serde(default)]
    pub similarity: Similarity,
    /// Fixed AdaGrad learning rate
    #[serde(default = "default_init_lr")]
    pub init_lr: f64,
    /// Weight of the context regularizers when they are enabled
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Margin of the ranking loss
    #[serde(default = "default_margin")]
    pub margin: f64,
    /// Add the projected-context norm penalties to the loss
    #[serde(default)]
    pub regularize_context: bool,
    /// Starting value of the AdaGrad squared-gradient accumulator
    #[serde(default = "default_initial_accumulator")]
    pub initial_accumulator: f64,
    /// Seed for parameter initialization; `None` draws from OS entropy
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_init_lr() -> f64 {
    1.0
}

fn default_alpha() -> f64 {
    1.0
}

fn default_margin() -> f64 {
    1.0
}

fn default_initial_accumulator() -> f64 {
    0.1
}

impl TekeConfig {
    /// Create a config with the given table sizes and default hyper-parameters.
    pub fn new(
        num_entities: usize,
        num_relations: usize,
        embedding_size: usize,
        batch_size_kg: usize,
    ) -> Self {
        Self {
            num_entities,
            num_relations,
            embedding_size,
            batch_size_kg,
            similarity: Similarity::default(),
            init_lr: default_init_lr(),
            alpha: default_alpha(),
            margin: default_margin(),
            regularize_context: false,
            initial_accumulator: default_initial_accumulator(),
            seed: None,
        }
    }

    pub fn with_similarity(mut self, similarity: Similarity) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_init_lr(mut self, init_lr: f64) -> Self {
        self.init_lr = init_lr;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_context_regularization(mut self, enabled: bool) -> Self {
        self.regularize_context = enabled;
        self
    }

    pub fn with_initial_accumulator(mut self, value: f64) -> Self {
        self.initial_accumulator = value;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Half-width of the uniform initializer: `sqrt(6 / d)`.
    pub fn init_bound(&self) -> f64 {
        (6.0 / self.embedding_size as f64).sqrt()
    }

    /// Reject sizes and rates the model cannot be built with.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("num_entities", self.num_entities),
            ("num_relations", self.num_relations),
            ("embedding_size", self.embedding_size),
            ("batch_size_kg", self.batch_size_kg),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(TekeError::Config(format!("{} must be positive", name)));
            }
        }
        if u32::try_from(self.num_entities).is_err() || u32::try_from(self.num_relations).is_err() {
            return Err(TekeError::Config(
                "table sizes must fit in u32 indices".to_string(),
            ));
        }
        if !self.init_lr.is_finite() || self.init_lr <= 0.0 {
            return Err(TekeError::Config(format!(
                "init_lr must be positive and finite, got {}",
                self.init_lr
            )));
        }
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(TekeError::Config(format!(
                "margin must be non-negative, got {}",
                self.margin
            )));
        }
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(TekeError::Config(format!(
                "alpha must be non-negative, got {}",
                self.alpha
            )));
        }
        if !self.initial_accumulator.is_finite() || self.initial_accumulator <= 0.0 {
            return Err(TekeError::Config(format!(
                "initial_accumulator must be positive, got {}",
                self.initial_accumulator
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TekeConfig::new(4, 2, 3, 2);
        assert_eq!(config.similarity, Similarity::L2);
        assert_eq!(config.init_lr, 1.0);
        assert_eq!(config.margin, 1.0);
        assert!(!config.regularize_context);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_init_bound() {
        let config = TekeConfig::new(4, 2, 6, 2);
        assert!((config.init_bound() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_zero_sizes() {
        assert!(matches!(
            TekeConfig::new(0, 2, 3, 2).validate(),
            Err(TekeError::Config(_))
        ));
        assert!(matches!(
            TekeConfig::new(4, 2, 0, 2).validate(),
            Err(TekeError::Config(_))
        ));
        assert!(matches!(
            TekeConfig::new(4, 2, 3, 0).validate(),
            Err(TekeError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_bad_rates() {
        let base = TekeConfig::new(4, 2, 3, 2);
        assert!(base.clone().with_init_lr(0.0).validate().is_err());
        assert!(base.clone().with_init_lr(f64::NAN).validate().is_err());
        assert!(base.clone().with_margin(-1.0).validate().is_err());
        assert!(base.clone().with_alpha(-0.5).validate().is_err());
        assert!(base.with_initial_accumulator(0.0).validate().is_err());
    }
}
