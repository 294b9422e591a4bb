//! Gradient-boosted regression trees with warm-start continuation
//!
//! An ensemble can be boosted repeatedly: each call appends trees fitted
//! against the residuals of everything learned so far. This is what lets
//! the chunked trainer grow one model across many row blocks.

mod ensemble;
mod tree;

pub use ensemble::BoostedEnsemble;
pub use tree::{RegressionTree, TreeNode};

use serde::{Deserialize, Serialize};

use crate::error::{MemboostError, Result};

/// Tree ensemble hyper-parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoosterConfig {
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights
    pub reg_alpha: f64,
    /// Minimum loss reduction to make a split (gamma)
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
}

impl Default for BoosterConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            subsample: 0.8,
            colsample_bytree: 0.8,
        }
    }
}

impl BoosterConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(MemboostError::invalid_parameter(
                "learning_rate",
                self.learning_rate,
                "must be positive",
            ));
        }
        if self.max_depth == 0 {
            return Err(MemboostError::invalid_parameter("max_depth", 0, "must be positive"));
        }
        for (name, ratio) in [("subsample", self.subsample), ("colsample_bytree", self.colsample_bytree)] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(MemboostError::invalid_parameter(name, ratio, "must be in (0, 1]"));
            }
        }
        if self.reg_lambda < 0.0 || self.reg_alpha < 0.0 || self.gamma < 0.0 {
            return Err(MemboostError::invalid_parameter(
                "regularization",
                format!("lambda={} alpha={} gamma={}", self.reg_lambda, self.reg_alpha, self.gamma),
                "must be non-negative",
            ));
        }
        Ok(())
    }
}
