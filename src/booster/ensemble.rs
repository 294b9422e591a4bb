//! Warm-startable boosted ensemble

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{GradientPair, RegressionTree};
use super::BoosterConfig;
use crate::error::{MemboostError, Result};

/// Squared-error gradient boosting model that can be extended in place
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedEnsemble {
    config: BoosterConfig,
    n_features: usize,
    base_score: Option<f64>,
    trees: Vec<RegressionTree>,
}

impl BoostedEnsemble {
    pub fn new(config: BoosterConfig, n_features: usize) -> Self {
        Self {
            config,
            n_features,
            base_score: None,
            trees: Vec::new(),
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn is_fitted(&self) -> bool {
        self.base_score.is_some()
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Append `rounds` trees fitted on `(x, y)`, continuing from the current model.
    ///
    /// The first call fixes the base score to the mean of `y`.
    pub fn boost(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        rounds: usize,
        seed: u64,
    ) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(MemboostError::DataError("cannot boost on zero rows".to_string()));
        }
        self.check_width(x.ncols())?;
        if y.len() != n_samples {
            return Err(MemboostError::ShapeError {
                expected: format!("{} targets", n_samples),
                actual: format!("{} targets", y.len()),
            });
        }

        let base = *self.base_score.get_or_insert_with(|| y.mean().unwrap_or(0.0));
        let mut preds = self.predict_with_base(x, base);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(self.trees.len() as u64));
        let hess = Array1::from_elem(n_samples, 1.0);

        for _ in 0..rounds {
            // Squared error: grad = pred - y, hess = 1.0
            let grad: Array1<f64> = &preds - &y;

            let row_indices = subsample(&mut rng, n_samples, self.config.subsample);
            let col_indices = subsample(&mut rng, self.n_features, self.config.colsample_bytree);

            let tree = RegressionTree::grow(
                x,
                &GradientPair { grad: &grad, hess: &hess },
                &row_indices,
                &col_indices,
                &self.config,
            );

            for (i, row) in x.rows().into_iter().enumerate() {
                preds[i] += self.config.learning_rate * tree.predict_row(row);
            }
            self.trees.push(tree);
        }

        debug!(rows = n_samples, rounds, total_trees = self.trees.len(), "Boosting step complete");
        Ok(())
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let base = self.base_score.ok_or(MemboostError::ModelNotFitted)?;
        self.check_width(x.ncols())?;
        Ok(self.predict_with_base(x, base))
    }

    fn predict_with_base(&self, x: ArrayView2<'_, f64>, base: f64) -> Array1<f64> {
        let lr = self.config.learning_rate;
        x.rows()
            .into_iter()
            .map(|row| base + lr * self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>())
            .collect()
    }

    fn check_width(&self, n_cols: usize) -> Result<()> {
        if n_cols != self.n_features {
            return Err(MemboostError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", n_cols),
            });
        }
        Ok(())
    }

    /// Average split gain per feature; features never split on get 0.0
    pub fn gain_importance(&self) -> Vec<f64> {
        let mut counts = vec![0usize; self.n_features];
        let mut gains = vec![0.0f64; self.n_features];
        for tree in &self.trees {
            tree.accumulate_gain(&mut counts, &mut gains);
        }
        counts
            .iter()
            .zip(gains)
            .map(|(&c, g)| if c > 0 { g / c as f64 } else { 0.0 })
            .collect()
    }

    /// Model output when no feature is known
    pub fn expected_value(&self) -> f64 {
        let lr = self.config.learning_rate;
        self.base_score.unwrap_or(0.0) + lr * self.trees.iter().map(|t| t.expected_value()).sum::<f64>()
    }

    /// Per-feature attributions for one row; they sum to
    /// `predict(row) - expected_value()`.
    pub fn shap_values(&self, row: ArrayView1<'_, f64>) -> Result<Vec<f64>> {
        if !self.is_fitted() {
            return Err(MemboostError::ModelNotFitted);
        }
        self.check_width(row.len())?;
        let mut phi = vec![0.0; self.n_features];
        for tree in &self.trees {
            tree.add_shap_values(row, self.config.learning_rate, &mut phi);
        }
        Ok(phi)
    }
}

fn subsample(rng: &mut Xoshiro256PlusPlus, n: usize, ratio: f64) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let k = (((n as f64) * ratio).ceil() as usize).max(1).min(n);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(k);
    indices.sort_unstable();
    indices
}
