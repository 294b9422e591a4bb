//! Bounded-sample additive explanations
//!
//! A fixed-seed sample of at most `sample_size` held-out rows is explained
//! with exact tree attributions. The rendered plots are returned as
//! base64-encoded SVG documents.

mod plots;

pub use plots::{Artifact, ShapPlots};

use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::booster::BoostedEnsemble;
use crate::encoding::EncodedBlock;
use crate::error::{MemboostError, Result};
use crate::metrics::sanitize;

/// Contribution of one feature to the prediction for one sampled row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub feature: String,
    pub value: f64,
    pub row: usize,
}

/// What to render and how to sample
#[derive(Debug, Clone)]
pub struct ExplainOptions {
    pub sample_size: usize,
    pub seed: u64,
    /// Render the dot summary plot
    pub summary_plot: bool,
    /// Render the low/medium/high breakdowns
    pub representative_plots: bool,
    /// Label used in breakdown titles, usually the target column
    pub target_label: String,
}

/// Sampled rows with their attributions
#[derive(Debug, Clone)]
pub struct ExplanationSample {
    feature_names: Vec<String>,
    x: Array2<f64>,
    values: Array2<f64>,
    predictions: Array1<f64>,
    base_value: f64,
}

impl ExplanationSample {
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn base_value(&self) -> f64 {
        self.base_value
    }

    pub fn predictions(&self) -> &Array1<f64> {
        &self.predictions
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.x
    }

    /// Attribution matrix, rows by features
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn row_values(&self, row: usize) -> ArrayView1<'_, f64> {
        self.values.row(row)
    }

    /// Flattened attributions, row-major
    pub fn attributions(&self) -> Vec<Attribution> {
        self.values
            .indexed_iter()
            .map(|((row, j), v)| Attribution {
                feature: self.feature_names[j].clone(),
                value: *v,
                row,
            })
            .collect()
    }

    /// Mean absolute attribution per feature
    pub fn mean_abs(&self) -> Vec<f64> {
        let n = self.n_rows().max(1) as f64;
        self.values
            .columns()
            .into_iter()
            .map(|c| c.iter().map(|v| v.abs()).sum::<f64>() / n)
            .collect()
    }

    /// Rows at the 10th, 50th and 90th percentile of predicted value,
    /// or `None` with fewer than three rows.
    pub fn representative_rows(&self) -> Option<[usize; 3]> {
        let n = self.n_rows();
        if n < 3 {
            return None;
        }
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            self.predictions[a]
                .partial_cmp(&self.predictions[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let at = |q: f64| order[((n as f64) * q) as usize];
        Some([at(0.1), at(0.5), at(0.9)])
    }
}

/// Computes attributions for a bounded sample of held-out rows
pub struct Explainer<'a> {
    model: &'a BoostedEnsemble,
    sample_size: usize,
    seed: u64,
}

impl<'a> Explainer<'a> {
    pub fn new(model: &'a BoostedEnsemble, sample_size: usize, seed: u64) -> Self {
        Self { model, sample_size, seed }
    }

    /// Draw the sample from `block` and attribute every sampled prediction
    pub fn sample(&self, block: &EncodedBlock) -> Result<ExplanationSample> {
        let n = block.n_rows();
        if n == 0 {
            return Err(MemboostError::DataError("no held-out rows to explain".to_string()));
        }

        let rows: Vec<usize> = if n <= self.sample_size {
            (0..n).collect()
        } else {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);
            let mut picked = index::sample(&mut rng, n, self.sample_size).into_vec();
            picked.sort_unstable();
            picked
        };
        let x = block.select_rows(&rows).x().clone();

        let predictions = self.model.predict(x.view())?.mapv(sanitize);
        let mut values = Array2::<f64>::zeros(x.dim());
        for (i, row) in x.rows().into_iter().enumerate() {
            let phi = self.model.shap_values(row)?;
            for (j, v) in phi.into_iter().enumerate() {
                values[[i, j]] = sanitize(v);
            }
        }
        debug!(rows = rows.len(), features = x.ncols(), "Attributions computed");

        Ok(ExplanationSample {
            feature_names: block.schema().names().to_vec(),
            x,
            values,
            predictions,
            base_value: sanitize(self.model.expected_value()),
        })
    }
}

/// Sample, attribute and render. Never fails: a failed attribution step is
/// reported in `ShapPlots::error`, a failed artifact under its key.
pub fn explain(model: &BoostedEnsemble, test: &EncodedBlock, options: &ExplainOptions) -> ShapPlots {
    match Explainer::new(model, options.sample_size, options.seed).sample(test) {
        Ok(sample) => plots::render_all(&sample, options),
        Err(e) => {
            warn!(error = %e, "Explanation step failed");
            ShapPlots::failed(e.to_string())
        }
    }
}
