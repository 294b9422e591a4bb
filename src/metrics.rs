//! Regression metrics, sampled train evaluation and importance normalization

use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use rand::seq::index;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::encoding::EncodedBlock;
use crate::error::Result;

/// Replace a non-finite value with 0.0
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        debug!(value, "Sanitized non-finite value to 0.0");
        0.0
    }
}

/// Root mean squared error; NaN for empty input
pub fn rmse(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len() as f64;
    let sse: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    (sse / n).sqrt()
}

/// Coefficient of determination; non-finite when the target has no variance
pub fn r2(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len() as f64;
    let y_mean = y_true.sum() / n;
    let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

/// Train and test accuracy of one run, always finite
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub train_rmse: f64,
    pub test_rmse: f64,
    pub train_r2: f64,
    pub test_r2: f64,
    pub chunks_processed: usize,
}

impl RegressionMetrics {
    pub fn compute(
        train: (&Array1<f64>, &Array1<f64>),
        test: (&Array1<f64>, &Array1<f64>),
        chunks_processed: usize,
    ) -> Self {
        Self {
            train_rmse: rmse(train.0, train.1),
            test_rmse: rmse(test.0, test.1),
            train_r2: r2(train.0, train.1),
            test_r2: r2(test.0, test.1),
            chunks_processed,
        }
        .sanitized()
    }

    pub fn sanitized(self) -> Self {
        Self {
            train_rmse: sanitize(self.train_rmse),
            test_rmse: sanitize(self.test_rmse),
            train_r2: sanitize(self.train_r2),
            test_r2: sanitize(self.test_r2),
            chunks_processed: self.chunks_processed,
        }
    }
}

/// Bounded per-chunk sample of encoded training rows
#[derive(Debug)]
pub struct TrainSample {
    fraction: f64,
    min_rows: usize,
    seed: u64,
    x_parts: Vec<Array2<f64>>,
    y_parts: Vec<Array1<f64>>,
}

impl TrainSample {
    pub fn new(fraction: f64, min_rows: usize, seed: u64) -> Self {
        Self {
            fraction,
            min_rows,
            seed,
            x_parts: Vec::new(),
            y_parts: Vec::new(),
        }
    }

    /// Rows kept from a chunk of `len` rows: `min(len, max(min_rows, fraction * len))`
    pub fn rows_for(&self, len: usize) -> usize {
        let share = ((len as f64) * self.fraction) as usize;
        share.max(self.min_rows).min(len)
    }

    /// Keep a seeded sample of `block`
    pub fn take_from(&mut self, block: &EncodedBlock) {
        let len = block.n_rows();
        let k = self.rows_for(len);
        if k == 0 {
            return;
        }
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);
        let mut rows = index::sample(&mut rng, len, k).into_vec();
        rows.sort_unstable();
        let sample = block.select_rows(&rows);
        debug!(kept = k, of = len, "Train sample taken");
        self.push(sample.x().clone(), sample.y().clone());
    }

    /// Keep every row of `block`
    pub fn take_all(&mut self, block: &EncodedBlock) {
        self.push(block.x().clone(), block.y().clone());
    }

    fn push(&mut self, x: Array2<f64>, y: Array1<f64>) {
        self.x_parts.push(x);
        self.y_parts.push(y);
    }

    pub fn n_rows(&self) -> usize {
        self.y_parts.iter().map(|y| y.len()).sum()
    }

    /// Concatenate all kept rows
    pub fn concatenated(&self, n_features: usize) -> Result<(Array2<f64>, Array1<f64>)> {
        if self.x_parts.is_empty() {
            return Ok((Array2::zeros((0, n_features)), Array1::zeros(0)));
        }
        let xs: Vec<ArrayView2<'_, f64>> = self.x_parts.iter().map(|x| x.view()).collect();
        let ys: Vec<_> = self.y_parts.iter().map(|y| y.view()).collect();
        Ok((concatenate(Axis(0), &xs)?, concatenate(Axis(0), &ys)?))
    }
}

/// Normalized importance of one encoded feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Normalize raw scores by their sum (1.0 if the sum is zero) and sort
/// descending, ties kept in schema order.
pub fn normalize_importance(features: &[String], raw: &[f64]) -> Vec<FeatureImportance> {
    let scores: Vec<f64> = raw.iter().map(|v| sanitize(*v).max(0.0)).collect();
    let total: f64 = scores.iter().sum();
    let denom = if total > 0.0 { total } else { 1.0 };

    let mut table: Vec<FeatureImportance> = features
        .iter()
        .enumerate()
        .map(|(i, name)| FeatureImportance {
            feature: name.clone(),
            importance: scores.get(i).map_or(0.0, |s| s / denom),
        })
        .collect();
    table.sort_by(|a, b| {
        b.importance
            .partial_cmp(&a.importance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_predictions() {
        let y = array![1.0, 2.0, 3.0];
        let m = RegressionMetrics::compute((&y, &y), (&y, &y), 1);
        assert_eq!(m.train_rmse, 0.0);
        assert_eq!(m.test_r2, 1.0);
    }

    #[test]
    fn test_constant_target_sanitized() {
        let y = array![5.0, 5.0, 5.0];
        let p = array![5.0, 5.0, 4.0];
        assert!(!r2(&y, &p).is_finite());
        let m = RegressionMetrics::compute((&y, &p), (&y, &y), 2);
        assert_eq!(m.train_r2, 0.0);
        assert_eq!(m.test_r2, 0.0);
        assert!(m.train_rmse > 0.0);
    }

    #[test]
    fn test_empty_metrics_are_zero() {
        let empty = Array1::<f64>::zeros(0);
        let m = RegressionMetrics::compute((&empty, &empty), (&empty, &empty), 0);
        assert_eq!(m, RegressionMetrics::default());
    }

    #[test]
    fn test_sample_size_rule() {
        let sample = TrainSample::new(0.2, 100, 42);
        assert_eq!(sample.rows_for(50), 50);
        assert_eq!(sample.rows_for(300), 100);
        assert_eq!(sample.rows_for(10_000), 2_000);
    }

    #[test]
    fn test_importance_normalized_and_sorted() {
        let names: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let table = normalize_importance(&names, &[1.0, 3.0, 0.0, 1.0]);
        let order: Vec<&str> = table.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "d", "c"]);
        assert!((table.iter().map(|f| f.importance).sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(table[3].importance, 0.0);
    }

    #[test]
    fn test_zero_importance_uses_unit_denominator() {
        let names = vec!["a".to_string(), "b".to_string()];
        let table = normalize_importance(&names, &[0.0, f64::NAN]);
        assert!(table.iter().all(|f| f.importance == 0.0));
        assert_eq!(table[0].feature, "a");
    }
}
