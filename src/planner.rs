//! Chunk planning
//!
//! Decides whether a dataset fits a single in-memory pass and, when it does
//! not, how many rows each chunk may hold. Estimation failures never abort
//! a run; they produce `Estimate::Degraded` with a fallback value.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{info, warn};

use crate::config::TrainerConfig;
use crate::data::DatasetHandle;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A value that was either measured or substituted after a failed measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Estimate<T> {
    Measured(T),
    Degraded { value: T, reason: String },
}

impl<T: Copy> Estimate<T> {
    pub fn value(&self) -> T {
        match self {
            Estimate::Measured(v) => *v,
            Estimate::Degraded { value, .. } => *value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Estimate::Degraded { .. })
    }
}

/// Row layout of one run: the train chunks and the held-out test block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub use_chunking: bool,
    pub rows_per_chunk: usize,
    pub total_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub num_chunks: usize,
}

impl ChunkPlan {
    /// Lay out `total_rows` with the last `test_size` share reserved for testing
    pub fn new(total_rows: usize, rows_per_chunk: usize, test_size: f64) -> Self {
        let rows_per_chunk = rows_per_chunk.max(1);
        let train_rows = ((total_rows as f64) * (1.0 - test_size)).floor() as usize;
        let train_rows = train_rows.min(total_rows);
        Self {
            use_chunking: total_rows > rows_per_chunk,
            rows_per_chunk,
            total_rows,
            train_rows,
            test_rows: total_rows - train_rows,
            num_chunks: train_rows.div_ceil(rows_per_chunk),
        }
    }

    /// Row range of training chunk `index`, or `None` past the last chunk
    pub fn chunk_range(&self, index: usize) -> Option<Range<usize>> {
        let start = index.checked_mul(self.rows_per_chunk)?;
        if start >= self.train_rows {
            return None;
        }
        Some(start..(start + self.rows_per_chunk).min(self.train_rows))
    }

    /// All training chunk ranges, ascending
    pub fn chunk_ranges(&self) -> Vec<Range<usize>> {
        (0..self.num_chunks).filter_map(|i| self.chunk_range(i)).collect()
    }

    /// The held-out block: the trailing rows after the training region
    pub fn test_range(&self) -> Range<usize> {
        self.train_rows..self.total_rows
    }

    /// Boosting rounds for each chunk; sums to `total_rounds`
    ///
    /// The remainder of the even split goes one round each to the earliest chunks.
    pub fn rounds_per_chunk(&self, total_rounds: usize) -> Vec<usize> {
        let n = self.num_chunks.max(1);
        let base = total_rounds / n;
        let extra = total_rounds % n;
        (0..n).map(|i| base + usize::from(i < extra)).collect()
    }
}

/// Outcome of planning: the plan plus how each input was obtained
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: ChunkPlan,
    pub total_rows: Estimate<usize>,
    pub rows_per_chunk: Estimate<usize>,
}

/// Sizes chunks against a memory target
pub struct ChunkPlanner<'a> {
    config: &'a TrainerConfig,
}

impl<'a> ChunkPlanner<'a> {
    pub fn new(config: &'a TrainerConfig) -> Self {
        Self { config }
    }

    pub fn plan(&self, handle: &DatasetHandle, columns: &[String]) -> PlanOutcome {
        let total_rows = self.estimate_total_rows(handle);
        let rows_per_chunk = self.estimate_rows_per_chunk(handle, columns);
        let plan = ChunkPlan::new(total_rows.value(), rows_per_chunk.value(), self.config.test_size);

        info!(
            total_rows = plan.total_rows,
            rows_per_chunk = plan.rows_per_chunk,
            use_chunking = plan.use_chunking,
            num_chunks = plan.num_chunks,
            "Chunk plan decided"
        );

        PlanOutcome { plan, total_rows, rows_per_chunk }
    }

    fn estimate_total_rows(&self, handle: &DatasetHandle) -> Estimate<usize> {
        match handle.count_rows() {
            Ok(n) => Estimate::Measured(n),
            Err(e) => {
                warn!(error = %e, fallback = self.config.fallback_total_rows, "Row count failed, assuming fallback");
                Estimate::Degraded {
                    value: self.config.fallback_total_rows,
                    reason: e.to_string(),
                }
            }
        }
    }

    fn estimate_rows_per_chunk(&self, handle: &DatasetHandle, columns: &[String]) -> Estimate<usize> {
        if let Some(rows) = self.config.rows_per_chunk {
            return Estimate::Measured(rows);
        }

        match self.bytes_per_row(handle, columns) {
            Ok(bytes_per_row) => {
                let target_bytes = self.config.chunk_target_mb() * BYTES_PER_MB;
                let rows = (target_bytes / bytes_per_row) as usize;
                Estimate::Measured(rows.max(self.config.min_rows_per_chunk))
            }
            Err(reason) => {
                warn!(%reason, fallback = self.config.fallback_rows_per_chunk, "Chunk size estimation failed, using fallback");
                Estimate::Degraded {
                    value: self.config.fallback_rows_per_chunk,
                    reason,
                }
            }
        }
    }

    fn bytes_per_row(&self, handle: &DatasetHandle, columns: &[String]) -> std::result::Result<f64, String> {
        let sample = handle
            .read_rows(columns, 0..self.config.sample_rows)
            .map_err(|e| e.to_string())?;
        if sample.height() == 0 {
            return Err("sample contained no rows".to_string());
        }
        let bytes_per_row = sample.estimated_size() as f64 / sample.height() as f64;
        if !(bytes_per_row.is_finite() && bytes_per_row > 0.0) {
            return Err(format!("unusable per-row footprint {bytes_per_row}"));
        }
        Ok(bytes_per_row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_reserves_trailing_test_block() {
        let plan = ChunkPlan::new(50_000, 10_000, 0.2);
        assert!(plan.use_chunking);
        assert_eq!(plan.train_rows, 40_000);
        assert_eq!(plan.test_rows, 10_000);
        assert_eq!(plan.num_chunks, 4);
        assert_eq!(plan.test_range(), 40_000..50_000);
        for range in plan.chunk_ranges() {
            assert!(range.end <= plan.test_range().start);
        }
    }

    #[test]
    fn test_small_dataset_not_chunked() {
        let plan = ChunkPlan::new(500, 1_000, 0.2);
        assert!(!plan.use_chunking);
        assert_eq!(plan.num_chunks, 1);
    }

    #[test]
    fn test_partial_last_chunk() {
        let plan = ChunkPlan::new(2_500, 1_000, 0.2);
        assert_eq!(plan.chunk_ranges(), vec![0..1_000, 1_000..2_000]);
        let plan = ChunkPlan::new(3_000, 1_000, 0.2);
        assert_eq!(plan.chunk_ranges(), vec![0..1_000, 1_000..2_000, 2_000..2_400]);
        assert_eq!(plan.chunk_range(3), None);
    }

    #[test]
    fn test_rounds_sum_exactly() {
        for chunks in 1..=13 {
            let plan = ChunkPlan::new(chunks * 1_000 * 10 / 8, 1_000, 0.2);
            let rounds = plan.rounds_per_chunk(100);
            assert_eq!(rounds.len(), plan.num_chunks.max(1));
            assert_eq!(rounds.iter().sum::<usize>(), 100);
        }
        let plan = ChunkPlan::new(3_750, 1_000, 0.2);
        assert_eq!(plan.rounds_per_chunk(100), vec![34, 33, 33]);
    }

    #[test]
    fn test_estimate_value() {
        let measured = Estimate::Measured(7usize);
        let degraded = Estimate::Degraded { value: 10_000usize, reason: "boom".into() };
        assert_eq!(measured.value(), 7);
        assert!(!measured.is_degraded());
        assert_eq!(degraded.value(), 10_000);
        assert!(degraded.is_degraded());
    }
}
