//! Full-batch path: one in-memory pass with a random train/test split

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::info;

use super::state::{Phase, TrainerState};
use super::{aggregate, boost_block, PathResult, RunContext};
use crate::error::{MemboostError, Result};

pub(super) fn run(ctx: &mut RunContext<'_>, state: TrainerState) -> Result<PathResult> {
    let mut state = state.advance(Phase::FullBatch)?;

    let df = ctx.handle.read_all(ctx.projection.columns())?;
    let rows = 0..df.height();
    let block = ctx
        .ledger
        .admit(0, rows.clone(), df)?
        .try_map(|df| state.encoder.encode(&df))?;

    let (train_idx, test_idx) = shuffle_split(block.data().n_rows(), ctx.config.test_size, ctx.config.seed)?;
    let train = block.data().select_rows(&train_idx);
    let test = block.data().select_rows(&test_idx);
    block.release();

    boost_block(ctx, &mut state, &train, ctx.config.total_rounds).map_err(|e| e.in_chunk(0, rows.clone()))?;
    state.chunks_processed = 1;

    let memory_mb = ctx.monitor.checkpoint("full_batch");
    info!(
        train_rows = train.n_rows(),
        test_rows = test.n_rows(),
        features = train.schema().len(),
        memory_mb,
        "Full-batch model trained"
    );

    let state = state.advance(Phase::Aggregating)?;
    let (metrics, feature_importance, shap_plots) =
        aggregate(ctx, &state, (train.x(), train.y()), &test, true)?;

    Ok(PathResult {
        state,
        metrics,
        feature_importance,
        shap_plots,
    })
}

/// Seeded random split; the test set gets `ceil(n * test_size)` rows
fn shuffle_split(n: usize, test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    let n_test = (((n as f64) * test_size).ceil() as usize).min(n);
    if n_test == 0 || n_test == n {
        return Err(MemboostError::DataError(format!(
            "{} rows cannot be split into train and test sets with test_size {}",
            n, test_size
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let train = indices.split_off(n_test);
    Ok((train, indices))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sizes_and_disjointness() {
        let (train, test) = shuffle_split(500, 0.2, 42).unwrap();
        assert_eq!(test.len(), 100);
        assert_eq!(train.len(), 400);
        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_seeded() {
        assert_eq!(shuffle_split(50, 0.2, 7).unwrap(), shuffle_split(50, 0.2, 7).unwrap());
    }

    #[test]
    fn test_split_rejects_tiny_datasets() {
        assert!(shuffle_split(1, 0.2, 42).is_err());
        assert!(shuffle_split(0, 0.2, 42).is_err());
    }
}
