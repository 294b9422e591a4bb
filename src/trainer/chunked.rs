//! Chunked path: warm-start boosting over sequential row blocks

use tracing::{info, warn};

use super::state::{ChunkStep, Phase, TrainerState};
use super::{aggregate, boost_block, PathResult, RunContext};
use crate::error::{MemboostError, Result};
use crate::planner::ChunkPlan;

pub(super) fn run(ctx: &mut RunContext<'_>, plan: &ChunkPlan, state: TrainerState) -> Result<PathResult> {
    let columns = ctx.projection.columns();
    let rounds = plan.rounds_per_chunk(ctx.config.total_rounds);
    // A single chunk feeds train metrics in full
    let keep_whole_chunk = plan.num_chunks == 1;

    let mut state = state;
    for (k, &chunk_rounds) in rounds.iter().enumerate() {
        state = state.advance(Phase::chunk(k, ChunkStep::LoadChunk))?;
        let Some(range) = plan.chunk_range(k) else {
            break;
        };

        let raw = ctx
            .handle
            .read_rows(columns, range.clone())
            .map_err(|e| e.in_chunk(k, range.clone()))?;
        if raw.height() == 0 {
            info!(chunk = k, rows = ?range, "Chunk is empty, ending training loop");
            break;
        }
        let chunk = ctx.ledger.admit(k, range.clone(), raw)?;

        state = state.advance(Phase::chunk(k, ChunkStep::Encode))?;
        let encoded = chunk
            .try_map(|df| state.encoder.encode_raw(&df))
            .map_err(|e| e.in_chunk(k, range.clone()))?;

        state = state.advance(Phase::chunk(k, ChunkStep::Align))?;
        let aligned = encoded
            .try_map(|raw| state.encoder.align(raw))
            .map_err(|e| e.in_chunk(k, range.clone()))?;

        state = state.advance(Phase::chunk(k, ChunkStep::Boost))?;
        let block = aligned.data();
        boost_block(ctx, &mut state, block, chunk_rounds).map_err(|e| e.in_chunk(k, range.clone()))?;
        if keep_whole_chunk {
            state.train_sample.take_all(block);
        } else {
            state.train_sample.take_from(block);
        }

        state = state.advance(Phase::chunk(k, ChunkStep::Release))?;
        let rows = block.n_rows();
        aligned.release();
        state.chunks_processed += 1;

        let memory_mb = ctx.monitor.checkpoint(&format!("chunk_{}", k));
        info!(chunk = k, rows = ?range, loaded = rows, rounds = chunk_rounds, memory_mb, "Chunk trained");
    }

    state = state.advance(Phase::Aggregating)?;
    if state.ensemble.is_none() {
        return Err(MemboostError::DataError("no training rows were read".to_string()));
    }
    let applied: usize = state.rounds_applied.iter().sum();
    if applied != ctx.config.total_rounds {
        warn!(applied, configured = ctx.config.total_rounds, "Training ended before all rounds were applied");
    }

    let test_range = plan.test_range();
    let raw = ctx.handle.read_rows(columns, test_range.clone())?;
    let test = ctx
        .ledger
        .admit(plan.num_chunks, test_range.clone(), raw)?
        .try_map(|df| state.encoder.encode(&df))?;
    info!(rows = ?test_range, loaded = test.data().n_rows(), "Test block encoded");

    let n_features = test.data().schema().len();
    let (train_x, train_y) = state.train_sample.concatenated(n_features)?;
    let (metrics, feature_importance, shap_plots) =
        aggregate(ctx, &state, (&train_x, &train_y), test.data(), false)?;
    test.release();

    Ok(PathResult {
        state,
        metrics,
        feature_importance,
        shap_plots,
    })
}
