//! Incremental trainer
//!
//! A run moves through `Idle -> Planning -> (FullBatch | ChunkedTraining) ->
//! Aggregating -> Done`. The chunked path cycles `LoadChunk -> Encode ->
//! Align -> Boost -> Release` once per chunk, and a chunk's buffers are
//! dropped before the next one is read.

mod chunked;
mod full;
mod pipeline;
mod report;
mod state;

pub use pipeline::{TrainingPipeline, TrainingRun};
pub use report::{ProcessingType, TrainingReport, MODEL_NAME, PROCESSOR_TYPE};
pub use state::{ChunkStep, Phase, TrainerState};

use ndarray::{Array1, Array2};
use rayon::ThreadPool;

use crate::booster::BoostedEnsemble;
use crate::config::TrainerConfig;
use crate::data::{ColumnProjection, DatasetHandle, ResidencyLedger};
use crate::encoding::EncodedBlock;
use crate::error::{MemboostError, Result};
use crate::explain::{explain, ExplainOptions, ShapPlots};
use crate::memory::MemoryMonitor;
use crate::metrics::{normalize_importance, FeatureImportance, RegressionMetrics};

/// Collaborators and resources a single run borrows or owns
pub(crate) struct RunContext<'a> {
    pub handle: &'a DatasetHandle,
    pub projection: &'a ColumnProjection,
    pub config: &'a TrainerConfig,
    pub ledger: ResidencyLedger,
    pub pool: ThreadPool,
    pub monitor: MemoryMonitor,
}

/// What a training path hands to the pipeline
pub(crate) struct PathResult {
    pub state: TrainerState,
    pub metrics: RegressionMetrics,
    pub feature_importance: Vec<FeatureImportance>,
    pub shap_plots: ShapPlots,
}

/// Append `rounds` boosting rounds fitted on `block`, creating the ensemble on first use
fn boost_block(
    ctx: &RunContext<'_>,
    state: &mut TrainerState,
    block: &EncodedBlock,
    rounds: usize,
) -> Result<()> {
    let config = ctx.config;
    let ensemble = state
        .ensemble
        .get_or_insert_with(|| BoostedEnsemble::new(config.booster.clone(), block.schema().len()));
    ctx.pool
        .install(|| ensemble.boost(block.x().view(), block.y().view(), rounds, config.seed))?;
    state.rounds_applied.push(rounds);
    Ok(())
}

/// Metrics, importance and explanations for a trained model
fn aggregate(
    ctx: &RunContext<'_>,
    state: &TrainerState,
    train: (&Array2<f64>, &Array1<f64>),
    test: &EncodedBlock,
    summary_plot: bool,
) -> Result<(RegressionMetrics, Vec<FeatureImportance>, ShapPlots)> {
    let model = state.ensemble.as_ref().ok_or(MemboostError::ModelNotFitted)?;

    let train_pred = model.predict(train.0.view())?;
    let test_pred = model.predict(test.x().view())?;
    let metrics = RegressionMetrics::compute(
        (train.1, &train_pred),
        (test.y(), &test_pred),
        state.chunks_processed,
    );

    let feature_importance = normalize_importance(test.schema().names(), &model.gain_importance());

    let options = ExplainOptions {
        sample_size: ctx.config.explain_sample_size,
        seed: ctx.config.seed,
        summary_plot,
        representative_plots: ctx.config.multiple_waterfall_plots,
        target_label: ctx.config.target_column.clone(),
    };
    let shap_plots = explain(model, test, &options);

    Ok((metrics, feature_importance, shap_plots))
}
