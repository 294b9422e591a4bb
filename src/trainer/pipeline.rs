//! Run orchestration: validate, plan, train, aggregate

use rayon::ThreadPoolBuilder;
use std::sync::Arc;
use tracing::info;

use super::report::{ProcessingType, TrainingReport, MODEL_NAME, PROCESSOR_TYPE};
use super::state::{Phase, TrainerState};
use super::{chunked, full, RunContext};
use crate::booster::BoostedEnsemble;
use crate::config::TrainerConfig;
use crate::data::{ColumnProjection, DatasetHandle, ResidencyLedger};
use crate::encoding::{FeatureEncoder, FeatureSchema};
use crate::error::{MemboostError, Result};
use crate::memory::MemoryMonitor;
use crate::metrics::TrainSample;
use crate::planner::{ChunkPlan, ChunkPlanner, PlanOutcome};

/// A finished run: the report plus the artifacts behind it
#[derive(Debug)]
pub struct TrainingRun {
    pub report: TrainingReport,
    pub model: BoostedEnsemble,
    pub schema: Arc<FeatureSchema>,
    pub plan: ChunkPlan,
    /// Boosting rounds applied per chunk, in chunk order
    pub rounds_applied: Vec<usize>,
}

/// Trains one model per call; every call owns its own state
pub struct TrainingPipeline {
    config: TrainerConfig,
}

impl TrainingPipeline {
    pub fn new(config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Validate columns and compute the chunk plan without training
    pub fn plan(&self, handle: &DatasetHandle) -> Result<PlanOutcome> {
        let projection = ColumnProjection::new(handle.column_names(), &self.config)?;
        Ok(ChunkPlanner::new(&self.config).plan(handle, projection.columns()))
    }

    /// Train and return only the report
    pub fn run(&self, handle: &DatasetHandle) -> Result<TrainingReport> {
        Ok(self.train(handle)?.report)
    }

    /// Train and return the report with the model and plan
    pub fn train(&self, handle: &DatasetHandle) -> Result<TrainingRun> {
        let config = &self.config;
        let monitor = MemoryMonitor::start();

        let encoder = FeatureEncoder::new(config.date_column.clone(), config.target_column.clone());
        let sample = TrainSample::new(config.train_sample_fraction, config.train_sample_min, config.seed);
        let state = TrainerState::new(encoder, sample).advance(Phase::Planning)?;

        // Column validation happens before any row is read
        let projection = ColumnProjection::new(handle.column_names(), config)?;
        let outcome = ChunkPlanner::new(config).plan(handle, projection.columns());
        let plan = outcome.plan.clone();

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.n_threads)
            .build()
            .map_err(|e| MemboostError::ConfigError(format!("thread pool: {}", e)))?;

        let mut ctx = RunContext {
            handle,
            projection: &projection,
            config,
            ledger: ResidencyLedger::new(),
            pool,
            monitor,
        };

        let (processing_type, result) = if plan.use_chunking {
            info!(chunks = plan.num_chunks, rows_per_chunk = plan.rows_per_chunk, "Training in chunks");
            (ProcessingType::Chunked, chunked::run(&mut ctx, &plan, state)?)
        } else {
            info!(rows = plan.total_rows, "Training in a single pass");
            let encoder = FeatureEncoder::new(config.date_column.clone(), config.target_column.clone())
                .with_date_features(config.derive_date_features);
            let state = state.with_encoder(encoder);
            (ProcessingType::Full, full::run(&mut ctx, state)?)
        };

        let mut state = result.state.advance(Phase::Done)?;
        let RunContext { ledger, monitor, .. } = ctx;
        let delta_mb = monitor.delta_mb();
        let resource_usage = monitor.finish(ledger.peak());

        let model = state.ensemble.take().ok_or(MemboostError::ModelNotFitted)?;
        let schema = state
            .encoder
            .schema()
            .cloned()
            .ok_or(MemboostError::ModelNotFitted)?;

        let chunked = processing_type == ProcessingType::Chunked;
        let report = TrainingReport {
            model: MODEL_NAME.to_string(),
            processor_type: PROCESSOR_TYPE.to_string(),
            metrics: result.metrics,
            feature_importance: result.feature_importance,
            shap_plots: result.shap_plots,
            processing_type,
            total_rows: plan.total_rows,
            rows_per_chunk: chunked.then_some(plan.rows_per_chunk),
            chunks_processed: chunked.then_some(state.chunks_processed),
            resource_usage,
        }
        .sanitized();

        info!(
            processing_type = ?report.processing_type,
            test_rmse = report.metrics.test_rmse,
            test_r2 = report.metrics.test_r2,
            peak_memory_mb = report.resource_usage.peak_memory_mb,
            memory_delta_mb = delta_mb,
            seconds = report.resource_usage.processing_time_seconds,
            "Training run complete"
        );

        Ok(TrainingRun {
            report,
            model,
            schema,
            plan,
            rounds_applied: state.rounds_applied,
        })
    }
}
