//! Analysis service: store lookup, training run, optional cleanup

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AnalysisRequest, TrainerConfig};
use crate::data::DatasetHandle;
use crate::error::{MemboostError, Result};
use crate::store::DatasetStore;
use crate::trainer::{TrainingPipeline, TrainingReport};

/// Runs analysis requests against an injected dataset store
#[derive(Clone)]
pub struct AnalysisService {
    store: Arc<dyn DatasetStore>,
    n_threads: usize,
}

impl AnalysisService {
    pub fn new(store: Arc<dyn DatasetStore>) -> Self {
        Self { store, n_threads: 1 }
    }

    /// Threads the boosting pool may use per run
    pub fn with_n_threads(mut self, n: usize) -> Self {
        self.n_threads = n;
        self
    }

    pub fn store(&self) -> &Arc<dyn DatasetStore> {
        &self.store
    }

    /// Trainer settings for `request`, with `MEMBOOST_*` environment overrides applied last
    pub fn resolve_config(&self, request: &AnalysisRequest) -> Result<TrainerConfig> {
        let config = request
            .to_config()
            .with_n_threads(self.n_threads)
            .from_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Run the analysis on the current thread
    pub fn analyze_blocking(&self, request: &AnalysisRequest) -> Result<TrainingReport> {
        let config = self.resolve_config(request)?;
        let pipeline = TrainingPipeline::new(config)?;

        let bytes = self
            .store
            .get(&request.dataset_id)?
            .ok_or_else(|| MemboostError::DatasetNotFound(request.dataset_id.clone()))?;
        info!(dataset_id = %request.dataset_id, bytes = bytes.len(), "Dataset retrieved");

        let report = {
            let handle = DatasetHandle::from_bytes(bytes)?;
            pipeline.run(&handle)?
        };

        if request.delete_after_analysis {
            match self.store.delete(&request.dataset_id) {
                Ok(true) => info!(dataset_id = %request.dataset_id, "Dataset deleted after analysis"),
                Ok(false) => warn!(dataset_id = %request.dataset_id, "Dataset was already gone at cleanup"),
                Err(e) => warn!(dataset_id = %request.dataset_id, error = %e, "Failed to delete dataset after analysis"),
            }
        }

        Ok(report)
    }

    /// Run the analysis on the blocking pool so the caller's runtime stays responsive
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<TrainingReport> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.analyze_blocking(&request))
            .await
            .map_err(|e| MemboostError::DataError(format!("analysis task failed: {}", e)))?
    }
}
