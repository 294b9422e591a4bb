//! Result object returned to callers

use serde::{Deserialize, Serialize};

use crate::explain::ShapPlots;
use crate::memory::ResourceUsage;
use crate::metrics::{sanitize, FeatureImportance, RegressionMetrics};

pub const MODEL_NAME: &str = "gradient_boosting";
pub const PROCESSOR_TYPE: &str = "chunked";

/// Which path trained the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingType {
    Full,
    Chunked,
}

/// Complete outcome of one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub model: String,
    pub processor_type: String,
    pub metrics: RegressionMetrics,
    pub feature_importance: Vec<FeatureImportance>,
    pub shap_plots: ShapPlots,
    pub processing_type: ProcessingType,
    pub total_rows: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_per_chunk: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks_processed: Option<usize>,
    pub resource_usage: ResourceUsage,
}

impl TrainingReport {
    /// Apply the non-finite -> 0.0 rule to every float in the report
    pub fn sanitized(mut self) -> Self {
        self.metrics = self.metrics.sanitized();
        for entry in &mut self.feature_importance {
            entry.importance = sanitize(entry.importance);
        }
        self.resource_usage.peak_memory_mb = sanitize(self.resource_usage.peak_memory_mb);
        self.resource_usage.processing_time_seconds =
            sanitize(self.resource_usage.processing_time_seconds);
        self
    }
}
