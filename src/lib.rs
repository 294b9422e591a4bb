//! memboost - Memory-bounded gradient boosting for regression
//!
//! Trains a boosted tree ensemble on a columnar (parquet) dataset without
//! ever materializing more than one block of rows at a time:
//! - small datasets are trained in a single in-memory pass
//! - large datasets are split into sequential chunks, each adding boosting
//!   rounds to one warm-started ensemble
//!
//! Every run returns a [`trainer::TrainingReport`] with held-out metrics,
//! normalized feature importance, attribution plots and resource usage.
//!
//! # Modules
//!
//! ## Data
//! - [`store`] - Dataset stores keyed by id
//! - [`data`] - Dataset handle, column projection, chunk residency
//! - [`planner`] - Chunk planning
//! - [`encoding`] - Feature encoding with a frozen schema
//!
//! ## Training
//! - [`booster`] - Gradient-boosted regression trees
//! - [`trainer`] - Chunked and full-batch training runs
//! - [`metrics`] - Regression metrics and feature importance
//! - [`explain`] - Tree attributions and SVG plots
//!
//! ## Services
//! - [`memory`] - Process memory monitoring
//! - [`service`] - Store-backed analysis service
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;

// Data
pub mod store;
pub mod data;
pub mod planner;
pub mod encoding;

// Training
pub mod booster;
pub mod trainer;
pub mod metrics;
pub mod explain;

// Services
pub mod memory;
pub mod service;
pub mod cli;

pub use error::{MemboostError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ColumnRole, MemboostError, Result};

    // Configuration
    pub use crate::booster::BoosterConfig;
    pub use crate::config::{AnalysisRequest, TrainerConfig};

    // Data
    pub use crate::data::{ColumnProjection, DatasetHandle};
    pub use crate::planner::{ChunkPlan, ChunkPlanner, Estimate, PlanOutcome};
    pub use crate::store::{DatasetStore, DirectoryStore, InMemoryStore};
    pub use crate::encoding::{EncodedBlock, FeatureEncoder, FeatureSchema};

    // Training
    pub use crate::booster::BoostedEnsemble;
    pub use crate::trainer::{ProcessingType, TrainingPipeline, TrainingReport, TrainingRun};
    pub use crate::metrics::{FeatureImportance, RegressionMetrics};
    pub use crate::explain::{Artifact, Attribution, ShapPlots};

    // Services
    pub use crate::memory::ResourceUsage;
    pub use crate::service::AnalysisService;
}
