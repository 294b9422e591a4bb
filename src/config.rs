//! Training run configuration

use serde::{Deserialize, Serialize};

use crate::booster::BoosterConfig;
use crate::error::{MemboostError, Result};

/// Configuration for one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Date column name (dropped before encoding)
    pub date_column: String,

    /// Target column name
    pub target_column: String,

    /// Columns never used as features
    pub exclude_columns: Vec<String>,

    /// Fraction of rows held out for testing
    pub test_size: f64,

    /// Memory budget for the run in megabytes
    pub max_memory_mb: usize,

    /// Share of `max_memory_mb` a single chunk may occupy
    pub chunk_memory_fraction: f64,

    /// Total boosting rounds across all chunks
    pub total_rounds: usize,

    /// Rows read to estimate the per-row footprint
    pub sample_rows: usize,

    /// Floor for rows per chunk
    pub min_rows_per_chunk: usize,

    /// Rows per chunk when the footprint cannot be estimated
    pub fallback_rows_per_chunk: usize,

    /// Fixed rows per chunk, bypassing footprint estimation
    #[serde(default)]
    pub rows_per_chunk: Option<usize>,

    /// Total rows assumed when the row count cannot be read
    pub fallback_total_rows: usize,

    /// Fraction of each chunk kept for train metrics
    pub train_sample_fraction: f64,

    /// Minimum rows kept per chunk for train metrics
    pub train_sample_min: usize,

    /// Maximum test rows explained
    pub explain_sample_size: usize,

    /// Render low/medium/high breakdowns
    pub multiple_waterfall_plots: bool,

    /// Expand the date column into calendar features (full-batch path only)
    pub derive_date_features: bool,

    /// Seed for splits, sampling and boosting
    pub seed: u64,

    /// Worker threads for split search
    pub n_threads: usize,

    /// Tree ensemble parameters
    pub booster: BoosterConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            date_column: String::new(),
            target_column: String::new(),
            exclude_columns: Vec::new(),
            test_size: 0.2,
            max_memory_mb: 256,
            chunk_memory_fraction: 0.1,
            total_rounds: 100,
            sample_rows: 1000,
            min_rows_per_chunk: 1000,
            fallback_rows_per_chunk: 10_000,
            rows_per_chunk: None,
            fallback_total_rows: 1_000_000,
            train_sample_fraction: 0.2,
            train_sample_min: 100,
            explain_sample_size: 100,
            multiple_waterfall_plots: true,
            derive_date_features: false,
            seed: 42,
            n_threads: 1,
            booster: BoosterConfig::default(),
        }
    }
}

impl TrainerConfig {
    /// Create a config for the given date and target columns
    pub fn new(date_column: impl Into<String>, target_column: impl Into<String>) -> Self {
        Self {
            date_column: date_column.into(),
            target_column: target_column.into(),
            ..Default::default()
        }
    }

    pub fn with_exclude_columns(mut self, columns: Vec<String>) -> Self {
        self.exclude_columns = columns;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_max_memory_mb(mut self, mb: usize) -> Self {
        self.max_memory_mb = mb;
        self
    }

    pub fn with_total_rounds(mut self, rounds: usize) -> Self {
        self.total_rounds = rounds;
        self
    }

    pub fn with_rows_per_chunk(mut self, rows: usize) -> Self {
        self.rows_per_chunk = Some(rows);
        self
    }

    pub fn with_multiple_waterfall_plots(mut self, enabled: bool) -> Self {
        self.multiple_waterfall_plots = enabled;
        self
    }

    pub fn with_date_features(mut self, enabled: bool) -> Self {
        self.derive_date_features = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_threads(mut self, n: usize) -> Self {
        self.n_threads = n;
        self
    }

    pub fn with_booster(mut self, booster: BoosterConfig) -> Self {
        self.booster = booster;
        self
    }

    /// Megabytes one chunk is sized against
    pub fn chunk_target_mb(&self) -> f64 {
        self.max_memory_mb as f64 * self.chunk_memory_fraction
    }

    /// Apply `MEMBOOST_*` environment overrides
    pub fn from_env_overrides(mut self) -> Self {
        if let Some(mb) = env_parse::<usize>("MEMBOOST_MAX_MEMORY_MB") {
            self.max_memory_mb = mb;
        }
        if let Some(test_size) = env_parse::<f64>("MEMBOOST_TEST_SIZE") {
            self.test_size = test_size;
        }
        if let Some(threads) = env_parse::<usize>("MEMBOOST_THREADS") {
            self.n_threads = threads;
        }
        self
    }

    /// Reject configurations no run could honor
    pub fn validate(&self) -> Result<()> {
        if self.date_column.trim().is_empty() {
            return Err(MemboostError::ConfigError("date_column is required".to_string()));
        }
        if self.target_column.trim().is_empty() {
            return Err(MemboostError::ConfigError("target_column is required".to_string()));
        }
        if self.date_column == self.target_column {
            return Err(MemboostError::ConfigError(format!(
                "date_column and target_column must differ (both '{}')",
                self.date_column
            )));
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(MemboostError::invalid_parameter(
                "test_size",
                self.test_size,
                "must be in (0, 1)",
            ));
        }
        if self.max_memory_mb == 0 {
            return Err(MemboostError::invalid_parameter("max_memory_mb", 0, "must be positive"));
        }
        if !(self.chunk_memory_fraction > 0.0 && self.chunk_memory_fraction <= 1.0) {
            return Err(MemboostError::invalid_parameter(
                "chunk_memory_fraction",
                self.chunk_memory_fraction,
                "must be in (0, 1]",
            ));
        }
        if self.total_rounds == 0 {
            return Err(MemboostError::invalid_parameter("total_rounds", 0, "must be positive"));
        }
        if self.n_threads == 0 {
            return Err(MemboostError::invalid_parameter("n_threads", 0, "must be positive"));
        }
        if self.min_rows_per_chunk == 0
            || self.fallback_rows_per_chunk == 0
            || self.rows_per_chunk == Some(0)
        {
            return Err(MemboostError::invalid_parameter(
                "rows_per_chunk",
                0,
                "chunk floors must be positive",
            ));
        }
        self.booster.validate()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn default_test_size() -> f64 {
    0.2
}

fn default_max_memory_mb() -> usize {
    256
}

fn default_true() -> bool {
    true
}

/// External analysis request, as received from the API layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub dataset_id: String,

    #[serde(alias = "dateColumn")]
    pub date_column: String,

    #[serde(alias = "targetColumn")]
    pub target_column: String,

    #[serde(default)]
    pub exclude_columns: Option<Vec<String>>,

    #[serde(default = "default_test_size")]
    pub test_size: f64,

    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: usize,

    #[serde(default = "default_true", alias = "multipleWaterfallPlots")]
    pub multiple_waterfall_plots: bool,

    #[serde(default = "default_true")]
    pub delete_after_analysis: bool,
}

impl AnalysisRequest {
    pub fn new(
        dataset_id: impl Into<String>,
        date_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            date_column: date_column.into(),
            target_column: target_column.into(),
            exclude_columns: None,
            test_size: default_test_size(),
            max_memory_mb: default_max_memory_mb(),
            multiple_waterfall_plots: true,
            delete_after_analysis: true,
        }
    }

    /// Build the trainer config this request asks for
    pub fn to_config(&self) -> TrainerConfig {
        TrainerConfig::new(self.date_column.clone(), self.target_column.clone())
            .with_exclude_columns(self.exclude_columns.clone().unwrap_or_default())
            .with_test_size(self.test_size)
            .with_max_memory_mb(self.max_memory_mb)
            .with_multiple_waterfall_plots(self.multiple_waterfall_plots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = TrainerConfig::new("Date", "Sales");
        assert!(config.validate().is_ok());
        assert_eq!(config.total_rounds, 100);
        assert_eq!(config.n_threads, 1);
        assert!((config.chunk_target_mb() - 25.6).abs() < 1e-9);
    }

    #[test]
    fn test_missing_target_rejected() {
        let config = TrainerConfig::new("Date", "");
        assert!(matches!(config.validate(), Err(MemboostError::ConfigError(_))));
    }

    #[test]
    fn test_bad_test_size_rejected() {
        let config = TrainerConfig::new("Date", "Sales").with_test_size(1.0);
        let err = config.validate().unwrap_err();
        assert!(err.is_user_error());
    }

    #[test]
    fn test_request_accepts_camel_case() {
        let json = r#"{
            "dataset_id": "abc",
            "dateColumn": "Date",
            "targetColumn": "Sales",
            "exclude_columns": ["Customers"],
            "max_memory_mb": 100
        }"#;
        let request: AnalysisRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.date_column, "Date");
        assert_eq!(request.test_size, 0.2);
        assert!(request.delete_after_analysis);

        let config = request.to_config();
        assert_eq!(config.exclude_columns, vec!["Customers".to_string()]);
        assert_eq!(config.max_memory_mb, 100);
    }
}
