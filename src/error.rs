//! Error types for memboost

use std::ops::Range;
use thiserror::Error;

/// Result type alias for memboost operations
pub type Result<T> = std::result::Result<T, MemboostError>;

/// Role a declared column plays in a training run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Date,
    Target,
}

impl std::fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnRole::Date => write!(f, "date"),
            ColumnRole::Target => write!(f, "target"),
        }
    }
}

/// Main error type for memboost
#[derive(Error, Debug)]
pub enum MemboostError {
    #[error("{role} column '{column}' not found in dataset. Available columns: {available}")]
    InvalidColumn {
        column: String,
        role: ColumnRole,
        available: String,
    },

    #[error("Dataset not found: no data for dataset id '{0}'")]
    DatasetNotFound(String),

    #[error("Training failed on chunk {chunk_index} (rows {rows:?}): {reason}")]
    TrainingFailure {
        chunk_index: usize,
        rows: Range<usize>,
        reason: String,
    },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Illegal trainer transition: {0}")]
    StateError(String),

    #[error("Memory bound violated: {0}")]
    MemoryBoundViolation(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl MemboostError {
    /// Whether the caller caused this error (bad columns, unknown dataset, bad options).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            MemboostError::InvalidColumn { .. }
                | MemboostError::DatasetNotFound(_)
                | MemboostError::ConfigError(_)
                | MemboostError::InvalidParameter { .. }
        )
    }

    pub(crate) fn invalid_parameter(
        name: &str,
        value: impl std::fmt::Display,
        reason: &str,
    ) -> Self {
        MemboostError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Attach chunk context to a failure raised inside a boosting step.
    pub(crate) fn in_chunk(self, chunk_index: usize, rows: Range<usize>) -> Self {
        match self {
            already @ MemboostError::TrainingFailure { .. } => already,
            other => MemboostError::TrainingFailure {
                chunk_index,
                rows,
                reason: other.to_string(),
            },
        }
    }
}

impl From<polars::error::PolarsError> for MemboostError {
    fn from(err: polars::error::PolarsError) -> Self {
        MemboostError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for MemboostError {
    fn from(err: serde_json::Error) -> Self {
        MemboostError::SerializationError(err.to_string())
    }
}

impl<E> From<plotters::drawing::DrawingAreaErrorKind<E>> for MemboostError
where
    E: std::error::Error + Send + Sync,
{
    fn from(err: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        MemboostError::RenderError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for MemboostError {
    fn from(err: ndarray::ShapeError) -> Self {
        MemboostError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MemboostError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_invalid_column_display() {
        let err = MemboostError::InvalidColumn {
            column: "Sales".to_string(),
            role: ColumnRole::Target,
            available: "Date, Store".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "target column 'Sales' not found in dataset. Available columns: Date, Store"
        );
        assert!(err.is_user_error());
    }

    #[test]
    fn test_in_chunk_wraps_once() {
        let err = MemboostError::DataError("bad".to_string()).in_chunk(2, 20..30);
        let rewrapped = err.in_chunk(5, 0..1);
        match rewrapped {
            MemboostError::TrainingFailure { chunk_index, rows, .. } => {
                assert_eq!(chunk_index, 2);
                assert_eq!(rows, 20..30);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_drawing_error_is_render_error() {
        use plotters::drawing::DrawingAreaErrorKind;

        let err: MemboostError = DrawingAreaErrorKind::<std::io::Error>::LayoutError.into();
        assert!(matches!(err, MemboostError::RenderError(_)));
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MemboostError = io_err.into();
        assert!(matches!(err, MemboostError::IoError(_)));
        assert!(!err.is_user_error());
    }
}
