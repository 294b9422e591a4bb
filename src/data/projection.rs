//! Column projection: narrow a dataset to date, target and feature columns

use crate::config::TrainerConfig;
use crate::error::{ColumnRole, MemboostError, Result};

/// Validated column selection for one run
#[derive(Debug, Clone)]
pub struct ColumnProjection {
    date_column: String,
    target_column: String,
    columns: Vec<String>,
}

impl ColumnProjection {
    /// Validate the declared columns against `available` and build the projection.
    ///
    /// Excluded columns are dropped, except the target and date columns which
    /// are always kept. Column order follows the dataset.
    pub fn new(available: &[String], config: &TrainerConfig) -> Result<Self> {
        for (column, role) in [
            (&config.date_column, ColumnRole::Date),
            (&config.target_column, ColumnRole::Target),
        ] {
            if !available.iter().any(|c| c == column) {
                return Err(MemboostError::InvalidColumn {
                    column: column.clone(),
                    role,
                    available: available.join(", "),
                });
            }
        }

        let columns = available
            .iter()
            .filter(|c| {
                **c == config.target_column
                    || **c == config.date_column
                    || !config.exclude_columns.contains(c)
            })
            .cloned()
            .collect();

        Ok(Self {
            date_column: config.date_column.clone(),
            target_column: config.target_column.clone(),
            columns,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn date_column(&self) -> &str {
        &self.date_column
    }

    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    /// Columns that may become features
    pub fn feature_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(move |c| *c != self.date_column && *c != self.target_column)
    }
}
