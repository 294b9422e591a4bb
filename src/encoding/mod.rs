//! Feature encoding with a schema frozen on the first block
//!
//! Steps, in order:
//! 1. drop the date column (optionally expanding it into calendar features first)
//! 2. classify non-numeric, non-boolean columns as categorical
//! 3. one-hot encode categoricals, dropping the first level
//! 4. on the first block only, record the column list as the `FeatureSchema`
//!
//! Every block, including the first, leaves the encoder through the
//! alignment step, so an `EncodedBlock` always matches the schema exactly.

mod calendar;
mod schema;

pub use schema::{CategoricalEncodingMap, FeatureSchema};

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::{MemboostError, Result};
use schema::indicator_name;

/// Numeric feature matrix and target, aligned to the run's feature schema
#[derive(Debug, Clone)]
pub struct EncodedBlock {
    x: Array2<f64>,
    y: Array1<f64>,
    schema: Arc<FeatureSchema>,
}

impl EncodedBlock {
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }

    /// Copy out the given rows, keeping the schema
    pub fn select_rows(&self, rows: &[usize]) -> EncodedBlock {
        EncodedBlock {
            x: self.x.select(Axis(0), rows),
            y: self.y.select(Axis(0), rows),
            schema: Arc::clone(&self.schema),
        }
    }
}

/// Encoded columns of one block, before schema alignment
pub(crate) struct RawEncoding {
    columns: Vec<(String, Vec<f64>)>,
    y: Array1<f64>,
    n_rows: usize,
}

struct Frozen {
    categoricals: CategoricalEncodingMap,
    schema: Arc<FeatureSchema>,
}

/// Converts raw row blocks into schema-aligned numeric matrices
pub struct FeatureEncoder {
    date_column: String,
    target_column: String,
    derive_date_features: bool,
    frozen: Option<Frozen>,
}

impl FeatureEncoder {
    pub fn new(date_column: impl Into<String>, target_column: impl Into<String>) -> Self {
        Self {
            date_column: date_column.into(),
            target_column: target_column.into(),
            derive_date_features: false,
            frozen: None,
        }
    }

    /// Expand the date column into calendar features before dropping it
    pub fn with_date_features(mut self, enabled: bool) -> Self {
        self.derive_date_features = enabled;
        self
    }

    /// The frozen schema, once the first block has been encoded
    pub fn schema(&self) -> Option<&Arc<FeatureSchema>> {
        self.frozen.as_ref().map(|f| &f.schema)
    }

    pub fn categoricals(&self) -> Option<&CategoricalEncodingMap> {
        self.frozen.as_ref().map(|f| &f.categoricals)
    }

    /// Encode and align a block. The first call freezes the schema; later calls replay it.
    pub fn encode(&mut self, df: &DataFrame) -> Result<EncodedBlock> {
        let raw = self.encode_raw(df)?;
        self.align(raw)
    }

    /// Encode a block without aligning it to the schema
    pub(crate) fn encode_raw(&mut self, df: &DataFrame) -> Result<RawEncoding> {
        let y = self.extract_target(df)?;

        let replay = self.frozen.as_ref().map(|f| f.categoricals.clone());
        let (columns, discovered) = match replay {
            Some(categoricals) => (self.encode_columns(df, &categoricals, false)?, None),
            None => {
                let categoricals = self.discover_categoricals(df);
                (self.encode_columns(df, &categoricals, true)?, Some(categoricals))
            }
        };

        // Alignment is by name, so a repeated name would silently drop a column
        let names: Vec<String> = columns.iter().map(|(n, _)| n.clone()).collect();
        if let Some(name) = first_duplicate(&names) {
            return Err(MemboostError::DataError(format!(
                "encoded feature name '{}' is produced twice; rename the column or categorical level it collides with",
                name
            )));
        }

        if let Some(categoricals) = discovered {
            let schema = Arc::new(FeatureSchema::new(names));
            debug!(
                features = schema.len(),
                categoricals = categoricals.columns().len(),
                "Feature schema frozen"
            );
            self.frozen = Some(Frozen { categoricals, schema });
        }

        Ok(RawEncoding {
            columns,
            y,
            n_rows: df.height(),
        })
    }

    /// Place encoded columns into schema order
    pub(crate) fn align(&self, raw: RawEncoding) -> Result<EncodedBlock> {
        let schema = self
            .schema()
            .ok_or_else(|| MemboostError::DataError("feature schema not frozen yet".to_string()))?;
        align(raw, schema)
    }

    fn extract_target(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let column = df.column(&self.target_column).map_err(|_| {
            MemboostError::DataError(format!(
                "target column '{}' missing from block",
                self.target_column
            ))
        })?;
        Ok(Array1::from_vec(numeric_values(column.as_materialized_series())?))
    }

    fn is_feature(&self, name: &str) -> bool {
        name != self.date_column && name != self.target_column
    }

    fn discover_categoricals(&self, df: &DataFrame) -> CategoricalEncodingMap {
        let columns = df
            .get_columns()
            .iter()
            .filter(|c| self.is_feature(c.name().as_str()) && !is_numeric_dtype(c.dtype()))
            .map(|c| c.name().to_string())
            .collect();
        CategoricalEncodingMap::new(columns)
    }

    /// Encode into named columns: numeric features in block order, then calendar
    /// features, then one indicator per categorical level.
    fn encode_columns(
        &self,
        df: &DataFrame,
        categoricals: &CategoricalEncodingMap,
        first_block: bool,
    ) -> Result<Vec<(String, Vec<f64>)>> {
        let mut columns = Vec::with_capacity(df.width());

        for column in df.get_columns() {
            let name = column.name().as_str();
            if !self.is_feature(name) || categoricals.contains(name) {
                continue;
            }
            columns.push((name.to_string(), numeric_values(column.as_materialized_series())?));
        }

        if self.derive_date_features {
            if let Ok(date) = df.column(&self.date_column) {
                columns.extend(calendar::calendar_features(
                    &self.date_column,
                    date.as_materialized_series(),
                )?);
            }
        }

        for name in categoricals.columns() {
            let Ok(column) = df.column(name) else {
                continue;
            };
            let values = string_values(column.as_materialized_series())?;
            let levels: BTreeSet<&str> = values.iter().flatten().map(String::as_str).collect();
            let skip = usize::from(first_block);

            for level in levels.into_iter().skip(skip) {
                let indicator = values
                    .iter()
                    .map(|v| f64::from(u8::from(v.as_deref() == Some(level))))
                    .collect();
                columns.push((indicator_name(name, level), indicator));
            }
        }

        Ok(columns)
    }
}

/// Place `columns` into schema order, zero-filling schema features the block lacks
/// and dropping columns the schema does not know.
fn align(raw: RawEncoding, schema: &Arc<FeatureSchema>) -> Result<EncodedBlock> {
    let RawEncoding { columns, y, n_rows } = raw;
    let mut x = Array2::<f64>::zeros((n_rows, schema.len()));
    let mut by_name: HashMap<String, Vec<f64>> = columns.into_iter().collect();

    let mut padded = Vec::new();
    for (j, name) in schema.names().iter().enumerate() {
        match by_name.remove(name) {
            Some(values) => {
                if values.len() != n_rows {
                    return Err(MemboostError::ShapeError {
                        expected: format!("{} rows in column '{}'", n_rows, name),
                        actual: format!("{} rows", values.len()),
                    });
                }
                x.column_mut(j).assign(&Array1::from_vec(values));
            }
            None => padded.push(name.as_str()),
        }
    }

    if !padded.is_empty() {
        debug!(padded = ?padded, "Zero-padded features absent from block");
    }
    if !by_name.is_empty() {
        debug!(dropped = by_name.len(), "Dropped columns outside the feature schema");
    }

    if y.len() != n_rows {
        return Err(MemboostError::ShapeError {
            expected: format!("{} targets", n_rows),
            actual: format!("{} targets", y.len()),
        });
    }

    Ok(EncodedBlock {
        x,
        y,
        schema: Arc::clone(schema),
    })
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(names.len());
    names
        .iter()
        .find(|name| !seen.insert(name.as_str()))
        .map(String::as_str)
}

fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Boolean
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Float32
            | DataType::Float64
            | DataType::Date
            | DataType::Datetime(_, _)
            | DataType::Null
    )
}

/// Cast to Float64; nulls and unparseable values become 0.0
fn numeric_values(series: &Series) -> Result<Vec<f64>> {
    let cast = series.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().map(|v| v.unwrap_or(0.0)).collect())
}

fn string_values(series: &Series) -> Result<Vec<Option<String>>> {
    let cast = series.cast(&DataType::String)?;
    Ok(cast.str()?.into_iter().map(|v| v.map(str::to_string)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_block() -> DataFrame {
        df!(
            "Date" => ["2024-01-01", "2024-01-02", "2024-01-03"],
            "Store" => ["b", "a", "c"],
            "Promo" => [true, false, true],
            "Customers" => [10i64, 20, 30],
            "Sales" => [1.0, 2.0, 3.0]
        )
        .unwrap()
    }

    #[test]
    fn test_first_block_freezes_schema() {
        let mut encoder = FeatureEncoder::new("Date", "Sales");
        let block = encoder.encode(&first_block()).unwrap();

        assert_eq!(
            block.schema().names(),
            &["Promo", "Customers", "Store_b", "Store_c"]
        );
        assert_eq!(block.x().row(0).to_vec(), vec![1.0, 10.0, 1.0, 0.0]);
        assert_eq!(block.x().row(1).to_vec(), vec![0.0, 20.0, 0.0, 0.0]);
        assert_eq!(block.y().to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(
            encoder.categoricals().unwrap().columns(),
            &["Store".to_string()]
        );
    }

    #[test]
    fn test_later_block_is_padded_and_reordered() {
        let mut encoder = FeatureEncoder::new("Date", "Sales");
        let first = encoder.encode(&first_block()).unwrap();

        let later = df!(
            "Date" => ["2024-02-01", "2024-02-02"],
            "Store" => ["a", "d"],
            "Promo" => [false, true],
            "Customers" => [5i64, 6],
            "Sales" => [4.0, 5.0]
        )
        .unwrap();
        let block = encoder.encode(&later).unwrap();

        assert_eq!(block.schema().names(), first.schema().names());
        let store_b = block.schema().position("Store_b").unwrap();
        let store_c = block.schema().position("Store_c").unwrap();
        assert!(block.x().column(store_b).iter().all(|v| *v == 0.0));
        assert!(block.x().column(store_c).iter().all(|v| *v == 0.0));
        assert_eq!(block.x().row(1).to_vec(), vec![1.0, 6.0, 0.0, 0.0]);
    }

    #[test]
    fn test_new_categorical_column_not_expanded_later() {
        let mut encoder = FeatureEncoder::new("Date", "Sales");
        let first = df!(
            "Date" => ["2024-01-01", "2024-01-02"],
            "Region" => [1i64, 2],
            "Sales" => [1.0, 2.0]
        )
        .unwrap();
        encoder.encode(&first).unwrap();

        let later = df!(
            "Date" => ["2024-01-03", "2024-01-04"],
            "Region" => ["north", "south"],
            "Sales" => [3.0, 4.0]
        )
        .unwrap();
        let block = encoder.encode(&later).unwrap();
        assert_eq!(block.schema().names(), &["Region"]);
        assert_eq!(block.x().column(0).to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_nulls_encode_as_zero() {
        let mut encoder = FeatureEncoder::new("Date", "Sales");
        let df = df!(
            "Date" => ["2024-01-01", "2024-01-02"],
            "Price" => [Some(2.5), None],
            "Sales" => [Some(1.0), None]
        )
        .unwrap();
        let block = encoder.encode(&df).unwrap();
        assert_eq!(block.x().column(0).to_vec(), vec![2.5, 0.0]);
        assert_eq!(block.y().to_vec(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_calendar_features_precede_indicators() {
        let mut encoder = FeatureEncoder::new("Date", "Sales").with_date_features(true);
        let block = encoder.encode(&first_block()).unwrap();
        let names = block.schema().names();
        assert_eq!(names[2], "Date_year");
        assert_eq!(names.last().map(String::as_str), Some("Store_c"));
        assert!(!names.iter().any(|n| n == "Date"));
    }

    #[test]
    fn test_indicator_colliding_with_numeric_column_is_rejected() {
        let mut encoder = FeatureEncoder::new("Date", "Sales");
        let df = df!(
            "Date" => ["2024-01-01", "2024-01-02", "2024-01-03"],
            "Store" => ["a", "b", "b"],
            "Store_b" => [7.0, 8.0, 9.0],
            "Sales" => [1.0, 2.0, 3.0]
        )
        .unwrap();

        let err = encoder.encode(&df).unwrap_err();
        assert!(matches!(err, MemboostError::DataError(ref m) if m.contains("Store_b")));
        assert!(encoder.schema().is_none());
    }

    #[test]
    fn test_later_level_colliding_with_numeric_column_is_rejected() {
        let mut encoder = FeatureEncoder::new("Date", "Sales");
        let first = df!(
            "Date" => ["2024-01-01", "2024-01-02"],
            "Store" => ["a", "c"],
            "Store_b" => [7.0, 8.0],
            "Sales" => [1.0, 2.0]
        )
        .unwrap();
        let block = encoder.encode(&first).unwrap();
        assert_eq!(block.schema().names(), &["Store_b", "Store_c"]);
        assert_eq!(block.x().column(0).to_vec(), vec![7.0, 8.0]);

        let later = df!(
            "Date" => ["2024-01-03"],
            "Store" => ["b"],
            "Store_b" => [9.0],
            "Sales" => [3.0]
        )
        .unwrap();
        assert!(matches!(encoder.encode(&later), Err(MemboostError::DataError(_))));
    }

    #[test]
    fn test_select_rows() {
        let mut encoder = FeatureEncoder::new("Date", "Sales");
        let block = encoder.encode(&first_block()).unwrap();
        let picked = block.select_rows(&[2, 0]);
        assert_eq!(picked.y().to_vec(), vec![3.0, 1.0]);
        assert_eq!(picked.n_rows(), 2);
    }
}
