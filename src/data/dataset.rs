//! Parquet-backed dataset handle

use polars::prelude::*;
use std::io::Cursor;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{MemboostError, Result};

/// Immutable reference to a columnar byte buffer
///
/// Reads are always projected and row-sliced so that callers control how
/// much of the dataset is materialized at any time.
#[derive(Debug, Clone)]
pub struct DatasetHandle {
    bytes: Arc<[u8]>,
    columns: Vec<String>,
}

impl DatasetHandle {
    /// Wrap raw parquet bytes, reading only the file footer for column names
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let bytes: Arc<[u8]> = bytes.into();
        if bytes.is_empty() {
            return Err(MemboostError::DataError("dataset buffer is empty".to_string()));
        }
        let schema = ParquetReader::new(Cursor::new(&bytes[..])).schema()?;
        let columns = schema.iter_names().map(|name| name.to_string()).collect();
        Ok(Self { bytes, columns })
    }

    /// Load a parquet file from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(bytes)
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Size of the underlying buffer in bytes
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Exact row count from parquet metadata
    pub fn count_rows(&self) -> Result<usize> {
        Ok(ParquetReader::new(self.cursor()).num_rows()?)
    }

    /// Read `columns` for the rows in `rows`, clamped to the dataset length
    pub fn read_rows(&self, columns: &[String], rows: Range<usize>) -> Result<DataFrame> {
        let (offset, len) = match self.count_rows() {
            Ok(total) => {
                let start = rows.start.min(total);
                (start, rows.end.min(total).saturating_sub(start))
            }
            Err(_) => (rows.start, rows.len()),
        };
        debug!(offset, len, columns = columns.len(), "Reading row block");

        let df = ParquetReader::new(self.cursor())
            .with_columns(Some(columns.to_vec()))
            .with_slice(Some((offset, len)))
            .finish()?;
        Ok(df)
    }

    /// Read `columns` for every row
    pub fn read_all(&self, columns: &[String]) -> Result<DataFrame> {
        let df = ParquetReader::new(self.cursor())
            .with_columns(Some(columns.to_vec()))
            .finish()?;
        Ok(df)
    }

    fn cursor(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.bytes[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parquet_bytes(mut df: DataFrame) -> Vec<u8> {
        let mut buf = Vec::new();
        ParquetWriter::new(&mut buf).finish(&mut df).unwrap();
        buf
    }

    fn sample() -> DatasetHandle {
        let df = df!(
            "Date" => ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"],
            "Store" => ["a", "b", "a", "c"],
            "Sales" => [1.0, 2.0, 3.0, 4.0]
        )
        .unwrap();
        DatasetHandle::from_bytes(parquet_bytes(df)).unwrap()
    }

    #[test]
    fn test_schema_introspection() {
        let handle = sample();
        assert_eq!(handle.column_names(), &["Date", "Store", "Sales"]);
        assert!(handle.has_column("Store"));
        assert!(!handle.has_column("Customers"));
        assert_eq!(handle.count_rows().unwrap(), 4);
    }

    #[test]
    fn test_read_rows_is_projected_and_sliced() {
        let handle = sample();
        let df = handle
            .read_rows(&["Sales".to_string()], 1..3)
            .unwrap();
        assert_eq!(df.width(), 1);
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn test_read_past_end_is_empty() {
        let handle = sample();
        let df = handle.read_rows(&["Sales".to_string()], 10..20).unwrap();
        assert_eq!(df.height(), 0);
    }

    #[test]
    fn test_empty_buffer_rejected() {
        assert!(DatasetHandle::from_bytes(Vec::<u8>::new()).is_err());
    }
}
