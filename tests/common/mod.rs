//! Shared fixtures for integration tests

#![allow(dead_code)]

use memboost::booster::BoosterConfig;
use memboost::config::TrainerConfig;
use memboost::data::DatasetHandle;
use polars::prelude::*;
use rand::prelude::*;

const STORES: [&str; 3] = ["A", "B", "C"];

/// Daily sales with a date, a categorical store, a boolean promo flag and two numeric drivers
pub fn sales_frame(n_rows: usize) -> DataFrame {
    sales_frame_with_stores(n_rows, |i| STORES[i % 3])
}

/// Like [`sales_frame`], with the store of row `i` chosen by `store`
pub fn sales_frame_with_stores(n_rows: usize, store: impl Fn(usize) -> &'static str) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(7);

    let dates: Vec<String> = (0..n_rows)
        .map(|i| format!("2023-{:02}-{:02}", i % 12 + 1, i % 28 + 1))
        .collect();
    let stores: Vec<&str> = (0..n_rows).map(&store).collect();
    let promo: Vec<bool> = (0..n_rows).map(|i| i % 4 == 0).collect();
    let temperature: Vec<f64> = (0..n_rows).map(|_| rng.gen_range(0.0..30.0)).collect();
    let customers: Vec<i64> = (0..n_rows).map(|_| rng.gen_range(50..500)).collect();

    let sales: Vec<f64> = (0..n_rows)
        .map(|i| {
            let store_effect = match stores[i] {
                "A" => 0.0,
                "B" => 25.0,
                _ => -15.0,
            };
            let promo_effect = if promo[i] { 40.0 } else { 0.0 };
            100.0
                + 3.0 * temperature[i]
                + 0.5 * customers[i] as f64
                + store_effect
                + promo_effect
                + rng.gen_range(-5.0..5.0)
        })
        .collect();

    df!(
        "Date" => dates,
        "Store" => stores,
        "Promo" => promo,
        "Temperature" => temperature,
        "Customers" => customers,
        "Sales" => sales
    )
    .unwrap()
}

pub fn parquet_bytes(mut df: DataFrame) -> Vec<u8> {
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf).finish(&mut df).unwrap();
    buf
}

pub fn handle(df: DataFrame) -> DatasetHandle {
    DatasetHandle::from_bytes(parquet_bytes(df)).unwrap()
}

/// Small, fast booster settings for tests
pub fn quick_config() -> TrainerConfig {
    TrainerConfig::new("Date", "Sales")
        .with_total_rounds(20)
        .with_booster(BoosterConfig {
            max_depth: 3,
            ..Default::default()
        })
}
