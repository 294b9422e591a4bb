//! Integration test: MEMBOOST_* environment overrides
//!
//! Kept in its own test binary with a single test, since the process
//! environment is shared by every test in a binary.

mod common;

use common::{handle, parquet_bytes, sales_frame};
use memboost::config::AnalysisRequest;
use memboost::error::MemboostError;
use memboost::service::AnalysisService;
use memboost::store::{DatasetStore, InMemoryStore};
use memboost::trainer::TrainingPipeline;
use std::sync::Arc;

const KEYS: [&str; 3] = ["MEMBOOST_MAX_MEMORY_MB", "MEMBOOST_TEST_SIZE", "MEMBOOST_THREADS"];

fn clear_overrides() {
    for key in KEYS {
        std::env::remove_var(key);
    }
}

#[test]
fn test_environment_overrides_reach_the_run() {
    clear_overrides();
    let store = Arc::new(InMemoryStore::new());
    store.put("daily", parquet_bytes(sales_frame(200))).unwrap();
    let service = AnalysisService::new(store.clone());
    let mut request = AnalysisRequest::new("daily", "Date", "Sales");
    request.delete_after_analysis = false;

    let baseline = service.resolve_config(&request).unwrap();
    let baseline_plan = TrainingPipeline::new(baseline.clone())
        .unwrap()
        .plan(&handle(sales_frame(200)))
        .unwrap()
        .plan;
    assert_eq!(baseline_plan.test_rows, 40);

    std::env::set_var("MEMBOOST_TEST_SIZE", "0.5");
    std::env::set_var("MEMBOOST_MAX_MEMORY_MB", "64");
    std::env::set_var("MEMBOOST_THREADS", "2");

    let config = service.resolve_config(&request).unwrap();
    assert_eq!(config.test_size, 0.5);
    assert_eq!(config.max_memory_mb, 64);
    assert_eq!(config.n_threads, 2);

    let plan = TrainingPipeline::new(config)
        .unwrap()
        .plan(&handle(sales_frame(200)))
        .unwrap()
        .plan;
    assert_eq!(plan.test_rows, 100);
    assert_eq!(plan.train_rows, 100);

    let report = service.analyze_blocking(&request).unwrap();
    assert_eq!(report.total_rows, 200);

    // An override outside the valid range is rejected like a bad request
    std::env::set_var("MEMBOOST_TEST_SIZE", "1.5");
    let err = service.analyze_blocking(&request).unwrap_err();
    assert!(matches!(err, MemboostError::InvalidParameter { ref name, .. } if name == "test_size"));
    assert!(store.contains("daily"));

    // Unparseable values are ignored
    std::env::set_var("MEMBOOST_TEST_SIZE", "half");
    assert_eq!(service.resolve_config(&request).unwrap().test_size, request.test_size);

    clear_overrides();
}
