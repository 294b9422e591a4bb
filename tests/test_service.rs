//! Integration test: store-backed analysis service

mod common;

use common::{parquet_bytes, sales_frame};
use memboost::config::AnalysisRequest;
use memboost::error::MemboostError;
use memboost::service::AnalysisService;
use memboost::store::{DatasetStore, DirectoryStore, InMemoryStore};
use memboost::trainer::ProcessingType;
use std::sync::Arc;

fn seeded_store(id: &str, rows: usize) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.put(id, parquet_bytes(sales_frame(rows))).unwrap();
    store
}

#[test]
fn test_analysis_deletes_dataset_afterwards() {
    let store = seeded_store("sales-2023", 300);
    let service = AnalysisService::new(store.clone());

    let report = service
        .analyze_blocking(&AnalysisRequest::new("sales-2023", "Date", "Sales"))
        .unwrap();

    assert_eq!(report.processing_type, ProcessingType::Full);
    assert_eq!(report.total_rows, 300);
    assert!(!store.contains("sales-2023"));
}

#[test]
fn test_analysis_can_keep_dataset() {
    let store = seeded_store("keep", 200);
    let service = AnalysisService::new(store.clone());

    let mut request = AnalysisRequest::new("keep", "Date", "Sales");
    request.delete_after_analysis = false;
    request.multiple_waterfall_plots = false;
    let report = service.analyze_blocking(&request).unwrap();

    assert!(store.contains("keep"));
    assert!(report.shap_plots.waterfall_plot_low.is_none());
}

#[test]
fn test_failed_run_keeps_dataset() {
    let store = seeded_store("bad", 100);
    let service = AnalysisService::new(store.clone());

    let err = service
        .analyze_blocking(&AnalysisRequest::new("bad", "Date", "Revenue"))
        .unwrap_err();

    assert!(matches!(err, MemboostError::InvalidColumn { .. }));
    assert!(store.contains("bad"));
}

#[test]
fn test_request_from_json() {
    let store = seeded_store("json", 200);
    let service = AnalysisService::new(store);

    let request: AnalysisRequest = serde_json::from_str(
        r#"{
            "dataset_id": "json",
            "dateColumn": "Date",
            "targetColumn": "Sales",
            "exclude_columns": ["Customers"],
            "test_size": 0.25
        }"#,
    )
    .unwrap();
    let report = service.analyze_blocking(&request).unwrap();

    assert!(report.feature_importance.iter().all(|f| f.feature != "Customers"));
}

#[test]
fn test_directory_store_drives_the_service() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DirectoryStore::new(dir.path()));
    store.put("daily", parquet_bytes(sales_frame(250))).unwrap();

    let service = AnalysisService::new(store.clone());
    let report = service
        .analyze_blocking(&AnalysisRequest::new("daily", "Date", "Sales"))
        .unwrap();

    assert_eq!(report.total_rows, 250);
    assert!(!dir.path().join("daily.parquet").exists());
}

#[tokio::test]
async fn test_async_analysis() {
    let store = seeded_store("async", 300);
    let service = AnalysisService::new(store.clone());

    let report = service
        .analyze(AnalysisRequest::new("async", "Date", "Sales"))
        .await
        .unwrap();

    assert!(report.metrics.test_rmse.is_finite());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_async_missing_dataset() {
    let service = AnalysisService::new(Arc::new(InMemoryStore::new()));
    let err = service
        .analyze(AnalysisRequest::new("nope", "Date", "Sales"))
        .await
        .unwrap_err();
    assert!(matches!(err, MemboostError::DatasetNotFound(_)));
}
