//! Integration tests for the query/download stages and the orchestrator.
//!
//! Providers are replaced by a scripted in-memory factory so failures,
//! retries and concurrency can be driven deterministically.

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use satflow::pipeline::DEFAULT_QUERY_RETRY_DELAY;
use satflow::{
    BoundingBox, DownloadStage, ErrorKind, Orchestrator, PipelineConfig, ProductRouter,
    ProviderError, ProviderKind, QueryStage, RetryPolicy, SearchCriteria,
};
use serde_json::json;
use tempfile::TempDir;

use support::mock_provider::{MockFactory, landsat, record, sentinel};

fn bbox() -> BoundingBox {
    BoundingBox::new(23.5, 37.7, 24.0, 38.2).unwrap()
}

fn date(s: &str) -> NaiveDate {
    satflow::provider::parse_date(s).unwrap()
}

fn criteria(product_type: &str) -> SearchCriteria {
    SearchCriteria::new(product_type, bbox(), date("20210112"), date("20210114")).unwrap()
}

fn query_stage(factory: &MockFactory, policy: RetryPolicy) -> QueryStage {
    QueryStage::new(
        Arc::new(factory.clone()),
        Arc::new(ProductRouter::default()),
        policy,
    )
}

fn download_stage(
    factory: &MockFactory,
    data_dir: &TempDir,
    workers: usize,
    policy: RetryPolicy,
) -> DownloadStage {
    DownloadStage::new(
        Arc::new(factory.clone()),
        Arc::new(ProductRouter::new(data_dir.path())),
        workers,
        policy,
    )
    .unwrap()
}

fn config(data_dir: &TempDir) -> PipelineConfig {
    PipelineConfig {
        data_dir: data_dir.path().to_path_buf(),
        query_retry_delay: Duration::ZERO,
        ..PipelineConfig::default()
    }
}

// ==================== QueryStage ====================

#[tokio::test(start_paused = true)]
async fn test_query_fail_fail_succeed_surfaces_no_error() {
    let factory = MockFactory::new()
        .with_records("S2MSI1C", vec![sentinel("a"), sentinel("b")])
        .failing_queries("S2MSI1C", 2);
    let stage = query_stage(&factory, RetryPolicy::default());
    let started = tokio::time::Instant::now();

    let records = stage.run_query(&criteria("S2MSI1C")).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(factory.queries(), 3);
    assert_eq!(factory.creates(), 3, "a fresh client per attempt");
    let elapsed = started.elapsed();
    assert!(
        elapsed >= DEFAULT_QUERY_RETRY_DELAY * 2,
        "two fixed delays expected, elapsed {elapsed:?}"
    );
    assert!(elapsed < DEFAULT_QUERY_RETRY_DELAY * 3, "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_query_gives_up_after_three_attempts() {
    let factory = MockFactory::new().failing_queries("landsat_8_c1", 10);
    let stage = query_stage(&factory, RetryPolicy::default());

    let error = stage.run_query(&criteria("landsat_8_c1")).await.unwrap_err();

    assert!(matches!(error, ProviderError::Query { .. }));
    assert_eq!(factory.queries(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_query_retries_rejected_session() {
    let factory = MockFactory::new()
        .with_records("landsat_8_c1", vec![landsat("LC08")])
        .failing_auth("landsat_8_c1", 2);
    let stage = query_stage(&factory, RetryPolicy::default());

    let records = stage.run_query(&criteria("landsat_8_c1")).await.unwrap();

    assert_eq!(records, vec![landsat("LC08")]);
    assert_eq!(factory.queries(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_query_configuration_error_is_not_retried() {
    let factory = MockFactory::new().without_credentials(ProviderKind::Copernicus);
    let stage = query_stage(&factory, RetryPolicy::default());
    let started = tokio::time::Instant::now();

    let error = stage.run_query(&criteria("S2MSI1C")).await.unwrap_err();

    assert!(matches!(error, ProviderError::Configuration { .. }));
    assert!(error.to_string().contains("DHUS_USER"));
    assert_eq!(factory.creates(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn test_query_unsupported_product_type_never_builds_a_client() {
    let factory = MockFactory::new();
    let stage = query_stage(&factory, RetryPolicy::default());

    let error = stage.run_query(&criteria("MODIS_TERRA")).await.unwrap_err();

    assert!(matches!(
        error,
        ProviderError::UnsupportedProductType { provider: None, .. }
    ));
    assert_eq!(factory.creates(), 0);
}

#[tokio::test]
async fn test_query_is_idempotent_against_stable_backend() {
    let factory = MockFactory::new().with_records("S2MSI1C", vec![sentinel("a"), sentinel("b")]);
    let stage = query_stage(&factory, RetryPolicy::no_retry());

    let first = stage.run_query(&criteria("S2MSI1C")).await.unwrap();
    let second = stage.run_query(&criteria("S2MSI1C")).await.unwrap();
    assert_eq!(first, second);
}

// ==================== DownloadStage ====================

#[tokio::test]
async fn test_downloads_return_one_result_per_record_in_order() {
    let data_dir = TempDir::new().unwrap();
    let records: Vec<_> = (0..20)
        .map(|i| {
            if i % 2 == 0 {
                sentinel(&format!("s{i}"))
            } else {
                landsat(&format!("l{i}"))
            }
        })
        .collect();
    let factory = MockFactory::new().with_download_delay(Duration::from_millis(5));
    let stage = download_stage(&factory, &data_dir, 3, RetryPolicy::no_retry());

    let results = stage.run_downloads(records.clone()).await;

    assert_eq!(results.len(), records.len());
    for (result, record) in results.iter().zip(&records) {
        assert_eq!(result.record(), record);
        let path = result.path().unwrap();
        assert!(path.exists());
        let expected_dir = match record.provider() {
            Some(ProviderKind::Copernicus) => data_dir.path().join("sentinel"),
            _ => data_dir.path().join("landsat"),
        };
        assert_eq!(path.parent().unwrap(), expected_dir);
    }
    assert!(
        factory.max_in_flight() <= 3,
        "worker limit exceeded: {}",
        factory.max_in_flight()
    );
}

#[tokio::test]
async fn test_unroutable_record_fails_alone() {
    let data_dir = TempDir::new().unwrap();
    let records = vec![
        record(json!({"uuid": "u-1", "title": "S2A_one"})),
        record(json!({"id": "mystery", "title": "unknown catalog"})),
        record(json!({"entity_id": "LC08", "dataset": "landsat_8_c1"})),
        record(json!({"entity_id": "LC09", "uuid": "u-2"})),
    ];
    let factory = MockFactory::new();
    let stage = download_stage(&factory, &data_dir, 2, RetryPolicy::no_retry());

    let results = stage.run_downloads(records).await;

    assert_eq!(results.len(), 4);
    assert!(results[0].is_success());
    assert_eq!(results[1].error().unwrap().kind(), ErrorKind::Routing);
    assert!(results[2].is_success());
    assert_eq!(results[3].error().unwrap().kind(), ErrorKind::Routing);
    assert_eq!(factory.downloads(), 2);
}

#[tokio::test]
async fn test_download_failures_are_contained_per_record() {
    let data_dir = TempDir::new().unwrap();
    let factory = MockFactory::new().gone("b").failing_downloads("c", 5);
    let stage = download_stage(&factory, &data_dir, 4, RetryPolicy::no_retry());

    let results = stage
        .run_downloads(vec![sentinel("a"), sentinel("b"), sentinel("c")])
        .await;

    assert!(results[0].is_success());
    assert_eq!(results[1].error().unwrap().kind(), ErrorKind::NotFound);
    assert_eq!(results[2].error().unwrap().kind(), ErrorKind::Download);
    assert_eq!(factory.downloads(), 3, "no retry by default");
}

#[tokio::test]
async fn test_download_retry_is_opt_in_and_skips_not_found() {
    let data_dir = TempDir::new().unwrap();
    let factory = MockFactory::new().gone("gone").failing_downloads("flaky", 1);
    let stage = download_stage(
        &factory,
        &data_dir,
        2,
        RetryPolicy::fixed(3, Duration::ZERO),
    );

    let results = stage
        .run_downloads(vec![landsat("flaky"), landsat("gone")])
        .await;

    assert!(results[0].is_success(), "{:?}", results[0].error());
    assert_eq!(results[1].error().unwrap().kind(), ErrorKind::NotFound);
    assert_eq!(factory.downloads(), 3, "flaky twice, gone once");
}

#[tokio::test]
async fn test_download_never_retries_rejected_session() {
    let data_dir = TempDir::new().unwrap();
    let factory = MockFactory::new().failing_auth("denied", 5);
    let stage = download_stage(
        &factory,
        &data_dir,
        2,
        RetryPolicy::fixed(3, Duration::ZERO),
    );

    let results = stage
        .run_downloads(vec![sentinel("denied"), sentinel("fine")])
        .await;

    assert_eq!(results[0].error().unwrap().kind(), ErrorKind::Authentication);
    assert!(results[1].is_success());
    assert_eq!(factory.downloads(), 2, "denied once, fine once");
}

#[tokio::test]
async fn test_panicking_worker_still_yields_a_result() {
    let data_dir = TempDir::new().unwrap();
    let factory = MockFactory::new().panicking("boom");
    let stage = download_stage(&factory, &data_dir, 2, RetryPolicy::no_retry());

    let results = stage
        .run_downloads(vec![sentinel("ok"), sentinel("boom"), sentinel("fine")])
        .await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_success());
    assert_eq!(results[1].error().unwrap().kind(), ErrorKind::Aborted);
    assert!(results[2].is_success());
}

#[tokio::test]
async fn test_missing_credentials_fail_each_record() {
    let data_dir = TempDir::new().unwrap();
    let factory = MockFactory::new().without_credentials(ProviderKind::EarthExplorer);
    let stage = download_stage(&factory, &data_dir, 2, RetryPolicy::fixed(3, Duration::ZERO));

    let results = stage
        .run_downloads(vec![landsat("a"), sentinel("b")])
        .await;

    assert_eq!(results[0].error().unwrap().kind(), ErrorKind::Configuration);
    assert!(results[1].is_success());
}

// ==================== Orchestrator ====================

#[tokio::test]
async fn test_workflow_two_product_types_downloads_union_in_type_order() {
    let data_dir = TempDir::new().unwrap();
    let factory = MockFactory::new()
        .with_records("S2MSI1C", vec![sentinel("s1"), sentinel("s2"), sentinel("s3")])
        .with_records("landsat_8_c1", vec![landsat("l1"), landsat("l2")]);
    let orchestrator = Orchestrator::new(&config(&data_dir), Arc::new(factory.clone())).unwrap();

    let report = orchestrator
        .run(bbox(), date("20210112"), date("20210114"))
        .await
        .unwrap();

    assert!(report.is_success(), "{}", report.summary());
    assert_eq!(report.downloads().len(), 5);
    let ids: Vec<_> = report
        .downloads()
        .iter()
        .map(|r| r.record().identifier().unwrap())
        .collect();
    assert_eq!(ids, vec!["s1", "s2", "s3", "l1", "l2"]);
    assert!(data_dir.path().join("sentinel/s1.bin").exists());
    assert!(data_dir.path().join("landsat/l2.bin").exists());

    let results = report.into_results();
    assert_eq!(results.len(), 5);
}

#[tokio::test]
async fn test_workflow_failed_query_does_not_block_siblings() {
    let data_dir = TempDir::new().unwrap();
    let factory = MockFactory::new()
        .with_records("S2MSI1C", vec![sentinel("s1")])
        .without_credentials(ProviderKind::EarthExplorer);
    let orchestrator = Orchestrator::new(&config(&data_dir), Arc::new(factory.clone())).unwrap();

    let report = orchestrator
        .run(bbox(), date("20210112"), date("20210114"))
        .await
        .unwrap();

    assert_eq!(report.downloads().len(), 1);
    assert_eq!(report.completed(), 1);
    assert_eq!(report.query_failures().len(), 1);
    assert_eq!(report.query_failures()[0].product_type, "landsat_8_c1");
    assert_eq!(report.query_failures()[0].kind(), ErrorKind::Configuration);
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_workflow_explicit_product_types() {
    let data_dir = TempDir::new().unwrap();
    let factory = MockFactory::new()
        .with_records("S2MSI2A", vec![sentinel("x")])
        .with_records("S2MSI1C", vec![sentinel("never")]);
    let orchestrator = Orchestrator::new(&config(&data_dir), Arc::new(factory.clone())).unwrap();

    let report = orchestrator
        .run_workflow(
            bbox(),
            date("20210112"),
            date("20210114"),
            &["S2MSI2A".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(report.downloads().len(), 1);
    assert_eq!(report.downloads()[0].record().identifier(), Some("x"));
}

#[tokio::test]
async fn test_workflow_rejects_inverted_dates_before_querying() {
    let data_dir = TempDir::new().unwrap();
    let factory = MockFactory::new();
    let orchestrator = Orchestrator::new(&config(&data_dir), Arc::new(factory.clone())).unwrap();

    let result = orchestrator
        .run(bbox(), date("20210114"), date("20210112"))
        .await;

    assert!(result.is_err());
    assert_eq!(factory.queries(), 0);
}

#[test]
fn test_orchestrator_rejects_invalid_config() {
    let data_dir = TempDir::new().unwrap();
    let bad = PipelineConfig {
        workers: 0,
        ..config(&data_dir)
    };
    assert!(Orchestrator::new(&bad, Arc::new(MockFactory::new())).is_err());
}
