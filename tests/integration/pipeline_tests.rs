//! End-to-end pipeline runs against a mock catalog

use crate::common::{html, item_page, mount_catalog, pipeline_config};
use catalog_harvest::config::DiscoveryMode;
use catalog_harvest::crawler::{harvest, HttpSessionFactory};
use catalog_harvest::storage::{SqliteSink, StorageSink};
use catalog_harvest::{PipelineState, Supervisor};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn stored_rows(db_path: &std::path::Path) -> (i64, Vec<(String, i64)>) {
    let mut sink = SqliteSink::new(db_path).unwrap();
    sink.ensure_schema().await.unwrap();
    (
        sink.count_records().await.unwrap(),
        sink.count_by_category().await.unwrap(),
    )
}

#[tokio::test]
async fn test_end_to_end_single_idle_flush() {
    let server = MockServer::start().await;
    let category = mount_catalog(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");
    let mut config = pipeline_config(DiscoveryMode::Dedicated, &db_path, vec![category.clone()]);
    // Idle flush fires well inside the quiescence window
    config.writer.idle_flush_ms = 100;
    config.pipeline.poll_interval_ms = 50;
    config.pipeline.quiescence_polls = 6;

    let factory = Arc::new(HttpSessionFactory::new(config.clone()));
    let sink = SqliteSink::new(&db_path).unwrap();
    let mut supervisor = Supervisor::new(config, factory, Box::new(sink));
    supervisor.start(vec![category]).unwrap();

    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if supervisor.poll().await.unwrap() != PipelineState::Running {
            break;
        }
    }
    assert_eq!(supervisor.state(), PipelineState::Draining);

    // Everything is already stored before the final flush on stop
    let (total, by_category) = stored_rows(&db_path).await;
    assert_eq!(total, 6);
    assert_eq!(by_category, vec![("DevOps - CI/CD".to_string(), 6)]);

    let summary = supervisor.drain().await.unwrap();
    assert_eq!(summary.records_written, 6);
    assert_eq!(summary.flushes, 1);
    assert_eq!(summary.requeues, 0);
    assert_eq!(summary.abandoned_tasks, 0);

    let discovery = summary.discovery.unwrap();
    assert_eq!(discovery.subcategories, 1);
    assert_eq!(discovery.listing_pages, 2);
    assert_eq!(discovery.items, 6);
}

#[tokio::test]
async fn test_rerun_refreshes_instead_of_duplicating() {
    let server = MockServer::start().await;
    let category = mount_catalog(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");
    let config = pipeline_config(DiscoveryMode::Dedicated, &db_path, vec![category]);

    harvest(config.clone(), CancellationToken::new()).await.unwrap();
    harvest(config, CancellationToken::new()).await.unwrap();

    let (total, _) = stored_rows(&db_path).await;
    assert_eq!(total, 6);
}

#[tokio::test]
async fn test_worker_discovery_end_to_end() {
    let server = MockServer::start().await;
    let category = mount_catalog(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");
    let config = pipeline_config(DiscoveryMode::Workers, &db_path, vec![category]);

    let summary = harvest(config, CancellationToken::new()).await.unwrap();
    assert_eq!(summary.records_written, 6);
    assert!(summary.discovery.is_none());

    let (total, by_category) = stored_rows(&db_path).await;
    assert_eq!(total, 6);
    assert_eq!(by_category[0].0, "DevOps - CI/CD");
}

#[tokio::test]
async fn test_transient_item_failure_recovered() {
    let server = MockServer::start().await;

    // Fails once more than the fetcher retries, so the worker reports it
    Mock::given(method("GET"))
        .and(path("/products/tool-3"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products/tool-3"))
        .respond_with(html(item_page("Tool 3", 3000)))
        .mount(&server)
        .await;
    let category = mount_catalog(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");
    let config = pipeline_config(DiscoveryMode::Dedicated, &db_path, vec![category]);

    let summary = harvest(config, CancellationToken::new()).await.unwrap();
    assert_eq!(summary.requeues, 1);
    assert_eq!(summary.restarts, 1);
    assert_eq!(summary.records_written, 6);

    let (total, _) = stored_rows(&db_path).await;
    assert_eq!(total, 6);
}

#[tokio::test]
async fn test_unreachable_seed_finishes_empty() {
    let server = MockServer::start().await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");
    let config = pipeline_config(
        DiscoveryMode::Dedicated,
        &db_path,
        vec![format!("{}/categories/missing", server.uri())],
    );

    let summary = harvest(config, CancellationToken::new()).await.unwrap();
    assert_eq!(summary.records_written, 0);
    assert_eq!(summary.discovery.unwrap().abandoned_branches, 1);
}
