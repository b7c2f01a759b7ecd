//! HTTP fetcher behaviour against a mock server

use catalog_harvest::config::FetcherConfig;
use catalog_harvest::crawler::{Fetcher, HttpFetcher};
use catalog_harvest::FetchError;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher_config(retries: u32) -> FetcherConfig {
    FetcherConfig {
        timeout_secs: 1,
        retries,
        backoff_ms: 10,
        retry_statuses: vec![429, 500, 502, 503, 504],
        user_agents: vec!["AgentA/1.0".to_string(), "AgentB/1.0".to_string()],
        referer: None,
    }
}

#[tokio::test]
async fn test_fetch_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&fetcher_config(2), 0).unwrap();
    let body = fetcher
        .fetch(&format!("{}/page", server.uri()), None)
        .await
        .unwrap();
    assert_eq!(body, "<html>ok</html>");
}

#[tokio::test]
async fn test_retryable_status_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&fetcher_config(2), 0).unwrap();
    let body = fetcher
        .fetch(&format!("{}/flaky", server.uri()), None)
        .await
        .unwrap();

    assert_eq!(body, "recovered");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_not_found_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/gone", server.uri());
    let fetcher = HttpFetcher::new(&fetcher_config(3), 0).unwrap();
    let result = fetcher.fetch(&url, None).await;

    assert_eq!(
        result,
        Err(FetchError::Status {
            url,
            status: 404,
            attempts: 1
        })
    );
}

#[tokio::test]
async fn test_retries_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&fetcher_config(2), 0).unwrap();
    let result = fetcher
        .fetch(&format!("{}/broken", server.uri()), None)
        .await;

    assert!(matches!(
        result,
        Err(FetchError::Status {
            status: 500,
            attempts: 3,
            ..
        })
    ));
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&fetcher_config(0), 0).unwrap();
    let result = fetcher
        .fetch(&format!("{}/slow", server.uri()), None)
        .await;

    assert!(matches!(result, Err(FetchError::Timeout { attempts: 1, .. })));
}

#[tokio::test]
async fn test_referer_and_user_agent_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listing"))
        .and(header("referer", "https://origin.test/categories"))
        .and(header("user-agent", "AgentB/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("matched"))
        .mount(&server)
        .await;

    // Slot 1 picks the second user agent
    let fetcher = HttpFetcher::new(&fetcher_config(0), 1).unwrap();
    let body = fetcher
        .fetch(
            &format!("{}/listing", server.uri()),
            Some("https://origin.test/categories"),
        )
        .await
        .unwrap();
    assert_eq!(body, "matched");
}

#[tokio::test]
async fn test_default_referer_used_when_none_given() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("referer", "https://www.google.com/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("matched"))
        .mount(&server)
        .await;

    let mut config = fetcher_config(0);
    config.referer = Some("https://www.google.com/".to_string());
    let fetcher = HttpFetcher::new(&config, 0).unwrap();

    let body = fetcher.fetch(&format!("{}/", server.uri()), None).await.unwrap();
    assert_eq!(body, "matched");
}
