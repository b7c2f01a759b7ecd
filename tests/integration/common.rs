use catalog_harvest::config::{Config, DiscoveryMode};
use std::path::Path;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Matches requests without a query string
pub struct NoQuery;

impl Match for NoQuery {
    fn matches(&self, request: &Request) -> bool {
        request.url.query().is_none()
    }
}

pub fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

pub fn category_page(heading: &str, subcategory_links: &[&str]) -> String {
    let cards: String = subcategory_links
        .iter()
        .map(|href| {
            format!(
                r#"<div class="rt-BaseCard rt-Card"><a href="{}"><span>View more</span></a></div>"#,
                href
            )
        })
        .collect();
    format!(
        r#"<html><body><h1 class="rt-Heading rt-r-size-8">{}</h1>{}</body></html>"#,
        heading, cards
    )
}

pub fn listing_page(heading: &str, item_links: &[String], current: u32, max: u32) -> String {
    let cards: String = item_links
        .iter()
        .map(|href| format!(r#"<a class="_card_1u7u9_1 _cardLink_1q928_1" href="{}">item</a>"#, href))
        .collect();
    format!(
        r#"<html><body><h1 class="rt-Heading">{}</h1>{}
        <div class="rt-Flex rt-r-ai-center"><span>Page {} of {}</span></div>
        </body></html>"#,
        heading, cards, current, max
    )
}

pub fn item_page(name: &str, median: i64) -> String {
    format!(
        r#"<html><body>
        <h1 class="rt-Heading">{}</h1>
        <div class="_read-more-box__content_122o3_1"><p class="rt-Text">About {}.</p></div>
        <div class="_rangeAverage_118fo_42">${}</div>
        <div class="_rangeSlider_118fo_13"><span>${}</span><span>${}</span></div>
        </body></html>"#,
        name,
        name,
        median,
        median / 2,
        median * 2
    )
}

/// Mounts a catalog of 1 category, 1 subcategory, 2 listing pages of 3 items
///
/// Returns the category URL.
pub async fn mount_catalog(server: &MockServer) -> String {
    Mock::given(method("GET"))
        .and(path("/categories/devops"))
        .respond_with(html(category_page("DevOps", &["/categories/devops/ci"])))
        .mount(server)
        .await;

    let first: Vec<String> = (1..=3).map(|n| format!("/products/tool-{}", n)).collect();
    let second: Vec<String> = (4..=6).map(|n| format!("/products/tool-{}", n)).collect();

    Mock::given(method("GET"))
        .and(path("/categories/devops/ci"))
        .and(NoQuery)
        .respond_with(html(listing_page("CI/CD", &first, 1, 2)))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/categories/devops/ci"))
        .and(query_param("page", "2"))
        .respond_with(html(listing_page("CI/CD", &second, 2, 2)))
        .mount(server)
        .await;

    for n in 1..=6 {
        Mock::given(method("GET"))
            .and(path(format!("/products/tool-{}", n)))
            .respond_with(html(item_page(&format!("Tool {}", n), 1000 * n)))
            .mount(server)
            .await;
    }

    format!("{}/categories/devops", server.uri())
}

pub fn pipeline_config(discovery: DiscoveryMode, db_path: &Path, seeds: Vec<String>) -> Config {
    let mut config = Config::default();
    config.crawl.seeds = seeds;
    config.crawl.discovery = discovery;
    config.pipeline.workers = 2;
    config.pipeline.pop_timeout_ms = 20;
    config.pipeline.poll_interval_ms = 20;
    config.pipeline.quiescence_polls = 3;
    config.pipeline.shutdown_timeout_ms = 5_000;
    config.writer.batch_size = 10;
    config.writer.idle_flush_ms = 500;
    config.fetcher.retries = 1;
    config.fetcher.backoff_ms = 10;
    config.storage.dsn = db_path.to_str().unwrap_or_default().to_string();
    config
}
