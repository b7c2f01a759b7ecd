use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Catalog-Harvest
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawl: CrawlConfig,
    pub pipeline: PipelineConfig,
    pub writer: WriterConfig,
    pub fetcher: FetcherConfig,
    pub storage: StorageConfig,
    pub selectors: SelectorConfig,
}

/// How the category hierarchy is walked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMode {
    /// A dedicated discoverer unit walks categories and listing pages
    #[default]
    Dedicated,
    /// Seeds become discovery tasks that the worker pool walks
    Workers,
}

/// Seed URLs and discovery behaviour
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Category page URLs to start from
    pub seeds: Vec<String>,

    /// Which unit walks the category hierarchy
    pub discovery: DiscoveryMode,
}

/// Worker pool and supervisor tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of worker units
    pub workers: usize,

    /// Bounded wait on a frontier pop (milliseconds)
    #[serde(rename = "pop-timeout-ms")]
    pub pop_timeout_ms: u64,

    /// Supervisor liveness poll interval (milliseconds)
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Consecutive empty polls before the pipeline drains
    #[serde(rename = "quiescence-polls")]
    pub quiescence_polls: u32,

    /// Bounded wait for workers and writer to exit while draining (milliseconds)
    #[serde(rename = "shutdown-timeout-ms")]
    pub shutdown_timeout_ms: u64,

    /// Attempts after which a repeatedly failing task is abandoned (0 = never)
    #[serde(rename = "max-task-attempts")]
    pub max_task_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            pop_timeout_ms: 500,
            poll_interval_ms: 500,
            quiescence_polls: 3,
            shutdown_timeout_ms: 30_000,
            max_task_attempts: 5,
        }
    }
}

impl PipelineConfig {
    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Persistence sink batching
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Records buffered before a flush is forced
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Flush a non-empty buffer after this long without new records (milliseconds)
    #[serde(rename = "idle-flush-ms")]
    pub idle_flush_ms: u64,

    /// Extra attempts for a failed batch upsert
    #[serde(rename = "write-retries")]
    pub write_retries: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            idle_flush_ms: 500,
            write_retries: 3,
        }
    }
}

impl WriterConfig {
    pub fn idle_flush(&self) -> Duration {
        Duration::from_millis(self.idle_flush_ms)
    }
}

/// HTTP fetcher behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Extra attempts for retryable failures
    pub retries: u32,

    /// Base backoff between attempts, doubled each retry (milliseconds)
    #[serde(rename = "backoff-ms")]
    pub backoff_ms: u64,

    /// HTTP statuses worth retrying
    #[serde(rename = "retry-statuses")]
    pub retry_statuses: Vec<u16>,

    /// User agents handed out to sessions round-robin by slot
    #[serde(rename = "user-agents")]
    pub user_agents: Vec<String>,

    /// Referer sent when the caller has none
    pub referer: Option<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retries: 3,
            backoff_ms: 500,
            retry_statuses: vec![429, 500, 502, 503, 504],
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                    .to_string(),
            ],
            referer: None,
        }
    }
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Where records are persisted
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `postgres://...` for Postgres, otherwise a SQLite file path
    pub dsn: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn: crate::storage::DEFAULT_SQLITE_PATH.to_string(),
        }
    }
}

/// CSS selectors used by the page extractor
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Page heading: category label on category pages, subcategory label on
    /// listing pages, record name on item pages
    pub heading: String,

    /// Links from a category page to its subcategories
    #[serde(rename = "subcategory-link")]
    pub subcategory_link: String,

    /// Only keep subcategory links whose text contains this
    #[serde(rename = "subcategory-link-text")]
    pub subcategory_link_text: Option<String>,

    /// Links from a listing page to item pages
    #[serde(rename = "item-link")]
    pub item_link: String,

    /// Element holding the "Page N of M" marker
    pub pagination: String,

    /// Item description paragraphs
    pub description: String,

    /// Median price element
    #[serde(rename = "price-median")]
    pub price_median: String,

    /// Min/max price elements, in that order
    #[serde(rename = "price-range")]
    pub price_range: String,

    /// Availability text ("In stock (12 available)")
    pub availability: Option<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            heading: r#"h1[class*="rt-Heading"]"#.to_string(),
            subcategory_link: r#"div[class*="rt-BaseCard"] a[href]"#.to_string(),
            subcategory_link_text: Some("View more".to_string()),
            item_link: r#"a[class*="_cardLink_"][href]"#.to_string(),
            pagination: r#"div[class*="rt-r-ai-center"] span"#.to_string(),
            description: r#"div[class*="_read-more-box__content"] p[class*="rt-Text"]"#
                .to_string(),
            price_median: r#"div[class*="_rangeAverage_"]"#.to_string(),
            price_range: r#"div[class*="_rangeSlider_"] span"#.to_string(),
            availability: None,
        }
    }
}
