//! In-memory doubles for pipeline tests

use crate::config::SelectorConfig;
use crate::crawler::extractor::SelectorExtractor;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::session::{Session, SessionFactory};
use crate::model::{Record, RecordKey};
use crate::storage::{StorageError, StorageResult, StorageSink};
use crate::{FetchError, FetchResult, HarvestError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct Site {
    pages: HashMap<String, String>,
    failures: HashMap<String, usize>,
    panics: HashMap<String, usize>,
    requests: HashMap<String, usize>,
    delay: Option<Duration>,
}

enum Planned {
    Page(String),
    Fail,
    Panic,
    Missing,
}

/// Serves fixed HTML by URL; clones share pages and request counts
#[derive(Clone, Default)]
pub struct StaticFetcher {
    site: Arc<Mutex<Site>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_site(self, f: impl FnOnce(&mut Site)) -> Self {
        f(&mut self.site.lock().unwrap_or_else(PoisonError::into_inner));
        self
    }

    pub fn page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        let (url, html) = (url.into(), html.into());
        self.with_site(|site| {
            site.pages.insert(url, html);
        })
    }

    /// The first `times` fetches of `url` fail with a 503
    pub fn fail_times(self, url: impl Into<String>, times: usize) -> Self {
        let url = url.into();
        self.with_site(|site| {
            site.failures.insert(url, times);
        })
    }

    /// The first `times` fetches of `url` panic
    pub fn panic_times(self, url: impl Into<String>, times: usize) -> Self {
        let url = url.into();
        self.with_site(|site| {
            site.panics.insert(url, times);
        })
    }

    /// Every fetch sleeps this long first
    pub fn delay(self, delay: Duration) -> Self {
        self.with_site(|site| site.delay = Some(delay))
    }

    pub fn requests(&self, url: &str) -> usize {
        let site = self.site.lock().unwrap_or_else(PoisonError::into_inner);
        site.requests.get(url).copied().unwrap_or(0)
    }

    fn plan(&self, url: &str) -> (Planned, Option<Duration>) {
        let mut site = self.site.lock().unwrap_or_else(PoisonError::into_inner);
        *site.requests.entry(url.to_string()).or_default() += 1;

        let planned = if take_one(&mut site.panics, url) {
            Planned::Panic
        } else if take_one(&mut site.failures, url) {
            Planned::Fail
        } else if let Some(html) = site.pages.get(url) {
            Planned::Page(html.clone())
        } else {
            Planned::Missing
        };
        (planned, site.delay)
    }
}

fn take_one(counts: &mut HashMap<String, usize>, url: &str) -> bool {
    match counts.get_mut(url) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str, _referer: Option<&str>) -> FetchResult<String> {
        let (planned, delay) = self.plan(url);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match planned {
            Planned::Page(html) => Ok(html),
            Planned::Fail => Err(FetchError::Status {
                url: url.to_string(),
                status: 503,
                attempts: 1,
            }),
            Planned::Panic => panic!("injected panic fetching {}", url),
            Planned::Missing => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
                attempts: 1,
            }),
        }
    }
}

/// Sessions over a shared [`StaticFetcher`] and the default selectors
pub struct StaticSessionFactory {
    fetcher: StaticFetcher,
    failing_opens: AtomicUsize,
    opened: AtomicUsize,
}

impl StaticSessionFactory {
    pub fn new(fetcher: StaticFetcher) -> Self {
        Self {
            fetcher,
            failing_opens: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
        }
    }

    /// The next `times` session opens fail
    pub fn failing_opens(self, times: usize) -> Self {
        self.failing_opens.store(times, Ordering::SeqCst);
        self
    }

    /// Sessions opened so far, including failed attempts
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl SessionFactory for StaticSessionFactory {
    fn open_session(&self, slot: usize) -> Result<Session, HarvestError> {
        self.opened.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(HarvestError::Session {
                slot,
                message: "injected open failure".to_string(),
            });
        }

        let extractor = SelectorExtractor::new(&SelectorConfig::default())?;
        Ok(Session::new(Box::new(self.fetcher.clone()), Box::new(extractor)))
    }
}

/// Records every upserted batch and keeps the latest row per key
#[derive(Clone, Default)]
pub struct MemorySink {
    pub batches: Arc<Mutex<Vec<Vec<Record>>>>,
    pub rows: Arc<Mutex<HashMap<RecordKey, Record>>>,
    failing_upserts: Arc<AtomicUsize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` upserts fail
    pub fn failing_upserts(self, times: usize) -> Self {
        self.failing_upserts.store(times, Ordering::SeqCst);
        self
    }

    pub fn batches(&self) -> Vec<Vec<Record>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn row(&self, name: &str, category: &str) -> Option<Record> {
        let key = RecordKey {
            name: name.to_string(),
            category: category.to_string(),
        };
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl StorageSink for MemorySink {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ensure_schema(&mut self) -> StorageResult<()> {
        Ok(())
    }

    async fn upsert(&mut self, records: &[Record]) -> StorageResult<usize> {
        let failing = self
            .failing_upserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StorageError::Database("injected upsert failure".to_string()));
        }

        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(records.to_vec());

        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            rows.insert(self.unique_key(record), record.clone());
        }
        Ok(records.len())
    }

    async fn count_records(&mut self) -> StorageResult<i64> {
        Ok(self.row_count() as i64)
    }

    async fn count_by_category(&mut self) -> StorageResult<Vec<(String, i64)>> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let mut counts: HashMap<String, i64> = HashMap::new();
        for key in rows.keys() {
            *counts.entry(key.category.clone()).or_default() += 1;
        }
        let mut counts: Vec<(String, i64)> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }
}

/// Category page matching the default selectors
pub fn category_page(heading: &str, subcategory_links: &[&str]) -> String {
    let cards: String = subcategory_links
        .iter()
        .map(|href| {
            format!(
                r#"<div class="rt-BaseCard"><a href="{}"><span>View more</span></a></div>"#,
                href
            )
        })
        .collect();
    format!(
        r#"<html><body><h1 class="rt-Heading">{}</h1>{}</body></html>"#,
        heading, cards
    )
}

/// Listing page matching the default selectors
pub fn listing_page(heading: &str, item_links: &[&str], pagination: Option<(u32, u32)>) -> String {
    let cards: String = item_links
        .iter()
        .map(|href| format!(r#"<a class="_cardLink_x1" href="{}">item</a>"#, href))
        .collect();
    let marker = pagination
        .map(|(current, max)| {
            format!(
                r#"<div class="rt-r-ai-center"><span>Page {} of {}</span></div>"#,
                current, max
            )
        })
        .unwrap_or_default();
    format!(
        r#"<html><body><h1 class="rt-Heading">{}</h1>{}{}</body></html>"#,
        heading, cards, marker
    )
}

/// Item page matching the default selectors
pub fn item_page(name: &str, description: &str, median_price: i64) -> String {
    format!(
        r#"<html><body>
        <h1 class="rt-Heading">{}</h1>
        <div class="_read-more-box__content_a"><p class="rt-Text">{}</p></div>
        <div class="_rangeAverage_a">${}</div>
        </body></html>"#,
        name, description, median_price
    )
}
