//! Category and listing discovery
//!
//! The discoverer walks each seed category page, follows its subcategory
//! links and pages through every listing, pushing one item task per item
//! link. It owns its own session and runs beside the worker pool.
//!
//! A fetch failure abandons only the branch it happened on. Retries belong
//! to the fetcher.

use crate::crawler::extractor::Pagination;
use crate::crawler::frontier::Frontier;
use crate::crawler::session::{Session, SessionFactory};
use crate::model::Task;
use crate::url::{label_from_url, next_page_url};
use crate::HarvestError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builds the category label attached to item tasks
///
/// # Example
///
/// ```
/// use catalog_harvest::crawler::category_context;
///
/// assert_eq!(category_context("Devops", Some("CI/CD")), "Devops - CI/CD");
/// assert_eq!(category_context("Devops", None), "Devops");
/// ```
pub fn category_context(category: &str, subcategory: Option<&str>) -> String {
    match subcategory.map(str::trim).filter(|s| !s.is_empty()) {
        Some(sub) if !category.is_empty() => format!("{} - {}", category, sub),
        Some(sub) => sub.to_string(),
        None => category.to_string(),
    }
}

/// Counters for one discovery run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub categories: usize,
    pub subcategories: usize,
    pub listing_pages: usize,
    pub items: usize,
    pub abandoned_branches: usize,
}

pub struct Discoverer {
    pub seeds: Vec<String>,
    pub frontier: Frontier,
    pub factory: Arc<dyn SessionFactory>,
    pub slot: usize,
    pub stop: CancellationToken,
}

impl Discoverer {
    /// Walks every seed category
    ///
    /// # Returns
    ///
    /// * `Ok(DiscoveryStats)` - Walk finished (some branches may have been abandoned)
    /// * `Err(HarvestError)` - The session could not be opened
    pub async fn run(self) -> Result<DiscoveryStats, HarvestError> {
        let session = self.factory.open_session(self.slot)?;
        let mut stats = DiscoveryStats::default();

        for category_url in &self.seeds {
            if self.stop.is_cancelled() {
                tracing::info!("Discovery stopped early");
                break;
            }
            self.walk_category(&session, category_url, &mut stats).await;
        }

        tracing::info!(
            "Discovery finished: {} categories, {} subcategories, {} listing pages, {} items",
            stats.categories,
            stats.subcategories,
            stats.listing_pages,
            stats.items
        );
        Ok(stats)
    }

    async fn walk_category(&self, session: &Session, category_url: &str, stats: &mut DiscoveryStats) {
        let content = match session.fetcher.fetch(category_url, None).await {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("Abandoning category {}: {}", category_url, e);
                stats.abandoned_branches += 1;
                return;
            }
        };

        let page = session.extractor.extract_category(&content, category_url);
        let label = page
            .label
            .or_else(|| label_from_url(category_url))
            .unwrap_or_default();

        stats.categories += 1;
        tracing::info!(
            "Category '{}' has {} subcategories",
            label,
            page.subcategory_links.len()
        );

        for subcategory_url in &page.subcategory_links {
            if self.stop.is_cancelled() {
                return;
            }
            stats.subcategories += 1;
            self.walk_listings(session, category_url, subcategory_url, &label, stats)
                .await;
        }
    }

    /// Pages through one subcategory listing
    ///
    /// The pagination marker is read from the first page only. Without a
    /// marker the listing is a single page.
    async fn walk_listings(
        &self,
        session: &Session,
        category_url: &str,
        subcategory_url: &str,
        category_label: &str,
        stats: &mut DiscoveryStats,
    ) {
        let mut url = subcategory_url.to_string();
        let mut pagination: Option<Pagination> = None;
        let mut first_page = true;

        loop {
            let content = match session.fetcher.fetch(&url, Some(category_url)).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::error!("Abandoning listing {}: {}", url, e);
                    stats.abandoned_branches += 1;
                    return;
                }
            };

            let page = session.extractor.extract_listing(&content, &url);
            stats.listing_pages += 1;

            if first_page {
                pagination = page.pagination;
                first_page = false;

                if pagination.is_none() && page.item_links.is_empty() {
                    tracing::debug!("Listing {} is empty", url);
                    return;
                }
            }

            let context = category_context(category_label, page.label.as_deref());
            for link in page.item_links {
                if !self.frontier.push(Task::extract_item(link, context.clone())) {
                    tracing::warn!("Frontier closed, stopping listing {}", subcategory_url);
                    return;
                }
                stats.items += 1;
            }

            let Some(position) = pagination.as_mut() else {
                return;
            };
            if position.is_last() || self.stop.is_cancelled() {
                return;
            }

            url = match next_page_url(&url) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    tracing::warn!("No page after {}, stopping listing", url);
                    return;
                }
                Err(e) => {
                    tracing::error!("Abandoning listing {}: {}", url, e);
                    stats.abandoned_branches += 1;
                    return;
                }
            };
            position.current += 1;
        }
    }
}
