//! Page extraction for category, listing and item pages
//!
//! This module turns fetched HTML into:
//! - Category labels and subcategory links
//! - Item links and pagination markers on listing pages
//! - Normalized records on item pages
//!
//! Extraction never fails. Missing elements produce partial or empty results.

use crate::config::SelectorConfig;
use crate::model::Record;
use crate::url::{parse_page_marker, resolve_link};
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Position within a paginated listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub current: u32,
    pub max: u32,
}

impl Pagination {
    pub fn is_last(&self) -> bool {
        self.current >= self.max
    }
}

/// What a category page links to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPage {
    /// Page heading, if present
    pub label: Option<String>,

    /// Absolute URLs of subcategory listing pages
    pub subcategory_links: Vec<String>,
}

/// What a listing page links to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Subcategory heading, if present
    pub label: Option<String>,

    /// Absolute URLs of item pages
    pub item_links: Vec<String>,

    /// Pagination marker, if present
    pub pagination: Option<Pagination>,
}

/// Capability for pulling structure out of fetched pages
///
/// Implementations must not panic or fail on malformed markup.
pub trait PageExtractor: Send + Sync {
    fn extract_category(&self, content: &str, page_url: &str) -> CategoryPage;

    fn extract_listing(&self, content: &str, page_url: &str) -> ListingPage;

    /// Returns `None` when the page has no usable record
    fn extract_item(&self, content: &str, page_url: &str, category_hint: &str) -> Option<Record>;
}

/// CSS-selector driven extractor built on `scraper`
#[derive(Debug, Clone)]
pub struct SelectorExtractor {
    heading: Selector,
    subcategory_link: Selector,
    subcategory_link_text: Option<String>,
    item_link: Selector,
    pagination: Selector,
    description: Selector,
    paragraph: Selector,
    price_median: Selector,
    price_range: Selector,
    availability: Option<Selector>,
}

fn compile(field: &'static str, selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|_| ConfigError::InvalidSelector {
        field,
        selector: selector.to_string(),
    })
}

impl SelectorExtractor {
    /// Compiles the configured selectors
    ///
    /// # Returns
    ///
    /// * `Ok(SelectorExtractor)` - All selectors compiled
    /// * `Err(ConfigError)` - A selector failed to parse
    pub fn new(config: &SelectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            heading: compile("heading", &config.heading)?,
            subcategory_link: compile("subcategory-link", &config.subcategory_link)?,
            subcategory_link_text: config.subcategory_link_text.clone(),
            item_link: compile("item-link", &config.item_link)?,
            pagination: compile("pagination", &config.pagination)?,
            description: compile("description", &config.description)?,
            paragraph: compile("paragraph", "p")?,
            price_median: compile("price-median", &config.price_median)?,
            price_range: compile("price-range", &config.price_range)?,
            availability: config
                .availability
                .as_deref()
                .map(|s| compile("availability", s))
                .transpose()?,
        })
    }

    fn heading_text(&self, document: &Html) -> Option<String> {
        first_text(document.select(&self.heading))
    }

    fn links(&self, document: &Html, selector: &Selector, base_url: Option<&Url>) -> Vec<String> {
        let Some(base_url) = base_url else {
            return Vec::new();
        };

        let mut links = Vec::new();
        for element in document.select(selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(absolute) = resolve_link(href, base_url) {
                    if !links.contains(&absolute) {
                        links.push(absolute);
                    }
                }
            }
        }
        links
    }

    fn description(&self, document: &Html) -> String {
        if let Some(text) = first_text(document.select(&self.description)) {
            return text;
        }

        // Fall back to paragraphs in the block around the heading
        document
            .select(&self.heading)
            .next()
            .and_then(|heading| heading.parent())
            .and_then(|parent| parent.parent())
            .and_then(ElementRef::wrap)
            .and_then(|block| first_text(block.select(&self.paragraph)))
            .unwrap_or_default()
    }

    fn prices(&self, document: &Html) -> (Option<i64>, Option<i64>, Option<i64>) {
        let median = document
            .select(&self.price_median)
            .next()
            .and_then(|el| parse_number(&element_text(&el)));

        let bounds: Vec<Option<i64>> = document
            .select(&self.price_range)
            .map(|el| parse_number(&element_text(&el)))
            .take(2)
            .collect();

        match bounds.as_slice() {
            [min, max] => (*min, *max, median),
            _ => (None, None, median),
        }
    }

    fn availability(&self, document: &Html) -> (Option<bool>, Option<i64>) {
        let Some(selector) = &self.availability else {
            return (None, None);
        };

        match first_text(document.select(selector)) {
            Some(text) => {
                let in_stock = text.to_lowercase().contains("in stock");
                (Some(in_stock), parse_number(&text))
            }
            None => (None, None),
        }
    }
}

impl PageExtractor for SelectorExtractor {
    fn extract_category(&self, content: &str, page_url: &str) -> CategoryPage {
        let document = Html::parse_document(content);
        let base_url = Url::parse(page_url).ok();

        let mut subcategory_links = Vec::new();
        if let Some(base_url) = &base_url {
            for element in document.select(&self.subcategory_link) {
                if let Some(filter) = &self.subcategory_link_text {
                    if !element_text(&element).contains(filter.as_str()) {
                        continue;
                    }
                }
                if let Some(href) = element.value().attr("href") {
                    if let Some(absolute) = resolve_link(href, base_url) {
                        if !subcategory_links.contains(&absolute) {
                            subcategory_links.push(absolute);
                        }
                    }
                }
            }
        }

        CategoryPage {
            label: self.heading_text(&document),
            subcategory_links,
        }
    }

    fn extract_listing(&self, content: &str, page_url: &str) -> ListingPage {
        let document = Html::parse_document(content);
        let base_url = Url::parse(page_url).ok();

        let pagination = document
            .select(&self.pagination)
            .map(|el| element_text(&el))
            .filter(|text| text.contains("Page") && text.contains("of"))
            .find_map(|text| parse_page_marker(&text))
            .map(|(current, max)| Pagination { current, max });

        ListingPage {
            label: self.heading_text(&document),
            item_links: self.links(&document, &self.item_link, base_url.as_ref()),
            pagination,
        }
    }

    fn extract_item(&self, content: &str, page_url: &str, category_hint: &str) -> Option<Record> {
        let document = Html::parse_document(content);

        let Some(name) = self.heading_text(&document) else {
            tracing::debug!("No name parsed for {}; skipping", page_url);
            return None;
        };

        let (min_price, max_price, median_price) = self.prices(&document);
        let (in_stock, stock_count) = self.availability(&document);

        Some(Record {
            name,
            category: category_hint.trim().to_string(),
            description: self.description(&document),
            min_price,
            max_price,
            median_price,
            in_stock,
            stock_count,
        })
    }
}

/// Whitespace-collapsed text content of an element
fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First non-empty text among the given elements
fn first_text<'a>(elements: impl Iterator<Item = ElementRef<'a>>) -> Option<String> {
    elements
        .map(|el| element_text(&el))
        .find(|text| !text.is_empty())
}

/// Parses the integer part of the first number in a price-like string
///
/// Thousands separators are dropped, so `"$12,500.75 / yr"` gives `12500`.
pub fn parse_number(text: &str) -> Option<i64> {
    let cleaned = text.replace(',', "");
    let digits: String = cleaned
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}
