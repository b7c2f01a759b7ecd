//! URL handling module for Catalog-Harvest
//!
//! This module provides link resolution, listing pagination and category
//! label fallbacks.

mod pagination;
mod resolve;

// Re-export main functions
pub use pagination::{next_page_url, parse_page_marker, PAGE_PARAM};
pub use resolve::{label_from_url, resolve_link};
