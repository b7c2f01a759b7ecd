//! Output module for reporting harvest results
//!
//! This module handles:
//! - Printing the summary of a finished run
//! - Reading record statistics back from storage

pub mod stats;
mod summary;

pub use stats::{format_statistics, load_statistics, print_statistics, StoreStatistics};
pub use summary::{format_run_summary, print_run_summary};
