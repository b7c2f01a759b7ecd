//! Statistics read back from the record store
//!
//! This module provides functionality for extracting and displaying
//! stored record counts for the `--stats` mode.

use crate::storage::{StorageResult, StorageSink};

/// Stored record counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatistics {
    /// Storage backend the counts came from
    pub backend: &'static str,

    /// Total number of stored rows
    pub total_records: i64,

    /// Rows per category, largest first
    pub by_category: Vec<(String, i64)>,
}

/// Loads statistics from a sink
///
/// # Arguments
///
/// * `sink` - The storage backend to query
///
/// # Returns
///
/// * `Ok(StoreStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub async fn load_statistics(sink: &mut dyn StorageSink) -> StorageResult<StoreStatistics> {
    sink.ensure_schema().await?;

    Ok(StoreStatistics {
        backend: sink.backend(),
        total_records: sink.count_records().await?,
        by_category: sink.count_by_category().await?,
    })
}

/// Renders statistics as the text printed by `--stats`
pub fn format_statistics(stats: &StoreStatistics) -> String {
    let mut out = String::new();
    out.push_str("=== Record Statistics ===\n\n");
    out.push_str(&format!("Backend: {}\n", stats.backend));
    out.push_str(&format!("Total records: {}\n", stats.total_records));

    if !stats.by_category.is_empty() {
        out.push_str("\nRecords by Category:\n");
        for (category, count) in &stats.by_category {
            let percentage = if stats.total_records > 0 {
                (*count as f64 / stats.total_records as f64) * 100.0
            } else {
                0.0
            };
            out.push_str(&format!("  {}: {} ({:.1}%)\n", category, count, percentage));
        }
    }

    out
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &StoreStatistics) {
    print!("{}", format_statistics(stats));
}
