//! Storage traits and error types
//!
//! This module defines the capability interface for record sinks and the
//! associated error types.

use crate::model::{Record, RecordKey};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Postgres error: {0}")]
    Postgres(#[from] sqlx::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Backend that persists records keyed by (name, category)
///
/// A sink is owned by a single writer unit, so methods take `&mut self` and
/// implementations only need to be `Send`.
#[async_trait]
pub trait StorageSink: Send {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Creates the records table if it does not exist
    async fn ensure_schema(&mut self) -> StorageResult<()>;

    /// Inserts new rows and overwrites existing ones by unique key
    ///
    /// Non-key fields of an existing row are replaced and its `scraped_at`
    /// timestamp refreshed. The batch must not contain two records with the
    /// same key.
    ///
    /// # Returns
    ///
    /// The number of records written
    async fn upsert(&mut self, records: &[Record]) -> StorageResult<usize>;

    /// The key rows are deduplicated and conflict-resolved on
    fn unique_key(&self, record: &Record) -> RecordKey {
        record.key()
    }

    /// Total number of stored rows
    async fn count_records(&mut self) -> StorageResult<i64>;

    /// Stored rows per category, largest first
    async fn count_by_category(&mut self) -> StorageResult<Vec<(String, i64)>>;
}
