//! Storage module for persisting extracted records
//!
//! This module handles all database operations for the pipeline, including:
//! - Schema creation for SQLite and Postgres
//! - Batched upserts keyed by (name, category)
//! - Backend selection from a DSN
//! - Read-back counts for statistics

mod postgres;
mod schema;
mod sqlite;
mod traits;

pub use postgres::PostgresSink;
pub use schema::{initialize_sqlite_schema, RECORDS_TABLE};
pub use sqlite::SqliteSink;
pub use traits::{StorageError, StorageResult, StorageSink};

use crate::config::StorageConfig;
use std::path::{Path, PathBuf};

/// SQLite database used when no usable path is configured
pub const DEFAULT_SQLITE_PATH: &str = "db/catalog.db";

/// Returns true if the DSN names a Postgres server
pub fn is_postgres_dsn(dsn: &str) -> bool {
    dsn.starts_with("postgres://") || dsn.starts_with("postgresql://")
}

/// Resolves the SQLite file to open for a configured path
///
/// An empty path, or one whose parent directory does not exist, falls back
/// to [`DEFAULT_SQLITE_PATH`]. The default directory is created if needed.
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path to open
/// * `Err(StorageError)` - The default directory could not be created
pub fn resolve_sqlite_path(configured: &str) -> StorageResult<PathBuf> {
    let configured = configured.trim();

    if !configured.is_empty() {
        let path = Path::new(configured);
        let parent_exists = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.is_dir(),
            _ => true,
        };
        if parent_exists {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(
            "Directory for {} does not exist, using {}",
            configured,
            DEFAULT_SQLITE_PATH
        );
    }

    let fallback = PathBuf::from(DEFAULT_SQLITE_PATH);
    if let Some(parent) = fallback.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(fallback)
}

/// Opens the sink named by the storage configuration
///
/// # Arguments
///
/// * `config` - Storage configuration holding the DSN
///
/// # Returns
///
/// * `Ok(Box<dyn StorageSink>)` - Connected sink, schema not yet ensured
/// * `Err(StorageError)` - Failed to open or connect
pub async fn open_sink(config: &StorageConfig) -> StorageResult<Box<dyn StorageSink>> {
    if is_postgres_dsn(&config.dsn) {
        tracing::info!("Using Postgres storage");
        let sink = PostgresSink::connect(&config.dsn).await?;
        return Ok(Box::new(sink));
    }

    let path = resolve_sqlite_path(&config.dsn)?;
    tracing::info!("Using SQLite storage at {}", path.display());
    Ok(Box::new(SqliteSink::new(&path)?))
}
