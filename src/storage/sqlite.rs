//! SQLite storage implementation
//!
//! This module provides the embedded single-file record sink.

use crate::model::Record;
use crate::storage::schema::initialize_sqlite_schema;
use crate::storage::traits::{StorageResult, StorageSink};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;

const UPSERT_SQL: &str = "
    INSERT INTO products
        (name, description, category, min_price, max_price, median_price, in_stock, stock_count)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(name, category) DO UPDATE SET
        description = excluded.description,
        min_price = excluded.min_price,
        max_price = excluded.max_price,
        median_price = excluded.median_price,
        in_stock = excluded.in_stock,
        stock_count = excluded.stock_count,
        scraped_at = CURRENT_TIMESTAMP
";

/// SQLite record sink
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Opens or creates a SQLite database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }
}

#[async_trait]
impl StorageSink for SqliteSink {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn ensure_schema(&mut self) -> StorageResult<()> {
        initialize_sqlite_schema(&self.conn)?;
        Ok(())
    }

    async fn upsert(&mut self, records: &[Record]) -> StorageResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
            for record in records {
                stmt.execute(params![
                    record.name,
                    record.description,
                    record.category,
                    record.min_price,
                    record.max_price,
                    record.median_price,
                    record.in_stock,
                    record.stock_count,
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }

    async fn count_records(&mut self) -> StorageResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        Ok(count)
    }

    async fn count_by_category(&mut self) -> StorageResult<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) AS n FROM products GROUP BY category ORDER BY n DESC, category",
        )?;

        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }
}
