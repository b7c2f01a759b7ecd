//! Database schema definitions
//!
//! Both backends store one row per (name, category). The unique constraint
//! is what upserts resolve conflicts on.

/// Name of the records table
pub const RECORDS_TABLE: &str = "products";

/// SQLite schema
pub const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    category TEXT NOT NULL,
    min_price INTEGER,
    max_price INTEGER,
    median_price INTEGER,
    in_stock INTEGER,
    stock_count INTEGER,
    scraped_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(name, category)
);

CREATE INDEX IF NOT EXISTS idx_products_category ON products(category);
"#;

/// Postgres schema, one statement per entry
pub const POSTGRES_SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS products (
    id SERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    category TEXT NOT NULL,
    min_price BIGINT,
    max_price BIGINT,
    median_price BIGINT,
    in_stock BOOLEAN,
    stock_count BIGINT,
    scraped_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (name, category)
)"#,
    "CREATE INDEX IF NOT EXISTS idx_products_category ON products (category)",
];

/// Initializes the SQLite schema
///
/// Safe to call on every start; existing tables are left alone.
pub fn initialize_sqlite_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SQLITE_SCHEMA)
}
