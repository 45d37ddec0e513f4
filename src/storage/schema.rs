//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Price-Sync database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Catalog products (core record)
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    visibility TEXT NOT NULL DEFAULT 'visible',
    regular_price REAL,
    sale_price REAL,
    price REAL
);

-- Sync settings and results stored against each product
CREATE TABLE IF NOT EXISTS product_meta (
    product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    meta_key TEXT NOT NULL,
    meta_value TEXT NOT NULL,
    PRIMARY KEY (product_id, meta_key)
);

CREATE INDEX IF NOT EXISTS idx_product_meta_key ON product_meta(meta_key, meta_value);

-- One row per sync attempt
CREATE TABLE IF NOT EXISTS sync_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL,
    sync_time TEXT NOT NULL,
    status TEXT NOT NULL,
    message TEXT NOT NULL,
    old_price REAL NOT NULL DEFAULT 0,
    new_price REAL NOT NULL DEFAULT 0,
    old_sale_price REAL NOT NULL DEFAULT 0,
    new_sale_price REAL NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_sync_log_product ON sync_log(product_id);
CREATE INDEX IF NOT EXISTS idx_sync_log_time ON sync_log(sync_time);

-- Cross-invocation state with expiry (lock, batch queue, status, abort flag)
CREATE TABLE IF NOT EXISTS state_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    holder TEXT,
    updated_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_state_entries_expires ON state_entries(expires_at);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
