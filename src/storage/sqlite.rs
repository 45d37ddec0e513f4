//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::state::Visibility;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ProductStore, StateStore, StorageError, StorageResult, SyncLog};
use crate::storage::{
    meta_bool, EligibilityFilter, MetaKey, Product, ProductImport, StateClaim, SyncLogEntry,
    SyncStatus,
};
use crate::SyncError;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(SyncError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, SyncError> {
        let conn = Connection::open(path)?;

        // Several processes may trigger runs against the same file
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn load_meta(&self, id: i64) -> StorageResult<HashMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT meta_key, meta_value FROM product_meta WHERE product_id = ?1")?;

        let meta = stmt
            .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<HashMap<String, String>, _>>()?;

        Ok(meta)
    }

    fn load_products(&self, ids: Vec<i64>) -> StorageResult<Vec<Product>> {
        let mut products = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(product) = self.get_product(id)? {
                products.push(product);
            }
        }
        Ok(products)
    }

    fn ensure_product(&self, id: i64) -> StorageResult<()> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM products WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(StorageError::ProductNotFound(id))
        }
    }
}

fn parse_time(value: Option<&String>) -> Option<DateTime<Utc>> {
    value
        .filter(|s| !s.is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_price(value: Option<&String>) -> Option<f64> {
    value.and_then(|s| s.trim().parse::<f64>().ok())
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn row_to_log_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncLogEntry> {
    let time: String = row.get(1)?;
    let status: String = row.get(2)?;
    Ok(SyncLogEntry {
        product_id: row.get(0)?,
        time: DateTime::parse_from_rfc3339(&time)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default(),
        status: SyncStatus::from_db_string(&status).unwrap_or(SyncStatus::Error),
        message: row.get(3)?,
        old_price: row.get(4)?,
        new_price: row.get(5)?,
        old_sale_price: row.get(6)?,
        new_sale_price: row.get(7)?,
    })
}

const LOG_COLUMNS: &str = "product_id, sync_time, status, message, old_price, new_price, old_sale_price, new_sale_price";

impl ProductStore for SqliteStorage {
    fn get_product(&self, id: i64) -> StorageResult<Option<Product>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, visibility, regular_price, sale_price, price FROM products WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                        row.get::<_, Option<f64>>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, name, visibility, regular_price, sale_price, price)) = row else {
            return Ok(None);
        };

        let meta = self.load_meta(id)?;
        let flag = |key: MetaKey| meta.get(key.as_str()).map(|v| v == "yes").unwrap_or(false);

        Ok(Some(Product {
            id,
            name,
            visibility: Visibility::from_db_string(&visibility).unwrap_or_default(),
            sync_enabled: flag(MetaKey::SyncEnabled),
            source_url: meta
                .get(MetaKey::SourceUrl.as_str())
                .cloned()
                .unwrap_or_default(),
            add_tax: flag(MetaKey::AddTax),
            add_margin: flag(MetaKey::AddMargin),
            margin_percent: parse_price(meta.get(MetaKey::MarginPercent.as_str())).unwrap_or(10.0),
            error_count: meta
                .get(MetaKey::ErrorCount.as_str())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            last_status: meta
                .get(MetaKey::LastStatus.as_str())
                .cloned()
                .unwrap_or_default(),
            last_sync_time: parse_time(meta.get(MetaKey::LastSyncTime.as_str())),
            error_since: parse_time(meta.get(MetaKey::ErrorSince.as_str())),
            regular_price,
            sale_price,
            price,
            regular_price_inc_tax: parse_price(meta.get(MetaKey::RegularPriceIncTax.as_str())),
            sale_price_inc_tax: parse_price(meta.get(MetaKey::SalePriceIncTax.as_str())),
        }))
    }

    fn get_meta(&self, id: i64, key: MetaKey) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT meta_value FROM product_meta WHERE product_id = ?1 AND meta_key = ?2",
                params![id, key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_meta(&mut self, id: i64, key: MetaKey, value: &str) -> StorageResult<()> {
        self.ensure_product(id)?;
        self.conn.execute(
            "INSERT INTO product_meta (product_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
             ON CONFLICT(product_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
            params![id, key.as_str(), value],
        )?;
        Ok(())
    }

    fn delete_meta(&mut self, id: i64, key: MetaKey) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM product_meta WHERE product_id = ?1 AND meta_key = ?2",
            params![id, key.as_str()],
        )?;
        Ok(())
    }

    fn query_eligible(&self, filter: &EligibilityFilter) -> StorageResult<Vec<Product>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id FROM products p
             JOIN product_meta e ON e.product_id = p.id
                AND e.meta_key = ?1 AND e.meta_value = 'yes'
             JOIN product_meta u ON u.product_id = p.id
                AND u.meta_key = ?2 AND TRIM(u.meta_value) != ''
             ORDER BY p.id",
        )?;

        let ids = stmt
            .query_map(
                params![MetaKey::SyncEnabled.as_str(), MetaKey::SourceUrl.as_str()],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<i64>, _>>()?;

        let products = self.load_products(ids)?;

        Ok(match filter.synced_after {
            Some(cutoff) => products
                .into_iter()
                .filter(|p| p.last_sync_time.map(|t| t <= cutoff).unwrap_or(true))
                .collect(),
            None => products,
        })
    }

    fn set_visibility(&mut self, id: i64, visibility: Visibility) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE products SET visibility = ?1 WHERE id = ?2",
            params![visibility.to_db_string(), id],
        )?;
        if changed == 0 {
            return Err(StorageError::ProductNotFound(id));
        }
        Ok(())
    }

    fn set_catalog_prices(
        &mut self,
        id: i64,
        regular: f64,
        sale: Option<f64>,
        price: f64,
    ) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE products SET regular_price = ?1, sale_price = ?2, price = ?3 WHERE id = ?4",
            params![regular, sale, price, id],
        )?;
        if changed == 0 {
            return Err(StorageError::ProductNotFound(id));
        }
        Ok(())
    }

    fn upsert_product(&mut self, import: &ProductImport) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO products (id, name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![import.id, import.name],
        )?;

        let margin = import.margin_percent.to_string();
        let settings = [
            (MetaKey::SyncEnabled, meta_bool(import.sync_enabled)),
            (MetaKey::SourceUrl, import.source_url.trim()),
            (MetaKey::AddTax, meta_bool(import.add_tax)),
            (MetaKey::AddMargin, meta_bool(import.add_margin)),
            (MetaKey::MarginPercent, margin.as_str()),
        ];
        for (key, value) in settings {
            tx.execute(
                "INSERT INTO product_meta (product_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(product_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
                params![import.id, key.as_str(), value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn list_products(&self) -> StorageResult<Vec<Product>> {
        let mut stmt = self.conn.prepare("SELECT id FROM products ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        self.load_products(ids)
    }
}

impl StateStore for SqliteStorage {
    fn get_state(&self, key: &str, now: DateTime<Utc>) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM state_entries WHERE key = ?1 AND expires_at > ?2",
                params![key, now.timestamp_millis()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put_state(
        &mut self,
        key: &str,
        value: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let now_ms = now.timestamp_millis();
        self.conn.execute(
            "INSERT INTO state_entries (key, value, holder, updated_at, expires_at)
             VALUES (?1, ?2, NULL, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                holder = NULL,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at",
            params![key, value, now_ms, now_ms + ttl.num_milliseconds()],
        )?;
        Ok(())
    }

    fn delete_state(&mut self, key: &str) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM state_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) -> StorageResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM state_entries WHERE expires_at <= ?1",
            params![now.timestamp_millis()],
        )?;
        Ok(removed)
    }

    fn try_claim(
        &mut self,
        key: &str,
        holder: &str,
        ttl: Duration,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let now_ms = now.timestamp_millis();
        let changed = self.conn.execute(
            "INSERT INTO state_entries (key, value, holder, updated_at, expires_at)
             VALUES (?1, ?2, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                holder = excluded.holder,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at
             WHERE state_entries.expires_at <= ?3 OR state_entries.updated_at < ?5",
            params![
                key,
                holder,
                now_ms,
                now_ms + ttl.num_milliseconds(),
                stale_before.timestamp_millis()
            ],
        )?;
        Ok(changed == 1)
    }

    fn refresh_claim(
        &mut self,
        key: &str,
        holder: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let now_ms = now.timestamp_millis();
        let changed = self.conn.execute(
            "UPDATE state_entries SET updated_at = ?1, expires_at = ?2
             WHERE key = ?3 AND holder = ?4",
            params![now_ms, now_ms + ttl.num_milliseconds(), key, holder],
        )?;
        Ok(changed == 1)
    }

    fn release_claim(&mut self, key: &str, holder: &str) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM state_entries WHERE key = ?1 AND holder = ?2",
            params![key, holder],
        )?;
        Ok(changed == 1)
    }

    fn get_claim(&self, key: &str) -> StorageResult<Option<StateClaim>> {
        let claim = self
            .conn
            .query_row(
                "SELECT holder, updated_at, expires_at FROM state_entries
                 WHERE key = ?1 AND holder IS NOT NULL",
                params![key],
                |row| {
                    Ok(StateClaim {
                        holder: row.get(0)?,
                        updated_at: from_millis(row.get(1)?),
                        expires_at: from_millis(row.get(2)?),
                    })
                },
            )
            .optional()?;
        Ok(claim)
    }
}

impl SyncLog for SqliteStorage {
    fn append_log(&mut self, entry: &SyncLogEntry) -> StorageResult<()> {
        self.conn.execute(
            &format!("INSERT INTO sync_log ({LOG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                entry.product_id,
                entry.time.to_rfc3339(),
                entry.status.to_db_string(),
                entry.message,
                entry.old_price,
                entry.new_price,
                entry.old_sale_price,
                entry.new_sale_price,
            ],
        )?;
        Ok(())
    }

    fn recent_logs(&self, limit: usize) -> StorageResult<Vec<SyncLogEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM sync_log ORDER BY id DESC LIMIT ?1"
        ))?;
        let entries = stmt
            .query_map(params![limit as i64], row_to_log_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn logs_for_product(
        &self,
        product_id: i64,
        limit: usize,
    ) -> StorageResult<Vec<SyncLogEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM sync_log WHERE product_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let entries = stmt
            .query_map(params![product_id, limit as i64], row_to_log_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn count_logs_by_status(&self, status: SyncStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_log WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
