//! Storage traits and error types
//!
//! This module defines the trait interfaces for storage backends and
//! associated error types. The product store, the TTL state store and the
//! sync log are separate traits so callers can depend on the narrow seam
//! they actually use.

use crate::state::Visibility;
use crate::storage::{
    EligibilityFilter, MetaKey, Product, ProductImport, StateClaim, SyncLogEntry, SyncStatus,
};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Product records and their sync metadata
pub trait ProductStore {
    /// Gets a product by ID, or `None` if it does not exist
    fn get_product(&self, id: i64) -> StorageResult<Option<Product>>;

    /// Gets a single metadata value
    fn get_meta(&self, id: i64, key: MetaKey) -> StorageResult<Option<String>>;

    /// Sets a single metadata value, replacing any previous value
    fn set_meta(&mut self, id: i64, key: MetaKey, value: &str) -> StorageResult<()>;

    /// Removes a metadata value
    fn delete_meta(&mut self, id: i64, key: MetaKey) -> StorageResult<()>;

    /// Lists products with sync enabled and a non-empty source URL
    ///
    /// # Arguments
    ///
    /// * `filter` - Optional exclusion of recently synced products
    ///
    /// # Returns
    ///
    /// Matching products in ID order. Queue ordering is the caller's concern.
    fn query_eligible(&self, filter: &EligibilityFilter) -> StorageResult<Vec<Product>>;

    /// Sets the catalog visibility of a product
    fn set_visibility(&mut self, id: i64, visibility: Visibility) -> StorageResult<()>;

    /// Writes the catalog-facing prices of a product
    fn set_catalog_prices(
        &mut self,
        id: i64,
        regular: f64,
        sale: Option<f64>,
        price: f64,
    ) -> StorageResult<()>;

    /// Inserts a product or updates its name and sync settings
    fn upsert_product(&mut self, import: &ProductImport) -> StorageResult<()>;

    /// Lists every product
    fn list_products(&self) -> StorageResult<Vec<Product>>;
}

/// Expiring key/value state shared between invocations
///
/// Every method takes `now` explicitly; expiry is evaluated against it rather
/// than the wall clock.
pub trait StateStore {
    /// Gets a live (unexpired) value
    fn get_state(&self, key: &str, now: DateTime<Utc>) -> StorageResult<Option<String>>;

    /// Stores a value that expires after `ttl`
    fn put_state(
        &mut self,
        key: &str,
        value: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Deletes a value. Deleting a missing key is not an error.
    fn delete_state(&mut self, key: &str) -> StorageResult<()>;

    /// Deletes all expired entries, returning how many were removed
    fn purge_expired(&mut self, now: DateTime<Utc>) -> StorageResult<usize>;

    /// Atomically claims `key` for `holder`
    ///
    /// The claim succeeds when the key is absent, expired, or was last
    /// refreshed before `stale_before`. The check and the write happen in a
    /// single statement so two racing claimants can never both succeed.
    ///
    /// # Returns
    ///
    /// `true` if `holder` now owns the key
    fn try_claim(
        &mut self,
        key: &str,
        holder: &str,
        ttl: Duration,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Extends a claim still owned by `holder`
    fn refresh_claim(
        &mut self,
        key: &str,
        holder: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Releases a claim owned by `holder`
    fn release_claim(&mut self, key: &str, holder: &str) -> StorageResult<bool>;

    /// Gets the current claim on `key`, expired or not
    fn get_claim(&self, key: &str) -> StorageResult<Option<StateClaim>>;
}

/// Append-only record of sync attempts
pub trait SyncLog {
    /// Appends one entry
    fn append_log(&mut self, entry: &SyncLogEntry) -> StorageResult<()>;

    /// Most recent entries, newest first
    fn recent_logs(&self, limit: usize) -> StorageResult<Vec<SyncLogEntry>>;

    /// Entries for one product, newest first
    fn logs_for_product(&self, product_id: i64, limit: usize)
        -> StorageResult<Vec<SyncLogEntry>>;

    /// Counts entries by status
    fn count_logs_by_status(&self, status: SyncStatus) -> StorageResult<u64>;
}

/// A full storage backend
pub trait Storage: ProductStore + StateStore + SyncLog {}

impl<T: ProductStore + StateStore + SyncLog> Storage for T {}
