//! Storage module for persisting sync data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Product records and their sync metadata
//! - The append-only sync log
//! - Expiring cross-invocation state (lock, batch queue, status, abort flag)

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ProductStore, StateStore, Storage, StorageError, StorageResult, SyncLog};

use crate::state::Visibility;
use crate::SyncError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(SyncError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, SyncError> {
    SqliteStorage::new(path)
}

/// Product metadata keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKey {
    SyncEnabled,
    SourceUrl,
    AddTax,
    AddMargin,
    MarginPercent,
    ErrorCount,
    LastStatus,
    LastSyncTime,
    ErrorSince,
    ExternalRegularPrice,
    ExternalSalePrice,
    RegularPriceIncTax,
    SalePriceIncTax,
}

impl MetaKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyncEnabled => "sync_enabled",
            Self::SourceUrl => "source_url",
            Self::AddTax => "add_tax",
            Self::AddMargin => "add_margin",
            Self::MarginPercent => "margin_percent",
            Self::ErrorCount => "error_count",
            Self::LastStatus => "last_status",
            Self::LastSyncTime => "last_sync_time",
            Self::ErrorSince => "error_since",
            Self::ExternalRegularPrice => "external_regular_price",
            Self::ExternalSalePrice => "external_sale_price",
            Self::RegularPriceIncTax => "regular_price_inc_tax",
            Self::SalePriceIncTax => "sale_price_inc_tax",
        }
    }
}

/// Boolean meta values are stored as "yes"/"no"
pub fn meta_bool(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Represents a product with its sync metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub visibility: Visibility,
    pub sync_enabled: bool,
    pub source_url: String,
    pub add_tax: bool,
    pub add_margin: bool,
    pub margin_percent: f64,
    pub error_count: u32,
    pub last_status: String,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub error_since: Option<DateTime<Utc>>,
    pub regular_price: Option<f64>,
    pub sale_price: Option<f64>,
    pub price: Option<f64>,
    pub regular_price_inc_tax: Option<f64>,
    pub sale_price_inc_tax: Option<f64>,
}

impl Product {
    /// Display label used in progress snapshots and notices
    pub fn label(&self) -> String {
        if self.name.trim().is_empty() {
            format!("Product #{}", self.id)
        } else {
            self.name.clone()
        }
    }

    /// Hidden and carrying an error record from an earlier failure
    pub fn is_hidden_with_error(&self) -> bool {
        self.visibility.is_hidden() && self.error_since.is_some()
    }
}

/// Product definition accepted by [`ProductStore::upsert_product`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProductImport {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default = "default_true")]
    pub sync_enabled: bool,
    #[serde(default)]
    pub add_tax: bool,
    #[serde(default)]
    pub add_margin: bool,
    #[serde(default = "default_margin")]
    pub margin_percent: f64,
}

fn default_true() -> bool {
    true
}

fn default_margin() -> f64 {
    10.0
}

/// Filter applied when building a run queue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EligibilityFilter {
    /// Exclude products whose last successful sync is after this instant
    pub synced_after: Option<DateTime<Utc>>,
}

/// Status of a sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    Success,
    Error,
}

impl SyncStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One row of the sync log
#[derive(Debug, Clone, PartialEq)]
pub struct SyncLogEntry {
    pub product_id: i64,
    pub time: DateTime<Utc>,
    pub status: SyncStatus,
    pub message: String,
    pub old_price: f64,
    pub new_price: f64,
    pub old_sale_price: f64,
    pub new_sale_price: f64,
}

impl SyncLogEntry {
    /// An entry without price changes
    pub fn new(product_id: i64, status: SyncStatus, message: impl Into<String>) -> Self {
        Self {
            product_id,
            time: Utc::now(),
            status,
            message: message.into(),
            old_price: 0.0,
            new_price: 0.0,
            old_sale_price: 0.0,
            new_sale_price: 0.0,
        }
    }
}

/// A lock-style claim on a state key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateClaim {
    pub holder: String,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
