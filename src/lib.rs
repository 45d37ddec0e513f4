//! Price-Sync: keeps catalog prices in step with supplier web pages
//!
//! This crate fetches the supplier page configured for each product, extracts a
//! regular/sale price pair from the HTML, applies tax and margin adjustments and
//! writes the result back to the product store. Catalog-wide runs are split into
//! short, resumable invocations guarded by a store-backed lock, and products that
//! keep failing are hidden until a later sync succeeds.

pub mod config;
pub mod output;
pub mod state;
pub mod storage;
pub mod sync;
pub mod url;

use thiserror::Error;

/// Main error type for Price-Sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Source URL errors. All of these except [`UrlError::Unresolved`] are
/// configuration problems and never count towards a product's error threshold.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("No URL specified")]
    Empty,

    #[error("Invalid URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Blocked host: {0}")]
    BlockedHost(String),

    #[error("Could not resolve host: {0}")]
    Unresolved(String),
}

/// Result type alias for Price-Sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{BatchState, ErrorPolicy, StatusSnapshot, TriggerKind, Visibility};
pub use sync::{BatchCoordinator, LockManager, PriceParser, SyncExecutor, SyncOutcome};
