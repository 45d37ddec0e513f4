//! Configuration module for Price-Sync
//!
//! This module handles loading, parsing, clamping and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use price_sync::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("price-sync.toml")).unwrap();
//! println!("Batch size: {}", config.sync.batch_size);
//! ```

mod catalog;
mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, LoggingConfig, StorageConfig, SyncSettings, DEFAULT_USER_AGENT};

// Re-export parser functions
pub use parser::{load_config, parse_config};

pub use catalog::{load_catalog, parse_catalog};
