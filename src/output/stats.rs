//! Statistics generation from the sync database
//!
//! This module provides functionality for extracting and displaying
//! catalog sync statistics from the storage layer.

use crate::state::Visibility;
use crate::storage::{Product, Storage, SyncStatus};
use crate::SyncError;

/// Catalog sync statistics summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatistics {
    /// Total number of products in the store
    pub total_products: u64,

    /// Products with sync enabled and a source URL
    pub sync_enabled: u64,

    pub visible: u64,
    pub hidden: u64,

    /// Products whose error counter is above zero
    pub with_errors: u64,

    /// Sync-enabled products that never synced successfully
    pub never_synced: u64,

    /// Sync log totals
    pub successful_syncs: u64,
    pub failed_syncs: u64,
}

impl SyncStatistics {
    fn from_products(products: &[Product]) -> Self {
        let mut stats = Self {
            total_products: products.len() as u64,
            ..Self::default()
        };

        for product in products {
            match product.visibility {
                Visibility::Visible => stats.visible += 1,
                Visibility::Hidden => stats.hidden += 1,
            }
            if product.error_count > 0 {
                stats.with_errors += 1;
            }
            if product.sync_enabled && !product.source_url.trim().is_empty() {
                stats.sync_enabled += 1;
                if product.last_sync_time.is_none() {
                    stats.never_synced += 1;
                }
            }
        }

        stats
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(SyncStatistics)` - Successfully loaded statistics
/// * `Err(SyncError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<SyncStatistics, SyncError> {
    let products = storage.list_products()?;

    let mut stats = SyncStatistics::from_products(&products);
    stats.successful_syncs = storage.count_logs_by_status(SyncStatus::Success)?;
    stats.failed_syncs = storage.count_logs_by_status(SyncStatus::Error)?;

    Ok(stats)
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &SyncStatistics) {
    println!("=== Sync Statistics ===\n");

    println!("Products:");
    println!("  Total: {}", stats.total_products);
    println!("  Sync enabled: {}", stats.sync_enabled);
    println!("  Never synced: {}", stats.never_synced);
    println!();

    println!("Visibility:");
    println!("  Visible: {}", stats.visible);
    println!("  Hidden: {}", stats.hidden);
    println!("  With errors: {}", stats.with_errors);
    println!();

    let attempts = stats.successful_syncs + stats.failed_syncs;
    let success_rate = if attempts > 0 {
        (stats.successful_syncs as f64 / attempts as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} sync attempts succeeded)",
        success_rate, stats.successful_syncs, attempts
    );
}
