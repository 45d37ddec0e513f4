//! Sync module for price synchronization
//!
//! This module contains the core sync logic, including:
//! - Supplier page fetching
//! - Multi-strategy price extraction
//! - Single-product sync with error/visibility tracking
//! - The run lock
//! - Resumable, batched catalog runs

mod coordinator;
mod executor;
mod fetcher;
mod lock;
mod parser;
mod pricing;

pub use coordinator::{order_queue, BatchCoordinator, InvocationResult, ABORT_KEY, BATCH_KEY, STATUS_KEY};
pub use executor::{compose_notice, OutcomeKind, SyncExecutor, SyncOutcome};
pub use fetcher::{build_http_client, fetch_url, FetchResult, Fetcher, GuardedResolver, HttpFetcher, NetworkErrorKind};
pub use lock::{LockManager, LOCK_KEY};
pub use parser::{extract_price_from_text, ExtractedPrices, PriceParser, PRICE_CEILING};
pub use pricing::{round2, AdjustedPrices, PriceAdjustment};

use crate::storage::SqliteStorage;
use crate::SyncError;
use std::sync::{Arc, Mutex, MutexGuard};

/// Locks shared storage, mapping a poisoned mutex to a storage error
pub(crate) fn lock_storage(
    storage: &Arc<Mutex<SqliteStorage>>,
) -> Result<MutexGuard<'_, SqliteStorage>, SyncError> {
    storage
        .lock()
        .map_err(|e| SyncError::Storage(format!("storage mutex poisoned: {}", e)))
}
