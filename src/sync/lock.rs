//! Store-backed run lock
//!
//! At most one catalog run may be active. The lock is a claim on a single
//! state-store key, taken with one atomic statement, so separate processes
//! racing for it cannot both win. A lock whose holder stopped refreshing it
//! for longer than the staleness threshold is reclaimed.

use crate::state::TriggerKind;
use crate::storage::{SqliteStorage, StateStore};
use crate::sync::lock_storage;
use crate::SyncError;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// State key of the run lock
pub const LOCK_KEY: &str = "price_sync.lock";

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(d.as_millis() as i64)
}

/// Mutual exclusion for catalog runs
pub struct LockManager {
    storage: Arc<Mutex<SqliteStorage>>,
    holder: String,
    staleness: Duration,
}

impl LockManager {
    /// Creates a lock handle with a fresh holder token
    pub fn new(storage: Arc<Mutex<SqliteStorage>>, trigger: TriggerKind) -> Self {
        Self::with_staleness(storage, trigger.staleness_threshold())
    }

    pub fn with_staleness(storage: Arc<Mutex<SqliteStorage>>, staleness: Duration) -> Self {
        Self {
            storage,
            holder: Uuid::new_v4().to_string(),
            staleness,
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    /// Tries to take the lock for `ttl`
    ///
    /// # Returns
    ///
    /// `true` if this handle now holds the lock
    pub fn try_acquire(&self, ttl: Duration) -> Result<bool, SyncError> {
        self.try_acquire_at(ttl, Utc::now())
    }

    pub fn try_acquire_at(&self, ttl: Duration, now: DateTime<Utc>) -> Result<bool, SyncError> {
        let stale_before = now - to_chrono(self.staleness);
        let mut store = lock_storage(&self.storage)?;

        let previous = store.get_claim(LOCK_KEY)?;
        let acquired = store.try_claim(LOCK_KEY, &self.holder, to_chrono(ttl), stale_before, now)?;

        if acquired {
            if let Some(previous) = previous.filter(|p| p.expires_at > now) {
                warn!(
                    "Recovered stale lock held by {} (last refreshed {})",
                    previous.holder, previous.updated_at
                );
            }
            debug!("Lock acquired by {}", self.holder);
        }

        Ok(acquired)
    }

    /// Extends the lock if this handle still holds it
    pub fn refresh(&self, ttl: Duration) -> Result<bool, SyncError> {
        self.refresh_at(ttl, Utc::now())
    }

    pub fn refresh_at(&self, ttl: Duration, now: DateTime<Utc>) -> Result<bool, SyncError> {
        let mut store = lock_storage(&self.storage)?;
        Ok(store.refresh_claim(LOCK_KEY, &self.holder, to_chrono(ttl), now)?)
    }

    /// Releases the lock if this handle holds it
    pub fn release(&self) -> Result<bool, SyncError> {
        let mut store = lock_storage(&self.storage)?;
        let released = store.release_claim(LOCK_KEY, &self.holder)?;
        if released {
            debug!("Lock released by {}", self.holder);
        }
        Ok(released)
    }

    /// Whether anyone holds a live, non-stale lock
    pub fn is_held(&self) -> Result<bool, SyncError> {
        self.is_held_at(Utc::now())
    }

    pub fn is_held_at(&self, now: DateTime<Utc>) -> Result<bool, SyncError> {
        let store = lock_storage(&self.storage)?;
        let stale_before = now - to_chrono(self.staleness);
        Ok(store
            .get_claim(LOCK_KEY)?
            .map(|claim| claim.expires_at > now && claim.updated_at >= stale_before)
            .unwrap_or(false))
    }

    /// Removes the lock whoever holds it
    pub fn clear(&self) -> Result<(), SyncError> {
        let mut store = lock_storage(&self.storage)?;
        store.delete_state(LOCK_KEY)?;
        Ok(())
    }
}
