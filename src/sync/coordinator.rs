//! Batch coordinator - resumable catalog runs
//!
//! A run walks one ordered product queue over many short invocations. Each
//! invocation takes the run lock, processes at most one slice of the queue,
//! persists progress and returns a status snapshot. Callers decide whether to
//! invoke again; nothing here schedules itself.
//!
//! Persisted between invocations (all with a TTL):
//! - the lock ([`LOCK_KEY`](crate::sync::LOCK_KEY))
//! - the batch state (queue, cursor, counters)
//! - the status snapshot for progress polling
//! - the abort flag

use crate::output::EventLevel;
use crate::state::{BatchState, StatusSnapshot, TriggerKind};
use crate::storage::{EligibilityFilter, Product, ProductStore, StateStore};
use crate::sync::lock::LockManager;
use crate::sync::{lock_storage, OutcomeKind, SyncExecutor, SyncOutcome};
use crate::SyncError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// State key of the persisted batch state
pub const BATCH_KEY: &str = "price_sync.batch";

/// State key of the persisted status snapshot
pub const STATUS_KEY: &str = "price_sync.status";

/// State key of the abort flag
pub const ABORT_KEY: &str = "price_sync.abort";

/// Lifetime of persisted run state
const STATE_TTL: Duration = Duration::from_secs(3600);

/// Lifetime of the lock record; staleness is judged separately
const LOCK_TTL: Duration = Duration::from_secs(600);

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(d.as_millis() as i64)
}

/// What one invocation did
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    /// Another invocation holds the lock; nothing was processed
    AlreadyRunning(StatusSnapshot),

    /// This invocation ran; the snapshot reflects its progress
    Ran(StatusSnapshot),
}

impl InvocationResult {
    pub fn snapshot(&self) -> &StatusSnapshot {
        match self {
            Self::AlreadyRunning(s) | Self::Ran(s) => s,
        }
    }

    pub fn already_running(&self) -> bool {
        matches!(self, Self::AlreadyRunning(_))
    }
}

/// Orders a run queue: never-synced products first, then oldest sync first
///
/// # Arguments
///
/// * `products` - Eligible products in any order
///
/// # Returns
///
/// Product IDs in processing order; ties are broken by ID
pub fn order_queue(mut products: Vec<Product>) -> Vec<i64> {
    // None sorts before Some
    products.sort_by_key(|p| (p.last_sync_time, p.id));
    products.into_iter().map(|p| p.id).collect()
}

/// Main batch coordinator structure
pub struct BatchCoordinator {
    executor: SyncExecutor,
    time_budget: Duration,
    throttle: Duration,
}

impl BatchCoordinator {
    /// Creates a coordinator; the time budget and throttle come from the
    /// executor's settings
    pub fn new(executor: SyncExecutor) -> Self {
        let settings = executor.settings();
        let time_budget = Duration::from_secs(settings.time_budget_seconds);
        let throttle = Duration::from_millis(settings.throttle_ms);
        Self {
            executor,
            time_budget,
            throttle,
        }
    }

    pub fn with_time_budget(mut self, time_budget: Duration) -> Self {
        self.time_budget = time_budget;
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn executor(&self) -> &SyncExecutor {
        &self.executor
    }

    /// Runs one invocation of the current (or a new) catalog run
    ///
    /// # Arguments
    ///
    /// * `trigger` - Cron or manual; decides the lock staleness threshold and
    ///   whether recently synced products are skipped when queueing
    ///
    /// # Returns
    ///
    /// * `Ok(InvocationResult)` - Already running, or the snapshot after this slice
    /// * `Err(SyncError)` - The state store failed
    pub async fn run_one_invocation(
        &self,
        trigger: TriggerKind,
    ) -> Result<InvocationResult, SyncError> {
        let started = Instant::now();
        let lock = LockManager::new(self.executor.storage().clone(), trigger);

        if !lock.try_acquire(LOCK_TTL)? {
            info!("Sync already running, {} invocation skipped", trigger);
            return Ok(InvocationResult::AlreadyRunning(self.status()?));
        }

        let result = self.run_locked(trigger, started, &lock).await;

        if let Err(e) = lock.release() {
            warn!("Failed to release sync lock: {}", e);
        }

        result.map(InvocationResult::Ran)
    }

    async fn run_locked(
        &self,
        trigger: TriggerKind,
        started: Instant,
        lock: &LockManager,
    ) -> Result<StatusSnapshot, SyncError> {
        let now = Utc::now();
        {
            let mut store = lock_storage(self.executor.storage())?;
            store.purge_expired(now)?;
        }

        let mut state = match self.load::<BatchState>(BATCH_KEY, now)? {
            Some(state) if !state.finished && !state.aborted => state,
            _ => {
                let state = self.build_queue(trigger, now)?;
                if state.total == 0 {
                    info!("No products eligible for sync");
                    return self.finish(state);
                }
                state
            }
        };

        let slice: Vec<i64> = state.current_slice().to_vec();
        if slice.is_empty() {
            return self.finish(state);
        }

        // Items of this slice done by an earlier, interrupted invocation
        let done_in_slice = state.processed().saturating_sub(state.offset());
        let pending = slice.len().saturating_sub(done_in_slice);

        // The budget is checked between products, so every invocation makes progress
        for (i, &product_id) in slice.iter().skip(done_in_slice).enumerate() {
            if self.abort_requested()? {
                return self.abort(state);
            }

            if i > 0 && started.elapsed() >= self.time_budget {
                info!(
                    "Time budget of {:?} used, {} products of this batch left for the next invocation",
                    self.time_budget,
                    pending - i
                );
                let snapshot = state.snapshot(true, true);
                self.persist(&state, &snapshot)?;
                return Ok(snapshot);
            }

            state.current_label = self.label_for(product_id)?;
            self.persist(&state, &state.snapshot(true, false))?;

            let outcome = match self.executor.sync(product_id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Sync of product {} failed: {}", product_id, e);
                    SyncOutcome {
                        success: false,
                        message: e.to_string(),
                        kind: OutcomeKind::Failed,
                    }
                }
            };
            state.record(outcome.success);
            self.persist(&state, &state.snapshot(true, false))?;

            if let Err(e) = lock.refresh(LOCK_TTL) {
                warn!("Failed to refresh sync lock: {}", e);
            }

            if i + 1 < pending && !self.throttle.is_zero() {
                tokio::time::sleep(self.throttle).await;
            }
        }

        if state.has_next_batch() {
            state.advance();
            let snapshot = state.snapshot(true, true);
            self.persist(&state, &snapshot)?;
            info!(
                "Batch done: {}/{} processed ({} failed), next batch pending",
                state.processed(),
                state.total,
                state.failed
            );
            return Ok(snapshot);
        }

        self.finish(state)
    }

    fn build_queue(&self, trigger: TriggerKind, now: DateTime<Utc>) -> Result<BatchState, SyncError> {
        let settings = self.executor.settings();
        let filter = if settings.skip_recent_sync && !trigger.bypasses_recent_skip() {
            EligibilityFilter {
                synced_after: Some(now - chrono::Duration::hours(settings.skip_recent_hours as i64)),
            }
        } else {
            EligibilityFilter::default()
        };

        let products = {
            let mut store = lock_storage(self.executor.storage())?;
            // A flag left from an earlier run must not abort this one
            store.delete_state(ABORT_KEY)?;
            store.query_eligible(&filter)?
        };

        let queue = order_queue(products);
        info!("Queued {} products for {} sync", queue.len(), trigger);
        self.executor.event(
            EventLevel::Info,
            &format!("Starting {} sync of {} products", trigger, queue.len()),
        );

        Ok(BatchState::new(queue, settings.batch_size, trigger))
    }

    fn finish(&self, mut state: BatchState) -> Result<StatusSnapshot, SyncError> {
        state.finished = true;
        state.current_label.clear();
        let snapshot = state.snapshot(false, false);

        {
            let mut store = lock_storage(self.executor.storage())?;
            store.delete_state(BATCH_KEY)?;
            store.delete_state(ABORT_KEY)?;
        }
        self.store(STATUS_KEY, &snapshot)?;

        info!(
            "Sync finished: {} successful, {} failed of {}",
            state.completed, state.failed, state.total
        );
        self.executor.event(
            EventLevel::Info,
            &format!(
                "Bulk sync completed. {} successful, {} failed.",
                state.completed, state.failed
            ),
        );
        Ok(snapshot)
    }

    fn abort(&self, mut state: BatchState) -> Result<StatusSnapshot, SyncError> {
        state.aborted = true;
        state.current_label.clear();
        let snapshot = state.snapshot(false, false);

        {
            let mut store = lock_storage(self.executor.storage())?;
            store.delete_state(BATCH_KEY)?;
            store.delete_state(ABORT_KEY)?;
        }
        self.store(STATUS_KEY, &snapshot)?;

        warn!(
            "Sync aborted after {}/{} products",
            state.processed(),
            state.total
        );
        self.executor
            .event(EventLevel::Warning, "Bulk sync aborted by request");
        Ok(snapshot)
    }

    fn abort_requested(&self) -> Result<bool, SyncError> {
        let store = lock_storage(self.executor.storage())?;
        Ok(store.get_state(ABORT_KEY, Utc::now())?.is_some())
    }

    fn label_for(&self, product_id: i64) -> Result<String, SyncError> {
        let store = lock_storage(self.executor.storage())?;
        Ok(store
            .get_product(product_id)?
            .map(|p| p.label())
            .unwrap_or_else(|| format!("Product #{}", product_id)))
    }

    fn persist(&self, state: &BatchState, snapshot: &StatusSnapshot) -> Result<(), SyncError> {
        self.store(BATCH_KEY, state)?;
        self.store(STATUS_KEY, snapshot)
    }

    fn store<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SyncError> {
        let json = serde_json::to_string(value)
            .map_err(|e| SyncError::Storage(format!("failed to encode {}: {}", key, e)))?;
        let mut store = lock_storage(self.executor.storage())?;
        store.put_state(key, &json, to_chrono(STATE_TTL), Utc::now())?;
        Ok(())
    }

    fn load<T: DeserializeOwned>(&self, key: &str, now: DateTime<Utc>) -> Result<Option<T>, SyncError> {
        let raw = {
            let store = lock_storage(self.executor.storage())?;
            store.get_state(key, now)?
        };

        match raw {
            Some(json) => match serde_json::from_str(&json) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!("Discarding unreadable {}: {}", key, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Current status snapshot for progress polling
    pub fn status(&self) -> Result<StatusSnapshot, SyncError> {
        let now = Utc::now();
        if let Some(snapshot) = self.load::<StatusSnapshot>(STATUS_KEY, now)? {
            return Ok(snapshot);
        }
        Ok(self
            .load::<BatchState>(BATCH_KEY, now)?
            .map(|state| state.snapshot(false, state.processed() < state.total))
            .unwrap_or_default())
    }

    /// Asks a running catalog run to stop after its current product
    ///
    /// # Returns
    ///
    /// `false` when no run is in progress
    pub fn request_abort(&self) -> Result<bool, SyncError> {
        let now = Utc::now();
        if self.load::<BatchState>(BATCH_KEY, now)?.is_none() {
            return Ok(false);
        }

        let mut store = lock_storage(self.executor.storage())?;
        store.put_state(ABORT_KEY, "true", to_chrono(STATE_TTL), now)?;
        info!("Abort requested");
        Ok(true)
    }

    /// Removes the lock and all run state; the next invocation starts fresh
    pub fn clear_state(&self) -> Result<(), SyncError> {
        LockManager::new(self.executor.storage().clone(), TriggerKind::Manual).clear()?;
        {
            let mut store = lock_storage(self.executor.storage())?;
            for key in [BATCH_KEY, STATUS_KEY, ABORT_KEY] {
                store.delete_state(key)?;
            }
        }
        info!("Cleared sync lock and batch state");
        Ok(())
    }

    /// Syncs one product outside any catalog run
    pub async fn sync_single(&self, product_id: i64) -> Result<SyncOutcome, SyncError> {
        self.executor.sync(product_id).await
    }
}
