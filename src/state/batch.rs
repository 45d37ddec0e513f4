//! Resumable batch state
//!
//! A catalog-wide run is one ordered queue of product ids walked in slices of
//! `batch_size`, one slice per invocation. The queue, the cursor and the
//! counters survive between invocations through the state store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Who started an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Periodic trigger, expected every five minutes
    Cron,

    /// A person (dashboard button, CLI) asked for the run
    Manual,
}

impl TriggerKind {
    /// Age after which an unreleased lock is reclaimed
    pub fn staleness_threshold(&self) -> Duration {
        match self {
            Self::Cron => Duration::from_secs(300),
            Self::Manual => Duration::from_secs(600),
        }
    }

    /// Manual runs sync everything, including recently synced products
    pub fn bypasses_recent_skip(&self) -> bool {
        matches!(self, Self::Manual)
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron => write!(f, "cron"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Persisted queue and progress of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchState {
    /// Product ids in processing order
    pub queue: Vec<i64>,

    /// Index of the next slice to process
    pub cursor: usize,

    /// Slice length, fixed for the lifetime of the run
    pub batch_size: usize,

    pub total: usize,
    pub completed: usize,
    pub failed: usize,

    /// Human-readable label of the product being processed
    pub current_label: String,

    pub finished: bool,
    pub aborted: bool,

    pub trigger: TriggerKind,
    pub started_at: DateTime<Utc>,
}

impl BatchState {
    /// Creates the state for a freshly built queue
    pub fn new(queue: Vec<i64>, batch_size: usize, trigger: TriggerKind) -> Self {
        let total = queue.len();
        Self {
            queue,
            cursor: 0,
            batch_size: batch_size.max(1),
            total,
            completed: 0,
            failed: 0,
            current_label: String::new(),
            finished: false,
            aborted: false,
            trigger,
            started_at: Utc::now(),
        }
    }

    /// Start offset of the current slice, never past `total`
    pub fn offset(&self) -> usize {
        (self.cursor * self.batch_size).min(self.total)
    }

    /// The ids of the current slice; empty once the queue is exhausted
    pub fn current_slice(&self) -> &[i64] {
        let start = self.offset();
        let end = (start + self.batch_size).min(self.queue.len());
        self.queue.get(start..end).unwrap_or(&[])
    }

    /// True when another slice follows the current one
    pub fn has_next_batch(&self) -> bool {
        (self.cursor + 1) * self.batch_size < self.total
    }

    /// Moves the cursor to the next slice
    pub fn advance(&mut self) {
        self.cursor += 1;
    }

    /// Products attempted so far
    pub fn processed(&self) -> usize {
        self.completed + self.failed
    }

    /// Records the result of one product
    pub fn record(&mut self, success: bool) {
        if success {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Progress view of this state
    pub fn snapshot(&self, running: bool, needs_next_batch: bool) -> StatusSnapshot {
        StatusSnapshot {
            running,
            completed: self.completed,
            total: self.total,
            failed: self.failed,
            current_product: self.current_label.clone(),
            finished: self.finished,
            aborted: self.aborted,
            needs_next_batch,
            updated_at: Some(Utc::now()),
        }
    }
}

/// Progress snapshot returned to triggers and stored for polling
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub completed: usize,
    pub total: usize,
    pub failed: usize,
    pub current_product: String,
    pub finished: bool,
    pub aborted: bool,
    pub needs_next_batch: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    /// Snapshot of a run that finished with nothing to do
    pub fn empty_finished() -> Self {
        Self {
            finished: true,
            updated_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Percentage of the queue attempted, for progress bars
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return if self.finished { 100 } else { 0 };
        }
        let done = (self.completed + self.failed).min(self.total);
        ((done * 100) / self.total) as u8
    }
}
