//! Output module for logs, notices and reports
//!
//! This module handles:
//! - The persistent monthly event log
//! - Admin notices (failure, hidden, restored)
//! - Catalog sync statistics

mod event_log;
mod notifier;
pub mod stats;
mod traits;

pub use event_log::{EventLevel, EventLog};
pub use notifier::{RecordingNotifier, SentNotice, TracingNotifier};
pub use stats::{load_statistics, print_statistics, SyncStatistics};
pub use traits::{Notifier, OutputError, OutputResult};
