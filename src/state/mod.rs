//! State module for tracking sync progress
//!
//! This module provides the state types shared by the executor and the batch coordinator.
//!
//! # Components
//!
//! - `Visibility`: Catalog visibility of a product (visible or hidden after repeated failures)
//! - `ErrorPolicy`: Maps failure counts to hide decisions and notices
//! - `BatchState`: Resumable queue and cursor of a catalog-wide run
//! - `StatusSnapshot`: Progress view polled by triggers
//! - `TriggerKind`: Who started an invocation (cron or a person)

mod batch;
mod error_policy;
mod visibility;

// Re-export main types
pub use batch::{BatchState, StatusSnapshot, TriggerKind};
pub use error_policy::{ErrorPolicy, FailureDecision, NoticeKind, SuccessDecision};
pub use visibility::Visibility;
