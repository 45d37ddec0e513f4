//! Output traits and error types
//!
//! This module defines the notifier interface used for admin notices and the
//! error type shared by the output sinks.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to send notice: {0}")]
    Send(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Delivers admin notices (failure, hidden, restored)
///
/// Delivery is best-effort: callers log and drop errors rather than failing
/// a sync because a notice could not be sent.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> OutputResult<()>;
}
