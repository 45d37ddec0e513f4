//! Notifier implementations

use crate::output::traits::{Notifier, OutputError, OutputResult};
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;

/// Writes notices to the tracing log instead of delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> OutputResult<()> {
        info!(to = %to, subject = %subject, "Admin notice\n{}", body);
        Ok(())
    }
}

/// A notice captured by [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotice {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Keeps every notice in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notices sent so far, oldest first
    pub fn sent(&self) -> Vec<SentNotice> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> OutputResult<()> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| OutputError::Send(e.to_string()))?;
        sent.push(SentNotice {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
