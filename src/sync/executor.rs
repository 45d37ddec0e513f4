//! Single-product sync
//!
//! Validates a product's sync settings, fetches its supplier page, extracts
//! and adjusts prices, and records the outcome: catalog prices, error
//! counter, visibility, sync log row, event log line and admin notice.
//!
//! Storage is never locked across an `.await`.

use crate::config::SyncSettings;
use crate::output::{EventLevel, EventLog, Notifier, TracingNotifier};
use crate::state::{ErrorPolicy, NoticeKind, Visibility};
use crate::storage::{MetaKey, Product, ProductStore, SqliteStorage, SyncLog, SyncLogEntry, SyncStatus};
use crate::sync::pricing::{AdjustedPrices, PriceAdjustment};
use crate::sync::{lock_storage, FetchResult, Fetcher, PriceParser};
use crate::url::{check_host, parse_source_url, HostResolver, SystemResolver};
use crate::{SyncError, UrlError};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// How a sync attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// Prices written
    Updated,

    /// Prices written and the product made visible again
    Restored,

    /// Misconfiguration; not counted towards the error threshold
    Config,

    /// Fetch or extraction failure, counted towards the error threshold
    Failed,
}

/// Result of syncing one product
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    pub kind: OutcomeKind,
}

impl SyncOutcome {
    fn updated(message: impl Into<String>, restored: bool) -> Self {
        Self {
            success: true,
            message: message.into(),
            kind: if restored {
                OutcomeKind::Restored
            } else {
                OutcomeKind::Updated
            },
        }
    }

    fn config(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            kind: OutcomeKind::Config,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            kind: OutcomeKind::Failed,
        }
    }

    /// Whether the attempt moved the product's error counter
    pub fn counted(&self) -> bool {
        self.kind == OutcomeKind::Failed
    }
}

/// Syncs single products
pub struct SyncExecutor {
    storage: Arc<Mutex<SqliteStorage>>,
    fetcher: Arc<dyn Fetcher>,
    resolver: Arc<dyn HostResolver>,
    notifier: Arc<dyn Notifier>,
    event_log: Option<EventLog>,
    parser: PriceParser,
    policy: ErrorPolicy,
    settings: SyncSettings,
}

impl SyncExecutor {
    /// Creates an executor using the system resolver and the tracing notifier
    ///
    /// # Arguments
    ///
    /// * `storage` - Shared product store
    /// * `fetcher` - Supplier page fetcher
    /// * `settings` - Sync settings; clamped again here
    pub fn new(
        storage: Arc<Mutex<SqliteStorage>>,
        fetcher: Arc<dyn Fetcher>,
        settings: SyncSettings,
    ) -> Self {
        let settings = settings.clamped();
        Self {
            storage,
            fetcher,
            resolver: Arc::new(SystemResolver),
            notifier: Arc::new(TracingNotifier),
            event_log: None,
            parser: PriceParser::new(),
            policy: ErrorPolicy::new(settings.max_errors),
            settings,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_event_log(mut self, event_log: EventLog) -> Self {
        self.event_log = Some(event_log);
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub(crate) fn storage(&self) -> &Arc<Mutex<SqliteStorage>> {
        &self.storage
    }

    /// Appends to the event log; failures are only traced
    pub(crate) fn event(&self, level: EventLevel, message: &str) {
        if let Some(log) = &self.event_log {
            if let Err(e) = log.append_event(level, message) {
                warn!("Failed to write event log: {}", e);
            }
        }
    }

    /// Syncs one product
    ///
    /// # Returns
    ///
    /// * `Ok(SyncOutcome)` - The attempt ran; the outcome says whether it succeeded
    /// * `Err(SyncError)` - The product store failed
    pub async fn sync(&self, product_id: i64) -> Result<SyncOutcome, SyncError> {
        let product = {
            let store = lock_storage(&self.storage)?;
            store.get_product(product_id)?
        };

        let Some(product) = product else {
            return self.config_error(product_id, None, "Product not found");
        };

        if !product.sync_enabled {
            return self.config_error(product_id, Some(&product), "Sync not enabled for this product");
        }

        let url = match parse_source_url(&product.source_url) {
            Ok(url) => url,
            Err(e) => return self.config_error(product_id, Some(&product), &e.to_string()),
        };

        match check_host(&url, self.resolver.as_ref()).await {
            Ok(()) => {}
            Err(UrlError::Unresolved(host)) => {
                let message = format!(
                    "Failed to fetch content from URL (could not resolve {})",
                    host
                );
                return self.record_failure(&product, &message).await;
            }
            Err(e) => return self.config_error(product_id, Some(&product), &e.to_string()),
        }

        info!("Syncing product {} from {}", product_id, url);
        let fetched = self
            .fetcher
            .fetch(
                &url,
                Duration::from_secs(self.settings.fetch_timeout_seconds),
                &self.settings.user_agent,
            )
            .await;

        let body = match fetched {
            FetchResult::Success { body, .. } => body,
            other => {
                let message = other
                    .failure_message()
                    .unwrap_or_else(|| "Failed to fetch content from URL".to_string());
                return self.record_failure(&product, &message).await;
            }
        };

        let prices = self.parser.parse(&body);
        if !prices.found() {
            return self
                .record_failure(&product, "No valid regular price found")
                .await;
        }

        let adjusted = PriceAdjustment {
            add_tax: product.add_tax,
            add_margin: product.add_margin,
            margin_percent: product.margin_percent,
        }
        .apply(&prices);

        self.record_success(&product, prices.regular_price, prices.sale_price, adjusted)
            .await
    }

    fn config_error(
        &self,
        product_id: i64,
        product: Option<&Product>,
        message: &str,
    ) -> Result<SyncOutcome, SyncError> {
        warn!("Product {} not synced: {}", product_id, message);
        {
            let mut store = lock_storage(&self.storage)?;
            if product.is_some() {
                store.set_meta(product_id, MetaKey::LastStatus, &format!("Error: {}", message))?;
            }
            append_log(
                &mut store,
                &SyncLogEntry::new(product_id, SyncStatus::Error, message),
            );
        }
        self.event(
            EventLevel::Error,
            &format!("Product {} not synced: {}", product_id, message),
        );
        Ok(SyncOutcome::config(message))
    }

    async fn record_failure(&self, product: &Product, message: &str) -> Result<SyncOutcome, SyncError> {
        let decision = self.policy.apply(product.error_count);
        let now = Utc::now();

        let status = if decision.should_hide {
            format!(
                "Failed: Hidden after {} errors - {}",
                decision.new_error_count, message
            )
        } else {
            format!(
                "Error: {} (attempt {}/{})",
                message,
                decision.new_error_count,
                self.policy.max_errors()
            )
        };

        {
            let mut store = lock_storage(&self.storage)?;
            store.set_meta(
                product.id,
                MetaKey::ErrorCount,
                &decision.new_error_count.to_string(),
            )?;
            if decision.should_hide {
                if product.error_since.is_none() {
                    store.set_meta(product.id, MetaKey::ErrorSince, &now.to_rfc3339())?;
                }
                store.set_visibility(product.id, Visibility::Hidden)?;
            }
            store.set_meta(product.id, MetaKey::LastStatus, &status)?;
            append_log(
                &mut store,
                &SyncLogEntry::new(product.id, SyncStatus::Error, message),
            );
        }

        warn!("Product {} failed: {}", product.id, status);
        self.event(
            EventLevel::Error,
            &format!("Error syncing product {}: {}", product.id, status),
        );
        self.notify(product, decision.notice, Some(message)).await;

        Ok(SyncOutcome::failed(status))
    }

    async fn record_success(
        &self,
        product: &Product,
        extracted_regular: f64,
        extracted_sale: f64,
        adjusted: AdjustedPrices,
    ) -> Result<SyncOutcome, SyncError> {
        let decision = self.policy.on_success(product.is_hidden_with_error());
        let now = Utc::now();

        let status = if decision.restore {
            "Success: Restored & Prices updated"
        } else {
            "Success: Prices updated"
        };

        {
            let mut store = lock_storage(&self.storage)?;
            store.set_meta(
                product.id,
                MetaKey::ExternalRegularPrice,
                &extracted_regular.to_string(),
            )?;
            store.set_meta(
                product.id,
                MetaKey::ExternalSalePrice,
                &extracted_sale.to_string(),
            )?;
            store.set_meta(
                product.id,
                MetaKey::RegularPriceIncTax,
                &adjusted.regular.to_string(),
            )?;
            store.set_meta(
                product.id,
                MetaKey::SalePriceIncTax,
                &adjusted.sale.to_string(),
            )?;
            store.set_catalog_prices(
                product.id,
                adjusted.regular,
                adjusted.catalog_sale(),
                adjusted.active(),
            )?;

            store.set_meta(
                product.id,
                MetaKey::ErrorCount,
                &decision.new_error_count.to_string(),
            )?;
            store.delete_meta(product.id, MetaKey::ErrorSince)?;
            if decision.restore {
                store.set_visibility(product.id, Visibility::Visible)?;
            }
            store.set_meta(product.id, MetaKey::LastStatus, status)?;
            store.set_meta(product.id, MetaKey::LastSyncTime, &now.to_rfc3339())?;

            append_log(
                &mut store,
                &SyncLogEntry {
                    product_id: product.id,
                    time: now,
                    status: SyncStatus::Success,
                    message: status.to_string(),
                    old_price: product.regular_price_inc_tax.unwrap_or(0.0),
                    new_price: adjusted.regular,
                    old_sale_price: product.sale_price_inc_tax.unwrap_or(0.0),
                    new_sale_price: adjusted.sale,
                },
            );
        }

        info!(
            "Updated product {}: regular {}, sale {}",
            product.id, adjusted.regular, adjusted.sale
        );
        self.event(
            EventLevel::Success,
            &format!(
                "Updated product {}: Regular: {}, Sale: {}",
                product.id, adjusted.regular, adjusted.sale
            ),
        );
        if let Some(notice) = decision.notice {
            self.notify(product, notice, None).await;
        }

        Ok(SyncOutcome::updated(status, decision.restore))
    }

    async fn notify(&self, product: &Product, notice: NoticeKind, error: Option<&str>) {
        let to = self.settings.admin_email.trim();
        if to.is_empty() {
            return;
        }

        let (subject, body) = compose_notice(product, notice, error);
        if let Err(e) = self.notifier.send(to, &subject, &body).await {
            warn!("Failed to send notice for product {}: {}", product.id, e);
        }
    }
}

fn append_log(store: &mut SqliteStorage, entry: &SyncLogEntry) {
    if let Err(e) = store.append_log(entry) {
        warn!("Failed to append sync log for product {}: {}", entry.product_id, e);
    }
}

/// Builds the subject and body of an admin notice
pub fn compose_notice(product: &Product, notice: NoticeKind, error: Option<&str>) -> (String, String) {
    let label = product.label();
    let error = error.unwrap_or("none");

    match notice {
        NoticeKind::Hidden => (
            format!("[Price Sync] Product hidden: {}", label),
            format!(
                "Price sync failed for the following product:\n\n\
                 Product: {}\nProduct ID: {}\nError: {}\n\n\
                 The product has been hidden from your catalog until the issue is resolved.\n",
                label, product.id, error
            ),
        ),
        NoticeKind::ApproachingThreshold => (
            format!("[Price Sync] Sync error: {}", label),
            format!(
                "Price sync failed for the following product:\n\n\
                 Product: {}\nProduct ID: {}\nError: {}\n\n\
                 The product is still visible. It will be hidden if syncing keeps failing.\n",
                label, product.id, error
            ),
        ),
        NoticeKind::Restored => (
            format!("[Price Sync] Product restored: {}", label),
            format!(
                "Price sync succeeded again for the following product:\n\n\
                 Product: {}\nProduct ID: {}\n\n\
                 The product is visible in your catalog again.\n",
                label, product.id
            ),
        ),
    }
}
