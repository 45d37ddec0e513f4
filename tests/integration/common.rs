//! Shared fixtures for the integration tests

use async_trait::async_trait;
use price_sync::config::SyncSettings;
use price_sync::output::RecordingNotifier;
use price_sync::storage::{ProductImport, ProductStore, SqliteStorage};
use price_sync::sync::{BatchCoordinator, FetchResult, Fetcher, SyncExecutor};
use price_sync::url::StaticResolver;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const ADMIN: &str = "admin@shop.example";

/// Fetcher answering from a fixed table of URL to response
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: Mutex<HashMap<String, FetchResult>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `html` for `url`
    pub fn page(&self, url: &str, html: &str) {
        self.respond(
            url,
            FetchResult::Success {
                final_url: url.to_string(),
                status_code: 200,
                body: html.to_string(),
            },
        );
    }

    pub fn respond(&self, url: &str, result: FetchResult) {
        self.pages.lock().unwrap().insert(url.to_string(), result);
    }

    /// URLs requested so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url, _timeout: Duration, _user_agent: &str) -> FetchResult {
        self.calls.lock().unwrap().push(url.to_string());
        self.pages
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .unwrap_or(FetchResult::HttpError { status_code: 404 })
    }
}

/// HTML with one regular price
pub fn price_page(regular: &str) -> String {
    format!(
        r#"<html><body><h1>Item</h1><span class="price">${}</span></body></html>"#,
        regular
    )
}

/// HTML with a regular and a sale price
pub fn sale_page(regular: &str, sale: &str) -> String {
    format!(
        r#"<html><body>
        <span class="price">${}</span>
        <span class="sale-price">${}</span>
        </body></html>"#,
        regular, sale
    )
}

pub fn supplier_url(id: i64) -> String {
    format!("https://supplier.example.com/item/{}", id)
}

pub fn import(id: i64) -> ProductImport {
    ProductImport {
        id,
        name: format!("Item {}", id),
        source_url: supplier_url(id),
        sync_enabled: true,
        add_tax: false,
        add_margin: false,
        margin_percent: 10.0,
    }
}

pub fn settings() -> SyncSettings {
    SyncSettings {
        batch_size: 5,
        max_errors: 1,
        admin_email: ADMIN.to_string(),
        throttle_ms: 0,
        ..SyncSettings::default()
    }
}

/// Everything a test needs to drive and inspect a run
pub struct Harness {
    pub storage: Arc<Mutex<SqliteStorage>>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub settings: SyncSettings,
}

impl Harness {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            storage: Arc::new(Mutex::new(
                SqliteStorage::new_in_memory().expect("Failed to create storage"),
            )),
            fetcher: Arc::new(ScriptedFetcher::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            settings,
        }
    }

    /// Adds products `1..=count`, each with a page priced at `$10.00`
    pub fn with_products(self, count: i64) -> Self {
        for id in 1..=count {
            self.add(import(id));
            self.fetcher.page(&supplier_url(id), &price_page("10.00"));
        }
        self
    }

    pub fn add(&self, product: ProductImport) {
        self.storage
            .lock()
            .unwrap()
            .upsert_product(&product)
            .expect("Failed to insert product");
    }

    pub fn executor(&self) -> SyncExecutor {
        let resolver = StaticResolver::new()
            .with("supplier.example.com", IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)))
            .with("intranet.example.com", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)));

        SyncExecutor::new(self.storage.clone(), self.fetcher.clone(), self.settings.clone())
            .with_resolver(Arc::new(resolver))
            .with_notifier(self.notifier.clone())
    }

    pub fn coordinator(&self) -> BatchCoordinator {
        BatchCoordinator::new(self.executor())
            .with_throttle(Duration::ZERO)
            .with_time_budget(Duration::from_secs(60))
    }

    pub fn product(&self, id: i64) -> price_sync::storage::Product {
        self.storage
            .lock()
            .unwrap()
            .get_product(id)
            .expect("Failed to load product")
            .expect("Product missing")
    }
}
