//! Single-product sync: prices, failures, hiding and restoration

use crate::common::{import, price_page, sale_page, settings, supplier_url, Harness, ADMIN};
use price_sync::storage::{MetaKey, ProductStore, SyncLog, SyncStatus};
use price_sync::sync::{FetchResult, OutcomeKind};
use price_sync::Visibility;

#[tokio::test]
async fn test_sync_updates_prices() {
    let harness = Harness::new(settings());
    harness.add(import(1));
    harness.fetcher.page(&supplier_url(1), &sale_page("120.00", "99.00"));

    let outcome = harness.executor().sync(1).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.kind, OutcomeKind::Updated);
    assert_eq!(outcome.message, "Success: Prices updated");

    let product = harness.product(1);
    assert_eq!(product.regular_price, Some(120.0));
    assert_eq!(product.sale_price, Some(99.0));
    assert_eq!(product.price, Some(99.0));
    assert_eq!(product.error_count, 0);
    assert_eq!(product.last_status, "Success: Prices updated");
    assert!(product.last_sync_time.is_some());
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_sync_applies_tax_then_margin() {
    let harness = Harness::new(settings());
    let mut product = import(1);
    product.add_tax = true;
    product.add_margin = true;
    product.margin_percent = 20.0;
    harness.add(product);
    harness.fetcher.page(&supplier_url(1), &sale_page("100.00", "80.00"));

    harness.executor().sync(1).await.unwrap();

    let product = harness.product(1);
    assert_eq!(product.regular_price, Some(132.0));
    assert_eq!(product.sale_price, Some(105.6));
    assert_eq!(product.price, Some(105.6));

    // Raw supplier values are kept alongside the adjusted ones
    let store = harness.storage.lock().unwrap();
    assert_eq!(
        store.get_meta(1, MetaKey::ExternalRegularPrice).unwrap().as_deref(),
        Some("100")
    );
}

#[tokio::test]
async fn test_sync_without_sale_clears_sale_price() {
    let harness = Harness::new(settings());
    harness.add(import(1));
    harness.fetcher.page(&supplier_url(1), &sale_page("50.00", "40.00"));
    harness.executor().sync(1).await.unwrap();

    harness.fetcher.page(&supplier_url(1), &price_page("55.00"));
    harness.executor().sync(1).await.unwrap();

    let product = harness.product(1);
    assert_eq!(product.regular_price, Some(55.0));
    assert_eq!(product.sale_price, None);
    assert_eq!(product.price, Some(55.0));
}

#[tokio::test]
async fn test_sync_log_records_old_and_new_prices() {
    let harness = Harness::new(settings());
    harness.add(import(1));
    harness.fetcher.page(&supplier_url(1), &price_page("20.00"));
    harness.executor().sync(1).await.unwrap();

    harness.fetcher.page(&supplier_url(1), &price_page("25.00"));
    harness.executor().sync(1).await.unwrap();

    let store = harness.storage.lock().unwrap();
    let logs = store.logs_for_product(1, 10).unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].status, SyncStatus::Success);
    assert_eq!(logs[0].old_price, 20.0);
    assert_eq!(logs[0].new_price, 25.0);
    assert_eq!(logs[1].old_price, 0.0);
    assert_eq!(logs[1].new_price, 20.0);
}

#[tokio::test]
async fn test_failure_hides_product_and_notifies() {
    let harness = Harness::new(settings());
    harness.add(import(1));
    harness
        .fetcher
        .respond(&supplier_url(1), FetchResult::HttpError { status_code: 503 });

    let outcome = harness.executor().sync(1).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.kind, OutcomeKind::Failed);
    assert!(outcome.counted());

    let product = harness.product(1);
    assert_eq!(product.visibility, Visibility::Hidden);
    assert_eq!(product.error_count, 1);
    assert!(product.error_since.is_some());
    assert_eq!(
        product.last_status,
        "Failed: Hidden after 1 errors - Failed to fetch content from URL (HTTP 503)"
    );

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, ADMIN);
    assert_eq!(sent[0].subject, "[Price Sync] Product hidden: Item 1");
    assert!(sent[0].body.contains("HTTP 503"));
}

#[tokio::test]
async fn test_failures_below_threshold_keep_product_visible() {
    let harness = Harness::new(price_sync::config::SyncSettings {
        max_errors: 3,
        ..settings()
    });
    harness.add(import(1));
    harness.fetcher.page(&supplier_url(1), "<html><body>Call us</body></html>");

    let executor = harness.executor();
    for attempt in 1..=2 {
        let outcome = executor.sync(1).await.unwrap();
        assert_eq!(
            outcome.message,
            format!("Error: No valid regular price found (attempt {}/3)", attempt)
        );
        assert_eq!(harness.product(1).visibility, Visibility::Visible);
    }

    executor.sync(1).await.unwrap();
    let product = harness.product(1);
    assert_eq!(product.visibility, Visibility::Hidden);
    assert_eq!(product.error_count, 3);

    let subjects: Vec<String> = harness.notifier.sent().into_iter().map(|n| n.subject).collect();
    assert_eq!(
        subjects,
        vec![
            "[Price Sync] Sync error: Item 1",
            "[Price Sync] Sync error: Item 1",
            "[Price Sync] Product hidden: Item 1",
        ]
    );
}

#[tokio::test]
async fn test_success_restores_hidden_product() {
    let harness = Harness::new(settings());
    harness.add(import(1));
    harness
        .fetcher
        .respond(&supplier_url(1), FetchResult::EmptyBody);
    harness.executor().sync(1).await.unwrap();
    assert_eq!(harness.product(1).visibility, Visibility::Hidden);

    harness.fetcher.page(&supplier_url(1), &price_page("15.00"));
    let outcome = harness.executor().sync(1).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.kind, OutcomeKind::Restored);
    assert_eq!(outcome.message, "Success: Restored & Prices updated");

    let product = harness.product(1);
    assert_eq!(product.visibility, Visibility::Visible);
    assert_eq!(product.error_count, 0);
    assert!(product.error_since.is_none());

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].subject, "[Price Sync] Product restored: Item 1");
}

#[tokio::test]
async fn test_manually_hidden_product_stays_hidden() {
    let harness = Harness::new(settings());
    harness.add(import(1));
    harness
        .storage
        .lock()
        .unwrap()
        .set_visibility(1, Visibility::Hidden)
        .unwrap();
    harness.fetcher.page(&supplier_url(1), &price_page("15.00"));

    let outcome = harness.executor().sync(1).await.unwrap();
    assert_eq!(outcome.message, "Success: Prices updated");
    assert_eq!(harness.product(1).visibility, Visibility::Hidden);
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_blocked_host_is_not_counted() {
    let harness = Harness::new(settings());
    let mut product = import(1);
    product.source_url = "http://127.0.0.1/x".to_string();
    harness.add(product);

    let outcome = harness.executor().sync(1).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.kind, OutcomeKind::Config);
    assert!(!outcome.counted());

    let product = harness.product(1);
    assert_eq!(product.error_count, 0);
    assert_eq!(product.visibility, Visibility::Visible);
    assert!(product.last_status.starts_with("Error: Blocked host"));
    assert!(harness.fetcher.calls().is_empty());
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_host_resolving_to_private_address_is_blocked() {
    let harness = Harness::new(settings());
    let mut product = import(1);
    product.source_url = "https://intranet.example.com/prices".to_string();
    harness.add(product);

    let outcome = harness.executor().sync(1).await.unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Config);
    assert!(harness.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_unresolvable_host_counts_as_fetch_failure() {
    let harness = Harness::new(settings());
    let mut product = import(1);
    product.source_url = "https://gone.example.net/item".to_string();
    harness.add(product);

    let outcome = harness.executor().sync(1).await.unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Failed);
    assert!(outcome.counted());
    assert!(outcome.message.contains("could not resolve gone.example.net"));
    assert!(harness.fetcher.calls().is_empty());

    let product = harness.product(1);
    assert_eq!(product.error_count, 1);
    assert_eq!(product.visibility, Visibility::Hidden);
}

#[tokio::test]
async fn test_configuration_errors() {
    let harness = Harness::new(settings());

    let mut disabled = import(1);
    disabled.sync_enabled = false;
    harness.add(disabled);

    let mut no_url = import(2);
    no_url.source_url = "   ".to_string();
    harness.add(no_url);

    let mut ftp = import(3);
    ftp.source_url = "ftp://supplier.example.com/list".to_string();
    harness.add(ftp);

    let executor = harness.executor();

    let outcome = executor.sync(1).await.unwrap();
    assert_eq!(outcome.message, "Sync not enabled for this product");

    let outcome = executor.sync(2).await.unwrap();
    assert_eq!(outcome.message, "No URL specified");
    assert_eq!(harness.product(2).last_status, "Error: No URL specified");

    let outcome = executor.sync(3).await.unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Config);

    let outcome = executor.sync(99).await.unwrap();
    assert_eq!(outcome.message, "Product not found");

    for id in [1, 2, 3] {
        assert_eq!(harness.product(id).error_count, 0);
    }
    assert!(harness.fetcher.calls().is_empty());

    // Every attempt leaves an error row behind
    let store = harness.storage.lock().unwrap();
    assert_eq!(store.count_logs_by_status(SyncStatus::Error).unwrap(), 4);
    assert_eq!(store.logs_for_product(99, 5).unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_admin_email_sends_nothing() {
    let harness = Harness::new(price_sync::config::SyncSettings {
        admin_email: String::new(),
        ..settings()
    });
    harness.add(import(1));

    harness.executor().sync(1).await.unwrap();

    assert_eq!(harness.product(1).visibility, Visibility::Hidden);
    assert!(harness.notifier.sent().is_empty());
}
