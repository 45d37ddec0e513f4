//! Catalog runs: batching, resumption, locking and abort

use crate::common::{import, settings, supplier_url, Harness};
use price_sync::config::SyncSettings;
use price_sync::storage::{ProductStore, StateStore};
use price_sync::sync::{InvocationResult, LockManager, ABORT_KEY, LOCK_KEY};
use price_sync::{StatusSnapshot, TriggerKind};
use std::collections::HashSet;
use std::time::Duration;

async fn run(harness: &Harness, trigger: TriggerKind) -> StatusSnapshot {
    match harness.coordinator().run_one_invocation(trigger).await.unwrap() {
        InvocationResult::Ran(snapshot) => snapshot,
        InvocationResult::AlreadyRunning(_) => panic!("Unexpected lock contention"),
    }
}

#[tokio::test]
async fn test_run_is_split_into_batches() {
    let harness = Harness::new(settings()).with_products(12);

    let first = run(&harness, TriggerKind::Cron).await;
    assert_eq!((first.completed, first.total), (5, 12));
    assert!(first.needs_next_batch);
    assert!(!first.finished);

    let second = run(&harness, TriggerKind::Cron).await;
    assert_eq!(second.completed, 10);
    assert!(second.needs_next_batch);

    let third = run(&harness, TriggerKind::Cron).await;
    assert_eq!(third.completed, 12);
    assert!(third.finished);
    assert!(!third.needs_next_batch);
    assert_eq!(third.percent(), 100);

    let expected: Vec<String> = (1..=12).map(supplier_url).collect();
    assert_eq!(harness.fetcher.calls(), expected);

    // The stored status outlives the run
    let status = harness.coordinator().status().unwrap();
    assert!(status.finished);
    assert_eq!(status.completed, 12);
}

#[tokio::test]
async fn test_failures_are_counted_and_run_continues() {
    let harness = Harness::new(settings()).with_products(3);
    harness.add(import(4));

    let snapshot = run(&harness, TriggerKind::Cron).await;
    assert!(snapshot.finished);
    assert_eq!(snapshot.completed, 3);
    assert_eq!(snapshot.failed, 1);
    assert_eq!(harness.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_empty_catalog_finishes_immediately() {
    let harness = Harness::new(settings());

    let snapshot = run(&harness, TriggerKind::Cron).await;
    assert!(snapshot.finished);
    assert_eq!(snapshot.total, 0);
    assert!(!snapshot.needs_next_batch);
}

#[tokio::test]
async fn test_time_budget_resumes_without_repeats() {
    let harness = Harness::new(settings()).with_products(7);
    let coordinator = harness.coordinator().with_time_budget(Duration::ZERO);

    let mut invocations = 0;
    loop {
        invocations += 1;
        let result = coordinator.run_one_invocation(TriggerKind::Cron).await.unwrap();
        let snapshot = result.snapshot();
        assert_eq!(snapshot.completed, invocations.min(7));
        if !snapshot.needs_next_batch {
            assert!(snapshot.finished);
            break;
        }
        assert!(invocations < 20, "run never finished");
    }

    // One product per invocation, each fetched exactly once
    assert_eq!(invocations, 7);
    let calls = harness.fetcher.calls();
    let unique: HashSet<&String> = calls.iter().collect();
    assert_eq!(calls.len(), 7);
    assert_eq!(unique.len(), 7);
}

#[tokio::test]
async fn test_held_lock_blocks_invocation() {
    let harness = Harness::new(settings()).with_products(2);

    let other = LockManager::new(harness.storage.clone(), TriggerKind::Manual);
    assert!(other.try_acquire(Duration::from_secs(600)).unwrap());

    let result = harness
        .coordinator()
        .run_one_invocation(TriggerKind::Cron)
        .await
        .unwrap();
    assert!(result.already_running());
    assert!(harness.fetcher.calls().is_empty());

    assert!(other.release().unwrap());
    let snapshot = run(&harness, TriggerKind::Cron).await;
    assert!(snapshot.finished);
}

#[tokio::test]
async fn test_lock_released_after_invocation() {
    let harness = Harness::new(settings()).with_products(6);

    run(&harness, TriggerKind::Cron).await;

    let store = harness.storage.lock().unwrap();
    assert!(store.get_claim(LOCK_KEY).unwrap().is_none());
}

#[tokio::test]
async fn test_stale_lock_is_reclaimed_by_cron() {
    let harness = Harness::new(settings()).with_products(1);

    // Taken seven minutes ago and never refreshed
    let crashed = LockManager::new(harness.storage.clone(), TriggerKind::Cron);
    let taken_at = chrono::Utc::now() - chrono::Duration::minutes(7);
    assert!(crashed
        .try_acquire_at(Duration::from_secs(600), taken_at)
        .unwrap());

    // Manual triggers wait ten minutes before reclaiming
    let result = harness
        .coordinator()
        .run_one_invocation(TriggerKind::Manual)
        .await
        .unwrap();
    assert!(result.already_running());

    let snapshot = run(&harness, TriggerKind::Cron).await;
    assert!(snapshot.finished);
    assert_eq!(snapshot.completed, 1);
}

#[tokio::test]
async fn test_abort_stops_run() {
    let harness = Harness::new(settings()).with_products(12);
    let coordinator = harness.coordinator();

    assert!(!coordinator.request_abort().unwrap());

    run(&harness, TriggerKind::Cron).await;
    assert!(coordinator.request_abort().unwrap());

    let snapshot = run(&harness, TriggerKind::Cron).await;
    assert!(snapshot.aborted);
    assert!(!snapshot.finished);
    assert!(!snapshot.needs_next_batch);
    assert_eq!(snapshot.completed, 5);
    assert_eq!(harness.fetcher.calls().len(), 5);

    assert!(coordinator.status().unwrap().aborted);
    assert!(!coordinator.request_abort().unwrap());

    // The next trigger starts a new run from scratch
    let fresh = run(&harness, TriggerKind::Cron).await;
    assert_eq!(fresh.total, 12);
    assert!(!fresh.aborted);
}

#[tokio::test]
async fn test_leftover_abort_flag_ignored_by_new_run() {
    let harness = Harness::new(settings()).with_products(2);
    harness
        .storage
        .lock()
        .unwrap()
        .put_state(
            ABORT_KEY,
            "true",
            chrono::Duration::hours(1),
            chrono::Utc::now(),
        )
        .unwrap();

    let snapshot = run(&harness, TriggerKind::Cron).await;
    assert!(!snapshot.aborted);
    assert_eq!(snapshot.completed, 2);
}

#[tokio::test]
async fn test_queue_puts_never_synced_first() {
    let harness = Harness::new(settings()).with_products(3);
    harness.executor().sync(1).await.unwrap();

    run(&harness, TriggerKind::Cron).await;

    let calls = harness.fetcher.calls();
    assert_eq!(
        calls,
        vec![supplier_url(1), supplier_url(2), supplier_url(3), supplier_url(1)]
    );
}

#[tokio::test]
async fn test_recent_syncs_skipped_unless_manual() {
    let harness = Harness::new(SyncSettings {
        skip_recent_sync: true,
        skip_recent_hours: 24,
        ..settings()
    })
    .with_products(3);
    harness.executor().sync(2).await.unwrap();

    let cron = run(&harness, TriggerKind::Cron).await;
    assert_eq!(cron.total, 2);

    let manual = run(&harness, TriggerKind::Manual).await;
    assert_eq!(manual.total, 3);
}

#[tokio::test]
async fn test_disabled_and_urlless_products_not_queued() {
    let harness = Harness::new(settings()).with_products(2);

    let mut disabled = import(3);
    disabled.sync_enabled = false;
    harness.add(disabled);

    let mut no_url = import(4);
    no_url.source_url = String::new();
    harness.add(no_url);

    let snapshot = run(&harness, TriggerKind::Cron).await;
    assert_eq!(snapshot.total, 2);
}

#[tokio::test]
async fn test_clear_state_resets_everything() {
    let harness = Harness::new(settings()).with_products(8);
    let coordinator = harness.coordinator();

    run(&harness, TriggerKind::Cron).await;
    let holder = LockManager::new(harness.storage.clone(), TriggerKind::Cron);
    assert!(holder.try_acquire(Duration::from_secs(600)).unwrap());

    coordinator.clear_state().unwrap();
    assert!(!holder.is_held().unwrap());

    assert_eq!(coordinator.status().unwrap(), StatusSnapshot::default());
    let fresh = run(&harness, TriggerKind::Cron).await;
    assert_eq!(fresh.total, 8);
    assert_eq!(fresh.completed, 5);

    // Products keep their synced prices across the reset
    let product = harness
        .storage
        .lock()
        .unwrap()
        .get_product(1)
        .unwrap()
        .unwrap();
    assert_eq!(product.regular_price, Some(10.0));
}
