//! Tests for the acknowledgement-set manager

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;

#[test]
fn test_inactive_manager_creates_inactive_sets() {
    let manager = AcknowledgementSetManager::inactive();
    let fired = Arc::new(AtomicBool::new(false));
    let f = Arc::clone(&fired);

    let set = manager.create(move |_| f.store(true, Ordering::SeqCst), Duration::from_secs(1));
    assert!(!manager.is_active());
    assert!(!set.is_active());
    assert_eq!(manager.pending_sets(), 0);
    assert_eq!(manager.sweep(), 0);

    set.complete();
    assert!(!fired.load(Ordering::SeqCst));
}

#[test]
fn test_create_registers_set() {
    let manager = AcknowledgementSetManager::new();
    let set = manager.create(|_| {}, Duration::from_secs(5));
    let id = set.id().unwrap();

    assert!(manager.contains(id));
    assert_eq!(manager.pending_sets(), 1);
    assert_eq!(manager.metrics().sets_created, 1);
}

#[test]
fn test_ids_are_unique() {
    let manager = AcknowledgementSetManager::new();
    let a = manager.create(|_| {}, Duration::from_secs(5));
    let b = manager.create(|_| {}, Duration::from_secs(5));
    assert_ne!(a.id(), b.id());
}

#[test]
fn test_acquire_and_release_through_manager() {
    let manager = AcknowledgementSetManager::new();
    let fired = Arc::new(AtomicBool::new(false));
    let f = Arc::clone(&fired);
    let set = manager.create(move |ok| f.store(ok, Ordering::SeqCst), Duration::from_secs(5));

    let handle = set.add().unwrap().unwrap();
    let copy = manager.acquire(&handle);
    set.complete();

    assert!(manager.release(&handle, true));
    assert!(!manager.release(&handle, true));
    assert!(!fired.load(Ordering::SeqCst));

    assert!(manager.release(&copy, true));
    assert!(fired.load(Ordering::SeqCst));
    assert_eq!(manager.metrics().sets_acknowledged, 1);
}

#[test]
fn test_sweep_removes_only_expired_sets() {
    let manager = AcknowledgementSetManager::new();
    let short = manager.create(|_| {}, Duration::from_millis(5));
    let _short_handle = short.add().unwrap();
    let long = manager.create(|_| {}, Duration::from_secs(60));
    let _long_handle = long.add().unwrap();

    std::thread::sleep(Duration::from_millis(20));

    assert_eq!(manager.sweep(), 1);
    assert_eq!(manager.pending_sets(), 1);
    assert!(manager.contains(long.id().unwrap()));
    assert!(short.is_expired());
}

#[test]
fn test_sweep_after_negative_completion_does_not_count_expiry() {
    let manager = AcknowledgementSetManager::new();
    let set = manager.create(|_| {}, Duration::from_millis(5));
    let a = set.add().unwrap().unwrap();
    let _b = set.add().unwrap().unwrap();
    set.complete();
    a.release(false);

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(manager.sweep(), 1);

    let metrics = manager.metrics();
    assert_eq!(metrics.sets_failed, 1);
    assert_eq!(metrics.sets_expired, 0);
}

#[tokio::test]
async fn test_sweeper_task_discards_expired_sets() {
    let manager = AcknowledgementSetManager::new();
    let cancel = CancellationToken::new();
    let sweeper = manager.spawn_sweeper(Duration::from_millis(5), cancel.clone());

    let set = manager.create(|_| {}, Duration::from_millis(10));
    let _handle = set.add().unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while manager.pending_sets() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sweeper did not discard the set");

    sweeper.shutdown().await;
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn test_sweeper_exits_for_inactive_manager() {
    let manager = AcknowledgementSetManager::inactive();
    let sweeper = manager.spawn_sweeper(Duration::from_millis(5), CancellationToken::new());

    tokio::time::timeout(Duration::from_secs(1), async {
        while !sweeper.is_finished() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("sweeper should exit immediately");
}
