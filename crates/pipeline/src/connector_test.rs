use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use conduit_acks::AcknowledgementSetManager;
use conduit_buffer::{Buffer, ExhaustionSignal};
use conduit_protocol::{Batch, Event, Record};
use conduit_sinks::{Sink, SinkError};

use super::*;

/// 0 = not fired, 1 = true, 2 = false
fn upstream(manager: &AcknowledgementSetManager, n: usize) -> (Arc<AtomicU8>, Vec<Record>) {
    let result = Arc::new(AtomicU8::new(0));
    let flag = Arc::clone(&result);
    let mut batch = Batch::from_events((0..n).map(|_| Event::new("log")));
    batch
        .register_acknowledgements(
            manager,
            move |ok| flag.store(if ok { 1 } else { 2 }, Ordering::SeqCst),
            Duration::from_secs(30),
        )
        .unwrap();
    (result, batch.into_records())
}

fn connector(buffer: &Buffer, manager: &AcknowledgementSetManager) -> PipelineConnector {
    PipelineConnector::new("pipeline:down", "down", buffer.clone(), manager.clone())
        .with_write_timeout(Duration::from_millis(10))
}

#[tokio::test]
async fn test_forwards_untracked_records() {
    let buffer = Buffer::new("down", 4);
    let manager = AcknowledgementSetManager::new();
    let sink = connector(&buffer, &manager);
    assert!(sink.manages_acknowledgements());

    let records = (0..3).map(|_| Record::new(Event::new("log"))).collect();
    sink.output(records).await.unwrap();

    let batch = buffer.try_read().unwrap();
    assert_eq!(batch.len(), 3);
    assert!(batch.iter().all(|r| r.handle().is_none()));
    assert_eq!(manager.pending_sets(), 0);
}

#[tokio::test]
async fn test_child_set_completes_parent() {
    let buffer = Buffer::new("down", 4);
    let manager = AcknowledgementSetManager::new();
    let sink = connector(&buffer, &manager);
    let (result, records) = upstream(&manager, 3);

    sink.output(records).await.unwrap();
    assert_eq!(result.load(Ordering::SeqCst), 0);

    let mut batch = buffer.try_read().unwrap();
    assert!(batch.iter().all(|r| r.handle().is_some()));
    assert_eq!(batch.release_all(true), 3);
    assert_eq!(result.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_child_failure_fails_parent() {
    let buffer = Buffer::new("down", 4);
    let manager = AcknowledgementSetManager::new();
    let sink = connector(&buffer, &manager);
    let (result, records) = upstream(&manager, 2);

    sink.output(records).await.unwrap();
    let mut batch = buffer.try_read().unwrap();
    batch.records_mut()[0].take_handle().unwrap().release(false);
    drop(batch);

    assert_eq!(result.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_inactive_downstream_settles_on_handoff() {
    let buffer = Buffer::new("down", 4);
    let upstream_manager = AcknowledgementSetManager::new();
    let sink = connector(&buffer, &AcknowledgementSetManager::inactive());
    let (result, records) = upstream(&upstream_manager, 2);

    sink.output(records).await.unwrap();
    assert_eq!(result.load(Ordering::SeqCst), 1);
    assert!(buffer.try_read().unwrap().iter().all(|r| r.handle().is_none()));
}

#[tokio::test]
async fn test_closed_downstream_fails_parent() {
    let buffer = Buffer::new("down", 4);
    buffer.shutdown();
    let manager = AcknowledgementSetManager::new();
    let sink = connector(&buffer, &manager);
    let (result, records) = upstream(&manager, 2);

    let err = sink.output(records).await.unwrap_err();
    assert!(matches!(err, SinkError::Closed));
    assert_eq!(result.load(Ordering::SeqCst), 2);
    assert_eq!(sink.metrics().unwrap().write_errors, 1);
}

#[tokio::test]
async fn test_expired_child_leaves_parent_unresolved() {
    let buffer = Buffer::new("down", 4);
    let manager = AcknowledgementSetManager::new();
    let sink = connector(&buffer, &manager).with_ack_expiry(Duration::from_millis(1));
    let (result, records) = upstream(&manager, 2);

    sink.output(records).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(manager.sweep(), 1);

    let mut batch = buffer.try_read().unwrap();
    batch.release_all(true);
    assert_eq!(result.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_full_buffer_blocks_until_space() {
    let buffer = Buffer::new("down", 1);
    let manager = AcknowledgementSetManager::new();
    let sink = Arc::new(connector(&buffer, &manager));
    sink.output(vec![Record::new(Event::new("log"))]).await.unwrap();

    let pending = {
        let sink = Arc::clone(&sink);
        tokio::spawn(async move { sink.output(vec![Record::new(Event::new("log"))]).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished());

    buffer.try_read().unwrap();
    pending.await.unwrap().unwrap();
    assert_eq!(buffer.len(), 1);
}

#[tokio::test]
async fn test_buffer_that_stays_full_is_escalated() {
    let buffer = Buffer::new("down", 1);
    let manager = AcknowledgementSetManager::new();
    let signal = ExhaustionSignal::new();
    let sink = connector(&buffer, &manager)
        .with_exhaustion(Duration::from_millis(50), signal.clone());
    sink.output(vec![Record::new(Event::new("log"))]).await.unwrap();

    let (result, records) = upstream(&manager, 3);
    let err = sink.output(records).await.unwrap_err();
    assert!(matches!(err, SinkError::Write(_)));
    assert_eq!(result.load(Ordering::SeqCst), 2);
    assert_eq!(sink.metrics().unwrap().write_errors, 1);

    let exhaustion = signal.get().cloned().unwrap();
    assert_eq!(exhaustion.buffer, "down");
    assert_eq!(exhaustion.writer, "pipeline:down");
    assert_eq!(exhaustion.records, 3);
    assert!(exhaustion.waited >= Duration::from_millis(50));
    // the queued batch is untouched
    assert_eq!(buffer.len(), 1);
}
