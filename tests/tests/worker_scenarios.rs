//! End-to-end scenarios for the ingestion worker over a fake queue.
//!
//! These tests verify counter consistency under concurrent dispatch, that
//! decode failures stay contained, and that the worker drains on every exit
//! path.

use integration_tests::{
    fixtures,
    mocks::FakeQueue,
    setup::{wait_until, TestContext},
};
use std::time::Duration;
use worker::{StopReason, WorkerState};

/// Scenario A: 1,000 unique sightings are all counted after drain.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_thousand_sightings_are_all_counted() {
    let ctx = TestContext::new(FakeQueue::with_messages(fixtures::sightings(1000)));
    let controller = ctx.start().await;

    assert!(ctx.wait_for_reads(1000).await, "Worker did not read every message");
    let report = controller.stop().await;

    let snapshot = ctx.metrics.snapshot();
    assert_eq!(snapshot.events_processed(), 1000);
    assert_eq!(snapshot.decode_failures(), 0);
    assert_eq!(report.messages_read, 1000);
    assert_eq!(report.tasks_abandoned, 0);
    assert!(report.is_clean());
    assert_eq!(ctx.metrics.tasks_in_flight.get(), 0);
    assert_eq!(ctx.queue.closes(), 1);
}

/// Scenario B: malformed messages are dropped without touching the processed count.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_batch_counts_only_valid_sightings() {
    let valid = fixtures::sightings(10);
    let invalid = fixtures::malformed(5);

    // Interleave: two valid, one invalid, ...
    let mut payloads = Vec::new();
    let mut invalid = invalid.into_iter();
    for (i, payload) in valid.into_iter().enumerate() {
        payloads.push(payload);
        if i % 2 == 1 {
            payloads.extend(invalid.next());
        }
    }
    payloads.extend(invalid);
    assert_eq!(payloads.len(), 15);

    let ctx = TestContext::new(FakeQueue::with_messages(payloads));
    let controller = ctx.start().await;

    assert!(ctx.wait_for_reads(15).await);
    let report = controller.stop().await;

    let snapshot = ctx.metrics.snapshot();
    assert_eq!(snapshot.events_processed(), 10);
    assert_eq!(snapshot.decode_failures(), 5);
    assert_eq!(snapshot.messages_consumed(), 15);
    assert_eq!(report.reason, StopReason::Cancelled);
}

/// Scenario C: cancelling mid-stream abandons unread messages without error.
#[tokio::test]
async fn test_cancel_mid_stream() {
    let queue = FakeQueue::with_messages(fixtures::sightings(100)).stall_after(3);
    let ctx = TestContext::new(queue);
    let controller = ctx.start().await;

    assert!(ctx.wait_for_reads(3).await);
    let report = tokio::time::timeout(Duration::from_secs(5), controller.stop())
        .await
        .expect("Worker did not close in time");

    let processed = ctx.metrics.snapshot().events_processed();
    assert!((3..=100).contains(&processed), "processed = {processed}");
    assert_eq!(report.messages_read, 3);
    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(controller.state(), WorkerState::Closed);
    assert_eq!(ctx.queue.remaining(), 97);
    assert_eq!(ctx.queue.closes(), 1);
}

/// Decode failures never stop the read loop.
#[tokio::test]
async fn test_decode_failures_are_inert() {
    let mut payloads = fixtures::malformed(40);
    payloads.push(fixtures::sighting("TAG-X-after-failures"));

    let ctx = TestContext::new(FakeQueue::with_messages(payloads));
    let controller = ctx.start().await;

    assert!(ctx.wait_for_reads(41).await);
    let metrics = ctx.metrics.clone();
    assert!(
        wait_until(Duration::from_secs(5), move || {
            metrics.decode_failures.get() == 40 && metrics.events_processed.get() == 1
        })
        .await
    );

    assert_eq!(controller.state(), WorkerState::Reading);
    assert!(ctx.health.worker.is_healthy());

    let report = controller.stop().await;
    assert!(report.is_clean());
    assert_eq!(ctx.queue.closes(), 1);
}

/// The optional in-flight ceiling still accounts for every message.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bounded_fan_out_counts_everything() {
    let ctx = TestContext::new(FakeQueue::with_messages(fixtures::sightings(500)))
        .with_max_in_flight(4);
    let controller = ctx.start().await;

    assert!(ctx.wait_for_reads(500).await);
    let report = controller.stop().await;

    assert_eq!(ctx.metrics.snapshot().events_processed(), 500);
    assert!(report.is_clean());
}

/// The in-flight ceiling holds for the whole run, not only at the end.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_ceiling_is_never_exceeded() {
    let ctx = TestContext::new(FakeQueue::with_messages(fixtures::sightings(2000)))
        .with_max_in_flight(4);

    let metrics = ctx.metrics.clone();
    let sampler = tokio::spawn(async move {
        let mut observed = 0;
        while metrics.messages_consumed.get() < 2000 || metrics.tasks_in_flight.get() > 0 {
            observed = observed.max(metrics.tasks_in_flight.get());
            tokio::task::yield_now().await;
        }
        observed
    });

    let controller = ctx.start().await;
    let observed = tokio::time::timeout(Duration::from_secs(10), sampler)
        .await
        .expect("Worker did not finish the batch")
        .unwrap();
    let report = controller.stop().await;

    assert!(observed <= 4, "observed {observed} tasks in flight");
    assert_eq!(ctx.metrics.snapshot().events_processed(), 2000);
    assert!(report.is_clean());
}

/// A fetch error makes the worker drain and close on its own.
#[tokio::test]
async fn test_fetch_error_self_drains() {
    let queue = FakeQueue::with_messages(fixtures::sightings(10)).fail_after(5);
    let ctx = TestContext::new(queue);
    let controller = ctx.start().await;

    let report = tokio::time::timeout(Duration::from_secs(5), controller.wait())
        .await
        .expect("Worker did not drain after fetch error");

    assert!(matches!(report.reason, StopReason::FetchFailed(ref msg) if msg.contains("connection reset")));
    assert_eq!(report.messages_read, 5);
    assert!(controller.is_finished());
    assert_eq!(ctx.queue.closes(), 1);

    let snapshot = ctx.metrics.snapshot();
    assert_eq!(snapshot.events_processed(), 5);
    assert_eq!(snapshot.counter(telemetry::FETCH_ERRORS), 1);

    assert!(!ctx.health.worker.is_healthy());
    assert!(ctx
        .health
        .worker
        .message()
        .unwrap_or_default()
        .contains("connection reset"));

    // Stopping afterwards returns the same terminal report.
    assert_eq!(controller.stop().await, report);
    assert_eq!(ctx.queue.closes(), 1);
}

/// A failing close is reported but the worker still reaches Closed.
#[tokio::test]
async fn test_close_error_is_reported() {
    let queue = FakeQueue::with_messages(fixtures::sightings(2)).fail_close();
    let ctx = TestContext::new(queue);
    let controller = ctx.start().await;

    assert!(ctx.wait_for_reads(2).await);
    let report = controller.stop().await;

    assert_eq!(
        report.close_error.as_deref(),
        Some("close error: socket already closed")
    );
    assert!(!report.is_clean());
    assert_eq!(controller.state(), WorkerState::Closed);
    assert_eq!(ctx.metrics.snapshot().events_processed(), 2);
}
