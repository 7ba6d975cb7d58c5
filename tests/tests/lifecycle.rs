//! Tests for starting and stopping the ingestion worker.

use ingest_core::Error;
use integration_tests::{
    fixtures,
    mocks::FakeQueue,
    setup::{wait_until, TestContext, GROUP_ID, TOPIC},
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use worker::{StopReason, WorkerController, WorkerState};

/// Cancelling while the read loop is blocked closes the subscription exactly once.
#[tokio::test]
async fn test_stop_while_blocked_on_fetch() {
    let ctx = TestContext::new(FakeQueue::new());
    let controller = ctx.start().await;
    assert_eq!(controller.state(), WorkerState::Reading);

    let report = tokio::time::timeout(Duration::from_secs(2), controller.stop())
        .await
        .expect("Worker did not close in time");

    assert_eq!(report.reason, StopReason::Cancelled);
    assert_eq!(report.messages_read, 0);
    assert_eq!(controller.state(), WorkerState::Closed);
    assert_eq!(ctx.queue.closes(), 1);
}

/// Calling stop twice yields the same terminal state as calling it once.
#[tokio::test]
async fn test_stop_is_idempotent() {
    let ctx = TestContext::new(FakeQueue::with_messages(fixtures::sightings(5)));
    let controller = ctx.start().await;
    assert!(ctx.wait_for_reads(5).await);

    let first = controller.stop().await;
    let second = tokio::time::timeout(Duration::from_secs(1), controller.stop())
        .await
        .expect("Second stop deadlocked");

    assert_eq!(first, second);
    assert!(controller.is_finished());
    assert_eq!(ctx.queue.closes(), 1);
    assert_eq!(ctx.metrics.snapshot().events_processed(), 5);
}

/// Concurrent stop calls all observe the same report.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_stops() {
    let ctx = TestContext::new(FakeQueue::new());
    let controller = ctx.start().await;

    let (a, b) = tokio::join!(controller.stop(), controller.stop());
    assert_eq!(a, b);
    assert_eq!(ctx.queue.closes(), 1);
}

/// A subscribe failure surfaces from start and nothing is left running.
#[tokio::test]
async fn test_subscribe_failure_fails_start() {
    let ctx = TestContext::new(FakeQueue::new().fail_subscribe());
    let worker = ctx.worker();
    let status = worker.status();

    let err = WorkerController::start(worker).await.err().expect("start should fail");

    match err {
        Error::Subscribe { topic, group_id, message } => {
            assert_eq!(topic, TOPIC);
            assert_eq!(group_id, GROUP_ID);
            assert_eq!(message, "broker unreachable");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(status.get(), WorkerState::Closed);
    assert_eq!(ctx.queue.subscribes(), 1);
    assert_eq!(ctx.queue.closes(), 0);
    assert!(!ctx.health.worker.is_healthy());
}

/// The worker subscribes with its configured topic and consumer group.
#[tokio::test]
async fn test_subscribes_to_configured_topic() {
    let ctx = TestContext::new(FakeQueue::new());
    let controller = ctx.start().await;

    assert_eq!(
        ctx.queue.subscribed_to(),
        Some((TOPIC.to_string(), GROUP_ID.to_string()))
    );
    controller.stop().await;
}

/// A token handed in by the owner cancels the worker as well.
#[tokio::test]
async fn test_external_token_cancels_worker() {
    let ctx = TestContext::new(FakeQueue::with_messages(fixtures::sightings(3)));
    let token = CancellationToken::new();
    let controller = WorkerController::start_with_token(ctx.worker(), token.clone())
        .await
        .unwrap();

    assert!(ctx.wait_for_reads(3).await);
    token.cancel();

    let report = tokio::time::timeout(Duration::from_secs(2), controller.wait())
        .await
        .expect("Worker ignored the external token");
    assert_eq!(report.reason, StopReason::Cancelled);
    assert!(controller.cancellation_token().is_cancelled());
}

/// Worker state moves forward through the lifecycle.
#[tokio::test]
async fn test_state_transitions() {
    let ctx = TestContext::new(FakeQueue::new());
    let worker = ctx.worker();
    assert_eq!(worker.state(), WorkerState::Idle);

    let controller = WorkerController::start(worker).await.unwrap();
    let status = controller.status();
    assert!(wait_until(Duration::from_secs(2), || status.get() == WorkerState::Reading).await);
    assert!(ctx.health.is_ready());

    controller.stop().await;
    assert_eq!(status.get(), WorkerState::Closed);
    assert!(!ctx.health.is_ready());
}
