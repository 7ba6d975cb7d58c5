//! Tests for the health and metrics endpoints.
//!
//! These run the real router against a worker reading from a fake queue.

use axum::http::StatusCode;
use axum_test::TestServer;
use integration_tests::{fixtures, mocks::FakeQueue, setup::TestContext};
use worker::WorkerController;

/// Test /health endpoint returns proper structure
#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new(FakeQueue::new());
    let controller = ctx.start().await;
    let server =
        TestServer::new(ctx.router(controller.status())).expect("Failed to create test server");

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    for field in [
        "status",
        "service",
        "mode",
        "worker_state",
        "worker_healthy",
        "redpanda_connected",
        "events_processed",
    ] {
        assert!(body.get(field).is_some(), "Response should have '{field}' field");
    }

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "Watchtower Inventory");
    assert_eq!(body["worker_state"], "reading");
    assert_eq!(body["worker_healthy"], true);

    controller.stop().await;
}

/// A stopped worker shows up in /health and /health/ready
#[tokio::test]
async fn test_health_reflects_stopped_worker() {
    let ctx = TestContext::new(FakeQueue::new());
    let controller = ctx.start().await;
    let server =
        TestServer::new(ctx.router(controller.status())).expect("Failed to create test server");

    server.get("/health/ready").await.assert_status_ok();

    controller.stop().await;

    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let body: serde_json::Value = server.get("/health").await.json();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["worker_state"], "closed");
    assert_eq!(body["worker_healthy"], false);
    assert_eq!(body["worker_message"], "worker closed");
}

/// Test /health/live endpoint always returns 200 when service is running
#[tokio::test]
async fn test_live_endpoint() {
    let ctx = TestContext::new(FakeQueue::new().fail_subscribe());
    let worker = ctx.worker();
    let status = worker.status();
    assert!(WorkerController::start(worker).await.is_err());

    let server = TestServer::new(ctx.router(status)).expect("Failed to create test server");
    server.get("/health/live").await.assert_status_ok();
    server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

/// Test /metrics exposes the processed counter after ingestion
#[tokio::test]
async fn test_metrics_endpoint() {
    let mut payloads = fixtures::sightings(12);
    payloads.extend(fixtures::malformed(3));

    let ctx = TestContext::new(FakeQueue::with_messages(payloads));
    let controller = ctx.start().await;
    assert!(ctx.wait_for_reads(15).await);
    controller.stop().await;

    let server =
        TestServer::new(ctx.router(controller.status())).expect("Failed to create test server");
    let response = server.get("/metrics").await;
    response.assert_status_ok();

    let text = response.text();
    assert!(text.contains("# TYPE inventory_rfid_events_total counter"));
    assert!(text.contains("\ninventory_rfid_events_total 12\n"));
    assert!(text.contains("\ninventory_rfid_decode_failures_total 3\n"));
    assert!(text.contains("\ninventory_rfid_tasks_in_flight 0\n"));
}
