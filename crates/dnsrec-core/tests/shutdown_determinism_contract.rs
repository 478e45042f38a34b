//! Contract Test: Shutdown Determinism
//!
//! Constraints verified:
//! - Requests still queued at shutdown resolve with `Cancelled`
//! - Requests buffered in the worker channel resolve with `Cancelled`
//! - Submissions after stop fail with `NotRunning` instead of vanishing
//! - The service joins every task, deregisters its entities and closes
//!   its proxies
//!
//! If this test fails, someone has added:
//! - Detached background tasks
//! - Tasks that ignore cancellation
//! - A path that drops a request without resolving it

mod common;

use common::*;
use dnsrec_core::error::Error;
use dnsrec_core::pipeline::{
    AttemptCeiling, Request, RequestQueue, RetryingRequestQueue,
};
use dnsrec_core::registry::EntityRegistry;
use dnsrec_core::worker::Worker;
use dnsrec_core::SyncService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn queued_requests_are_cancelled_at_shutdown() {
    let provider = Arc::new(MockProvider::new().with_record("example.com", "A", "www", "1", "1.2.3.4"));
    provider.set_delay(Duration::from_millis(300));

    let cancel = CancellationToken::new();
    let (worker_tx, worker_rx) = mpsc::channel(1);
    let (queue, queue_handle) = RequestQueue::new(worker_tx);
    let (retry, retry_handle) = RetryingRequestQueue::new(
        queue_handle.clone(),
        Arc::new(AttemptCeiling::default()),
        Duration::ZERO,
    );
    let worker = Worker::new(provider.clone(), worker_rx, Duration::from_secs(300));

    let tasks = vec![
        tokio::spawn(queue.run()),
        tokio::spawn(retry.run()),
        tokio::spawn(worker.run(cancel.clone())),
    ];

    let mut receivers = Vec::new();
    for _ in 0..3 {
        let (request, rx) = Request::get("example.com", "A", "www");
        assert_ok!(retry_handle.enqueue(request));
        receivers.push(rx);
    }

    // Let the first request reach the (slow) provider
    tokio::time::sleep(Duration::from_millis(50)).await;

    retry_handle.stop();
    queue_handle.stop();
    cancel.cancel();

    for rx in receivers {
        let result = within(rx).await.expect("result channel must be written");
        assert!(
            matches!(result, Err(Error::Cancelled)),
            "expected Cancelled, got {:?}",
            result
        );
    }

    for task in tasks {
        assert_ok!(within(task).await);
    }

    let (late, _rx) = Request::get("example.com", "A", "www");
    assert!(matches!(retry_handle.enqueue(late), Err(Error::NotRunning)));
    let (late, _rx) = Request::get("example.com", "A", "www");
    assert!(matches!(queue_handle.enqueue(late), Err(Error::NotRunning)));
}

#[tokio::test]
async fn worker_cancels_buffered_requests() {
    let provider = Arc::new(MockProvider::new());
    let cancel = CancellationToken::new();
    let (worker_tx, worker_rx) = mpsc::channel(4);

    let mut receivers = Vec::new();
    for name in ["a", "b", "c"] {
        let (request, rx) = Request::get("example.com", "A", name);
        assert_ok!(worker_tx.send(request).await);
        receivers.push(rx);
    }

    cancel.cancel();
    within(Worker::new(provider.clone(), worker_rx, Duration::ZERO).run(cancel)).await;

    for rx in receivers {
        assert!(matches!(within(rx).await, Ok(Err(Error::Cancelled))));
    }
    assert_eq!(provider.total_calls(), 0, "cancelled requests never reach the provider");
}

#[tokio::test]
async fn service_shutdown_deregisters_and_closes_proxies() {
    let provider = Arc::new(
        MockProvider::new()
            .with_record("example.com", "A", "www", "1", "1.2.3.4")
            .with_record("example.com", "TXT", "_acme", "2", "token"),
    );
    let registry = Arc::new(EntityRegistry::new());
    let config = config_for(&[("example.com", "A", "www"), ("example.com", "TXT", "_acme")]);

    let service = within(SyncService::start(provider.clone(), registry.clone(), config))
        .await
        .expect("service starts");
    assert_eq!(registry.len(), 2);

    let stubs = within(service.handle().stubs()).await.unwrap();
    assert_eq!(stubs.len(), 2);

    assert_ok!(within(service.shutdown()).await);

    assert!(registry.is_empty(), "entities are deregistered on stop");
    for stub in &stubs {
        assert!(stub.is_closed());
        assert!(matches!(
            within(stub.data()).await,
            Err(Error::EntityUnavailable(_))
        ));
    }
}

#[tokio::test]
async fn handle_fails_fast_after_shutdown() {
    let provider = Arc::new(MockProvider::new());
    let service = within(SyncService::start(
        provider,
        Arc::new(EntityRegistry::new()),
        config_for(&[("example.com", "A", "www")]),
    ))
    .await
    .expect("service starts");
    let handle = service.handle();

    assert_ok!(within(service.shutdown()).await);

    assert_err!(within(handle.status_and_entities()).await);
    assert_err!(within(handle.refresh()).await);
    assert_err!(within(handle.stub("example.com", "A", "www")).await);
}
