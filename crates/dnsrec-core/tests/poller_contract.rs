//! Contract Test: Poller and Status
//!
//! Constraints verified:
//! - Nothing is fetched during the initial quiescence delay
//! - One refresh pass runs after the delay, then one per interval
//! - Cancellation before the first pass stops the poller without fetching
//! - One record's failure does not stop the others from refreshing, and
//!   the failures of a pass are reported together
//! - Status totals and the record listing reflect the applied results

mod common;

use common::*;
use dnsrec_core::error::Error;
use dnsrec_core::registry::EntityRegistry;
use dnsrec_core::SyncService;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

#[tokio::test(start_paused = true)]
async fn refresh_runs_after_initial_delay_then_on_interval() {
    let provider = Arc::new(MockProvider::new().with_record("example.com", "A", "www", "1", "1.2.3.4"));
    let mut config = config_for(&[("example.com", "A", "www")]);
    config.engine.poll_initial_delay_secs = 20;
    config.engine.poll_interval_secs = 4 * 60 * 60;

    let service = SyncService::start(provider.clone(), Arc::new(EntityRegistry::new()), config)
        .await
        .expect("service starts");

    tokio::time::sleep(Duration::from_secs(19)).await;
    assert_eq!(provider.retrieve_calls(), 0, "quiet during the initial delay");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(provider.retrieve_calls(), 1, "first pass after the initial delay");

    tokio::time::sleep(Duration::from_secs(4 * 60 * 60)).await;
    assert_eq!(provider.retrieve_calls(), 2, "second pass one interval later");

    let stub = service.handle().stub("example.com", "A", "www").await.unwrap();
    assert_eq!(stub.data().await.unwrap().get_success_count, 2);

    assert_ok!(service.shutdown().await);
}

#[tokio::test(start_paused = true)]
async fn shutdown_before_first_pass_fetches_nothing() {
    let provider = Arc::new(MockProvider::new().with_record("example.com", "A", "www", "1", "1.2.3.4"));
    let mut config = config_for(&[("example.com", "A", "www")]);
    config.engine.poll_initial_delay_secs = 20;

    let service = SyncService::start(provider.clone(), Arc::new(EntityRegistry::new()), config)
        .await
        .expect("service starts");

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_ok!(service.shutdown().await);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(provider.retrieve_calls(), 0);
}

#[tokio::test]
async fn refresh_pass_aggregates_failures_and_status_reflects_them() {
    // "api" is not present remotely
    let provider = Arc::new(MockProvider::new().with_record("example.com", "A", "www", "1", "1.2.3.4"));
    let config = config_for(&[("example.com", "A", "www"), ("example.com", "A", "api")]);

    let service = within(SyncService::start(
        provider.clone(),
        Arc::new(EntityRegistry::new()),
        config,
    ))
    .await
    .expect("service starts");
    let handle = service.handle();

    match within(handle.refresh()).await {
        Err(Error::Refresh(failures)) => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].contains("api_example.com.A"), "{:?}", failures);
        }
        other => panic!("expected an aggregated refresh failure, got {:?}", other),
    }
    assert_eq!(provider.retrieve_calls(), 2, "the failure did not stop the other record");

    let listing = within(handle.status_and_entities()).await.unwrap();
    let status = &listing.status;
    assert_eq!(status.total_success_count, 1);
    assert_eq!(status.total_error_count, 1);
    assert!(status
        .last_error_message
        .as_deref()
        .unwrap_or_default()
        .contains("not found"));
    assert!(status.last_error_time.is_some());
    assert!(status.peak_queue_size >= 1);
    assert!(status.peak_queue_size_time.is_some());
    assert!(status.peak_retry_queue_size >= 1);
    assert_eq!(status.current_retry_queue_size, 0);

    let names: Vec<_> = listing.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["api", "www"]);

    // The listing is meant for rendering layers
    let json = serde_json::to_value(&listing).unwrap();
    assert_eq!(json["status"]["total_success_count"], 1);

    assert_ok!(within(service.shutdown()).await);
}
