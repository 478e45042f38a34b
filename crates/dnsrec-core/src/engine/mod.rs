//! Synchronizer engine
//!
//! [`SyncService`] wires the components together and owns their lifecycle;
//! [`SyncHandle`] is the cheap, cloneable way in for everything else.
//!
//! ## Architecture
//!
//! ```text
//!  DnsRecordStub / SyncHandle
//!          │ exec(closure)
//!          ▼
//! ┌──────────────────┐  enqueue   ┌──────────────────────┐
//! │ OwnerLoop        │──────────► │ RetryingRequestQueue │
//! │  SyncState       │            └──────────────────────┘
//! │  (records, host) │                       │ one attempt at a time
//! └──────────────────┘                       ▼
//!          ▲                      ┌──────────────────────┐
//!          │ apply result         │ RequestQueue         │
//!          │                      └──────────────────────┘
//!   delivery task                            │
//!          ▲                                 ▼
//!          │ terminal result      ┌──────────────────────┐
//!          └────────────────────── │ Worker ── provider   │
//!                                 └──────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. [`SyncService::start`] validates the configuration, spawns the
//!    pipeline, the worker and the owner loop, registers every record with
//!    the entity host, then starts the poller
//! 2. Callers use [`SyncHandle`] and [`DnsRecordStub`] proxies
//! 3. [`SyncService::shutdown`] stops intake, cancels pending requests,
//!    waits for every task, deregisters the records and closes their proxies

pub mod poller;
pub mod status;

pub use status::{StatusAndEntities, SyncStatus};

use crate::config::{record_key, SyncConfig};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::pipeline::{
    AttemptCeiling, QueueStats, RecordResult, Request, RequestQueue, RequestQueueHandle,
    ResultReceiver, RetryQueueHandle, RetryingRequestQueue,
};
use crate::record::{DnsRecord, DnsRecordData, DnsRecordStub};
use crate::traits::{DnsProvider, EntityHost, DNS_RECORD_ENTITY_TYPE};
use crate::worker::Worker;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type ApplyFn = fn(&mut DnsRecord, &RecordResult);

/// Outcome of one record's refresh, as reported back to the refresh pass
type Delivery = JoinHandle<std::result::Result<(), String>>;

/// State confined to the owner loop
///
/// Every method runs on the owner loop, reached through
/// [`Dispatcher::exec`] or [`Dispatcher::enqueue`].
pub struct SyncState {
    dispatcher: Dispatcher<SyncState>,
    host: Arc<dyn EntityHost>,
    records: BTreeMap<String, DnsRecord>,
    retry_queue: RetryQueueHandle,
    queue_stats: watch::Receiver<QueueStats>,
    running: bool,
}

impl SyncState {
    /// Record tracked under `key`
    pub fn record(&self, key: &str) -> Option<&DnsRecord> {
        self.records.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &DnsRecord> {
        self.records.values()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Submit a request to the pipeline
    pub fn enqueue_request(&self, request: Request) -> Result<()> {
        if !self.running {
            return Err(Error::NotRunning);
        }
        self.retry_queue.enqueue(request)
    }

    /// Submit an update of the record under `key` to `value`
    ///
    /// The terminal result is applied to the record when it arrives.
    pub fn update_value(&mut self, key: &str, value: String) -> Result<()> {
        let record = self
            .records
            .get(key)
            .ok_or_else(|| Error::entity_unavailable(format!("{} is not tracked", key)))?;

        let (request, rx) = Request::update(record.domain(), record.data(), value);
        self.enqueue_request(request)?;
        self.spawn_delivery(key.to_string(), rx, DnsRecord::apply_update_result);
        Ok(())
    }

    /// Submit a get for the record under `key`
    pub fn refresh_record(&mut self, key: &str) -> Result<Delivery> {
        let record = self
            .records
            .get(key)
            .ok_or_else(|| Error::entity_unavailable(format!("{} is not tracked", key)))?;

        let (request, rx) = Request::get(record.domain(), record.record_type(), record.name());
        self.enqueue_request(request)?;
        Ok(self.spawn_delivery(key.to_string(), rx, DnsRecord::apply_get_result))
    }

    /// Submit a get for every tracked record
    ///
    /// Records whose request could not be enqueued are reported in the
    /// returned error list instead of stopping the pass.
    fn start_refresh(&mut self) -> Result<(Vec<Delivery>, Vec<String>)> {
        if !self.running {
            return Err(Error::NotRunning);
        }

        let keys: Vec<String> = self.records.keys().cloned().collect();
        let mut deliveries = Vec::with_capacity(keys.len());
        let mut errors = Vec::new();

        for key in keys {
            match self.refresh_record(&key) {
                Ok(delivery) => deliveries.push(delivery),
                Err(e) => errors.push(format!("{}: {}", key, e)),
            }
        }

        Ok((deliveries, errors))
    }

    /// Wait for a request's terminal result and apply it on the owner loop
    fn spawn_delivery(&self, key: String, rx: ResultReceiver, apply: ApplyFn) -> Delivery {
        let dispatcher = self.dispatcher.clone();

        tokio::spawn(async move {
            let result = rx.await.unwrap_or(Err(Error::Cancelled));
            let summary = match &result {
                Ok(_) => Ok(()),
                Err(e) => Err(format!("{}: {}", key, e)),
            };

            let apply_key = key.clone();
            let applied = dispatcher.enqueue(move |state| {
                if let Some(record) = state.records.get_mut(&apply_key) {
                    apply(record, &result);
                }
            });
            if let Err(e) = applied {
                warn!("Result for {} was not applied: {}", key, e);
            }

            summary
        })
    }

    /// Proxy for the record under `key`
    pub fn stub(&mut self, key: &str) -> Option<Arc<DnsRecordStub>> {
        let dispatcher = self.dispatcher.clone();
        self.records.get_mut(key).map(|record| record.stub(&dispatcher))
    }

    /// Proxies for every tracked record, in key order
    pub fn stubs(&mut self) -> Vec<Arc<DnsRecordStub>> {
        let dispatcher = self.dispatcher.clone();
        self.records
            .values_mut()
            .map(|record| record.stub(&dispatcher))
            .collect()
    }

    /// Register the record under `key` with the entity host
    pub fn register_record(&mut self, key: &str) -> Result<String> {
        let record = self
            .records
            .get_mut(key)
            .ok_or_else(|| Error::entity_unavailable(format!("{} is not tracked", key)))?;

        if let Some(existing) = record.host_entity_id() {
            return Err(Error::Other(format!(
                "{} is already registered as {}",
                record.id(),
                existing
            )));
        }

        let host_id = self
            .host
            .register_entity(record.id(), DNS_RECORD_ENTITY_TYPE, record.name())?;
        record.set_host_entity_id(host_id.clone())?;
        Ok(host_id)
    }

    /// Submit an update for every record configured with a desired value
    fn push_desired_values(&mut self, desired: Vec<(String, String)>) {
        for (key, value) in desired {
            match self.update_value(&key, value) {
                Ok(()) => debug!("Desired value submitted for {}", key),
                Err(e) => warn!("Could not submit desired value for {}: {}", key, e),
            }
        }
    }

    fn register_entities(&mut self) {
        let keys: Vec<String> = self.records.keys().cloned().collect();
        for key in keys {
            match self.register_record(&key) {
                Ok(host_id) => debug!("Registered {} as {}", key, host_id),
                Err(e) => warn!("Error registering {}: {}", key, e),
            }
        }
    }

    fn deregister_entities(&mut self) {
        for (key, record) in self.records.iter_mut() {
            if let Some(host_id) = record.host_entity_id().map(str::to_string) {
                match self.host.deregister_entity(&host_id) {
                    Ok(()) => {
                        record.clear_host_entity_id();
                    }
                    Err(e) => warn!("Error deregistering {}: {}", key, e),
                }
            }

            record.close_stub();
        }
    }

    /// Aggregated status plus every record snapshot
    pub fn status_and_entities(&self) -> StatusAndEntities {
        let mut records: Vec<DnsRecordData> = self.records.values().map(|r| r.data()).collect();
        let status = status::aggregate(
            &records,
            &self.queue_stats.borrow(),
            &self.retry_queue.stats(),
        );
        status::sort_for_display(&mut records);

        StatusAndEntities { status, records }
    }
}

/// Cloneable entry point for callers outside the owner loop
#[derive(Clone, Debug)]
pub struct SyncHandle {
    dispatcher: Dispatcher<SyncState>,
}

impl SyncHandle {
    /// Proxy for a configured record
    pub async fn stub(
        &self,
        domain: &str,
        record_type: &str,
        name: &str,
    ) -> Result<Arc<DnsRecordStub>> {
        let key = record_key(domain, record_type, name);
        let lookup = key.clone();
        self.dispatcher
            .exec(move |state| state.stub(&lookup))
            .await?
            .ok_or_else(|| Error::entity_unavailable(format!("{} is not tracked", key)))
    }

    /// Proxies for every configured record
    pub async fn stubs(&self) -> Result<Vec<Arc<DnsRecordStub>>> {
        self.dispatcher.exec(|state| state.stubs()).await
    }

    /// Aggregated status plus every record snapshot
    pub async fn status_and_entities(&self) -> Result<StatusAndEntities> {
        self.dispatcher
            .exec(|state| state.status_and_entities())
            .await
    }

    /// Blocking variant of [`SyncHandle::status_and_entities`] for plain OS threads
    pub fn blocking_status_and_entities(&self) -> Result<StatusAndEntities> {
        self.dispatcher
            .exec_blocking(|state| state.status_and_entities())
    }

    /// Refresh every record from the provider and wait for the results
    ///
    /// Every record is attempted even when some fail. The failures of the
    /// pass are reported together as [`Error::Refresh`]. Returns the number
    /// of records refreshed.
    pub async fn refresh(&self) -> Result<usize> {
        let (deliveries, mut errors) = self
            .dispatcher
            .exec(|state| state.start_refresh())
            .await??;

        let mut refreshed = 0usize;
        for delivery in deliveries {
            match delivery.await {
                Ok(Ok(())) => refreshed += 1,
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(format!("delivery task failed: {}", e)),
            }
        }

        if errors.is_empty() {
            Ok(refreshed)
        } else {
            Err(Error::Refresh(errors))
        }
    }
}

/// Running synchronizer
///
/// Dropping the service without calling [`SyncService::shutdown`] leaves
/// its tasks running until the runtime shuts down.
pub struct SyncService {
    dispatcher: Dispatcher<SyncState>,
    cancel: CancellationToken,
    request_queue: RequestQueueHandle,
    retry_queue: RetryQueueHandle,
    owner: JoinHandle<SyncState>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl SyncService {
    /// Start the synchronizer
    ///
    /// # Parameters
    ///
    /// - `provider`: DNS provider the worker talks to
    /// - `host`: Entity host records are registered with
    /// - `config`: Synchronizer configuration
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Config`] when the configuration is invalid.
    pub async fn start(
        provider: Arc<dyn DnsProvider>,
        host: Arc<dyn EntityHost>,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        let engine = config.engine.clone();

        let cancel = CancellationToken::new();
        let (worker_tx, worker_rx) = mpsc::channel(engine.worker_channel_capacity);

        let (request_queue, request_queue_handle) = RequestQueue::new(worker_tx);
        let (retry_queue, retry_queue_handle) = RetryingRequestQueue::new(
            request_queue_handle.clone(),
            Arc::new(AttemptCeiling::new(engine.max_attempts)),
            engine.retry_delay(),
        );
        let worker = Worker::new(provider.clone(), worker_rx, engine.freshness_window());

        let mut tasks = vec![
            ("request queue", tokio::spawn(request_queue.run())),
            ("retrying request queue", tokio::spawn(retry_queue.run())),
            ("worker", tokio::spawn(worker.run(cancel.clone()))),
        ];

        let (dispatcher, owner_loop) = Dispatcher::channel();
        let mut records = BTreeMap::new();
        let mut desired = Vec::new();
        let mut next_entity_id = 0u64;
        for domain in &config.domains {
            for configured in &domain.records {
                next_entity_id += 1;
                let record = DnsRecord::new(
                    format!("DnsRecord_{}", next_entity_id),
                    &domain.name,
                    &configured.record_type,
                    &configured.name,
                );
                if let Some(value) = &configured.value {
                    desired.push((record.key().to_string(), value.clone()));
                }
                records.insert(record.key().to_string(), record);
            }
        }
        let tracked = records.len();

        let state = SyncState {
            dispatcher: dispatcher.clone(),
            host,
            records,
            retry_queue: retry_queue_handle.clone(),
            queue_stats: request_queue_handle.stats_receiver(),
            running: false,
        };
        let owner = tokio::spawn(owner_loop.run(state));

        let started = dispatcher
            .exec(|state| {
                state.register_entities();
                state.running = true;
                state.push_desired_values(desired);
            })
            .await;

        if let Err(e) = started {
            warn!("Synchronizer failed to start: {}", e);
            retry_queue_handle.stop();
            request_queue_handle.stop();
            cancel.cancel();
            for (name, task) in tasks {
                if let Err(e) = task.await {
                    warn!("Task {} ended abnormally: {}", name, e);
                }
            }
            dispatcher.stop();
            return Err(e);
        }

        let handle = SyncHandle {
            dispatcher: dispatcher.clone(),
        };
        tasks.push((
            "poller",
            tokio::spawn(poller::run_poller(
                handle,
                engine.poll_initial_delay(),
                engine.poll_interval(),
                cancel.clone(),
            )),
        ));

        info!(
            "Synchronizer started: {} record(s), provider {}",
            tracked,
            provider.provider_name()
        );

        Ok(Self {
            dispatcher,
            cancel,
            request_queue: request_queue_handle,
            retry_queue: retry_queue_handle,
            owner,
            tasks,
        })
    }

    /// Handle for callers outside the owner loop
    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            dispatcher: self.dispatcher.clone(),
        }
    }

    /// Stop the synchronizer
    ///
    /// Intake stops first, then every pending request is cancelled and every
    /// task joined. Records are deregistered and their proxies closed only
    /// after the worker has finished. A failing step is logged and teardown
    /// continues; the first failure is returned at the end.
    pub async fn shutdown(self) -> Result<()> {
        info!("Stopping synchronizer...");
        let mut failure = None;

        if let Err(e) = self.dispatcher.exec(|state| state.running = false).await {
            warn!("Could not stop intake on the owner loop: {}", e);
            failure.get_or_insert(e);
        }
        self.retry_queue.stop();
        self.request_queue.stop();
        self.cancel.cancel();

        debug!("Waiting for tasks to finish...");
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                warn!("Task {} ended abnormally: {}", name, e);
            }
        }

        debug!("Tasks stopped, deregistering entities...");
        if let Err(e) = self
            .dispatcher
            .exec(|state| state.deregister_entities())
            .await
        {
            warn!("Could not deregister entities: {}", e);
            failure.get_or_insert(e);
        }

        self.dispatcher.stop();
        if let Err(e) = self.owner.await {
            warn!("Owner loop ended abnormally: {}", e);
            failure.get_or_insert(Error::Other(format!("owner loop ended abnormally: {}", e)));
        }

        match failure {
            None => {
                info!("Synchronizer stopped");
                Ok(())
            }
            Some(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::traits::{EditRecord, RetrieveResponse, StatusResponse};
    use async_trait::async_trait;

    struct EmptyZone;

    #[async_trait]
    impl DnsProvider for EmptyZone {
        async fn retrieve_by_name_type(
            &self,
            _domain: &str,
            _record_type: &str,
            _name: &str,
        ) -> Result<RetrieveResponse> {
            Ok(RetrieveResponse {
                status: "SUCCESS".to_string(),
                ..Default::default()
            })
        }

        async fn edit_record(
            &self,
            _domain: &str,
            _record_id: &str,
            _record: &EditRecord,
        ) -> Result<StatusResponse> {
            Err(Error::not_found("empty zone"))
        }

        fn provider_name(&self) -> &'static str {
            "empty"
        }
    }

    /// Host whose registration takes the owner loop down
    struct BrokenHost;

    impl EntityHost for BrokenHost {
        fn register_entity(&self, _local_id: &str, _entity_type: &str, _name: &str) -> Result<String> {
            panic!("host unavailable");
        }

        fn deregister_entity(&self, _host_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn config() -> SyncConfig {
        let mut config = SyncConfig::new(ProviderConfig::new("key", "secret"));
        config.add_domain("example.com").add_record("A", "www");
        config.engine.poll_initial_delay_secs = 3600;
        config
    }

    #[tokio::test]
    async fn test_failed_start_stops_spawned_tasks() {
        let provider: Arc<dyn DnsProvider> = Arc::new(EmptyZone);

        let result = SyncService::start(provider.clone(), Arc::new(BrokenHost), config()).await;

        assert!(matches!(result, Err(Error::Dispatch(_))));
        // The worker was joined and released its provider handle
        assert_eq!(Arc::strong_count(&provider), 1);
    }

    #[tokio::test]
    async fn test_shutdown_tears_down_after_owner_loop_died() {
        let provider: Arc<dyn DnsProvider> = Arc::new(EmptyZone);
        let service = SyncService::start(
            provider.clone(),
            Arc::new(crate::registry::EntityRegistry::new()),
            config(),
        )
        .await
        .unwrap();

        service
            .dispatcher
            .enqueue(|_| panic!("owner loop failure"))
            .unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), service.shutdown())
            .await
            .expect("shutdown must not hang");

        assert!(result.is_err());
        assert_eq!(Arc::strong_count(&provider), 1);
    }
}
