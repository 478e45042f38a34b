//! Test doubles and common utilities for contract tests
//!
//! The mock provider keeps records in memory, counts calls, and can be told
//! to fail, reject, or slow down.

#![allow(dead_code)]

use dnsrec_core::config::{ProviderConfig, SyncConfig};
use dnsrec_core::error::{Error, Result};
use dnsrec_core::record::{DnsRecordData, DnsRecordStub};
use dnsrec_core::traits::{
    DnsProvider, EditRecord, RecordMessage, RetrieveResponse, StatusResponse, STATUS_SUCCESS,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Upper bound for anything a test awaits
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory DNS provider with call counters
#[derive(Default)]
pub struct MockProvider {
    /// Records keyed by (domain, type, relative name)
    records: Mutex<HashMap<(String, String, String), Vec<RecordMessage>>>,
    retrieve_calls: AtomicUsize,
    edit_calls: AtomicUsize,
    /// Number of upcoming calls that fail with a transport error
    failures_remaining: AtomicUsize,
    always_fail: AtomicBool,
    reject: AtomicBool,
    delay_ms: AtomicUsize,
    edits: Mutex<Vec<(String, String, EditRecord)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record; it is reported with a fully qualified name like the real API
    pub fn with_record(
        self,
        domain: &str,
        record_type: &str,
        name: &str,
        id: &str,
        content: &str,
    ) -> Self {
        self.add_record(domain, record_type, name, id, content);
        self
    }

    pub fn add_record(&self, domain: &str, record_type: &str, name: &str, id: &str, content: &str) {
        let message = RecordMessage {
            id: id.to_string(),
            name: format!("{}.{}", name, domain),
            record_type: record_type.to_string(),
            content: content.to_string(),
            ttl: Some("600".to_string()),
            prio: None,
            notes: Some(String::new()),
        };
        self.records
            .lock()
            .unwrap()
            .entry((domain.to_string(), record_type.to_string(), name.to_string()))
            .or_default()
            .push(message);
    }

    /// Change a record's value behind the synchronizer's back
    pub fn set_content(&self, domain: &str, record_type: &str, name: &str, content: &str) {
        let mut records = self.records.lock().unwrap();
        let key = (domain.to_string(), record_type.to_string(), name.to_string());
        for message in records.get_mut(&key).into_iter().flatten() {
            message.content = content.to_string();
        }
    }

    pub fn content_of(&self, domain: &str, record_type: &str, name: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .get(&(domain.to_string(), record_type.to_string(), name.to_string()))
            .and_then(|records| records.first().map(|r| r.content.clone()))
    }

    /// Fail the next `n` calls with a transport error
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Fail every call with a transport error
    pub fn fail_always(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    /// Answer every call with a non-success status
    pub fn reject_all(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Delay every call
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }

    pub fn edit_calls(&self) -> usize {
        self.edit_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.retrieve_calls() + self.edit_calls()
    }

    pub fn edits(&self) -> Vec<(String, String, EditRecord)> {
        self.edits.lock().unwrap().clone()
    }

    async fn before_call(&self, call: usize) -> Result<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        if self.always_fail.load(Ordering::SeqCst) {
            return Err(Error::network(format!("simulated outage (call {})", call)));
        }

        let scheduled = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if scheduled.is_ok() {
            return Err(Error::network(format!("simulated failure (call {})", call)));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockProvider {
    async fn retrieve_by_name_type(
        &self,
        domain: &str,
        record_type: &str,
        name: &str,
    ) -> Result<RetrieveResponse> {
        let call = self.retrieve_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.before_call(call).await?;

        if self.reject.load(Ordering::SeqCst) {
            return Ok(RetrieveResponse {
                status: "ERROR".to_string(),
                message: Some("Invalid API key".to_string()),
                records: Vec::new(),
            });
        }

        let records = self
            .records
            .lock()
            .unwrap()
            .get(&(domain.to_string(), record_type.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default();

        Ok(RetrieveResponse {
            status: STATUS_SUCCESS.to_string(),
            message: None,
            records,
        })
    }

    async fn edit_record(
        &self,
        domain: &str,
        record_id: &str,
        record: &EditRecord,
    ) -> Result<StatusResponse> {
        let call = self.edit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.before_call(call).await?;

        if self.reject.load(Ordering::SeqCst) {
            return Ok(StatusResponse {
                status: "ERROR".to_string(),
                message: Some("Edit rejected".to_string()),
            });
        }

        self.edits
            .lock()
            .unwrap()
            .push((domain.to_string(), record_id.to_string(), record.clone()));

        let mut records = self.records.lock().unwrap();
        for ((d, _, _), messages) in records.iter_mut() {
            if d != domain {
                continue;
            }
            for message in messages.iter_mut().filter(|m| m.id == record_id) {
                message.content = record.content.clone();
            }
        }

        Ok(StatusResponse {
            status: STATUS_SUCCESS.to_string(),
            message: None,
        })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Configuration tracking `(domain, type, name)` records
///
/// The poller's first pass is pushed out of the way; tests that exercise
/// it set their own schedule.
pub fn config_for(records: &[(&str, &str, &str)]) -> SyncConfig {
    let mut config = SyncConfig::new(ProviderConfig::new("pk1_test", "sk1_test"));
    for (domain, record_type, name) in records {
        let existing = config.domains.iter().position(|d| d.name == *domain);
        let entry = match existing {
            Some(index) => &mut config.domains[index],
            None => config.add_domain(*domain),
        };
        entry.add_record(*record_type, *name);
    }
    config.engine.poll_initial_delay_secs = 3600;
    config
}

/// Await `future`, failing the test if it takes longer than [`TEST_TIMEOUT`]
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("operation should complete, not hang")
}

/// Poll a proxy until its snapshot satisfies `predicate`
pub async fn wait_for_data<P>(stub: &DnsRecordStub, predicate: P) -> DnsRecordData
where
    P: Fn(&DnsRecordData) -> bool,
{
    within(async {
        loop {
            let data = stub.data().await.expect("proxy should be open");
            if predicate(&data) {
                return data;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}
