//! DNS record entities
//!
//! A [`DnsRecord`] is the authoritative local state of one remote record. It
//! lives inside the owner loop's state and is only ever mutated there;
//! everything outside the owner loop sees [`DnsRecordData`] snapshots taken
//! through the [`DnsRecordStub`] proxy.

pub mod stub;

pub use stub::DnsRecordStub;

use crate::dispatch::Dispatcher;
use crate::engine::SyncState;
use crate::error::{Error, Result};
use crate::pipeline::RecordResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Point-in-time snapshot of a DNS record entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordData {
    /// Provider-assigned record id (empty until the first fetch)
    pub id: String,
    /// Record name relative to the domain
    pub name: String,
    pub record_type: String,
    pub value: String,
    pub ttl: i32,
    pub priority: i32,
    pub notes: String,

    /// Last successful fetch from the provider
    pub last_fetched: Option<DateTime<Utc>>,
    /// Last write that actually changed the remote value
    pub last_modified: Option<DateTime<Utc>>,

    pub get_success_count: u64,
    pub get_error_count: u64,
    pub update_success_count: u64,
    pub update_error_count: u64,

    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

impl DnsRecordData {
    /// Whether the last fetch is recent enough to trust without re-fetching
    pub fn is_fresh(&self, window: Duration, now: DateTime<Utc>) -> bool {
        let Some(fetched) = self.last_fetched else {
            return false;
        };
        match (now - fetched).to_std() {
            Ok(age) => age < window,
            // Fetched "in the future" (clock skew): treat as fresh
            Err(_) => true,
        }
    }

    /// Copy the remote fields of `other` onto this snapshot, keeping counters
    fn merge_remote(&mut self, other: &DnsRecordData) {
        self.id = other.id.clone();
        self.name = other.name.clone();
        self.record_type = other.record_type.clone();
        self.value = other.value.clone();
        self.ttl = other.ttl;
        self.priority = other.priority;
        self.notes = other.notes.clone();
        self.last_fetched = other.last_fetched;
    }

    fn record_error(&mut self, error: &Error) {
        self.last_error = Some(error.to_string());
        self.last_error_time = Some(Utc::now());
    }
}

/// A tracked DNS record
#[derive(Debug)]
pub struct DnsRecord {
    /// Local id (`DnsRecord_{n}`)
    id: String,
    /// Tracking key, fixed at creation
    key: String,
    /// Id handed out by the entity host while registered
    host_entity_id: Option<String>,
    domain: String,
    data: DnsRecordData,
    stub: Option<Arc<DnsRecordStub>>,
}

impl DnsRecord {
    /// Create an entity for a configured record
    pub fn new(
        id: impl Into<String>,
        domain: impl Into<String>,
        record_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let domain = domain.into();
        let record_type = record_type.into();
        let name = name.into();

        Self {
            id: id.into(),
            key: crate::config::record_key(&domain, &record_type, &name),
            host_entity_id: None,
            domain,
            data: DnsRecordData {
                record_type,
                name,
                ..Default::default()
            },
            stub: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn record_type(&self) -> &str {
        &self.data.record_type
    }

    /// Key under which this record is tracked
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Snapshot of the current fields
    pub fn data(&self) -> DnsRecordData {
        self.data.clone()
    }

    pub fn host_entity_id(&self) -> Option<&str> {
        self.host_entity_id.as_deref()
    }

    /// Remember the id the entity host assigned
    ///
    /// Registering an already registered entity is refused.
    pub fn set_host_entity_id(&mut self, host_id: impl Into<String>) -> Result<()> {
        if let Some(existing) = &self.host_entity_id {
            return Err(Error::Other(format!(
                "{} is already registered as {}",
                self.id, existing
            )));
        }
        self.host_entity_id = Some(host_id.into());
        Ok(())
    }

    pub fn clear_host_entity_id(&mut self) -> Option<String> {
        self.host_entity_id.take()
    }

    /// Apply the terminal result of a get request
    pub fn apply_get_result(&mut self, result: &RecordResult) {
        match result {
            Ok(outcome) => {
                self.data.merge_remote(&outcome.data);
                self.data.get_success_count += 1;
            }
            Err(e) => {
                self.data.record_error(e);
                self.data.get_error_count += 1;
            }
        }
    }

    /// Apply the terminal result of an update request
    pub fn apply_update_result(&mut self, result: &RecordResult) {
        match result {
            Ok(outcome) => {
                self.data.merge_remote(&outcome.data);
                self.data.last_modified = outcome.data.last_modified;
                self.data.update_success_count += 1;
            }
            Err(e) => {
                self.data.record_error(e);
                self.data.update_error_count += 1;
            }
        }
    }

    /// Proxy for this record, created on first use
    ///
    /// A closed proxy is never handed out again; the next call creates a
    /// fresh one.
    pub fn stub(&mut self, dispatcher: &Dispatcher<SyncState>) -> Arc<DnsRecordStub> {
        if let Some(stub) = &self.stub {
            if !stub.is_closed() {
                return Arc::clone(stub);
            }
        }

        let stub = Arc::new(DnsRecordStub::new(self.key.clone(), dispatcher.clone()));
        self.stub = Some(Arc::clone(&stub));
        stub
    }

    /// Retire the current proxy, if one was handed out
    pub fn close_stub(&mut self) {
        if let Some(stub) = self.stub.take() {
            if stub.close() {
                debug!("Closed proxy for {}", self.id);
            }
        }
    }
}
