// # Entity Proxy
//
// `DnsRecordStub` is the handle code outside the owner loop uses to reach a
// record. It never touches the record itself: reads and update submissions
// are closures run on the owner loop through the dispatcher.
//
// The stub holds its wrapper (record key + dispatcher) in a mutex-guarded
// option. `close` takes the wrapper out under the lock, so exactly one call
// observes it and every later call (to `close` or to any operation) finds
// the slot empty and fails fast with `Error::EntityUnavailable`.

use super::DnsRecordData;
use crate::dispatch::Dispatcher;
use crate::engine::SyncState;
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug)]
struct EntityWrapper {
    record_key: String,
    dispatcher: Dispatcher<SyncState>,
}

/// Thread-safe proxy for a single DNS record entity
#[derive(Debug)]
pub struct DnsRecordStub {
    record_key: String,
    wrapper: Mutex<Option<Arc<EntityWrapper>>>,
}

impl DnsRecordStub {
    pub(crate) fn new(record_key: String, dispatcher: Dispatcher<SyncState>) -> Self {
        let wrapper = EntityWrapper {
            record_key: record_key.clone(),
            dispatcher,
        };
        Self {
            record_key,
            wrapper: Mutex::new(Some(Arc::new(wrapper))),
        }
    }

    /// Key of the record this proxy points at
    pub fn record_key(&self) -> &str {
        &self.record_key
    }

    /// Snapshot of the record's current fields
    pub async fn data(&self) -> Result<DnsRecordData> {
        let wrapper = self.wrapper()?;
        let key = wrapper.record_key.clone();
        wrapper
            .dispatcher
            .exec(move |state| state.record(&key).map(|r| r.data()))
            .await?
            .ok_or_else(|| self.unavailable())
    }

    /// Current record name
    pub async fn name(&self) -> Result<String> {
        let wrapper = self.wrapper()?;
        let key = wrapper.record_key.clone();
        wrapper
            .dispatcher
            .exec(move |state| state.record(&key).map(|r| r.name().to_string()))
            .await?
            .ok_or_else(|| self.unavailable())
    }

    /// Submit an update to `value`
    ///
    /// Returns once the request is enqueued. The outcome is applied to the
    /// record later and shows up in subsequent [`DnsRecordStub::data`] reads.
    pub async fn update_value(&self, value: impl Into<String>) -> Result<()> {
        let wrapper = self.wrapper()?;
        let key = wrapper.record_key.clone();
        let value = value.into();
        wrapper
            .dispatcher
            .exec(move |state| state.update_value(&key, value))
            .await?
    }

    /// Blocking variant of [`DnsRecordStub::data`] for plain OS threads
    ///
    /// Must not be called from within the async runtime.
    pub fn blocking_data(&self) -> Result<DnsRecordData> {
        let wrapper = self.wrapper()?;
        let key = wrapper.record_key.clone();
        wrapper
            .dispatcher
            .exec_blocking(move |state| state.record(&key).map(|r| r.data()))?
            .ok_or_else(|| self.unavailable())
    }

    /// Blocking variant of [`DnsRecordStub::update_value`] for plain OS threads
    pub fn blocking_update_value(&self, value: impl Into<String>) -> Result<()> {
        let wrapper = self.wrapper()?;
        let key = wrapper.record_key.clone();
        let value = value.into();
        wrapper
            .dispatcher
            .exec_blocking(move |state| state.update_value(&key, value))?
    }

    /// Retire the proxy
    ///
    /// Returns `true` for the call that actually closed it and `false` for
    /// every later call.
    pub fn close(&self) -> bool {
        self.slot().take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.slot().is_none()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<EntityWrapper>>> {
        self.wrapper.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current wrapper, cloned out so the lock is not held across the call
    fn wrapper(&self) -> Result<Arc<EntityWrapper>> {
        self.slot().clone().ok_or_else(|| self.unavailable())
    }

    fn unavailable(&self) -> Error {
        Error::entity_unavailable(format!("{} is closed or no longer tracked", self.record_key))
    }
}
