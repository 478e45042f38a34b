//! Single serialized worker
//!
//! The worker is the only component that calls the DNS provider. It takes
//! one request at a time from the request queue, in arrival order, and never
//! runs two provider calls concurrently.
//!
//! ## Get
//!
//! 1. Retrieve `(domain, type, name)`
//! 2. Non-`SUCCESS` status → [`Error::ProviderRejected`]
//! 3. No records → [`Error::NotFound`]
//! 4. Several records → warn, use the first one in response order
//! 5. Strip the `.{domain}` suffix from the returned name
//!
//! ## Update
//!
//! 1. Snapshot fetched within the freshness window → use it as the current
//!    record, otherwise retrieve it live
//! 2. Current value equals the new value → success, no write
//! 3. Otherwise edit the record and overlay the new value on the pre-write
//!    record
//!
//! ## Shutdown
//!
//! When the cancellation token fires the worker closes its channel and
//! cancels every request still buffered in it.

use crate::error::{Error, Result};
use crate::pipeline::{
    GetRecordRequest, RecordOutcome, Request, RequestKind, UpdateRecordRequest,
};
use crate::record::DnsRecordData;
use crate::traits::{DnsProvider, EditRecord, RecordMessage};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Executes requests against the DNS provider, one at a time
pub struct Worker {
    provider: Arc<dyn DnsProvider>,
    requests: mpsc::Receiver<Request>,
    freshness_window: Duration,
}

impl Worker {
    /// Create a worker
    ///
    /// # Parameters
    ///
    /// - `provider`: DNS provider implementation
    /// - `requests`: Receiving end of the request queue's worker channel
    /// - `freshness_window`: Age below which an update trusts the cached
    ///   snapshot instead of retrieving the record again
    pub fn new(
        provider: Arc<dyn DnsProvider>,
        requests: mpsc::Receiver<Request>,
        freshness_window: Duration,
    ) -> Self {
        Self {
            provider,
            requests,
            freshness_window,
        }
    }

    /// Run until `cancel` fires or the request channel closes
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Worker started (provider: {})", self.provider.provider_name());

        loop {
            let request = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                request = self.requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let result = self.process(request.kind()).await;
            request.complete(result);
        }

        self.requests.close();
        let mut cancelled = 0usize;
        while let Ok(request) = self.requests.try_recv() {
            request.cancel();
            cancelled += 1;
        }

        info!("Worker stopped, {} buffered request(s) cancelled", cancelled);
    }

    async fn process(&self, kind: &RequestKind) -> Result<RecordOutcome> {
        debug!("Processing {}", kind.describe());
        match kind {
            RequestKind::Get(get) => self.get(get).await,
            RequestKind::Update(update) => self.update(update).await,
        }
    }

    async fn get(&self, request: &GetRecordRequest) -> Result<RecordOutcome> {
        let record = self
            .fetch_record(&request.domain, &request.record_type, &request.name)
            .await?;

        Ok(RecordOutcome {
            data: build_record_data(&record, Some(Utc::now()), None),
            message: "Retrieved successfully".to_string(),
        })
    }

    async fn update(&self, request: &UpdateRecordRequest) -> Result<RecordOutcome> {
        let snapshot = &request.current;
        let now = Utc::now();

        let (current, fetched_at) = if snapshot.is_fresh(self.freshness_window, now) {
            debug!(
                "Using cached snapshot of {} {} {}",
                request.domain, snapshot.record_type, snapshot.name
            );
            (record_from_snapshot(snapshot), snapshot.last_fetched)
        } else {
            let record = self
                .fetch_record(&request.domain, &snapshot.record_type, &snapshot.name)
                .await?;
            (record, Some(Utc::now()))
        };

        if current.content == request.new_value {
            return Ok(RecordOutcome {
                data: build_record_data(&current, fetched_at, snapshot.last_modified),
                message: format!(
                    "DNS record {} {} {} already has value \"{}\", no update needed",
                    request.domain, current.record_type, current.name, request.new_value
                ),
            });
        }

        let edit = EditRecord {
            name: current.name.clone(),
            record_type: current.record_type.clone(),
            content: request.new_value.clone(),
            ttl: current.ttl.clone(),
            prio: current.prio.clone(),
            notes: current.notes.clone(),
        };

        let response = self
            .provider
            .edit_record(&request.domain, &current.id, &edit)
            .await?;
        if !response.is_success() {
            return Err(Error::provider_rejected(format!(
                "edit {} {} {} returned status {}: {}",
                request.domain,
                current.record_type,
                current.name,
                response.status,
                response.message.unwrap_or_default()
            )));
        }

        info!(
            "Updated {} {} {}: \"{}\" -> \"{}\"",
            request.domain, current.record_type, current.name, current.content, request.new_value
        );

        let updated = RecordMessage {
            content: request.new_value.clone(),
            ..current
        };
        Ok(RecordOutcome {
            data: build_record_data(&updated, fetched_at, Some(Utc::now())),
            message: "Updated successfully".to_string(),
        })
    }

    /// Retrieve the single record matching `(domain, type, name)`
    ///
    /// The returned record's name is relative to the domain.
    async fn fetch_record(
        &self,
        domain: &str,
        record_type: &str,
        name: &str,
    ) -> Result<RecordMessage> {
        let response = self
            .provider
            .retrieve_by_name_type(domain, record_type, name)
            .await?;

        if !response.is_success() {
            return Err(Error::provider_rejected(format!(
                "retrieve {} {} {} returned status {}: {}",
                domain,
                record_type,
                name,
                response.status,
                response.message.unwrap_or_default()
            )));
        }

        let count = response.records.len();
        let mut records = response.records.into_iter();
        let Some(mut record) = records.next() else {
            return Err(Error::not_found(format!(
                "no {} record named {} under {}",
                record_type, name, domain
            )));
        };

        if count > 1 {
            warn!(
                "{} records match {} {} {}, using the first one (id {})",
                count, domain, record_type, name, record.id
            );
        }

        record.name = strip_domain_suffix(&record.name, domain);
        Ok(record)
    }
}

/// `www.example.com` → `www`; names without the suffix are kept as is
fn strip_domain_suffix(name: &str, domain: &str) -> String {
    name.strip_suffix(domain)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(name)
        .to_string()
}

/// Rebuild the provider's view of a record from a cached snapshot
fn record_from_snapshot(snapshot: &DnsRecordData) -> RecordMessage {
    RecordMessage {
        id: snapshot.id.clone(),
        name: snapshot.name.clone(),
        record_type: snapshot.record_type.clone(),
        content: snapshot.value.clone(),
        ttl: Some(snapshot.ttl.to_string()),
        prio: Some(snapshot.priority.to_string()),
        notes: Some(snapshot.notes.clone()),
    }
}

fn build_record_data(
    record: &RecordMessage,
    last_fetched: Option<DateTime<Utc>>,
    last_modified: Option<DateTime<Utc>>,
) -> DnsRecordData {
    DnsRecordData {
        id: record.id.clone(),
        name: record.name.clone(),
        record_type: record.record_type.clone(),
        value: record.content.clone(),
        ttl: parse_numeric("ttl", record.ttl.as_deref()),
        priority: parse_numeric("prio", record.prio.as_deref()),
        notes: record.notes.clone().unwrap_or_default(),
        last_fetched,
        last_modified,
        ..Default::default()
    }
}

fn parse_numeric(field: &str, value: Option<&str>) -> i32 {
    match value {
        None | Some("") => 0,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Unparsable {} value {:?}, using 0", field, raw);
            0
        }),
    }
}
