// # DNS Provider Trait
//
// Defines the transport seam between the worker and the remote DNS provider.
//
// ## Implementations
//
// - Porkbun: `dnsrec-provider-porkbun` crate
//
// ## Wire Contract
//
// - Retrieve: POST credentials to `.../dns/retrieveByNameType/{domain}/{type}/{name}`,
//   answered with `{status, records: [{id, name, type, content, ttl, prio, notes}]}`
// - Edit: POST credentials + record fields to `.../dns/edit/{domain}/{id}`,
//   answered with `{status, message}`
//
// Any status other than `SUCCESS` is a failed call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Status value the provider uses for a successful call
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// A DNS record as the provider reports it
///
/// `name` is fully qualified (`www.example.com`) when it comes back from a
/// retrieval; the worker strips the domain suffix before storing it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMessage {
    /// Provider-assigned record id
    #[serde(default)]
    pub id: String,
    /// Record name
    #[serde(default)]
    pub name: String,
    /// Record type (A, AAAA, TXT, ...)
    #[serde(rename = "type", default)]
    pub record_type: String,
    /// Record value
    #[serde(default)]
    pub content: String,
    /// TTL, sent as a string
    #[serde(default)]
    pub ttl: Option<String>,
    /// Priority, sent as a string
    #[serde(default)]
    pub prio: Option<String>,
    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,
}

/// Envelope returned by a retrieval call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub records: Vec<RecordMessage>,
}

impl RetrieveResponse {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Envelope returned by an edit call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Record fields sent with an edit call (credentials are added by the provider)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRecord {
    /// Record name relative to the domain
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    /// New value
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Trait for DNS provider implementations
///
/// Providers are single-shot transports: one HTTP call per method
/// invocation, no retries, no caching, no task spawning. Retry and
/// scheduling belong to the request pipeline; deciding whether a write is
/// needed belongs to the worker.
///
/// Transport failures should be reported as [`crate::Error::TransientNetwork`]
/// so the pipeline retries them. A well-formed response with a non-success
/// status is returned as-is; the worker classifies it.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Retrieve records matching `(domain, record_type, name)`
    async fn retrieve_by_name_type(
        &self,
        domain: &str,
        record_type: &str,
        name: &str,
    ) -> Result<RetrieveResponse, crate::Error>;

    /// Edit the record with the given provider id
    async fn edit_record(
        &self,
        domain: &str,
        record_id: &str,
        record: &EditRecord,
    ) -> Result<StatusResponse, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
