//! Core traits for the record synchronizer
//!
//! - [`DnsProvider`]: Retrieve and edit records via the provider API
//! - [`EntityHost`]: Register entities with the hosting container

pub mod dns_provider;
pub mod entity_host;

pub use dns_provider::{
    DnsProvider, EditRecord, RecordMessage, RetrieveResponse, StatusResponse, STATUS_SUCCESS,
};
pub use entity_host::{EntityHost, DNS_RECORD_ENTITY_TYPE};
