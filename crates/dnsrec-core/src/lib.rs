// # dnsrec-core
//
// Core library for keeping a small set of remotely hosted DNS records in
// sync with locally held entity state.
//
// ## Architecture Overview
//
// - **DnsRecord**: Authoritative record state, mutated only on the owner loop
// - **DnsRecordStub**: Thread-safe proxy that reaches a record through dispatch
// - **Dispatcher / OwnerLoop**: Runs closures against the owned state, in order
// - **RetryingRequestQueue**: Bounded retry in front of the request queue
// - **RequestQueue**: FIFO backlog feeding the worker, with depth statistics
// - **Worker**: The only caller of the DNS provider, one request at a time
// - **Poller**: Periodic refresh of every record
// - **SyncService**: Wires the above together and owns their lifecycle
//
// ## Design Principles
//
// 1. **Single writer**: Record state has exactly one mutator, the owner loop
// 2. **Serialized provider access**: One provider call in flight at a time
// 3. **Exactly-once results**: Every accepted request resolves exactly once,
//    through a one-shot channel
// 4. **Library-First**: Providers and entity hosts plug in through traits

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod registry;
pub mod traits;
pub mod worker;

// Re-export core types for convenience
pub use config::{DomainConfig, EngineConfig, ProviderConfig, RecordConfig, SyncConfig};
pub use dispatch::{Dispatcher, OwnerLoop};
pub use engine::{StatusAndEntities, SyncHandle, SyncService, SyncState, SyncStatus};
pub use error::{Error, Result};
pub use pipeline::{
    AttemptCeiling, RecordOutcome, RecordResult, Request, RequestKind, RequestQueue,
    RetryPolicy, RetryingRequestQueue,
};
pub use record::{DnsRecord, DnsRecordData, DnsRecordStub};
pub use registry::EntityRegistry;
pub use traits::{DnsProvider, EntityHost};
pub use worker::Worker;
