// # Requests
//
// A request is a tagged operation plus the one-shot channel its result is
// delivered on. `Request::complete` consumes the request, so a request can
// resolve at most once; dropping an unresolved request drops its sender,
// which the waiting side observes as a closed channel.

use crate::error::{Error, Result};
use crate::record::DnsRecordData;
use tokio::sync::oneshot;
use tracing::debug;

/// Successful outcome of a request
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    /// Record state after the operation
    pub data: DnsRecordData,
    /// Human-readable description of what happened
    pub message: String,
}

/// Result delivered on a request's channel
pub type RecordResult = Result<RecordOutcome>;

/// Sending half of a request's one-shot result channel
pub type ResultSender = oneshot::Sender<RecordResult>;

/// Receiving half of a request's one-shot result channel
pub type ResultReceiver = oneshot::Receiver<RecordResult>;

/// Retrieve a single record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRecordRequest {
    pub domain: String,
    pub record_type: String,
    pub name: String,
}

/// Change a record's value
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRecordRequest {
    pub domain: String,
    /// Entity snapshot at submission time
    pub current: DnsRecordData,
    pub new_value: String,
}

/// The operation a request carries
#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    Get(GetRecordRequest),
    Update(UpdateRecordRequest),
}

impl RequestKind {
    /// Short description for log lines
    pub fn describe(&self) -> String {
        match self {
            RequestKind::Get(get) => {
                format!("get {} {} {}", get.domain, get.record_type, get.name)
            }
            RequestKind::Update(update) => format!(
                "update {} {} {} -> \"{}\"",
                update.domain, update.current.record_type, update.current.name, update.new_value
            ),
        }
    }
}

/// A request and its result channel
#[derive(Debug)]
pub struct Request {
    kind: RequestKind,
    result_tx: ResultSender,
}

impl Request {
    /// Create a request and the receiver its result will arrive on
    pub fn new(kind: RequestKind) -> (Self, ResultReceiver) {
        let (result_tx, result_rx) = oneshot::channel();
        (Self { kind, result_tx }, result_rx)
    }

    /// Create a get request
    pub fn get(
        domain: impl Into<String>,
        record_type: impl Into<String>,
        name: impl Into<String>,
    ) -> (Self, ResultReceiver) {
        Self::new(RequestKind::Get(GetRecordRequest {
            domain: domain.into(),
            record_type: record_type.into(),
            name: name.into(),
        }))
    }

    /// Create an update request
    pub fn update(
        domain: impl Into<String>,
        current: DnsRecordData,
        new_value: impl Into<String>,
    ) -> (Self, ResultReceiver) {
        Self::new(RequestKind::Update(UpdateRecordRequest {
            domain: domain.into(),
            current,
            new_value: new_value.into(),
        }))
    }

    /// Reassemble a request around an existing sender
    pub fn from_parts(kind: RequestKind, result_tx: ResultSender) -> Self {
        Self { kind, result_tx }
    }

    /// Split the request into its operation and result sender
    pub fn into_parts(self) -> (RequestKind, ResultSender) {
        (self.kind, self.result_tx)
    }

    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    /// Deliver the result, consuming the request
    pub fn complete(self, result: RecordResult) {
        let description = self.kind.describe();
        if self.result_tx.send(result).is_err() {
            debug!("Result for {} dropped: receiver is gone", description);
        }
    }

    /// Complete with [`Error::Cancelled`]
    pub fn cancel(self) {
        self.complete(Err(Error::Cancelled));
    }
}
