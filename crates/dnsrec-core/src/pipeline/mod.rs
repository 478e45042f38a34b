//! Request pipeline
//!
//! Requests enter through the [`RetryingRequestQueue`], which submits each
//! attempt to the [`RequestQueue`], which feeds the single worker in arrival
//! order.
//!
//! - [`request`]: Request variants and their one-shot result channels
//! - [`queue`]: FIFO backlog in front of the worker, with depth statistics
//! - [`retry`]: Retry decorator, retry policy, failure statistics

pub mod queue;
pub mod request;
pub mod retry;

pub use queue::{QueueStats, RequestQueue, RequestQueueHandle};
pub use request::{
    GetRecordRequest, RecordOutcome, RecordResult, Request, RequestKind, ResultReceiver,
    ResultSender, UpdateRecordRequest,
};
pub use retry::{
    AttemptCeiling, DEFAULT_MAX_ATTEMPTS, RetryPolicy, RetryQueueHandle, RetryQueueStats,
    RetryingRequestQueue,
};
