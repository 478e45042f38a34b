// # Retrying Request Queue
//
// Decorates a `RequestQueue` with bounded retry. Each accepted request is
// wrapped in an envelope that keeps the caller's original result sender and
// submits every attempt with a private sender of its own. Attempt results
// come back to this loop, get classified by the retry policy, and only the
// terminal one (success, exhausted retries, non-retryable failure, or
// cancellation at shutdown) is relayed to the caller.
//
// ## Flow
//
// ```text
// enqueue ──► envelope ──attempt n──► RequestQueue ──► Worker
//                ▲                                        │
//                └──── AttemptFinished(id, result) ◄──────┘
//                         │
//                 failed && can_retry ? resubmit : relay to caller
// ```
//
// Envelopes and statistics are touched only by the loop in `run`.

use super::queue::RequestQueueHandle;
use super::request::{RecordResult, Request, RequestKind, ResultSender};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Default attempt ceiling (first attempt included)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 11;

/// Decides which results count as failures and which failures may be retried
pub trait RetryPolicy: Send + Sync + 'static {
    /// Whether `result` is a failed attempt
    fn is_failed(&self, result: &RecordResult) -> bool {
        result.is_err()
    }

    /// Whether another attempt is allowed
    ///
    /// # Parameters
    ///
    /// - `request`: The operation being retried
    /// - `last`: Result of the attempt that just failed
    /// - `attempts`: Attempts made so far
    /// - `first_enqueued`: When the caller submitted the request
    fn can_retry(
        &self,
        request: &RequestKind,
        last: &RecordResult,
        attempts: u32,
        first_enqueued: DateTime<Utc>,
    ) -> bool;
}

/// Retry retryable failures until a fixed number of attempts has been made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptCeiling {
    max_attempts: u32,
}

impl AttemptCeiling {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for AttemptCeiling {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy for AttemptCeiling {
    fn can_retry(
        &self,
        _request: &RequestKind,
        last: &RecordResult,
        attempts: u32,
        _first_enqueued: DateTime<Utc>,
    ) -> bool {
        let retryable = match last {
            Err(e) => e.is_retryable(),
            Ok(_) => true,
        };
        retryable && attempts < self.max_attempts
    }
}

/// Depth and failure statistics of the retrying queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryQueueStats {
    /// Requests accepted and not yet relayed
    pub current: usize,
    pub peak: usize,
    pub peak_time: Option<DateTime<Utc>>,
    /// Requests whose latest attempt failed and that are awaiting a retry
    pub current_failed_attempts: usize,
    pub peak_failed_attempts: usize,
    pub peak_failed_attempts_time: Option<DateTime<Utc>>,
}

struct Envelope {
    kind: RequestKind,
    original: ResultSender,
    attempts: u32,
    first_enqueued: DateTime<Utc>,
    failing: bool,
}

enum Command {
    Enqueue(Request),
    AttemptFinished { id: u64, result: RecordResult },
    RetryDue(u64),
    Stop,
}

/// Handle for submitting requests and reading statistics
#[derive(Clone)]
pub struct RetryQueueHandle {
    tx: mpsc::UnboundedSender<Command>,
    stats: watch::Receiver<RetryQueueStats>,
}

impl RetryQueueHandle {
    /// Submit a request
    ///
    /// Fails with [`Error::NotRunning`] once the queue has stopped; the
    /// request is dropped and no result will be delivered for it.
    pub fn enqueue(&self, request: Request) -> Result<()> {
        self.tx
            .send(Command::Enqueue(request))
            .map_err(|_| Error::NotRunning)
    }

    /// Stop accepting requests and cancel everything pending
    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
    }

    /// Latest statistics snapshot
    pub fn stats(&self) -> RetryQueueStats {
        self.stats.borrow().clone()
    }

    /// Receiver for statistics snapshots
    pub fn stats_receiver(&self) -> watch::Receiver<RetryQueueStats> {
        self.stats.clone()
    }
}

/// Retry decorator around a [`RequestQueueHandle`]
pub struct RetryingRequestQueue {
    rx: mpsc::UnboundedReceiver<Command>,
    tx: mpsc::UnboundedSender<Command>,
    inner: RequestQueueHandle,
    policy: Arc<dyn RetryPolicy>,
    retry_delay: Duration,
    envelopes: HashMap<u64, Envelope>,
    next_id: u64,
    stats: RetryQueueStats,
    stats_tx: watch::Sender<RetryQueueStats>,
}

impl RetryingRequestQueue {
    /// Create a retrying queue in front of `inner`
    pub fn new(
        inner: RequestQueueHandle,
        policy: Arc<dyn RetryPolicy>,
        retry_delay: Duration,
    ) -> (Self, RetryQueueHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) = watch::channel(RetryQueueStats::default());

        let handle = RetryQueueHandle {
            tx: tx.clone(),
            stats: stats_rx,
        };
        let queue = Self {
            rx,
            tx,
            inner,
            policy,
            retry_delay,
            envelopes: HashMap::new(),
            next_id: 0,
            stats: RetryQueueStats::default(),
            stats_tx,
        };

        (queue, handle)
    }

    /// Run until stopped
    ///
    /// On stop every pending envelope is relayed [`Error::Cancelled`]
    /// exactly once, whatever attempt it was on.
    pub async fn run(mut self) {
        debug!("Retrying request queue started");

        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Enqueue(request) => self.accept(request),
                Command::AttemptFinished { id, result } => self.on_attempt_finished(id, result),
                Command::RetryDue(id) => self.submit_attempt(id),
                Command::Stop => break,
            }
        }

        self.rx.close();
        let mut cancelled = 0usize;
        while let Ok(command) = self.rx.try_recv() {
            if let Command::Enqueue(request) = command {
                request.cancel();
                cancelled += 1;
            }
        }
        let pending: Vec<u64> = self.envelopes.keys().copied().collect();
        for id in pending {
            if let Some(envelope) = self.envelopes.remove(&id) {
                self.relay(envelope, Err(Error::Cancelled));
                cancelled += 1;
            }
        }

        info!("Retrying request queue stopped, {} pending request(s) cancelled", cancelled);
    }

    fn accept(&mut self, request: Request) {
        let (kind, original) = request.into_parts();
        self.next_id += 1;
        let id = self.next_id;

        self.envelopes.insert(
            id,
            Envelope {
                kind,
                original,
                attempts: 0,
                first_enqueued: Utc::now(),
                failing: false,
            },
        );

        let depth = self.envelopes.len();
        self.stats.current = depth;
        if depth > self.stats.peak {
            self.stats.peak = depth;
            self.stats.peak_time = Some(Utc::now());
        }
        self.publish();

        self.submit_attempt(id);
    }

    /// Submit the next attempt for an envelope with a fresh private channel
    fn submit_attempt(&mut self, id: u64) {
        let Some(envelope) = self.envelopes.get_mut(&id) else {
            return;
        };
        envelope.attempts += 1;

        let (request, attempt_rx) = Request::new(envelope.kind.clone());
        if self.inner.enqueue(request).is_err() {
            // The inner queue only stops at shutdown; the request was accepted,
            // so it resolves as cancelled rather than as a rejected submission
            debug!(
                "Inner queue stopped before attempt {} of {}",
                envelope.attempts,
                envelope.kind.describe()
            );
            if let Some(envelope) = self.envelopes.remove(&id) {
                self.relay(envelope, Err(Error::Cancelled));
            }
            return;
        }

        let tx = self.tx.clone();
        tokio::spawn(async move {
            // A dropped attempt sender means the attempt never ran to completion
            let result = attempt_rx.await.unwrap_or(Err(Error::Cancelled));
            let _ = tx.send(Command::AttemptFinished { id, result });
        });
    }

    fn on_attempt_finished(&mut self, id: u64, result: RecordResult) {
        let Some(mut envelope) = self.envelopes.remove(&id) else {
            return;
        };

        if !self.policy.is_failed(&result) {
            self.relay(envelope, result);
            return;
        }

        let can_retry = self.policy.can_retry(
            &envelope.kind,
            &result,
            envelope.attempts,
            envelope.first_enqueued,
        );

        if !can_retry {
            if let Err(ref e) = result {
                error!(
                    "Request {} failed after {} attempt(s): {}",
                    envelope.kind.describe(),
                    envelope.attempts,
                    e
                );
            }
            self.relay(envelope, result);
            return;
        }

        if let Err(ref e) = result {
            warn!(
                "Attempt {} of {} failed, retrying: {}",
                envelope.attempts,
                envelope.kind.describe(),
                e
            );
        }

        if !envelope.failing {
            envelope.failing = true;
            self.stats.current_failed_attempts += 1;
            if self.stats.current_failed_attempts > self.stats.peak_failed_attempts {
                self.stats.peak_failed_attempts = self.stats.current_failed_attempts;
                self.stats.peak_failed_attempts_time = Some(Utc::now());
            }
            self.publish();
        }
        self.envelopes.insert(id, envelope);

        if self.retry_delay.is_zero() {
            self.submit_attempt(id);
        } else {
            let tx = self.tx.clone();
            let delay = self.retry_delay;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        let _ = tx.send(Command::RetryDue(id));
                    }
                    _ = tx.closed() => {}
                }
            });
        }
    }

    /// Deliver the terminal result to the caller's original channel
    fn relay(&mut self, envelope: Envelope, result: RecordResult) {
        if envelope.failing {
            self.stats.current_failed_attempts = self.stats.current_failed_attempts.saturating_sub(1);
        }
        self.stats.current = self.envelopes.len();
        self.publish();

        if envelope.original.send(result).is_err() {
            debug!(
                "Result for {} dropped: caller is gone",
                envelope.kind.describe()
            );
        }
    }

    fn publish(&self) {
        self.stats_tx.send_replace(self.stats.clone());
    }
}
