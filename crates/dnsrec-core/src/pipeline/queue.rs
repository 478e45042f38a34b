// # Request Queue
//
// Unbounded FIFO between submitters and the worker. The queue's own loop is
// the only code that touches the backlog and its statistics; other tasks
// read statistics through a `watch` snapshot.
//
// The worker channel is kept small, so the backlog (and therefore the
// depth statistics) lives here rather than inside the channel.

use super::request::Request;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Depth statistics of the request queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Requests waiting for the worker
    pub current: usize,
    /// Highest depth observed
    pub peak: usize,
    /// When the peak was observed
    pub peak_time: Option<DateTime<Utc>>,
}

impl QueueStats {
    fn record_depth(&mut self, depth: usize) {
        self.current = depth;
        if depth > self.peak {
            self.peak = depth;
            self.peak_time = Some(Utc::now());
        }
    }
}

enum Command {
    Enqueue(Request),
    Stop,
}

/// Handle for submitting requests and reading statistics
#[derive(Clone)]
pub struct RequestQueueHandle {
    tx: mpsc::UnboundedSender<Command>,
    stats: watch::Receiver<QueueStats>,
}

impl RequestQueueHandle {
    /// Submit a request
    ///
    /// Fails with [`Error::NotRunning`] once the queue has stopped; the
    /// request is dropped and no result will be delivered for it.
    pub fn enqueue(&self, request: Request) -> Result<()> {
        self.tx
            .send(Command::Enqueue(request))
            .map_err(|_| Error::NotRunning)
    }

    /// Stop accepting requests and cancel the backlog
    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
    }

    /// Latest statistics snapshot
    pub fn stats(&self) -> QueueStats {
        self.stats.borrow().clone()
    }

    /// Receiver for statistics snapshots
    pub fn stats_receiver(&self) -> watch::Receiver<QueueStats> {
        self.stats.clone()
    }
}

/// FIFO queue feeding the worker
pub struct RequestQueue {
    rx: mpsc::UnboundedReceiver<Command>,
    worker_tx: mpsc::Sender<Request>,
    stats_tx: watch::Sender<QueueStats>,
}

impl RequestQueue {
    /// Create a queue that forwards to `worker_tx`
    pub fn new(worker_tx: mpsc::Sender<Request>) -> (Self, RequestQueueHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) = watch::channel(QueueStats::default());

        let queue = Self {
            rx,
            worker_tx,
            stats_tx,
        };
        let handle = RequestQueueHandle {
            tx,
            stats: stats_rx,
        };

        (queue, handle)
    }

    /// Run until stopped
    ///
    /// On stop every request still in the backlog, and every request that
    /// raced the stop into the command channel, is completed with
    /// [`Error::Cancelled`].
    pub async fn run(self) {
        let RequestQueue {
            mut rx,
            worker_tx,
            stats_tx,
        } = self;
        let mut backlog: VecDeque<Request> = VecDeque::new();
        let mut stats = QueueStats::default();

        debug!("Request queue started");

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Enqueue(request)) => {
                        backlog.push_back(request);
                        stats.record_depth(backlog.len());
                        stats_tx.send_replace(stats.clone());
                    }
                    Some(Command::Stop) | None => break,
                },
                permit = worker_tx.reserve(), if !backlog.is_empty() => match permit {
                    Ok(permit) => {
                        if let Some(request) = backlog.pop_front() {
                            permit.send(request);
                        }
                        stats.record_depth(backlog.len());
                        stats_tx.send_replace(stats.clone());
                    }
                    Err(_) => {
                        warn!("Worker channel closed, request queue stopping");
                        break;
                    }
                },
            }
        }

        rx.close();
        let mut cancelled = 0usize;
        while let Ok(command) = rx.try_recv() {
            if let Command::Enqueue(request) = command {
                request.cancel();
                cancelled += 1;
            }
        }
        for request in backlog.drain(..) {
            request.cancel();
            cancelled += 1;
        }

        stats.record_depth(0);
        stats_tx.send_replace(stats);
        info!("Request queue stopped, {} queued request(s) cancelled", cancelled);
    }
}
