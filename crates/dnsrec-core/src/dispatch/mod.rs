//! Owner-thread dispatch
//!
//! All authoritative entity and pipeline bookkeeping lives in a single state
//! value owned by one task, the *owner loop*. Other tasks and threads never
//! touch that state directly; they submit closures through a [`Dispatcher`]
//! and the owner loop runs them one at a time, in submission order.
//!
//! ```text
//!  caller task ──exec(f)──┐
//!  caller thread ─exec_blocking(f)─┐      ┌────────────┐
//!  delivery task ──enqueue(f)──────┴─────►│ OwnerLoop  │── f(&mut state)
//!                                         └────────────┘
//! ```
//!
//! Value-returning calls ([`Dispatcher::exec`], [`Dispatcher::exec_blocking`])
//! pair the closure with a `oneshot` reply slot and wait on it. The slot is
//! moved into the closure, so it outlives the waiting caller regardless of
//! which side finishes first. Side-effecting calls ([`Dispatcher::enqueue`])
//! are fire-and-forget.
//!
//! Once the loop stops, every call fails fast with [`Error::Dispatch`]
//! instead of blocking.

use crate::error::{Error, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Job<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

enum Message<S> {
    Run(Job<S>),
    Stop,
}

/// Handle for submitting work to the owner loop
pub struct Dispatcher<S> {
    tx: mpsc::UnboundedSender<Message<S>>,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S> std::fmt::Debug for Dispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// The receiving side, run on the task that owns `S`
pub struct OwnerLoop<S> {
    rx: mpsc::UnboundedReceiver<Message<S>>,
}

impl<S: Send + 'static> Dispatcher<S> {
    /// Create a dispatcher and the loop that will serve it
    ///
    /// The loop is returned separately so the owned state can capture a
    /// dispatcher clone before the loop starts.
    pub fn channel() -> (Self, OwnerLoop<S>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, OwnerLoop { rx })
    }

    /// Submit a side-effecting closure without waiting for it to run
    pub fn enqueue(&self, f: impl FnOnce(&mut S) + Send + 'static) -> Result<()> {
        self.tx
            .send(Message::Run(Box::new(f)))
            .map_err(|_| Error::dispatch("owner loop is not running"))
    }

    /// Run a closure on the owner loop and wait for its value
    pub async fn exec<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> T + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.enqueue(move |state| {
            // The caller may have given up waiting; nothing to do then
            let _ = reply_tx.send(f(state));
        })?;

        reply_rx
            .await
            .map_err(|_| Error::dispatch("owner loop stopped before producing a result"))
    }

    /// Blocking variant of [`Dispatcher::exec`] for plain OS threads
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context, like
    /// [`tokio::sync::oneshot::Receiver::blocking_recv`]. Calling it from a
    /// closure running on the owner loop would deadlock.
    pub fn exec_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> T + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.enqueue(move |state| {
            let _ = reply_tx.send(f(state));
        })?;

        reply_rx
            .blocking_recv()
            .map_err(|_| Error::dispatch("owner loop stopped before producing a result"))
    }

    /// Ask the owner loop to stop after the work already queued ahead of this call
    pub fn stop(&self) {
        let _ = self.tx.send(Message::Stop);
    }

    /// Whether the owner loop has stopped receiving
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<S: Send + 'static> OwnerLoop<S> {
    /// Serve submitted closures until stopped, then hand the state back
    pub async fn run(mut self, mut state: S) -> S {
        debug!("Owner loop started");

        while let Some(message) = self.rx.recv().await {
            match message {
                Message::Run(job) => job(&mut state),
                Message::Stop => break,
            }
        }

        // Anything submitted after the stop is dropped; dropping a job drops
        // its reply slot, which fails the waiting caller instead of hanging it
        self.rx.close();
        let mut dropped = 0usize;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }

        debug!("Owner loop stopped ({} late submission(s) dropped)", dropped);
        state
    }
}
