//! Delivery of callbacks to the caller's execution context.
//!
//! Work such as touching the store runs on the background worker, but its
//! observers must not run there: they typically update UI state that
//! belongs to the application's main thread. A [`CallbackContext`] is the
//! seam where results are handed back.
//!
//! [`MainQueue`] is the context for applications that own an event loop
//! (or a test that wants to stand in for one). The owner pumps it; every
//! callback runs on the pumping thread.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use tracing::warn;

/// A callback to run on the caller's context.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere callbacks can be sent to run.
pub trait CallbackContext: Send + Sync + 'static {
    /// Schedules `callback` to run on this context.
    fn dispatch(&self, callback: Callback);
}

/// Runs callbacks immediately on whichever thread dispatches them.
///
/// For headless use where there is no main thread to protect.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineContext;

impl CallbackContext for InlineContext {
    fn dispatch(&self, callback: Callback) {
        callback();
    }
}

/// A queue of callbacks pumped by its owner.
#[derive(Debug)]
pub struct MainQueue {
    sender: Sender<Callback>,
    receiver: Receiver<Callback>,
}

impl MainQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Returns a context that posts into this queue.
    #[must_use]
    pub fn context(&self) -> MainContext {
        MainContext {
            sender: self.sender.clone(),
        }
    }

    /// Runs every callback that is already queued. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(callback) = self.receiver.try_recv() {
            callback();
            ran += 1;
        }
        ran
    }

    /// Waits up to `timeout` for one callback and runs it.
    ///
    /// Returns false if nothing arrived in time.
    pub fn run_next_timeout(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(callback) => {
                callback();
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Pumps callbacks until `done` returns true or `timeout` elapses.
    ///
    /// Returns the final value of `done`.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return done();
            }
            self.run_next_timeout(remaining);
        }
    }

    /// Returns the number of callbacks waiting to run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if no callbacks are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for MainQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Sending side of a [`MainQueue`].
#[derive(Debug, Clone)]
pub struct MainContext {
    sender: Sender<Callback>,
}

impl CallbackContext for MainContext {
    fn dispatch(&self, callback: Callback) {
        if self.sender.send(callback).is_err() {
            warn!("main queue is gone; dropping callback");
        }
    }
}
