//! The background worker and write tickets.

use crate::error::{CoreError, CoreResult};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A single background thread running jobs in submission order.
///
/// A job that panics is logged and the worker carries on with the next
/// one. Dropping the worker lets queued jobs finish, then joins the thread.
#[derive(Debug)]
pub struct BackgroundWorker {
    sender: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl BackgroundWorker {
    /// Starts a worker thread with the given name.
    pub fn new(name: &str) -> CoreResult<Self> {
        let (sender, receiver) = unbounded::<Job>();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_jobs(&receiver))?;
        let thread_id = thread.thread().id();
        debug!(worker = name, "started background worker");

        Ok(Self {
            sender: Some(sender),
            thread: Some(thread),
            thread_id,
        })
    }

    /// Queues a job.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WorkerStopped`] if the worker thread is gone.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> CoreResult<()> {
        let sender = self.sender.as_ref().ok_or(CoreError::WorkerStopped)?;
        sender
            .send(Box::new(job))
            .map_err(|_| CoreError::WorkerStopped)
    }

    /// Blocks until every job queued before this call has run.
    ///
    /// # Errors
    ///
    /// Fails if called from the worker itself, which would never return, or
    /// if the worker has stopped.
    pub fn barrier(&self) -> CoreResult<()> {
        if self.is_worker_thread() {
            return Err(CoreError::invalid_operation(
                "barrier called from the background worker",
            ));
        }
        let (done, wait) = bounded::<()>(1);
        self.submit(move || {
            let _ = done.send(());
        })?;
        wait.recv().map_err(|_| CoreError::WorkerStopped)
    }

    /// Returns true when called from the worker thread.
    #[must_use]
    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        // Closing the channel ends the job loop once the queue drains.
        self.sender.take();
        if self.is_worker_thread() {
            return;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("background worker thread panicked");
            }
        }
    }
}

fn run_jobs(receiver: &Receiver<Job>) {
    for job in receiver {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
            error!(panic = %panic_message(payload.as_ref()), "background job panicked");
        }
    }
    debug!("background worker stopped");
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to the outcome of a background write.
///
/// Dropping the ticket does not cancel the write; the outcome is then only
/// visible in the log.
#[derive(Debug)]
pub struct WriteTicket<T> {
    result: Receiver<CoreResult<T>>,
    cancelled: Arc<AtomicBool>,
}

/// Worker-side half of a [`WriteTicket`].
#[derive(Debug)]
pub(crate) struct TicketSender<T> {
    result: Sender<CoreResult<T>>,
    cancelled: Arc<AtomicBool>,
}

impl<T> WriteTicket<T> {
    pub(crate) fn new() -> (Self, TicketSender<T>) {
        let (sender, receiver) = bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        (
            Self {
                result: receiver,
                cancelled: Arc::clone(&cancelled),
            },
            TicketSender {
                result: sender,
                cancelled,
            },
        )
    }

    /// Blocks until the write has finished.
    pub fn wait(self) -> CoreResult<T> {
        self.result.recv().unwrap_or(Err(CoreError::WorkerStopped))
    }

    /// Waits up to `timeout`. Returns `None` if the write is still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CoreResult<T>> {
        match self.result.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(CoreError::WorkerStopped)),
        }
    }

    /// Returns the outcome if the write has finished, without blocking.
    pub fn try_result(&self) -> Option<CoreResult<T>> {
        match self.result.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(CoreError::WorkerStopped)),
        }
    }

    /// Asks for the write to be skipped.
    ///
    /// Only effective before the write starts; a started write commits or
    /// rolls back as usual. Returns false if cancellation was already
    /// requested.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    /// Returns true if cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl<T> TicketSender<T> {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn complete(self, result: CoreResult<T>) {
        // The ticket may have been dropped; nobody is waiting then.
        let _ = self.result.send(result);
    }
}
