//! Transactional writes, on the caller's thread or the background worker.
//!
//! Every write runs the same sequence: take the access gate exclusively,
//! open a write handle, begin a transaction, run the operation, commit if
//! it returned `Ok`, roll back otherwise (a panic counts as failure).
//!
//! # Ordering
//!
//! Background writes run in submission order relative to each other. A
//! synchronous write is **not** ordered relative to background writes
//! already queued: it runs as soon as it gets the gate. Call
//! [`WriteCoordinator::barrier`] first when a synchronous write must see
//! the effect of queued ones.

use crate::config::StoreConfiguration;
use crate::dispatch::CallbackContext;
use crate::error::{CoreError, CoreResult};
use crate::handle::{AccessMode, StoreHandle, WriteTransaction};
use crate::lifecycle::AccessGate;
use crate::worker::{panic_message, BackgroundWorker, WriteTicket};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs write operations against the store.
#[derive(Clone)]
pub struct WriteCoordinator {
    writer: Writer,
    worker: Arc<BackgroundWorker>,
    callbacks: Arc<dyn CallbackContext>,
}

/// The part of a coordinator that background jobs carry.
#[derive(Debug, Clone)]
struct Writer {
    config: Arc<StoreConfiguration>,
    gate: AccessGate,
}

impl Writer {
    fn execute<T, F>(&self, op: F) -> CoreResult<T>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> CoreResult<T>,
    {
        let _exclusive = self.gate.write();
        let mut handle = StoreHandle::open(&self.config, AccessMode::Write)?;
        let mut txn = handle.begin_write()?;

        match catch_unwind(AssertUnwindSafe(|| op(&mut txn))) {
            Ok(Ok(value)) => {
                txn.commit()?;
                Ok(value)
            }
            Ok(Err(e)) => {
                txn.rollback();
                Err(e)
            }
            Err(payload) => {
                txn.rollback();
                Err(CoreError::aborted(format!(
                    "write operation panicked: {}",
                    panic_message(payload.as_ref())
                )))
            }
        }
    }
}

impl WriteCoordinator {
    /// Creates a write coordinator.
    #[must_use]
    pub fn new(
        config: Arc<StoreConfiguration>,
        gate: AccessGate,
        worker: Arc<BackgroundWorker>,
        callbacks: Arc<dyn CallbackContext>,
    ) -> Self {
        Self {
            writer: Writer { config, gate },
            worker,
            callbacks,
        }
    }

    /// Runs `op` in a transaction on the current thread.
    ///
    /// # Errors
    ///
    /// Returns the operation's own error, or the error that prevented the
    /// store from being opened or the transaction from committing. Nothing
    /// is committed in either case.
    pub fn try_write<T, F>(&self, op: F) -> CoreResult<T>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> CoreResult<T>,
    {
        self.writer.execute(op)
    }

    /// Runs `op` in a transaction on the current thread. Returns true if it
    /// committed.
    pub fn write_sync<F>(&self, op: F) -> bool
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> CoreResult<()>,
    {
        match self.try_write(op) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "write failed and was rolled back");
                false
            }
        }
    }

    /// Queues `op` on the background worker.
    ///
    /// Failures are logged. The returned ticket can be waited on, polled,
    /// cancelled, or simply dropped.
    pub fn write_async<T, F>(&self, op: F) -> WriteTicket<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut WriteTransaction<'_>) -> CoreResult<T> + Send + 'static,
    {
        self.queue(op, None)
    }

    /// Like [`write_async`](Self::write_async), and additionally hands a
    /// [`CoreError::BackgroundWriteFailed`] to `on_failure`, through the
    /// callback context, when the write fails.
    pub fn write_async_with<T, F, E>(&self, op: F, on_failure: E) -> WriteTicket<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut WriteTransaction<'_>) -> CoreResult<T> + Send + 'static,
        E: FnOnce(CoreError) + Send + 'static,
    {
        self.queue(op, Some(Box::new(on_failure)))
    }

    /// Blocks until every background write queued so far has finished.
    pub fn barrier(&self) -> CoreResult<()> {
        self.worker.barrier()
    }

    fn queue<T, F>(&self, op: F, on_failure: Option<Box<dyn FnOnce(CoreError) + Send>>) -> WriteTicket<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut WriteTransaction<'_>) -> CoreResult<T> + Send + 'static,
    {
        let (ticket, sender) = WriteTicket::new();
        let writer = self.writer.clone();
        let callbacks = Arc::clone(&self.callbacks);

        let submitted = self.worker.submit(move || {
            if sender.is_cancelled() {
                debug!("skipping cancelled background write");
                sender.complete(Err(CoreError::Cancelled));
                return;
            }

            let result = writer.execute(op);
            if let Err(e) = &result {
                warn!(error = %e, "background write failed and was rolled back");
                if let Some(on_failure) = on_failure {
                    let failure = CoreError::BackgroundWriteFailed {
                        message: e.to_string(),
                    };
                    callbacks.dispatch(Box::new(move || on_failure(failure)));
                }
            }
            sender.complete(result);
        });

        // A rejected job drops its ticket sender, so the ticket resolves to
        // `WorkerStopped`.
        if let Err(e) = submitted {
            warn!(error = %e, "could not queue background write");
        }
        ticket
    }
}

impl std::fmt::Debug for WriteCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteCoordinator")
            .field("location", &self.writer.config.location())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{InlineContext, MainQueue};
    use crate::lifecycle::LifecycleManager;
    use crate::migration::MigrationEngine;
    use crate::record::Record;
    use crate::records::Reminder;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _temp: TempDir,
        config: Arc<StoreConfiguration>,
        coordinator: WriteCoordinator,
    }

    fn fixture(callbacks: Arc<dyn CallbackContext>) -> Fixture {
        let temp = tempdir().unwrap();
        let config = Arc::new(StoreConfiguration::new(temp.path().join("store")));
        let gate = AccessGate::default();
        let lifecycle = LifecycleManager::new(
            Arc::clone(&config),
            Arc::new(MigrationEngine::standard()),
            Arc::clone(&gate),
        );
        lifecycle.ensure_environment().unwrap();
        lifecycle.run(None, &mut |_| {}).unwrap();

        let worker = Arc::new(BackgroundWorker::new("write-test").unwrap());
        let coordinator = WriteCoordinator::new(Arc::clone(&config), gate, worker, callbacks);
        Fixture {
            _temp: temp,
            config,
            coordinator,
        }
    }

    fn reminders(config: &StoreConfiguration) -> Vec<Reminder> {
        StoreHandle::open(config, AccessMode::Read)
            .unwrap()
            .image()
            .all()
            .unwrap()
    }

    #[test]
    fn sequential_writes_keep_order() {
        let f = fixture(Arc::new(InlineContext));
        let before = reminders(&f.config).len();

        assert!(f.coordinator.write_sync(|txn| {
            txn.insert(&Reminder::new("first", 8, 0))?;
            Ok(())
        }));
        assert!(f.coordinator.write_sync(|txn| {
            txn.insert(&Reminder::new("second", 9, 0))?;
            Ok(())
        }));

        let all = reminders(&f.config);
        assert_eq!(all.len(), before + 2);
        assert_eq!(all[before].label, "first");
        assert_eq!(all[before + 1].label, "second");
    }

    #[test]
    fn failed_write_leaves_no_trace() {
        let f = fixture(Arc::new(InlineContext));
        let before = reminders(&f.config);

        assert!(!f.coordinator.write_sync(|txn| {
            txn.insert(&Reminder::new("doomed", 8, 0))?;
            Err(CoreError::aborted("changed my mind"))
        }));
        assert_eq!(reminders(&f.config), before);
    }

    #[test]
    fn panicking_write_is_rolled_back() {
        let f = fixture(Arc::new(InlineContext));
        let before = reminders(&f.config);

        let result = f.coordinator.try_write(|txn| -> CoreResult<()> {
            txn.insert(&Reminder::new("doomed", 8, 0))?;
            panic!("operation bug");
        });
        assert!(matches!(result, Err(CoreError::Aborted { .. })));
        assert_eq!(reminders(&f.config), before);
    }

    #[test]
    fn background_write_commits() {
        let f = fixture(Arc::new(InlineContext));
        let ticket = f.coordinator.write_async(|txn| txn.insert(&Reminder::new("later", 7, 30)));
        let id = ticket.wait().unwrap();

        let handle = StoreHandle::open(&f.config, AccessMode::Read).unwrap();
        let stored: Reminder = handle.image().get(id).unwrap().unwrap();
        assert_eq!(stored.label, "later");
    }

    #[test]
    fn background_failure_reaches_callback_on_main_queue() {
        let queue = MainQueue::new();
        let f = fixture(Arc::new(queue.context()));
        let failures = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&failures);
        let ticket = f.coordinator.write_async_with(
            |_txn| -> CoreResult<()> { Err(CoreError::aborted("nope")) },
            move |e| sink.lock().push(e.to_string()),
        );

        assert!(matches!(ticket.wait(), Err(CoreError::Aborted { .. })));
        assert!(queue.run_until(Duration::from_secs(5), || !failures.lock().is_empty()));
        assert!(failures.lock()[0].contains("nope"));
    }

    #[test]
    fn cancelled_write_is_skipped() {
        let f = fixture(Arc::new(InlineContext));
        let before = reminders(&f.config);

        // Hold the worker so the next job cannot start before it is cancelled.
        let (release, blocked) = crossbeam_channel::bounded::<()>(0);
        f.coordinator
            .worker
            .submit(move || {
                let _ = blocked.recv();
            })
            .unwrap();

        let ticket = f.coordinator.write_async(|txn| {
            txn.insert(&Reminder::new("never", 6, 0))?;
            Ok(())
        });
        assert!(ticket.cancel());
        release.send(()).unwrap();

        assert!(matches!(ticket.wait(), Err(CoreError::Cancelled)));
        assert_eq!(reminders(&f.config), before);
    }

    #[test]
    fn barrier_orders_sync_after_async() {
        let f = fixture(Arc::new(InlineContext));
        for i in 0..5 {
            let _ = f
                .coordinator
                .write_async(move |txn| txn.insert(&Reminder::new(format!("bg{i}"), 10, 0)));
        }
        f.coordinator.barrier().unwrap();

        assert!(f.coordinator.write_sync(|txn| {
            let count = txn.count(Reminder::COLLECTION);
            txn.insert(&Reminder::new(format!("after {count}"), 11, 0))?;
            Ok(())
        }));
        let all = reminders(&f.config);
        assert!(all.last().unwrap().label.starts_with("after"));
        assert_eq!(all.iter().filter(|r| r.label.starts_with("bg")).count(), 5);
    }
}
