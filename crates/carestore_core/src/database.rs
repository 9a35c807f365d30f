//! Database facade.

use crate::backup::{BackupExporter, BackupImporter};
use crate::config::StoreConfiguration;
use crate::dispatch::CallbackContext;
use crate::error::CoreResult;
use crate::handle::WriteTransaction;
use crate::lifecycle::{AccessGate, LifecycleManager, TouchState};
use crate::migration::{MigrationEngine, TestScenario};
use crate::query::QueryFacade;
use crate::worker::{BackgroundWorker, WriteTicket};
use crate::write::WriteCoordinator;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// The main store handle.
///
/// `Database` owns everything the application talks to:
/// - the lifecycle manager that opens, creates and migrates the store
/// - the write coordinator and its background worker
/// - backup export and import
/// - typed queries
///
/// Every component shares one configuration and one access gate, so reads,
/// writes, lifecycle work and backups exclude each other correctly.
///
/// # Starting up
///
/// ```rust,ignore
/// use carestore_core::{Database, MainQueue, StoreConfiguration, TouchState};
/// use std::sync::Arc;
///
/// let queue = MainQueue::new();
/// let db = Database::new(
///     StoreConfiguration::new("/data/app/store"),
///     Arc::new(queue.context()),
/// )?;
///
/// db.touch_database(None, |state| println!("store: {state:?}"))?;
/// queue.run_pending();
/// ```
///
/// # Writing
///
/// ```rust,ignore
/// use carestore_core::JournalEntry;
///
/// let ok = db.write(|txn| {
///     txn.insert(&JournalEntry::new(today, 4, "Slept well"))?;
///     Ok(())
/// });
/// ```
///
/// Writes made with [`write`](Self::write) run immediately on the calling
/// thread; writes made with [`background_write`](Self::background_write)
/// run later on the worker. The two are not ordered against each other.
/// Call [`barrier`](Self::barrier) to wait for queued writes first.
pub struct Database {
    config: Arc<StoreConfiguration>,
    callbacks: Arc<dyn CallbackContext>,
    worker: Arc<BackgroundWorker>,
    lifecycle: LifecycleManager,
    writes: WriteCoordinator,
    exporter: BackupExporter,
    importer: BackupImporter,
    queries: QueryFacade,
}

impl Database {
    /// Creates a database with the standard migrations.
    ///
    /// Nothing touches the disk until
    /// [`touch_database`](Self::touch_database) is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the background worker cannot be started.
    pub fn new(
        config: StoreConfiguration,
        callbacks: Arc<dyn CallbackContext>,
    ) -> CoreResult<Self> {
        Self::with_engine(config, MigrationEngine::standard(), callbacks)
    }

    /// Creates a database with a custom migration engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the background worker cannot be started.
    pub fn with_engine(
        config: StoreConfiguration,
        engine: MigrationEngine,
        callbacks: Arc<dyn CallbackContext>,
    ) -> CoreResult<Self> {
        let config = Arc::new(config);
        let engine = Arc::new(engine);
        let gate = AccessGate::default();
        let worker = Arc::new(BackgroundWorker::new("carestore-writer")?);

        let lifecycle =
            LifecycleManager::new(Arc::clone(&config), Arc::clone(&engine), Arc::clone(&gate));
        let writes = WriteCoordinator::new(
            Arc::clone(&config),
            Arc::clone(&gate),
            Arc::clone(&worker),
            Arc::clone(&callbacks),
        );
        let exporter = BackupExporter::new(Arc::clone(&config), Arc::clone(&gate));
        let importer = BackupImporter::new(Arc::clone(&config), Arc::clone(&gate), engine);
        let queries = QueryFacade::new(Arc::clone(&config), gate, writes.clone());

        debug!(location = %config.location().display(), "database created");
        Ok(Self {
            config,
            callbacks,
            worker,
            lifecycle,
            writes,
            exporter,
            importer,
            queries,
        })
    }

    /// Opens, creates or migrates the store in the background.
    ///
    /// `observer` receives every [`TouchState`] through the callback
    /// context, ending with [`TouchState::Finished`],
    /// [`TouchState::InitError`] or [`TouchState::MigrationError`].
    ///
    /// A `scenario` wipes the store and seeds it with test data.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Environment`](crate::CoreError::Environment) if
    /// the store directories cannot be created, or
    /// [`CoreError::WorkerStopped`](crate::CoreError::WorkerStopped). The
    /// observer is not called in either case.
    pub fn touch_database<F>(&self, scenario: Option<TestScenario>, observer: F) -> CoreResult<()>
    where
        F: FnMut(TouchState) + Send + 'static,
    {
        self.lifecycle
            .touch(&self.worker, Arc::clone(&self.callbacks), scenario, observer)
    }

    /// Runs `op` in a transaction on the calling thread. Returns true if it
    /// committed.
    pub fn write<F>(&self, op: F) -> bool
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> CoreResult<()>,
    {
        self.writes.write_sync(op)
    }

    /// Queues `op` on the background worker.
    pub fn background_write<T, F>(&self, op: F) -> WriteTicket<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut WriteTransaction<'_>) -> CoreResult<T> + Send + 'static,
    {
        self.writes.write_async(op)
    }

    /// Exports the store on the background worker.
    ///
    /// `completion` receives the archive bytes, or `None` if the export
    /// failed, through the callback context.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WorkerStopped`](crate::CoreError::WorkerStopped)
    /// if the export could not be queued; `completion` is not called then.
    pub fn export_data<F>(&self, completion: F) -> CoreResult<()>
    where
        F: FnOnce(Option<Vec<u8>>) + Send + 'static,
    {
        let exporter = self.exporter.clone();
        let callbacks = Arc::clone(&self.callbacks);
        self.worker.submit(move || {
            let archive = exporter.export();
            callbacks.dispatch(Box::new(move || completion(archive)));
        })
    }

    /// Replaces the store with the archive at `path`. Returns true on
    /// success. Blocks the calling thread.
    pub fn import_data(&self, path: &Path) -> bool {
        self.importer.import(path)
    }

    /// Waits until every queued background job has finished.
    ///
    /// # Errors
    ///
    /// Fails if called from the worker itself or if the worker has stopped.
    pub fn barrier(&self) -> CoreResult<()> {
        self.worker.barrier()
    }

    /// Returns the query facade.
    #[must_use]
    pub fn queries(&self) -> &QueryFacade {
        &self.queries
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfiguration {
        &self.config
    }

    /// Returns the lifecycle manager.
    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Returns the write coordinator.
    #[must_use]
    pub fn writes(&self) -> &WriteCoordinator {
        &self.writes
    }

    /// Returns the backup exporter.
    #[must_use]
    pub fn exporter(&self) -> &BackupExporter {
        &self.exporter
    }

    /// Returns the backup importer.
    #[must_use]
    pub fn importer(&self) -> &BackupImporter {
        &self.importer
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("location", &self.config.location())
            .field("target_version", &self.config.target())
            .finish_non_exhaustive()
    }
}
