//! Test fixtures and store helpers.
//!
//! A [`TestStore`] is a [`Database`] in a temporary directory whose callbacks
//! are delivered through a [`MainQueue`] owned by the test thread, the way an
//! application's main thread would receive them.

use carestore_core::{
    Database, MainQueue, MigrationEngine, StoreConfiguration, TestScenario, TouchState,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// How long helpers pump the callback queue before giving up.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The database instance.
    pub db: Database,
    /// Queue the database delivers callbacks to.
    pub queue: MainQueue,
    config: StoreConfiguration,
    temp_dir: TempDir,
}

impl TestStore {
    /// Creates an untouched store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Creates an untouched store, letting `configure` adjust the
    /// configuration. The location is already set.
    pub fn with_config(configure: impl FnOnce(StoreConfiguration) -> StoreConfiguration) -> Self {
        Self::build(configure, MigrationEngine::standard())
    }

    /// Creates an untouched store with a custom migration engine.
    pub fn with_engine(engine: MigrationEngine) -> Self {
        Self::build(|config| config, engine)
    }

    /// Creates a store and touches it, asserting it reached `Finished`.
    pub fn touched() -> Self {
        let store = Self::new();
        assert_eq!(store.touch(None).last(), Some(&TouchState::Finished));
        store
    }

    fn build(
        configure: impl FnOnce(StoreConfiguration) -> StoreConfiguration,
        engine: MigrationEngine,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = configure(StoreConfiguration::new(temp_dir.path().join("store")));
        let queue = MainQueue::new();
        let db = Database::with_engine(config.clone(), engine, Arc::new(queue.context()))
            .expect("Failed to create database");
        Self {
            db,
            queue,
            config,
            temp_dir,
        }
    }

    /// Returns the temporary directory everything lives in.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns the store's configuration.
    pub fn config(&self) -> &StoreConfiguration {
        &self.config
    }

    /// Touches the store and pumps callbacks until a terminal state arrives.
    ///
    /// Returns every state the observer saw, in order.
    pub fn touch(&self, scenario: Option<TestScenario>) -> Vec<TouchState> {
        touch_and_wait(&self.db, &self.queue, scenario)
    }

    /// Creates a second database over the same files, as a restarted process
    /// would. Its callbacks go to this store's queue.
    pub fn restart(&self) -> Database {
        self.restart_with(self.config.clone())
    }

    /// Like [`restart`](Self::restart) with a different configuration.
    pub fn restart_with(&self, config: StoreConfiguration) -> Database {
        Database::new(config, Arc::new(self.queue.context())).expect("Failed to create database")
    }

    /// Exports through the worker and waits for the completion callback.
    pub fn export(&self) -> Option<Vec<u8>> {
        export_and_wait(&self.db, &self.queue)
    }

    /// Writes an archive to a file in the temporary directory.
    pub fn save_archive(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.dir().join(name);
        std::fs::write(&path, data).expect("Failed to write archive");
        path
    }

    /// Returns the raw bytes of the primary data file.
    pub fn primary_bytes(&self) -> Vec<u8> {
        carestore_storage::read_file(&self.config.layout().primary_path())
            .expect("Failed to read primary file")
    }

    /// Lists what is left in the scratch root.
    pub fn scratch_leftovers(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.config.scratch_dir()) {
            Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStore {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Touches `db` and pumps `queue` until a terminal state arrives.
///
/// Panics if none arrives within [`TIMEOUT`].
pub fn touch_and_wait(
    db: &Database,
    queue: &MainQueue,
    scenario: Option<TestScenario>,
) -> Vec<TouchState> {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    db.touch_database(scenario, move |state| sink.lock().push(state))
        .expect("Failed to start touch");

    let done = queue.run_until(TIMEOUT, || {
        states.lock().last().is_some_and(|s| s.is_terminal())
    });
    assert!(done, "touch did not finish within {TIMEOUT:?}");
    let seen = states.lock().clone();
    seen
}

/// Exports `db` through its worker and pumps `queue` until the completion
/// callback has run.
pub fn export_and_wait(db: &Database, queue: &MainQueue) -> Option<Vec<u8>> {
    let slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    db.export_data(move |archive| *sink.lock() = Some(archive))
        .expect("Failed to queue export");

    let done = queue.run_until(TIMEOUT, || slot.lock().is_some());
    assert!(done, "export did not finish within {TIMEOUT:?}");
    let archive = slot.lock().take().flatten();
    archive
}
