//! Opening, creating and migrating the store.
//!
//! ```text
//! idle ─┬─ no primary file ──▶ creating ──────────────────────▶ migrating ─▶ Finished
//!       └─ primary file ─────▶ probing ─┬─ older ─▶ BeginMigration ─▶ migrating
//!                                       ├─ equal ─▶ Finished
//!                                       └─ newer ─▶ InitError
//! creating / probing failures ─▶ InitError
//! migrating failures          ─▶ MigrationError
//! ```
//!
//! A migration pass runs in a single write transaction. If any step fails
//! nothing from the pass is committed and the store stays at its old
//! version.

use crate::config::StoreConfiguration;
use crate::dispatch::CallbackContext;
use crate::error::{CoreError, CoreResult, ErrorCategory};
use crate::handle::{AccessMode, StoreHandle};
use crate::migration::{MigrationEngine, TestScenario};
use crate::types::SchemaVersion;
use crate::worker::BackgroundWorker;
use carestore_storage::StorageError;
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};

/// In-process reader/writer gate around one store's files.
///
/// Readers (queries, export) hold it shared; writers, lifecycle work and
/// the import swap hold it exclusively.
pub type AccessGate = Arc<RwLock<()>>;

/// Progress notifications emitted while touching the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchState {
    /// An existing store is about to be migrated to the target version.
    BeginMigration,
    /// The store is open at the target version.
    Finished,
    /// The store could not be created or probed.
    InitError,
    /// The migration pass failed; the store keeps its old version.
    MigrationError,
}

impl TouchState {
    /// Returns true for states after which no further state follows.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::BeginMigration)
    }
}

/// Brings the store to its target schema version.
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    config: Arc<StoreConfiguration>,
    engine: Arc<MigrationEngine>,
    gate: AccessGate,
}

impl LifecycleManager {
    /// Creates a lifecycle manager.
    #[must_use]
    pub fn new(
        config: Arc<StoreConfiguration>,
        engine: Arc<MigrationEngine>,
        gate: AccessGate,
    ) -> Self {
        Self {
            config,
            engine,
            gate,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfiguration {
        &self.config
    }

    /// Returns the migration engine.
    #[must_use]
    pub fn engine(&self) -> &MigrationEngine {
        &self.engine
    }

    /// Creates the store directory and scratch root if they are missing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Environment`] if either cannot be created.
    pub fn ensure_environment(&self) -> CoreResult<()> {
        self.config
            .layout()
            .ensure_directory()
            .map_err(CoreError::environment)?;

        let scratch = self.config.scratch_dir();
        fs::create_dir_all(&scratch).map_err(|source| {
            CoreError::environment(StorageError::CreateDirectory {
                path: scratch.clone(),
                source,
            })
        })
    }

    /// Touches the store on the background worker.
    ///
    /// The directory structure is created before this returns; failing that
    /// is reported as an error here rather than through `observer`. The
    /// open and migrate work is queued on `worker`, and every state is
    /// handed to `callbacks` for delivery, so `observer` never runs on the
    /// worker thread unless the context chooses to run it there.
    pub fn touch<F>(
        &self,
        worker: &BackgroundWorker,
        callbacks: Arc<dyn CallbackContext>,
        scenario: Option<TestScenario>,
        observer: F,
    ) -> CoreResult<()>
    where
        F: FnMut(TouchState) + Send + 'static,
    {
        self.ensure_environment()?;

        let observer = Arc::new(Mutex::new(observer));
        let manager = self.clone();
        worker.submit(move || {
            let mut report = |state: TouchState| {
                let observer = Arc::clone(&observer);
                callbacks.dispatch(Box::new(move || {
                    let mut observer = observer.lock();
                    (*observer)(state);
                }));
            };
            // Outcome already reported through the observer.
            let _ = manager.run(scenario, &mut report);
        })
    }

    /// Opens or creates the store and migrates it, reporting states to
    /// `observer` on the current thread.
    ///
    /// Returns the store's schema version. The access gate is held
    /// exclusively while the store is opened and migrated and released
    /// before `observer` sees any state, so the observer may query the
    /// store.
    pub fn run(
        &self,
        scenario: Option<TestScenario>,
        observer: &mut dyn FnMut(TouchState),
    ) -> CoreResult<SchemaVersion> {
        let mut progress = Vec::new();
        let result = {
            let _exclusive = self.gate.write();
            self.open_or_create(scenario, &mut progress)
        };
        for state in progress {
            observer(state);
        }

        match &result {
            Ok(version) => {
                info!(location = %self.config.location().display(), version, "store ready");
                observer(TouchState::Finished);
            }
            Err(e) => {
                let state = if e.category() == ErrorCategory::Migration {
                    TouchState::MigrationError
                } else {
                    TouchState::InitError
                };
                warn!(location = %self.config.location().display(), error = %e, ?state, "touch failed");
                observer(state);
            }
        }
        result
    }

    fn open_or_create(
        &self,
        scenario: Option<TestScenario>,
        progress: &mut Vec<TouchState>,
    ) -> CoreResult<SchemaVersion> {
        let layout = self.config.layout();
        let target = self.config.target();

        if scenario.is_some() {
            let removed = layout
                .remove_files()
                .map_err(|e| CoreError::init(e.into()))?;
            warn!(?scenario, removed, "reset store for test scenario");
        }

        if !layout.primary_exists() {
            info!(location = %layout.dir().display(), "creating store");
            drop(StoreHandle::create(&self.config).map_err(CoreError::init)?);
            return self.migrate(target, scenario);
        }

        let persisted = StoreHandle::probe_version(&self.config).map_err(CoreError::init)?;
        if persisted > target {
            return Err(CoreError::init(CoreError::VersionTooNew { persisted, target }));
        }
        if persisted < target {
            info!(from = persisted, to = target, "store needs migration");
            progress.push(TouchState::BeginMigration);
            return self.migrate(target, scenario);
        }

        // Up to date; make sure it actually decodes.
        StoreHandle::open(&self.config, AccessMode::Read).map_err(CoreError::init)?;
        Ok(persisted)
    }

    fn migrate(
        &self,
        target: SchemaVersion,
        scenario: Option<TestScenario>,
    ) -> CoreResult<SchemaVersion> {
        let mut handle = StoreHandle::open(&self.config, AccessMode::Write)
            .map_err(|e| CoreError::migration(0, target, e))?;
        let old = handle.schema_version();
        let failed = |e| CoreError::migration(old, target, e);

        let mut txn = handle.begin_write().map_err(failed)?;
        self.engine.run(&mut txn, old, target, scenario)?;
        txn.set_schema_version(target).map_err(failed)?;
        txn.commit().map_err(failed)?;
        Ok(target)
    }
}
