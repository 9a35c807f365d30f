//! Restoring the store from a backup archive.
//!
//! The candidate is unpacked into its own scratch directory and opened there
//! with the full lifecycle (including migration to the target version).
//! Only a candidate that opens cleanly replaces the live store, and it does
//! so by renaming directories, never by copying files over the live ones.

use super::archive::{self, ARCHIVE_FILE_NAME};
use crate::config::StoreConfiguration;
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::{AccessGate, LifecycleManager};
use crate::migration::MigrationEngine;
use carestore_storage::{read_file, sync_directory, write_atomic, ScratchDir};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const STAGED_DIR: &str = "store";
const PREVIOUS_DIR: &str = "previous";

/// Replaces the live store with the contents of a backup archive.
#[derive(Debug, Clone)]
pub struct BackupImporter {
    config: Arc<StoreConfiguration>,
    gate: AccessGate,
    engine: Arc<MigrationEngine>,
}

impl BackupImporter {
    /// Creates an importer.
    #[must_use]
    pub fn new(
        config: Arc<StoreConfiguration>,
        gate: AccessGate,
        engine: Arc<MigrationEngine>,
    ) -> Self {
        Self {
            config,
            gate,
            engine,
        }
    }

    /// Imports the archive at `path`. Returns true once the live store holds
    /// the imported data.
    pub fn import(&self, path: &Path) -> bool {
        match self.try_import(path) {
            Ok(()) => true,
            Err(e) if e.is_fatal() => {
                error!(error = %e, "import left the store inconsistent");
                false
            }
            Err(e) => {
                warn!(error = %e, "import failed; store unchanged");
                false
            }
        }
    }

    /// Imports the archive at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ImportFailed`] if the archive cannot be read,
    /// unpacked or opened; the live store is untouched. Returns
    /// [`CoreError::SwapInconsistency`] if the live store was moved aside
    /// and could be neither replaced nor restored.
    pub fn try_import(&self, path: &Path) -> CoreResult<()> {
        let scratch = self.scratch().map_err(CoreError::import_failed)?;
        let copy = scratch.join(ARCHIVE_FILE_NAME);
        let data = fs::copy(path, &copy)
            .map_err(CoreError::from)
            .and_then(|_| read_file(&copy).map_err(CoreError::from))
            .map_err(CoreError::import_failed)?;
        self.install(scratch, &data)
    }

    /// Imports an archive held in memory.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ImportFailed`] if the scratch directory cannot
    /// be created or the archive does not validate; the live store is
    /// untouched. Returns [`CoreError::SwapInconsistency`] under the same
    /// conditions as [`try_import`](Self::try_import).
    pub fn import_bytes(&self, data: &[u8]) -> CoreResult<()> {
        let scratch = self.scratch().map_err(CoreError::import_failed)?;
        self.install(scratch, data)
    }

    fn scratch(&self) -> CoreResult<ScratchDir> {
        let path = self
            .config
            .scratch_dir()
            .join(format!("import-{}", Uuid::new_v4()));
        Ok(ScratchDir::create(&path)?)
    }

    fn install(&self, scratch: ScratchDir, data: &[u8]) -> CoreResult<()> {
        let staged_dir = scratch.join(STAGED_DIR);
        let version = self
            .stage(&staged_dir, data)
            .map_err(CoreError::import_failed)?;

        {
            let _exclusive = self.gate.write();
            swap_directories(
                self.config.location(),
                &staged_dir,
                &scratch.join(PREVIOUS_DIR),
                |from, to| fs::rename(from, to),
            )?;
        }

        if let Err(e) = scratch.close() {
            warn!(error = %e, "could not remove import scratch directory");
        }
        info!(location = %self.config.location().display(), version, "imported store");
        Ok(())
    }

    /// Unpacks the candidate into `dir` and opens it at the target version.
    fn stage(&self, dir: &Path, data: &[u8]) -> CoreResult<u64> {
        let unpacked = archive::unpack(data)?;
        let file_name = self.config.layout().file_name().to_string();
        let [entry] = unpacked.entries.as_slice() else {
            return Err(CoreError::invalid_format(format!(
                "expected one archive entry, found {}",
                unpacked.entries.len()
            )));
        };
        if entry.name != file_name {
            return Err(CoreError::invalid_format(format!(
                "archive holds '{}', expected '{file_name}'",
                entry.name
            )));
        }

        let staged = self.config.staged_at(dir);
        let layout = staged.layout();
        layout.ensure_directory()?;
        write_atomic(&layout.primary_path(), &layout.note_path(), &entry.data)?;

        let validator = LifecycleManager::new(
            Arc::new(staged),
            Arc::clone(&self.engine),
            AccessGate::default(),
        );
        validator.run(None, &mut |state| debug!(?state, "validating staged store"))
    }
}

/// Moves `staged` to `live`, keeping the old `live` at `previous` until the
/// move has succeeded.
///
/// If the move fails the old directory is put back. If that fails too the
/// store location may be empty, which is reported as
/// [`CoreError::SwapInconsistency`].
fn swap_directories<R>(live: &Path, staged: &Path, previous: &Path, rename: R) -> CoreResult<()>
where
    R: Fn(&Path, &Path) -> io::Result<()>,
{
    let had_live = live.exists();
    if had_live {
        rename(live, previous).map_err(|e| CoreError::import_failed(e.into()))?;
    }

    if let Err(e) = rename(staged, live) {
        if had_live {
            if let Err(restore) = rename(previous, live) {
                return Err(CoreError::swap_inconsistency(
                    live.to_path_buf(),
                    format!(
                        "imported store could not be moved into place ({e}) and the previous store could not be restored ({restore}); it remains at {}",
                        previous.display()
                    ),
                ));
            }
        }
        return Err(CoreError::import_failed(e.into()));
    }

    if let Some(parent) = live.parent() {
        if let Err(e) = sync_directory(parent) {
            warn!(error = %e, "could not sync store parent directory");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupExporter;
    use crate::handle::{AccessMode, StoreHandle};
    use crate::record::Record;
    use crate::records::{DiagnosisType, Reminder};
    use crate::write::WriteCoordinator;
    use tempfile::{tempdir, TempDir};

    struct Store {
        config: Arc<StoreConfiguration>,
        gate: AccessGate,
        engine: Arc<MigrationEngine>,
    }

    impl Store {
        fn touched(root: &Path, name: &str) -> Self {
            let config = Arc::new(StoreConfiguration::new(root.join(name)));
            let gate = AccessGate::default();
            let engine = Arc::new(MigrationEngine::standard());
            let lifecycle =
                LifecycleManager::new(Arc::clone(&config), Arc::clone(&engine), Arc::clone(&gate));
            lifecycle.ensure_environment().unwrap();
            lifecycle.run(None, &mut |_| {}).unwrap();
            Self {
                config,
                gate,
                engine,
            }
        }

        fn importer(&self) -> BackupImporter {
            BackupImporter::new(
                Arc::clone(&self.config),
                Arc::clone(&self.gate),
                Arc::clone(&self.engine),
            )
        }

        fn export(&self) -> Vec<u8> {
            BackupExporter::new(Arc::clone(&self.config), Arc::clone(&self.gate))
                .export()
                .unwrap()
        }

        fn reminders(&self) -> Vec<Reminder> {
            StoreHandle::open(&self.config, AccessMode::Read)
                .unwrap()
                .image()
                .all()
                .unwrap()
        }

        fn add_reminder(&self, label: &str) {
            let worker = Arc::new(crate::worker::BackgroundWorker::new("import-test").unwrap());
            let writes = WriteCoordinator::new(
                Arc::clone(&self.config),
                Arc::clone(&self.gate),
                worker,
                Arc::new(crate::dispatch::InlineContext),
            );
            assert!(writes.write_sync(|txn| {
                txn.insert(&Reminder::new(label, 7, 0))?;
                Ok(())
            }));
        }
    }

    fn scratch_is_clean(config: &StoreConfiguration) -> bool {
        fs::read_dir(config.scratch_dir())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }

    fn root() -> TempDir {
        tempdir().unwrap()
    }

    #[test]
    fn import_replaces_live_store() {
        let temp = root();
        let source = Store::touched(temp.path(), "source");
        source.add_reminder("from source");
        let bytes = source.export();

        let target = Store::touched(temp.path(), "target");
        target.add_reminder("to be replaced");
        target.importer().import_bytes(&bytes).unwrap();

        assert_eq!(target.reminders(), source.reminders());
        assert!(scratch_is_clean(&target.config));
    }

    #[test]
    fn zero_byte_file_leaves_store_untouched() {
        let temp = root();
        let store = Store::touched(temp.path(), "store");
        store.add_reminder("keep me");
        let before = store.reminders();

        let empty = temp.path().join("empty.cbak");
        fs::write(&empty, b"").unwrap();

        assert!(!store.importer().import(&empty));
        assert_eq!(store.reminders(), before);
        assert!(scratch_is_clean(&store.config));
    }

    #[test]
    fn missing_file_is_import_failure() {
        let temp = root();
        let store = Store::touched(temp.path(), "store");
        let err = store
            .importer()
            .try_import(&temp.path().join("nope.cbak"))
            .unwrap_err();
        assert!(matches!(err, CoreError::ImportFailed { .. }));
    }

    #[test]
    fn archive_from_newer_app_is_rejected() {
        let temp = root();
        let source = Store::touched(temp.path(), "source");
        let bytes = source.export();

        let config = Arc::new(StoreConfiguration::new(temp.path().join("old")).target_version(1));
        let gate = AccessGate::default();
        let engine = Arc::new(MigrationEngine::standard());
        let lifecycle = LifecycleManager::new(Arc::clone(&config), Arc::clone(&engine), Arc::clone(&gate));
        lifecycle.ensure_environment().unwrap();
        lifecycle.run(None, &mut |_| {}).unwrap();

        let importer = BackupImporter::new(Arc::clone(&config), gate, engine);
        assert!(matches!(
            importer.import_bytes(&bytes),
            Err(CoreError::ImportFailed { .. })
        ));
        assert_eq!(StoreHandle::probe_version(&config).unwrap(), 1);
    }

    #[test]
    fn older_archive_is_migrated_on_import() {
        let temp = root();
        let config = Arc::new(StoreConfiguration::new(temp.path().join("v1")).target_version(1));
        let gate = AccessGate::default();
        let engine = Arc::new(MigrationEngine::standard());
        let lifecycle = LifecycleManager::new(Arc::clone(&config), Arc::clone(&engine), Arc::clone(&gate));
        lifecycle.ensure_environment().unwrap();
        lifecycle.run(None, &mut |_| {}).unwrap();
        let bytes = BackupExporter::new(config, gate).export().unwrap();

        let target = Store::touched(temp.path(), "target");
        target.importer().import_bytes(&bytes).unwrap();

        let handle = StoreHandle::open(&target.config, AccessMode::Read).unwrap();
        assert_eq!(handle.schema_version(), 2);
        assert_eq!(handle.image().count(DiagnosisType::COLLECTION), 4);
        assert_eq!(handle.image().count(Reminder::COLLECTION), 1);
    }

    #[test]
    fn failed_move_restores_previous_store() {
        let temp = root();
        let live = temp.path().join("live");
        let staged = temp.path().join("staged");
        let previous = temp.path().join("previous");
        fs::create_dir_all(&live).unwrap();
        fs::write(live.join("marker"), b"old").unwrap();
        fs::create_dir_all(&staged).unwrap();

        let err = swap_directories(&live, &staged, &previous, |from, to| {
            if from == staged.as_path() {
                Err(io::Error::new(io::ErrorKind::Other, "injected"))
            } else {
                fs::rename(from, to)
            }
        })
        .unwrap_err();

        assert!(matches!(err, CoreError::ImportFailed { .. }));
        assert_eq!(fs::read(live.join("marker")).unwrap(), b"old");
    }

    #[test]
    fn failed_restore_is_fatal() {
        let temp = root();
        let live = temp.path().join("live");
        let staged = temp.path().join("staged");
        let previous = temp.path().join("previous");
        fs::create_dir_all(&live).unwrap();
        fs::create_dir_all(&staged).unwrap();

        let err = swap_directories(&live, &staged, &previous, |from, to| {
            if from == live.as_path() {
                fs::rename(from, to)
            } else {
                Err(io::Error::new(io::ErrorKind::Other, "injected"))
            }
        })
        .unwrap_err();

        assert!(matches!(err, CoreError::SwapInconsistency { .. }));
        assert!(err.is_fatal());
        assert!(previous.exists());
    }
}
