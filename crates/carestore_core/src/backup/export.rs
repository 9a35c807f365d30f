//! Producing backup archives.

use super::archive::{self, ArchiveEntry, ArchiveMetadata, ARCHIVE_FILE_NAME};
use crate::config::StoreConfiguration;
use crate::error::{CoreError, CoreResult};
use crate::handle::{AccessMode, StoreHandle};
use crate::lifecycle::AccessGate;
use carestore_storage::{read_file, write_atomic, ScratchDir};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Takes point-in-time archives of the store.
#[derive(Debug, Clone)]
pub struct BackupExporter {
    config: Arc<StoreConfiguration>,
    gate: AccessGate,
}

impl BackupExporter {
    /// Creates an exporter.
    #[must_use]
    pub fn new(config: Arc<StoreConfiguration>, gate: AccessGate) -> Self {
        Self { config, gate }
    }

    /// Exports the store. Returns `None` on failure.
    pub fn export(&self) -> Option<Vec<u8>> {
        match self.try_export() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "export failed");
                None
            }
        }
    }

    /// Exports the store.
    ///
    /// Writers are excluded from the moment the store is opened until the
    /// archive has been read back, so the archive reflects one committed
    /// state. Other readers may continue.
    ///
    /// The archive is assembled in a `backup-<uuid>` directory of its own
    /// under the scratch root, which is removed before this returns whether
    /// or not the export succeeded. Concurrent exports don't interfere.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ExportFailed`] wrapping the underlying failure.
    pub fn try_export(&self) -> CoreResult<Vec<u8>> {
        self.export_inner().map_err(CoreError::export_failed)
    }

    fn scratch(&self) -> PathBuf {
        self.config
            .scratch_dir()
            .join(format!("backup-{}", Uuid::new_v4()))
    }

    fn export_inner(&self) -> CoreResult<Vec<u8>> {
        let scratch = ScratchDir::create(&self.scratch())?;

        let _shared = self.gate.read();
        let handle = StoreHandle::open(&self.config, AccessMode::Read)?;
        let layout = handle.layout();
        let image = handle.image();

        let entries = [ArchiveEntry::new(
            layout.file_name(),
            read_file(&layout.primary_path())?,
        )];
        let metadata = ArchiveMetadata::now(image.schema_version, image.store_id);
        let packed = archive::pack(&metadata, &entries)?;

        let archive_path = scratch.join(ARCHIVE_FILE_NAME);
        write_atomic(&archive_path, &scratch.join("archive.partial"), &packed)?;
        let bytes = read_file(&archive_path)?;
        drop(handle);

        scratch.close()?;
        info!(
            store_id = %metadata.store_id,
            version = metadata.schema_version,
            bytes = bytes.len(),
            "exported store"
        );
        Ok(bytes)
    }
}
