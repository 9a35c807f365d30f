//! Backup export and import.
//!
//! An export is a single-file archive holding the store's primary data
//! file, taken while writers are excluded. An import validates a candidate
//! archive in isolation and only then swaps it in for the live store.
//!
//! Both sides work in scratch directories under the configured scratch
//! root; the directories are removed on success and on failure.

pub mod archive;
mod export;
mod import;

pub use archive::{
    Archive, ArchiveEntry, ArchiveMetadata, ARCHIVE_FILE_NAME, ARCHIVE_MIME_TYPE,
};
pub use export::BackupExporter;
pub use import::BackupImporter;
