//! Store configuration.

use crate::crypto::{CryptoManager, EncryptionKey};
use crate::error::CoreResult;
use crate::types::{SchemaVersion, CURRENT_SCHEMA_VERSION};
use carestore_storage::StoreLayout;
use std::path::{Path, PathBuf};

/// Default primary data file name.
pub const DEFAULT_FILE_NAME: &str = "default.carestore";

const SCRATCH_DIR: &str = ".carestore-scratch";

/// Immutable description of where a store lives and what it should become.
///
/// Built once by the application's composition root and passed (usually as
/// an `Arc`) to every component that touches the store. There is no global
/// instance.
///
/// # Example
///
/// ```
/// use carestore_core::StoreConfiguration;
///
/// let config = StoreConfiguration::new("/data/app/store")
///     .file_name("journal.carestore")
///     .target_version(2);
///
/// assert_eq!(config.target(), 2);
/// assert!(config.layout().primary_path().ends_with("journal.carestore"));
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfiguration {
    /// Directory holding the store's files.
    location: PathBuf,
    /// Primary data file name within `location`.
    file_name: String,
    /// Schema version the store is migrated to when touched.
    target_version: SchemaVersion,
    /// Key used to seal the primary data file, if any.
    encryption_key: Option<EncryptionKey>,
    /// Directory under which backup and import scratch directories are made.
    scratch_root: Option<PathBuf>,
}

impl StoreConfiguration {
    /// Creates a configuration for a store in `location` with default values.
    #[must_use]
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            target_version: CURRENT_SCHEMA_VERSION,
            encryption_key: None,
            scratch_root: None,
        }
    }

    /// Sets the primary data file name.
    #[must_use]
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    /// Sets the target schema version.
    #[must_use]
    pub fn target_version(mut self, version: SchemaVersion) -> Self {
        self.target_version = version;
        self
    }

    /// Sets the encryption key.
    #[must_use]
    pub fn encryption_key(mut self, key: EncryptionKey) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Sets the directory under which scratch directories are created.
    ///
    /// Import swaps the live store directory by renaming, so this should be
    /// on the same file system as the store.
    #[must_use]
    pub fn scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(dir.into());
        self
    }

    /// Returns the store directory.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Returns the configured target schema version.
    #[must_use]
    pub fn target(&self) -> SchemaVersion {
        self.target_version
    }

    /// Returns the encryption key, if any.
    #[must_use]
    pub fn key(&self) -> Option<&EncryptionKey> {
        self.encryption_key.as_ref()
    }

    /// Returns the file layout of the store.
    #[must_use]
    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(&self.location, &self.file_name)
    }

    /// Returns the scratch root.
    ///
    /// Defaults to a hidden sibling named after the store directory, so
    /// stores sharing a parent directory never share scratch space:
    /// `/data/journal` scratches in `/data/.journal.carestore-scratch`.
    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        if let Some(dir) = &self.scratch_root {
            return dir.clone();
        }
        let name = match self.location.file_name() {
            Some(name) => format!(".{}{SCRATCH_DIR}", name.to_string_lossy()),
            None => SCRATCH_DIR.to_string(),
        };
        self.location
            .parent()
            .map_or_else(|| PathBuf::from(&name), |p| p.join(&name))
    }

    /// Returns a copy of this configuration pointing at a staging directory.
    ///
    /// Used by import to validate a candidate store before it replaces the
    /// live one. File name, target version and key are kept.
    #[must_use]
    pub fn staged_at(&self, dir: &Path) -> Self {
        Self {
            location: dir.to_path_buf(),
            file_name: self.file_name.clone(),
            target_version: self.target_version,
            encryption_key: self.encryption_key.clone(),
            scratch_root: Some(dir.join(SCRATCH_DIR)),
        }
    }

    /// Builds the cipher for the configured key, if any.
    pub(crate) fn cipher(&self) -> CoreResult<Option<CryptoManager>> {
        self.encryption_key
            .as_ref()
            .map(CryptoManager::new)
            .transpose()
    }
}
