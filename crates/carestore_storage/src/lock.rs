//! Advisory locking of a store's lock file.

use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// How a [`StoreLock`] holds the lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Any number of shared holders may coexist.
    Shared,
    /// A single holder, excluding shared holders too.
    Exclusive,
}

/// An advisory lock on a store's lock file.
///
/// The lock is taken without blocking and released when the value is
/// dropped (closing the file releases it; fs2 handles this on every
/// platform).
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    mode: LockMode,
    _file: File,
}

impl StoreLock {
    /// Acquires the lock file at `path` in the given mode.
    ///
    /// The lock file is created if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if a conflicting holder exists, or an
    /// I/O error if the lock file cannot be opened.
    pub fn acquire(path: &Path, mode: LockMode) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let locked = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };
        if locked.is_err() {
            return Err(StorageError::Locked {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            _file: file,
        })
    }

    /// Returns the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the mode the lock is held in.
    #[must_use]
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}
