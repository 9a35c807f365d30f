//! Scope-guarded scratch directories.

use crate::error::{StorageError, StorageResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A scratch directory that is removed when the guard goes out of scope.
///
/// Backup export and import stage their files in a `ScratchDir`. Removal
/// happens on every exit path: call [`close`](Self::close) to observe the
/// removal result, or let the guard drop (errors are logged).
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    removed: bool,
}

impl ScratchDir {
    /// Creates a fresh, empty scratch directory at `path`.
    ///
    /// Leftovers from an earlier interrupted run at the same path are
    /// removed first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CreateDirectory`] if the directory cannot be
    /// created.
    pub fn create(path: &Path) -> StorageResult<Self> {
        match fs::remove_dir_all(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale scratch directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        fs::create_dir_all(path).map_err(|source| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            removed: false,
        })
    }

    /// Returns the scratch directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of `name` inside the scratch directory.
    #[must_use]
    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Removes the scratch directory now and reports the result.
    pub fn close(mut self) -> StorageResult<()> {
        self.removed = true;
        remove(&self.path)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = remove(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove scratch directory");
        }
    }
}

fn remove(path: &Path) -> StorageResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn removed_on_drop() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("backup");

        {
            let scratch = ScratchDir::create(&path).unwrap();
            fs::write(scratch.join("archive"), b"data").unwrap();
            assert!(path.is_dir());
        }

        assert!(!path.exists());
    }

    #[test]
    fn removed_on_close() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("backup");

        let scratch = ScratchDir::create(&path).unwrap();
        scratch.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn removed_when_unwinding_from_error() {
        fn failing_step(path: &Path) -> StorageResult<()> {
            let scratch = ScratchDir::create(path)?;
            fs::write(scratch.join("partial"), b"half")?;
            Err(StorageError::corrupted("step failed"))
        }

        let temp = tempdir().unwrap();
        let path = temp.path().join("backup");

        assert!(failing_step(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn stale_contents_are_cleared() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("backup");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("stale"), b"old").unwrap();

        let scratch = ScratchDir::create(&path).unwrap();
        assert!(!scratch.join("stale").exists());
    }
}
