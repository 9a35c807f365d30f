//! Store directory layout.
//!
//! Every store lives in a directory and is made of one primary data file plus
//! a fixed set of auxiliary paths derived from its file name:
//!
//! ```text
//! <dir>/
//! ├─ default.carestore              # Primary data file
//! ├─ default.carestore.lock         # Advisory lock
//! ├─ default.carestore.note         # Commit staging file
//! └─ default.carestore.management/  # Legacy management directory
//! ```
//!
//! Deleting a store removes exactly these paths and leaves the directory in
//! place, so directory handles held elsewhere stay valid.

use crate::error::{StorageError, StorageResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const LOCK_SUFFIX: &str = "lock";
const NOTE_SUFFIX: &str = "note";
const MANAGEMENT_SUFFIX: &str = "management";

/// Names the files that make up one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    dir: PathBuf,
    file_name: String,
}

impl StoreLayout {
    /// Creates a layout for the store `file_name` inside `dir`.
    #[must_use]
    pub fn new(dir: &Path, file_name: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            file_name: file_name.to_string(),
        }
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the primary data file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Returns the path to the primary data file.
    #[must_use]
    pub fn primary_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Returns the path to the lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.auxiliary(LOCK_SUFFIX)
    }

    /// Returns the path of the commit staging file.
    #[must_use]
    pub fn note_path(&self) -> PathBuf {
        self.auxiliary(NOTE_SUFFIX)
    }

    /// Returns the path of the management directory.
    #[must_use]
    pub fn management_path(&self) -> PathBuf {
        self.auxiliary(MANAGEMENT_SUFFIX)
    }

    /// Returns every path owned by the store, primary file first.
    #[must_use]
    pub fn owned_paths(&self) -> Vec<PathBuf> {
        vec![
            self.primary_path(),
            self.lock_path(),
            self.note_path(),
            self.management_path(),
        ]
    }

    /// Returns true if the primary data file exists.
    #[must_use]
    pub fn primary_exists(&self) -> bool {
        self.primary_path().is_file()
    }

    /// Creates the store directory if it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CreateDirectory`] if the directory cannot be
    /// created, or if the path exists but is not a directory.
    pub fn ensure_directory(&self) -> StorageResult<()> {
        if self.dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|source| StorageError::CreateDirectory {
            path: self.dir.clone(),
            source,
        })?;
        if !self.dir.is_dir() {
            return Err(StorageError::CreateDirectory {
                path: self.dir.clone(),
                source: io::Error::new(io::ErrorKind::Other, "path is not a directory"),
            });
        }
        Ok(())
    }

    /// Removes the store's files, leaving the directory itself in place.
    ///
    /// Returns the number of paths that existed and were removed. Missing
    /// paths are not an error.
    pub fn remove_files(&self) -> StorageResult<usize> {
        let mut removed = 0;
        for path in self.owned_paths() {
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    fn auxiliary(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}.{suffix}", self.file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn paths_are_derived_from_file_name() {
        let layout = StoreLayout::new(Path::new("/data/store"), "default.carestore");

        assert_eq!(layout.primary_path(), Path::new("/data/store/default.carestore"));
        assert_eq!(layout.lock_path(), Path::new("/data/store/default.carestore.lock"));
        assert_eq!(layout.note_path(), Path::new("/data/store/default.carestore.note"));
        assert_eq!(
            layout.management_path(),
            Path::new("/data/store/default.carestore.management")
        );
        assert_eq!(layout.owned_paths().len(), 4);
    }

    #[test]
    fn ensure_directory_creates_nested_dirs() {
        let temp = tempdir().unwrap();
        let layout = StoreLayout::new(&temp.path().join("a").join("b"), "x.carestore");

        layout.ensure_directory().unwrap();
        assert!(layout.dir().is_dir());

        // Idempotent
        layout.ensure_directory().unwrap();
    }

    #[test]
    fn ensure_directory_fails_on_file() {
        let temp = tempdir().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"not a dir").unwrap();

        let layout = StoreLayout::new(&blocker, "x.carestore");
        let result = layout.ensure_directory();
        assert!(matches!(result, Err(StorageError::CreateDirectory { .. })));
    }

    #[test]
    fn remove_files_keeps_directory_and_foreign_files() {
        let temp = tempdir().unwrap();
        let layout = StoreLayout::new(temp.path(), "x.carestore");

        fs::write(layout.primary_path(), b"data").unwrap();
        fs::write(layout.lock_path(), b"").unwrap();
        fs::create_dir(layout.management_path()).unwrap();
        fs::write(temp.path().join("unrelated.txt"), b"keep").unwrap();

        let removed = layout.remove_files().unwrap();

        assert_eq!(removed, 3);
        assert!(temp.path().is_dir());
        assert!(!layout.primary_exists());
        assert!(temp.path().join("unrelated.txt").exists());
    }

    #[test]
    fn remove_files_on_empty_directory() {
        let temp = tempdir().unwrap();
        let layout = StoreLayout::new(temp.path(), "x.carestore");
        assert_eq!(layout.remove_files().unwrap(), 0);
    }
}
