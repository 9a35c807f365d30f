//! Whole-file reads and crash-safe replacement.

use crate::error::StorageResult;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

/// Reads a whole file into memory.
pub fn read_file(path: &Path) -> StorageResult<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(data)
}

/// Replaces `target` with `data` atomically.
///
/// Uses the write-then-rename pattern:
/// 1. Write to the staging file
/// 2. Sync the staging file to disk
/// 3. Rename the staging file over `target`
/// 4. Fsync the parent directory so the rename is durable
///
/// Readers see either the old contents or the new contents, never a mix.
/// The staging file must live in the same directory as `target`.
pub fn write_atomic(target: &Path, staging: &Path, data: &[u8]) -> StorageResult<()> {
    let mut file = File::create(staging)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(staging, target) {
        let _ = fs::remove_file(staging);
        return Err(e.into());
    }

    if let Some(parent) = target.parent() {
        sync_directory(parent)?;
    }
    Ok(())
}

/// Syncs a directory so that creations, renames and deletions in it are
/// durable.
///
/// On Windows, directory fsync is not supported in the same way as Unix;
/// NTFS journaling covers metadata durability, so this is a no-op there.
#[cfg(unix)]
pub fn sync_directory(dir: &Path) -> StorageResult<()> {
    let handle = File::open(dir)?;
    handle.sync_all()?;
    Ok(())
}

/// Syncs a directory (no-op on this platform).
#[cfg(not(unix))]
pub fn sync_directory(_dir: &Path) -> StorageResult<()> {
    Ok(())
}
