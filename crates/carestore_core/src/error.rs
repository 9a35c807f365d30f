//! Error types for CareStore core.

use crate::types::{DocumentId, SchemaVersion};
use carestore_storage::StorageError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Broad classes of failure, used by callers to pick a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The environment is broken (directories cannot be created, the store
    /// may be missing after a failed swap). Not expected to be recoverable.
    Fatal,
    /// Creating or probing the store failed.
    Init,
    /// Applying migration steps failed.
    Migration,
    /// A write transaction failed and was rolled back.
    Write,
    /// Producing a backup archive failed.
    Export,
    /// Importing a backup archive failed; the live store is untouched.
    Import,
    /// Anything else.
    Other,
}

/// Errors that can occur in CareStore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CBOR encoding or decoding failed.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// Invalid store or archive format.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// A required directory could not be created.
    #[error("environment error: {source}")]
    Environment {
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },

    /// The store has no primary data file.
    #[error("store does not exist: {}", path.display())]
    StoreMissing {
        /// Expected path of the primary data file.
        path: PathBuf,
    },

    /// The store was written by a newer version of the application.
    #[error("store version {persisted} is newer than supported version {target}")]
    VersionTooNew {
        /// Version found on disk.
        persisted: SchemaVersion,
        /// Highest version this build understands.
        target: SchemaVersion,
    },

    /// An attempt was made to lower a store's schema version.
    #[error("schema version cannot decrease from {current} to {requested}")]
    VersionRegression {
        /// Current version.
        current: SchemaVersion,
        /// Requested version.
        requested: SchemaVersion,
    },

    /// Creating or probing the store failed.
    #[error("store initialization failed: {source}")]
    InitFailed {
        /// The underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// A migration pass failed; nothing from the pass was committed.
    #[error("migration from version {from} to {to} failed: {source}")]
    MigrationFailed {
        /// Version the pass started from.
        from: SchemaVersion,
        /// Version the pass was heading to.
        to: SchemaVersion,
        /// The underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// The registered migration steps are inconsistent.
    #[error("invalid migration plan: {message}")]
    InvalidMigrationPlan {
        /// Description of the inconsistency.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// A record to update does not exist.
    #[error("record {id} not found in collection {collection}")]
    RecordNotFound {
        /// Collection searched.
        collection: String,
        /// Missing record id.
        id: DocumentId,
    },

    /// A write operation asked for its transaction to be rolled back.
    #[error("write aborted: {reason}")]
    Aborted {
        /// Reason given by the operation.
        reason: String,
    },

    /// A background write failed.
    #[error("background write failed: {message}")]
    BackgroundWriteFailed {
        /// Rendered error of the failed write.
        message: String,
    },

    /// Export failed; no scratch state remains.
    #[error("export failed: {source}")]
    ExportFailed {
        /// The underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// Import failed; the live store is untouched.
    #[error("import failed: {source}")]
    ImportFailed {
        /// The underlying failure.
        #[source]
        source: Box<CoreError>,
    },

    /// The live store was moved away but the replacement could not be put
    /// in place, and the original could not be restored.
    #[error("store swap left {} inconsistent: {message}", location.display())]
    SwapInconsistency {
        /// The live store location.
        location: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The operation was cancelled before it started.
    #[error("operation cancelled")]
    Cancelled,

    /// The background worker is no longer running.
    #[error("background worker stopped")]
    WorkerStopped,

    /// Encryption is not enabled.
    #[error("encryption feature not enabled")]
    EncryptionNotEnabled,

    /// The store is encrypted but no key was configured.
    #[error("store is encrypted and no encryption key was configured")]
    EncryptionKeyRequired,

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Invalid key size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an environment error from a storage failure.
    pub fn environment(source: StorageError) -> Self {
        Self::Environment { source }
    }

    /// Wraps a failure that happened while creating or probing the store.
    ///
    /// Fatal errors pass through unchanged.
    pub fn init(source: CoreError) -> Self {
        if source.is_fatal() {
            return source;
        }
        Self::InitFailed {
            source: Box::new(source),
        }
    }

    /// Wraps a failure that happened during a migration pass.
    pub fn migration(from: SchemaVersion, to: SchemaVersion, source: CoreError) -> Self {
        if source.is_fatal() {
            return source;
        }
        Self::MigrationFailed {
            from,
            to,
            source: Box::new(source),
        }
    }

    /// Creates an invalid migration plan error.
    pub fn invalid_migration_plan(message: impl Into<String>) -> Self {
        Self::InvalidMigrationPlan {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an aborted-write error, for use inside write operations.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Wraps an export failure.
    pub fn export_failed(source: CoreError) -> Self {
        match source {
            Self::ExportFailed { .. } => source,
            other => Self::ExportFailed {
                source: Box::new(other),
            },
        }
    }

    /// Wraps an import failure. Fatal errors pass through unchanged.
    pub fn import_failed(source: CoreError) -> Self {
        if source.is_fatal() || matches!(source, Self::ImportFailed { .. }) {
            return source;
        }
        Self::ImportFailed {
            source: Box::new(source),
        }
    }

    /// Creates a swap inconsistency error.
    pub fn swap_inconsistency(location: PathBuf, message: impl Into<String>) -> Self {
        Self::SwapInconsistency {
            location,
            message: message.into(),
        }
    }

    /// Creates an encryption not enabled error.
    pub fn encryption_not_enabled() -> Self {
        Self::EncryptionNotEnabled
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Environment { .. } | Self::SwapInconsistency { .. } => ErrorCategory::Fatal,
            Self::InitFailed { .. } | Self::VersionTooNew { .. } => ErrorCategory::Init,
            Self::MigrationFailed { .. } | Self::InvalidMigrationPlan { .. } => {
                ErrorCategory::Migration
            }
            Self::Aborted { .. }
            | Self::BackgroundWriteFailed { .. }
            | Self::RecordNotFound { .. }
            | Self::VersionRegression { .. } => ErrorCategory::Write,
            Self::ExportFailed { .. } => ErrorCategory::Export,
            Self::ImportFailed { .. } => ErrorCategory::Import,
            _ => ErrorCategory::Other,
        }
    }

    /// Returns true for failures that are not expected to be recoverable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_not_rewrapped() {
        let env = CoreError::environment(StorageError::corrupted("x"));
        assert!(matches!(CoreError::init(env), CoreError::Environment { .. }));

        let swap = CoreError::swap_inconsistency(PathBuf::from("/store"), "rename failed");
        assert!(matches!(
            CoreError::import_failed(swap),
            CoreError::SwapInconsistency { .. }
        ));
    }

    #[test]
    fn categories() {
        assert_eq!(
            CoreError::init(CoreError::invalid_format("bad")).category(),
            ErrorCategory::Init
        );
        assert_eq!(
            CoreError::migration(1, 2, CoreError::aborted("step")).category(),
            ErrorCategory::Migration
        );
        assert_eq!(CoreError::aborted("no").category(), ErrorCategory::Write);
        assert_eq!(
            CoreError::import_failed(CoreError::invalid_format("empty")).category(),
            ErrorCategory::Import
        );
        assert!(CoreError::swap_inconsistency(PathBuf::new(), "x").is_fatal());
    }

    #[test]
    fn import_failure_is_not_double_wrapped() {
        let once = CoreError::import_failed(CoreError::invalid_format("x"));
        let twice = CoreError::import_failed(once);
        match twice {
            CoreError::ImportFailed { source } => {
                assert!(matches!(*source, CoreError::InvalidFormat { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn display_mentions_versions() {
        let err = CoreError::VersionTooNew {
            persisted: 5,
            target: 2,
        };
        assert_eq!(
            err.to_string(),
            "store version 5 is newer than supported version 2"
        );
    }
}
