//! Scoped store handles and write transactions.
//!
//! A [`StoreHandle`] is opened for exactly one operation. It holds the
//! advisory lock on the store's lock file and the decoded [`StoreImage`];
//! dropping it releases both. Nothing in this crate keeps a handle alive
//! past the operation that opened it.

use crate::config::StoreConfiguration;
use crate::crypto::CryptoManager;
use crate::error::{CoreError, CoreResult};
use crate::image::{encode_record, Documents, StoreImage};
use crate::record::Record;
use crate::types::{DocumentId, SchemaVersion};
use carestore_storage::{read_file, write_atomic, FrameHeader, LockMode, StoreLayout, StoreLock};
use ciborium::Value;
use std::ops::Deref;
use tracing::debug;

/// How a handle accesses the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Shared access; transactions cannot be started.
    Read,
    /// Exclusive access.
    Write,
}

impl AccessMode {
    fn lock_mode(self) -> LockMode {
        match self {
            Self::Read => LockMode::Shared,
            Self::Write => LockMode::Exclusive,
        }
    }
}

/// An open connection to the store files.
#[derive(Debug)]
pub struct StoreHandle {
    layout: StoreLayout,
    mode: AccessMode,
    image: StoreImage,
    crypto: Option<CryptoManager>,
    _lock: StoreLock,
}

impl StoreHandle {
    /// Creates a new, empty store at version 0 and returns a write handle.
    ///
    /// # Errors
    ///
    /// Fails if a primary data file already exists, if the lock is held
    /// elsewhere, or if the file cannot be written.
    pub fn create(config: &StoreConfiguration) -> CoreResult<Self> {
        let layout = config.layout();
        let crypto = config.cipher()?;
        let lock = StoreLock::acquire(&layout.lock_path(), LockMode::Exclusive)?;

        if layout.primary_exists() {
            return Err(CoreError::invalid_operation(format!(
                "store already exists at {}",
                layout.primary_path().display()
            )));
        }

        let image = StoreImage::empty();
        let bytes = image.to_file_bytes(crypto.as_ref())?;
        write_atomic(&layout.primary_path(), &layout.note_path(), &bytes)?;

        debug!(path = %layout.primary_path().display(), store_id = %image.store_id, "created store");
        Ok(Self {
            layout,
            mode: AccessMode::Write,
            image,
            crypto,
            _lock: lock,
        })
    }

    /// Opens an existing store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreMissing`] if there is no primary data file,
    /// a storage error if the lock is held in a conflicting mode, and a
    /// decoding error if the file is damaged or sealed under another key.
    pub fn open(config: &StoreConfiguration, mode: AccessMode) -> CoreResult<Self> {
        let layout = config.layout();
        if !layout.primary_exists() {
            return Err(CoreError::StoreMissing {
                path: layout.primary_path(),
            });
        }

        let crypto = config.cipher()?;
        let lock = StoreLock::acquire(&layout.lock_path(), mode.lock_mode())?;
        let data = read_file(&layout.primary_path())?;
        let image = StoreImage::from_file_bytes(&data, crypto.as_ref())?;

        debug!(
            path = %layout.primary_path().display(),
            ?mode,
            version = image.schema_version,
            "opened store"
        );
        Ok(Self {
            layout,
            mode,
            image,
            crypto,
            _lock: lock,
        })
    }

    /// Reads the persisted schema version without decoding the store.
    ///
    /// Only the frame header is read; the shared lock is released before
    /// this returns.
    pub fn probe_version(config: &StoreConfiguration) -> CoreResult<SchemaVersion> {
        let layout = config.layout();
        if !layout.primary_exists() {
            return Err(CoreError::StoreMissing {
                path: layout.primary_path(),
            });
        }

        let _lock = StoreLock::acquire(&layout.lock_path(), LockMode::Shared)?;
        let header = FrameHeader::read_from(&layout.primary_path())?;
        if header.encrypted && config.key().is_none() {
            return Err(CoreError::EncryptionKeyRequired);
        }
        Ok(header.schema_version)
    }

    /// Returns the layout of the store this handle is open on.
    #[must_use]
    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Returns the access mode.
    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Returns the committed contents of the store.
    #[must_use]
    pub fn image(&self) -> &StoreImage {
        &self.image
    }

    /// Returns the committed schema version.
    #[must_use]
    pub fn schema_version(&self) -> SchemaVersion {
        self.image.schema_version
    }

    /// Starts a write transaction.
    ///
    /// # Errors
    ///
    /// Fails if the handle was opened for reading.
    pub fn begin_write(&mut self) -> CoreResult<WriteTransaction<'_>> {
        if self.mode != AccessMode::Write {
            return Err(CoreError::invalid_operation(
                "cannot write through a read handle",
            ));
        }
        let working = self.image.clone();
        Ok(WriteTransaction {
            handle: self,
            working,
            state: TransactionState::Active,
        })
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        debug!(path = %self.layout.primary_path().display(), mode = ?self.mode, "closed store");
    }
}

/// State of a write transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Changes are being made.
    Active,
    /// Changes were written to disk.
    Committed,
    /// Changes were discarded.
    RolledBack,
}

/// A set of changes against a write handle.
///
/// Changes are made to a working copy of the store image. [`commit`]
/// replaces the primary data file in one atomic rename; dropping the
/// transaction without committing discards the working copy.
///
/// Reads through `Deref` see the transaction's own uncommitted changes.
///
/// [`commit`]: WriteTransaction::commit
#[derive(Debug)]
pub struct WriteTransaction<'h> {
    handle: &'h mut StoreHandle,
    working: StoreImage,
    state: TransactionState,
}

impl WriteTransaction<'_> {
    /// Returns the transaction state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Inserts a record and returns its newly assigned id.
    ///
    /// Any id the record already carries is ignored.
    pub fn insert<T: Record>(&mut self, record: &T) -> CoreResult<DocumentId> {
        let mut record = record.clone();
        let id = self.next_id();
        record.set_id(id);
        let value = encode_record(&record)?;
        self.documents_mut(T::COLLECTION).insert(id, value);
        Ok(id)
    }

    /// Replaces an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecordNotFound`] if no record has the given id.
    pub fn update<T: Record>(&mut self, record: &T) -> CoreResult<()> {
        let id = record.id();
        let value = encode_record(record)?;
        match self.documents_mut(T::COLLECTION).get_mut(&id) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(CoreError::RecordNotFound {
                collection: T::COLLECTION.to_string(),
                id,
            }),
        }
    }

    /// Removes a record. Returns false if it did not exist.
    pub fn remove<T: Record>(&mut self, id: DocumentId) -> bool {
        let Some(docs) = self.working.collections.get_mut(T::COLLECTION) else {
            return false;
        };
        let removed = docs.remove(&id).is_some();
        if docs.is_empty() {
            self.working.collections.remove(T::COLLECTION);
        }
        removed
    }

    /// Returns the raw documents of a collection, creating it if needed.
    ///
    /// Migration steps use this to reshape documents whose old layout no
    /// longer decodes as the current record type.
    pub fn documents_mut(&mut self, collection: &str) -> &mut Documents {
        self.working
            .collections
            .entry(collection.to_string())
            .or_default()
    }

    /// Inserts a raw document and returns its newly assigned id.
    pub fn insert_document(&mut self, collection: &str, document: Value) -> DocumentId {
        let id = self.next_id();
        self.documents_mut(collection).insert(id, document);
        id
    }

    /// Raises the schema version of the working copy.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::VersionRegression`] if `version` is lower than
    /// the current version.
    pub fn set_schema_version(&mut self, version: SchemaVersion) -> CoreResult<()> {
        let current = self.working.schema_version;
        if version < current {
            return Err(CoreError::VersionRegression {
                current,
                requested: version,
            });
        }
        self.working.schema_version = version;
        Ok(())
    }

    /// Writes the working copy to disk.
    ///
    /// On failure the committed store is unchanged.
    pub fn commit(mut self) -> CoreResult<()> {
        let bytes = self.working.to_file_bytes(self.handle.crypto.as_ref())?;
        let layout = &self.handle.layout;
        write_atomic(&layout.primary_path(), &layout.note_path(), &bytes)?;

        self.handle.image = std::mem::take(&mut self.working);
        self.state = TransactionState::Committed;
        debug!(
            path = %self.handle.layout.primary_path().display(),
            version = self.handle.image.schema_version,
            documents = self.handle.image.total_documents(),
            "committed transaction"
        );
        Ok(())
    }

    /// Discards the working copy.
    pub fn rollback(mut self) {
        self.state = TransactionState::RolledBack;
        debug!(path = %self.handle.layout.primary_path().display(), "rolled back transaction");
    }

    fn next_id(&mut self) -> DocumentId {
        let id = DocumentId::new(self.working.next_document_id);
        self.working.next_document_id += 1;
        id
    }
}

impl Deref for WriteTransaction<'_> {
    type Target = StoreImage;

    fn deref(&self) -> &StoreImage {
        &self.working
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            debug!(
                path = %self.handle.layout.primary_path().display(),
                "discarding uncommitted transaction"
            );
        }
    }
}
