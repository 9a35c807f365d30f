//! # CareStore Core
//!
//! The persistent store behind the patient-support app.
//!
//! This crate provides:
//! - Store lifecycle: open, create and migrate on startup ([`LifecycleManager`])
//! - Ordered, versioned migrations with optional seed scenarios ([`migration`])
//! - All-or-nothing writes, synchronous or on a background worker
//!   ([`WriteCoordinator`])
//! - Single-file backup export and validated import ([`backup`])
//! - Typed queries over the app's records ([`QueryFacade`])
//! - Optional AES-256-GCM encryption of the data file
//!
//! [`Database`] wires all of these together and is what applications hold.
//!
//! ## Example
//!
//! ```no_run
//! use carestore_core::{Database, MainQueue, StoreConfiguration, TouchState};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let queue = MainQueue::new();
//! let db = Database::new(
//!     StoreConfiguration::new("/data/app/store"),
//!     Arc::new(queue.context()),
//! )
//! .unwrap();
//!
//! db.touch_database(None, |state| {
//!     if state == TouchState::Finished {
//!         println!("store ready");
//!     }
//! })
//! .unwrap();
//! queue.run_next_timeout(Duration::from_secs(5));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backup;
mod config;
mod crypto;
mod database;
mod dispatch;
mod error;
mod handle;
mod image;
mod lifecycle;
pub mod migration;
mod query;
mod record;
mod records;
mod types;
mod worker;
mod write;

pub use backup::{
    Archive, ArchiveEntry, ArchiveMetadata, BackupExporter, BackupImporter, ARCHIVE_FILE_NAME,
    ARCHIVE_MIME_TYPE,
};
pub use config::{StoreConfiguration, DEFAULT_FILE_NAME};
pub use crypto::{CryptoManager, EncryptionKey};
pub use database::Database;
pub use dispatch::{Callback, CallbackContext, InlineContext, MainContext, MainQueue};
pub use error::{CoreError, CoreResult, ErrorCategory};
pub use handle::{AccessMode, StoreHandle, TransactionState, WriteTransaction};
pub use image::{Documents, StoreImage};
pub use lifecycle::{AccessGate, LifecycleManager, TouchState};
pub use migration::{MigrationEngine, MigrationStep, StepKind, TestScenario};
pub use query::QueryFacade;
pub use record::{DayRecord, Record};
pub use records::{
    DiagnosisType, JournalEntry, MedicationIntake, Reminder, MAX_WELLBEING, NEUTRAL_WELLBEING,
};
pub use types::{DocumentId, SchemaVersion, CURRENT_SCHEMA_VERSION};
pub use worker::{BackgroundWorker, WriteTicket};
pub use write::WriteCoordinator;

pub use carestore_storage::{StorageError, StoreLayout};
