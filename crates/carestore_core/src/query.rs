//! Typed reads and writes for the rest of the application.
//!
//! Reads return `Option`: `None` means the store could not be read, which
//! is different from an empty result. Writes return `bool` and go through
//! [`WriteCoordinator::write_sync`].

use crate::config::StoreConfiguration;
use crate::error::{CoreError, CoreResult};
use crate::handle::{AccessMode, StoreHandle};
use crate::image::StoreImage;
use crate::lifecycle::AccessGate;
use crate::record::{DayRecord, Record};
use crate::records::{DiagnosisType, JournalEntry, MedicationIntake, Reminder};
use crate::types::DocumentId;
use crate::write::WriteCoordinator;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::warn;

/// Query and update helpers over the store's records.
#[derive(Debug, Clone)]
pub struct QueryFacade {
    config: Arc<StoreConfiguration>,
    gate: AccessGate,
    writes: WriteCoordinator,
}

impl QueryFacade {
    /// Creates a facade.
    #[must_use]
    pub fn new(config: Arc<StoreConfiguration>, gate: AccessGate, writes: WriteCoordinator) -> Self {
        Self {
            config,
            gate,
            writes,
        }
    }

    /// Returns every record of a type, in id order.
    pub fn all<T: Record>(&self) -> Option<Vec<T>> {
        self.read(T::COLLECTION, StoreImage::all)
    }

    /// Returns one record. The inner `None` means no record has that id.
    pub fn get<T: Record>(&self, id: DocumentId) -> Option<Option<T>> {
        self.read(T::COLLECTION, |image| image.get(id))
    }

    /// Returns the records filed under `day`, in id order.
    pub fn records_for_day<T: DayRecord>(&self, day: NaiveDate) -> Option<Vec<T>> {
        self.records_between(day, day)
    }

    /// Returns the records filed from `from` to `to` inclusive, ordered by
    /// day and then id. An inverted range yields an empty list.
    pub fn records_between<T: DayRecord>(&self, from: NaiveDate, to: NaiveDate) -> Option<Vec<T>> {
        self.read(T::COLLECTION, |image| {
            let mut records: Vec<T> = image
                .all::<T>()?
                .into_iter()
                .filter(|r| (from..=to).contains(&r.day()))
                .collect();
            records.sort_by_key(|r| (r.day(), r.id()));
            Ok(records)
        })
    }

    /// Stores a new record. Any id it carries is replaced.
    pub fn create<T: Record>(&self, record: &T) -> bool {
        self.writes.write_sync(|txn| txn.insert(record).map(|_| ()))
    }

    /// Replaces an existing record. Returns false if it does not exist.
    pub fn update<T: Record>(&self, record: &T) -> bool {
        self.writes.write_sync(|txn| txn.update(record))
    }

    /// Deletes a record. Returns false if it does not exist.
    pub fn delete<T: Record>(&self, id: DocumentId) -> bool {
        self.writes.write_sync(|txn| {
            if txn.remove::<T>(id) {
                Ok(())
            } else {
                Err(CoreError::RecordNotFound {
                    collection: T::COLLECTION.to_string(),
                    id,
                })
            }
        })
    }

    /// Returns the diagnosis types.
    pub fn diagnosis_types(&self) -> Option<Vec<DiagnosisType>> {
        self.all()
    }

    /// Returns the journal entries for a day.
    pub fn journal_entries_for_day(&self, day: NaiveDate) -> Option<Vec<JournalEntry>> {
        self.records_for_day(day)
    }

    /// Returns the journal entries in an inclusive range of days.
    pub fn journal_entries_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Option<Vec<JournalEntry>> {
        self.records_between(from, to)
    }

    /// Adds a journal entry.
    pub fn add_journal_entry(&self, entry: &JournalEntry) -> bool {
        self.create(entry)
    }

    /// Returns the medication intakes for a day.
    pub fn medication_intakes_for_day(&self, day: NaiveDate) -> Option<Vec<MedicationIntake>> {
        self.records_for_day(day)
    }

    /// Returns the medication intakes in an inclusive range of days.
    pub fn medication_intakes_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Option<Vec<MedicationIntake>> {
        self.records_between(from, to)
    }

    /// Records a medication intake.
    pub fn record_medication_intake(&self, intake: &MedicationIntake) -> bool {
        self.create(intake)
    }

    /// Returns the reminders.
    pub fn reminders(&self) -> Option<Vec<Reminder>> {
        self.all()
    }

    fn read<R>(
        &self,
        collection: &str,
        f: impl FnOnce(&StoreImage) -> CoreResult<R>,
    ) -> Option<R> {
        let result = {
            let _shared = self.gate.read();
            StoreHandle::open(&self.config, AccessMode::Read).and_then(|handle| f(handle.image()))
        };
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(collection, error = %e, "query failed");
                None
            }
        }
    }
}
