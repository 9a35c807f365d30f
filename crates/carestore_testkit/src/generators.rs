//! Property-based test generators using proptest.
//!
//! Provides strategies for the app's records and for batches of write
//! operations against a store.

use carestore_core::{
    CoreResult, JournalEntry, MedicationIntake, Reminder, WriteTransaction, MAX_WELLBEING,
};
use chrono::{Days, NaiveDate};
use proptest::prelude::*;

/// First day produced by [`day_strategy`].
pub fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
}

/// Strategy for days within one year from [`first_day`].
pub fn day_strategy() -> impl Strategy<Value = NaiveDate> {
    (0u64..366).prop_map(|offset| first_day() + Days::new(offset))
}

/// Strategy for free-text notes.
pub fn note_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9 ,.']{0,40}").expect("Invalid regex")
}

/// Strategy for journal entries that have not been stored.
pub fn journal_entry_strategy() -> impl Strategy<Value = JournalEntry> {
    (day_strategy(), 1..=MAX_WELLBEING, note_strategy())
        .prop_map(|(day, wellbeing, note)| JournalEntry::new(day, wellbeing, note))
}

/// Strategy for medication intakes that have not been stored.
pub fn medication_intake_strategy() -> impl Strategy<Value = MedicationIntake> {
    (
        day_strategy(),
        prop::sample::select(vec!["Methotrexate", "Ibuprofen", "Insulin", "Folic acid"]),
        any::<bool>(),
    )
        .prop_map(|(day, medication, taken)| MedicationIntake::new(day, medication, taken))
}

/// Strategy for reminders that have not been stored.
pub fn reminder_strategy() -> impl Strategy<Value = Reminder> {
    (note_strategy(), 0u8..24, 0u8..60)
        .prop_map(|(label, hour, minute)| Reminder::new(label, hour, minute))
}

/// One mutation applied inside a write transaction.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert a journal entry.
    AddJournal(JournalEntry),
    /// Insert a medication intake.
    AddIntake(MedicationIntake),
    /// Insert a reminder.
    AddReminder(Reminder),
    /// Remove the n-th reminder (modulo the count), if there are any.
    RemoveReminder(usize),
}

impl WriteOp {
    /// Applies the operation to a transaction.
    pub fn apply(&self, txn: &mut WriteTransaction<'_>) -> CoreResult<()> {
        match self {
            Self::AddJournal(entry) => txn.insert(entry).map(|_| ()),
            Self::AddIntake(intake) => txn.insert(intake).map(|_| ()),
            Self::AddReminder(reminder) => txn.insert(reminder).map(|_| ()),
            Self::RemoveReminder(n) => {
                let reminders: Vec<Reminder> = txn.all()?;
                if !reminders.is_empty() {
                    let id = reminders[n % reminders.len()].id;
                    txn.remove::<Reminder>(id);
                }
                Ok(())
            }
        }
    }
}

/// Strategy for a single write operation.
pub fn write_op_strategy() -> impl Strategy<Value = WriteOp> {
    prop_oneof![
        3 => journal_entry_strategy().prop_map(WriteOp::AddJournal),
        2 => medication_intake_strategy().prop_map(WriteOp::AddIntake),
        1 => reminder_strategy().prop_map(WriteOp::AddReminder),
        1 => any::<usize>().prop_map(WriteOp::RemoveReminder),
    ]
}

/// Strategy for a batch of write operations.
pub fn write_batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<WriteOp>> {
    prop::collection::vec(write_op_strategy(), 0..=max_len)
}
