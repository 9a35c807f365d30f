//! Domain records of the patient-support application.

use crate::record::{DayRecord, Record};
use crate::types::DocumentId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Wellbeing recorded for journal entries written before the scale existed.
pub const NEUTRAL_WELLBEING: u8 = 3;

/// Highest value on the wellbeing scale.
pub const MAX_WELLBEING: u8 = 5;

/// A diagnosis the patient can pick in their profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisType {
    /// Store-assigned id.
    #[serde(default)]
    pub id: DocumentId,
    /// Display name.
    pub name: String,
}

impl DiagnosisType {
    /// Creates an unsaved diagnosis type.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: DocumentId::UNASSIGNED,
            name: name.into(),
        }
    }
}

impl Record for DiagnosisType {
    const COLLECTION: &'static str = "diagnosis_types";

    fn id(&self) -> DocumentId {
        self.id
    }

    fn set_id(&mut self, id: DocumentId) {
        self.id = id;
    }
}

/// One journal entry for a day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Store-assigned id.
    #[serde(default)]
    pub id: DocumentId,
    /// Day the entry is about.
    pub day: NaiveDate,
    /// Wellbeing from 1 (bad) to 5 (good).
    pub wellbeing: u8,
    /// Free text.
    pub note: String,
}

impl JournalEntry {
    /// Creates an unsaved journal entry. Wellbeing is clamped to the scale.
    #[must_use]
    pub fn new(day: NaiveDate, wellbeing: u8, note: impl Into<String>) -> Self {
        Self {
            id: DocumentId::UNASSIGNED,
            day,
            wellbeing: wellbeing.clamp(1, MAX_WELLBEING),
            note: note.into(),
        }
    }
}

impl Record for JournalEntry {
    const COLLECTION: &'static str = "journal_entries";

    fn id(&self) -> DocumentId {
        self.id
    }

    fn set_id(&mut self, id: DocumentId) {
        self.id = id;
    }
}

impl DayRecord for JournalEntry {
    fn day(&self) -> NaiveDate {
        self.day
    }
}

/// A planned or taken dose of a medication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationIntake {
    /// Store-assigned id.
    #[serde(default)]
    pub id: DocumentId,
    /// Day of the intake.
    pub day: NaiveDate,
    /// Medication name.
    pub medication: String,
    /// Whether the dose was taken.
    pub taken: bool,
}

impl MedicationIntake {
    /// Creates an unsaved intake.
    #[must_use]
    pub fn new(day: NaiveDate, medication: impl Into<String>, taken: bool) -> Self {
        Self {
            id: DocumentId::UNASSIGNED,
            day,
            medication: medication.into(),
            taken,
        }
    }
}

impl Record for MedicationIntake {
    const COLLECTION: &'static str = "medication_intakes";

    fn id(&self) -> DocumentId {
        self.id
    }

    fn set_id(&mut self, id: DocumentId) {
        self.id = id;
    }
}

impl DayRecord for MedicationIntake {
    fn day(&self) -> NaiveDate {
        self.day
    }
}

/// A daily reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Store-assigned id.
    #[serde(default)]
    pub id: DocumentId,
    /// Text shown with the reminder.
    pub label: String,
    /// Hour of day, 0-23.
    pub hour: u8,
    /// Minute, 0-59.
    pub minute: u8,
}

impl Reminder {
    /// Creates an unsaved reminder. Out-of-range times wrap into the day.
    #[must_use]
    pub fn new(label: impl Into<String>, hour: u8, minute: u8) -> Self {
        Self {
            id: DocumentId::UNASSIGNED,
            label: label.into(),
            hour: hour % 24,
            minute: minute % 60,
        }
    }
}

impl Record for Reminder {
    const COLLECTION: &'static str = "reminders";

    fn id(&self) -> DocumentId {
        self.id
    }

    fn set_id(&mut self, id: DocumentId) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wellbeing_is_clamped() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(JournalEntry::new(day, 0, "").wellbeing, 1);
        assert_eq!(JournalEntry::new(day, 9, "").wellbeing, MAX_WELLBEING);
    }

    #[test]
    fn reminder_time_wraps() {
        let reminder = Reminder::new("Walk", 25, 61);
        assert_eq!((reminder.hour, reminder.minute), (1, 1));
    }

    #[test]
    fn collections_are_distinct() {
        let names = [
            DiagnosisType::COLLECTION,
            JournalEntry::COLLECTION,
            MedicationIntake::COLLECTION,
            Reminder::COLLECTION,
        ];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
