//! The application's default migration steps.

use super::MigrationStep;
use crate::error::{CoreError, CoreResult};
use crate::handle::WriteTransaction;
use crate::record::Record;
use crate::records::{DiagnosisType, JournalEntry, Reminder, NEUTRAL_WELLBEING};
use ciborium::Value;

/// Diagnosis types every store starts with.
pub const DEFAULT_DIAGNOSIS_TYPES: [&str; 4] = [
    "Rheumatoid arthritis",
    "Multiple sclerosis",
    "Crohn's disease",
    "Type 1 diabetes",
];

/// Label of the reminder added when the wellbeing scale was introduced.
pub const DEFAULT_REMINDER_LABEL: &str = "Fill in your journal";

const WELLBEING_FIELD: &str = "wellbeing";

pub(super) fn steps() -> Vec<MigrationStep> {
    vec![
        MigrationStep::new(1, "seed_diagnosis_types", seed_diagnosis_types),
        MigrationStep::new(2, "journal_wellbeing_scale", journal_wellbeing_scale),
    ]
}

/// v1: seed the default diagnosis types that are not there yet.
fn seed_diagnosis_types(txn: &mut WriteTransaction<'_>) -> CoreResult<()> {
    let existing: Vec<String> = txn
        .all::<DiagnosisType>()?
        .into_iter()
        .map(|t| t.name)
        .collect();

    for name in DEFAULT_DIAGNOSIS_TYPES {
        if !existing.iter().any(|n| n == name) {
            txn.insert(&DiagnosisType::new(name))?;
        }
    }
    Ok(())
}

/// v2: journal entries gained a wellbeing score. Older entries get the
/// neutral score, and stores without reminders get the evening journal
/// reminder.
fn journal_wellbeing_scale(txn: &mut WriteTransaction<'_>) -> CoreResult<()> {
    for (id, document) in txn.documents_mut(JournalEntry::COLLECTION).iter_mut() {
        let Value::Map(fields) = document else {
            return Err(CoreError::invalid_format(format!(
                "journal entry {id} is not a map"
            )));
        };
        let has_score = fields
            .iter()
            .any(|(key, _)| key.as_text() == Some(WELLBEING_FIELD));
        if !has_score {
            fields.push((
                Value::Text(WELLBEING_FIELD.to_string()),
                Value::Integer(NEUTRAL_WELLBEING.into()),
            ));
        }
    }

    if txn.count(Reminder::COLLECTION) == 0 {
        txn.insert(&Reminder::new(DEFAULT_REMINDER_LABEL, 20, 0))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfiguration;
    use crate::handle::StoreHandle;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn fresh_handle(dir: &std::path::Path) -> StoreHandle {
        let config = StoreConfiguration::new(dir.join("store"));
        config.layout().ensure_directory().unwrap();
        StoreHandle::create(&config).unwrap()
    }

    #[test]
    fn seeding_twice_adds_nothing() {
        let temp = tempdir().unwrap();
        let mut handle = fresh_handle(temp.path());
        let mut txn = handle.begin_write().unwrap();

        seed_diagnosis_types(&mut txn).unwrap();
        seed_diagnosis_types(&mut txn).unwrap();
        assert_eq!(txn.count(DiagnosisType::COLLECTION), 4);
    }

    #[test]
    fn wellbeing_backfilled_on_old_entries() {
        let temp = tempdir().unwrap();
        let mut handle = fresh_handle(temp.path());
        let mut txn = handle.begin_write().unwrap();

        // Layout of a journal entry before the wellbeing scale.
        let old = Value::Map(vec![
            (
                Value::Text("day".into()),
                Value::Text("2023-11-02".into()),
            ),
            (Value::Text("note".into()), Value::Text("tired".into())),
        ]);
        let id = txn.insert_document(JournalEntry::COLLECTION, old);
        let current = txn
            .insert(&JournalEntry::new(
                NaiveDate::from_ymd_opt(2023, 11, 3).unwrap(),
                5,
                "great",
            ))
            .unwrap();

        journal_wellbeing_scale(&mut txn).unwrap();

        let migrated: JournalEntry = txn.get(id).unwrap().unwrap();
        assert_eq!(migrated.wellbeing, NEUTRAL_WELLBEING);
        assert_eq!(migrated.note, "tired");
        let untouched: JournalEntry = txn.get(current).unwrap().unwrap();
        assert_eq!(untouched.wellbeing, 5);

        let reminders: Vec<Reminder> = txn.all().unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].label, DEFAULT_REMINDER_LABEL);
    }

    #[test]
    fn non_map_journal_document_fails() {
        let temp = tempdir().unwrap();
        let mut handle = fresh_handle(temp.path());
        let mut txn = handle.begin_write().unwrap();

        txn.insert_document(JournalEntry::COLLECTION, Value::Bool(true));
        assert!(journal_wellbeing_scale(&mut txn).is_err());
    }
}
