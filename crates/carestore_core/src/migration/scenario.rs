//! Seed data for test and demo builds.

use super::{MigrationStep, TestScenario};
use crate::error::{CoreError, CoreResult};
use crate::handle::WriteTransaction;
use crate::records::{JournalEntry, MedicationIntake, MAX_WELLBEING};
use chrono::NaiveDate;

/// Number of journal days seeded by [`TestScenario::DemoJournal`].
pub const DEMO_JOURNAL_DAYS: usize = 14;

/// Number of intake days seeded by [`TestScenario::MedicationPlan`].
pub const MEDICATION_PLAN_DAYS: usize = 7;

const DEMO_MEDICATION: &str = "Methotrexate";

pub(super) fn steps() -> Vec<MigrationStep> {
    vec![
        MigrationStep::scenario(1, "demo_journal", TestScenario::DemoJournal, demo_journal),
        MigrationStep::scenario(
            1,
            "medication_plan",
            TestScenario::MedicationPlan,
            medication_plan,
        ),
    ]
}

// Fixed so that seeded stores are identical from run to run.
fn seed_start() -> CoreResult<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .ok_or_else(|| CoreError::invalid_operation("invalid seed start date"))
}

fn demo_journal(txn: &mut WriteTransaction<'_>) -> CoreResult<()> {
    for (i, day) in seed_start()?.iter_days().take(DEMO_JOURNAL_DAYS).enumerate() {
        let wellbeing = (i % usize::from(MAX_WELLBEING)) as u8 + 1;
        txn.insert(&JournalEntry::new(day, wellbeing, format!("Day {}", i + 1)))?;
    }
    Ok(())
}

fn medication_plan(txn: &mut WriteTransaction<'_>) -> CoreResult<()> {
    for (i, day) in seed_start()?
        .iter_days()
        .take(MEDICATION_PLAN_DAYS)
        .enumerate()
    {
        txn.insert(&MedicationIntake::new(day, DEMO_MEDICATION, i % 3 != 2))?;
    }
    Ok(())
}
