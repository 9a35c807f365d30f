//! Schema migration.
//!
//! Migrations are an explicit, ordered list of [`MigrationStep`]s. Each step
//! names the schema version it produces and applies when a store moves from
//! an older version to one at or beyond it:
//!
//! ```text
//! applies(step) := old_version < step.version <= target_version
//! ```
//!
//! The engine never deduplicates. A step runs exactly once per migration
//! pass in which it applies; steps that must tolerate re-application check
//! their own preconditions.
//!
//! Default steps always run first, in ascending version order. Scenario
//! steps (seed data for tests and demos) follow, and only exist when the
//! `scenarios` feature is enabled.
//!
//! ## Usage
//!
//! ```
//! use carestore_core::migration::MigrationEngine;
//!
//! let engine = MigrationEngine::standard();
//! let names: Vec<_> = engine.plan(0, 2, None).iter().map(|s| s.name()).collect();
//! assert_eq!(names, ["seed_diagnosis_types", "journal_wellbeing_scale"]);
//! ```

#[cfg(any(test, feature = "scenarios"))]
mod scenario;
mod standard;

use crate::error::{CoreError, CoreResult};
use crate::handle::WriteTransaction;
use crate::types::SchemaVersion;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(any(test, feature = "scenarios"))]
pub use scenario::{DEMO_JOURNAL_DAYS, MEDICATION_PLAN_DAYS};
pub use standard::{DEFAULT_DIAGNOSIS_TYPES, DEFAULT_REMINDER_LABEL};

/// Seed data selection for test and demo builds.
///
/// Selecting a scenario deletes and recreates the store. Without the
/// `scenarios` feature this type has no values, so no production code path
/// can reach that branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestScenario {
    /// Two weeks of journal entries.
    #[cfg(any(test, feature = "scenarios"))]
    DemoJournal,
    /// A week of medication intakes.
    #[cfg(any(test, feature = "scenarios"))]
    MedicationPlan,
}

/// Whether a step is part of every migration or belongs to a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Runs for every store.
    Default,
    /// Runs only when the store is touched with this scenario.
    Scenario(TestScenario),
}

/// Function applied by a migration step.
pub type ApplyFn = dyn Fn(&mut WriteTransaction<'_>) -> CoreResult<()> + Send + Sync;

/// One versioned migration step.
#[derive(Clone)]
pub struct MigrationStep {
    version: SchemaVersion,
    name: String,
    kind: StepKind,
    apply: Arc<ApplyFn>,
}

impl MigrationStep {
    /// Creates a default step.
    pub fn new<F>(version: SchemaVersion, name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&mut WriteTransaction<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        Self {
            version,
            name: name.into(),
            kind: StepKind::Default,
            apply: Arc::new(apply),
        }
    }

    /// Creates a scenario step.
    pub fn scenario<F>(
        version: SchemaVersion,
        name: impl Into<String>,
        scenario: TestScenario,
        apply: F,
    ) -> Self
    where
        F: Fn(&mut WriteTransaction<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        Self {
            kind: StepKind::Scenario(scenario),
            ..Self::new(version, name, apply)
        }
    }

    /// Returns the version this step migrates to.
    #[must_use]
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Returns the step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the step kind.
    #[must_use]
    pub fn kind(&self) -> StepKind {
        self.kind
    }

    /// Returns true if this step runs when moving from `old` to `target`.
    #[must_use]
    pub fn applies(&self, old: SchemaVersion, target: SchemaVersion) -> bool {
        old < self.version && self.version <= target
    }

    /// Applies the step to a transaction.
    pub fn apply(&self, txn: &mut WriteTransaction<'_>) -> CoreResult<()> {
        (self.apply)(txn)
    }
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// An ordered, validated list of migration steps.
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    steps: Vec<MigrationStep>,
}

impl MigrationEngine {
    /// Creates an engine from a list of steps.
    ///
    /// Steps are sorted by version; steps with equal versions keep their
    /// given order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidMigrationPlan`] if a step targets version
    /// 0 or two default steps target the same version.
    pub fn new(mut steps: Vec<MigrationStep>) -> CoreResult<Self> {
        let mut seen = BTreeSet::new();
        for step in &steps {
            if step.version == 0 {
                return Err(CoreError::invalid_migration_plan(format!(
                    "step '{}' targets version 0",
                    step.name
                )));
            }
            if step.kind == StepKind::Default && !seen.insert(step.version) {
                return Err(CoreError::invalid_migration_plan(format!(
                    "more than one default step for version {}",
                    step.version
                )));
            }
        }
        steps.sort_by_key(|step| step.version);
        Ok(Self { steps })
    }

    /// Creates an engine with the application's standard steps.
    #[must_use]
    pub fn standard() -> Self {
        let steps = standard::steps();
        #[cfg(any(test, feature = "scenarios"))]
        let steps = {
            let mut steps = steps;
            steps.extend(scenario::steps());
            steps
        };
        let mut steps = steps;
        steps.sort_by_key(|step| step.version);
        Self { steps }
    }

    /// Returns all registered steps in version order.
    #[must_use]
    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Returns the highest version produced by a default step.
    #[must_use]
    pub fn latest_version(&self) -> SchemaVersion {
        self.steps
            .iter()
            .filter(|step| step.kind == StepKind::Default)
            .map(|step| step.version)
            .max()
            .unwrap_or(0)
    }

    /// Returns the steps that move a store from `old` to `target`.
    ///
    /// Default steps come first in ascending version order, then the steps
    /// of `scenario`, also in ascending order. The result depends only on the
    /// arguments.
    #[must_use]
    pub fn plan(
        &self,
        old: SchemaVersion,
        target: SchemaVersion,
        scenario: Option<TestScenario>,
    ) -> Vec<&MigrationStep> {
        let defaults = self
            .steps
            .iter()
            .filter(|step| step.kind == StepKind::Default);
        let seeds = self.steps.iter().filter(move |step| match step.kind {
            StepKind::Scenario(s) => Some(s) == scenario,
            StepKind::Default => false,
        });

        defaults
            .chain(seeds)
            .filter(|step| step.applies(old, target))
            .collect()
    }

    /// Applies the planned steps to a transaction and returns how many ran.
    ///
    /// Stops at the first failing step. The caller decides whether to
    /// commit.
    pub fn run(
        &self,
        txn: &mut WriteTransaction<'_>,
        old: SchemaVersion,
        target: SchemaVersion,
        scenario: Option<TestScenario>,
    ) -> CoreResult<usize> {
        let plan = self.plan(old, target, scenario);
        info!(from = old, to = target, steps = plan.len(), "running migrations");

        for step in &plan {
            debug!(version = step.version, name = %step.name, "applying migration step");
            step.apply(txn)
                .map_err(|e| CoreError::migration(old, target, e))?;
        }
        Ok(plan.len())
    }
}
