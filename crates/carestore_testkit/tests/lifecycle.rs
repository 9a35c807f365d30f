//! Startup behaviour across fresh installs, upgrades and restarts.

use carestore_core::migration::{DEFAULT_DIAGNOSIS_TYPES, DEMO_JOURNAL_DAYS};
use carestore_core::{
    AccessMode, CoreError, EncryptionKey, ErrorCategory, MigrationEngine, MigrationStep,
    StoreHandle, TestScenario, TouchState, CURRENT_SCHEMA_VERSION,
};
use carestore_testkit::prelude::*;
use std::thread;

#[test]
fn fresh_install_reports_only_finished_and_seeds_defaults() {
    init_test_logging();
    let store = TestStore::new();

    assert_eq!(store.touch(None), [TouchState::Finished]);

    let names: Vec<String> = store
        .queries()
        .diagnosis_types()
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, DEFAULT_DIAGNOSIS_TYPES);
    assert_eq!(store.queries().reminders().unwrap().len(), 1);
}

#[test]
fn upgrade_from_version_zero_reports_begin_migration_first() {
    init_test_logging();
    let store = TestStore::with_config(|config| config.target_version(0));
    assert_eq!(store.touch(None), [TouchState::Finished]);
    assert!(store.queries().diagnosis_types().unwrap().is_empty());

    let upgraded = store.restart_with(store.config().clone().target_version(1));
    let states = touch_and_wait(&upgraded, &store.queue, None);
    assert_eq!(states, [TouchState::BeginMigration, TouchState::Finished]);

    assert_eq!(
        upgraded.queries().diagnosis_types().unwrap().len(),
        DEFAULT_DIAGNOSIS_TYPES.len()
    );
    // Version 2 has not run yet.
    assert!(upgraded.queries().reminders().unwrap().is_empty());
}

#[test]
fn restart_at_target_does_not_rerun_seeds() {
    init_test_logging();
    let store = TestStore::touched();
    let before = store.primary_bytes();

    let restarted = store.restart();
    assert_eq!(
        touch_and_wait(&restarted, &store.queue, None),
        [TouchState::Finished]
    );

    assert_eq!(
        restarted.queries().diagnosis_types().unwrap().len(),
        DEFAULT_DIAGNOSIS_TYPES.len()
    );
    assert_eq!(store.primary_bytes(), before);
}

#[test]
fn version_only_moves_forward() {
    init_test_logging();
    let store = TestStore::touched();
    let probe = || StoreHandle::probe_version(store.config()).unwrap();
    assert_eq!(probe(), CURRENT_SCHEMA_VERSION);

    let older = store.restart_with(store.config().clone().target_version(1));
    assert_eq!(
        touch_and_wait(&older, &store.queue, None),
        [TouchState::InitError]
    );
    assert_eq!(probe(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn newer_store_is_refused_with_typed_error() {
    init_test_logging();
    let store = TestStore::touched();
    let older = store.restart_with(store.config().clone().target_version(1));

    let err = older.lifecycle().run(None, &mut |_| {}).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Init);
    assert!(matches!(
        err,
        CoreError::InitFailed { ref source, .. }
            if matches!(**source, CoreError::VersionTooNew { persisted: 2, target: 1 })
    ));
}

#[test]
fn failing_step_reports_migration_error_and_keeps_old_version() {
    init_test_logging();
    let steps = vec![
        MigrationStep::new(1, "ok", |_| Ok(())),
        MigrationStep::new(2, "broken", |txn| {
            txn.insert(&JournalEntry::new(first_day(), 3, "half done"))?;
            Err(CoreError::invalid_operation("step failed"))
        }),
    ];
    let store = TestStore::with_engine(MigrationEngine::new(steps).unwrap());

    assert_eq!(store.touch(None), [TouchState::MigrationError]);

    let handle = StoreHandle::open(store.config(), AccessMode::Read).unwrap();
    assert_eq!(handle.schema_version(), 0);
    assert_eq!(handle.image().total_documents(), 0);
}

#[test]
fn observer_runs_on_the_pumping_thread() {
    init_test_logging();
    let store = TestStore::new();
    let pump = thread::current().id();
    let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&seen);

    store
        .touch_database(None, move |state| {
            sink.lock().push((state, thread::current().id()));
        })
        .unwrap();
    assert!(store.queue.run_until(TIMEOUT, || !seen.lock().is_empty()));

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], (TouchState::Finished, pump));
}

#[test]
fn inline_observer_may_query_and_write_on_finished() {
    init_test_logging();
    let temp = tempfile::tempdir().unwrap();
    let db = Database::new(
        StoreConfiguration::new(temp.path().join("store")),
        std::sync::Arc::new(InlineContext),
    )
    .unwrap();
    let queries = db.queries().clone();
    let (tx, rx) = std::sync::mpsc::channel();

    db.touch_database(None, move |state| {
        if state == TouchState::Finished {
            let types = queries.diagnosis_types().map(|t| t.len());
            let wrote = queries.add_journal_entry(&JournalEntry::new(first_day(), 3, "ready"));
            let _ = tx.send((types, wrote));
        }
    })
    .unwrap();

    let (types, wrote) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(types, Some(DEFAULT_DIAGNOSIS_TYPES.len()));
    assert!(wrote);
    assert_eq!(db.queries().all::<JournalEntry>().unwrap().len(), 1);
}

#[test]
fn scenario_resets_and_seeds_demo_data() {
    init_test_logging();
    let store = TestStore::touched();
    assert!(store.queries().add_journal_entry(&JournalEntry::new(first_day(), 1, "mine")));

    assert_eq!(
        store.touch(Some(TestScenario::DemoJournal)),
        [TouchState::Finished]
    );

    let entries = store.queries().all::<JournalEntry>().unwrap();
    assert_eq!(entries.len(), DEMO_JOURNAL_DAYS);
    assert!(entries.iter().all(|e| e.note != "mine"));
    assert_eq!(
        store.queries().diagnosis_types().unwrap().len(),
        DEFAULT_DIAGNOSIS_TYPES.len()
    );
}

#[test]
fn encrypted_store_needs_its_key() {
    init_test_logging();
    let key = EncryptionKey::generate().unwrap();
    let store = TestStore::with_config(|config| config.encryption_key(key.clone()));
    assert_eq!(store.touch(None), [TouchState::Finished]);
    assert!(store.queries().add_journal_entry(&JournalEntry::new(first_day(), 4, "secret")));

    let bytes = store.primary_bytes();
    assert!(!bytes.windows(6).any(|w| w == b"secret"));

    let keyless = store.restart_with(without_key(store.config()));
    assert_eq!(
        touch_and_wait(&keyless, &store.queue, None),
        [TouchState::InitError]
    );

    let wrong_key = store.restart_with(
        without_key(store.config()).encryption_key(EncryptionKey::generate().unwrap()),
    );
    assert_eq!(
        touch_and_wait(&wrong_key, &store.queue, None),
        [TouchState::InitError]
    );

    let reopened = store.restart();
    assert_eq!(
        touch_and_wait(&reopened, &store.queue, None),
        [TouchState::Finished]
    );
    assert_eq!(
        reopened.queries().journal_entries_for_day(first_day()).unwrap()[0].note,
        "secret"
    );
}

/// Same location and target, no key.
fn without_key(config: &StoreConfiguration) -> StoreConfiguration {
    StoreConfiguration::new(config.location()).target_version(config.target())
}
