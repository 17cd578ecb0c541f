//! Integration tests for the migration engine
//!
//! Exercises whole invocations through `Migrator` against in-memory and
//! file-backed DuckDB stores: idempotence, round trips, ordering, atomicity,
//! batch semantics, drift, locking, data-loss policy, timeouts and repair.

use duckdb::Connection;
use std::path::Path;
use tm_core::{
    Action, Catalog, Config, CoreError, DataLossPolicy, Direction, DriftMode, Migration,
    MigrationId, Target,
};
use tm_db::{DbError, DbResult, MigrationStore, SchemaActions, SqlActions};
use tm_engine::{MigrateError, Migrator, RunOptions, RunOutcome};

// ── Helpers ────────────────────────────────────────────────────────────

fn articles_catalog() -> Catalog {
    Catalog::new(vec![
        Migration::new(
            20240101000000,
            "create_articles",
            "CREATE TABLE articles (id INTEGER PRIMARY KEY, title VARCHAR)",
            "DROP TABLE articles",
        ),
        Migration::new(
            20240201000000,
            "add_pic_to_articles",
            "ALTER TABLE articles ADD COLUMN pic_file_name VARCHAR;
             ALTER TABLE articles ADD COLUMN pic_content_type VARCHAR;",
            "ALTER TABLE articles DROP COLUMN pic_content_type;
             ALTER TABLE articles DROP COLUMN pic_file_name;",
        ),
        Migration::new(
            20240301000000,
            "create_comments",
            "CREATE TABLE comments (id INTEGER, article_id INTEGER, body VARCHAR)",
            "DROP TABLE comments",
        ),
    ])
    .unwrap()
}

fn migrator_with(catalog: Catalog, config: Config) -> Migrator {
    let store = MigrationStore::open_memory(&config).unwrap();
    Migrator::new(store, catalog, config)
}

fn migrator() -> Migrator {
    migrator_with(articles_catalog(), Config::default())
}

fn id(value: u64) -> MigrationId {
    MigrationId::new(value)
}

fn applied(migrator: &Migrator) -> Vec<MigrationId> {
    migrator.store().applied_ids().unwrap().into_iter().collect()
}

/// Application tables and their columns, excluding the ledger schema.
fn schema_snapshot(migrator: &Migrator) -> Vec<(String, String)> {
    let conn = migrator.store().conn();
    let mut stmt = conn
        .prepare(
            "SELECT table_name, column_name FROM information_schema.columns
             WHERE table_schema = 'main' ORDER BY table_name, column_name",
        )
        .unwrap();
    let columns = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    columns
}

fn table_exists(migrator: &Migrator, name: &str) -> bool {
    schema_snapshot(migrator).iter().any(|(table, _)| table == name)
}

/// Runs the action, then fails before returning to the executor.
struct FailAfterChange {
    poisoned: &'static str,
}

impl SchemaActions for FailAfterChange {
    fn apply(&self, conn: &Connection, action: &Action) -> DbResult<()> {
        SqlActions.apply(conn, action)?;
        if action.as_str().contains(self.poisoned) {
            return Err(DbError::ExecutionError("injected failure".to_string()));
        }
        Ok(())
    }

    fn revert(&self, conn: &Connection, action: &Action) -> DbResult<()> {
        SqlActions.revert(conn, action)
    }

    fn probe(&self, conn: &Connection, query: &str) -> DbResult<bool> {
        SqlActions.probe(conn, query)
    }
}

// ── Idempotence ────────────────────────────────────────────────────────

#[test]
fn test_up_twice_is_noop() {
    let migrator = migrator();
    let first = migrator.up(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(first.outcome(), RunOutcome::Succeeded);
    let snapshot = schema_snapshot(&migrator);

    let second = migrator.up(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(second.outcome(), RunOutcome::NoOp);
    assert_eq!(schema_snapshot(&migrator), snapshot);
    assert_eq!(applied(&migrator).len(), 3);
}

#[test]
fn test_down_on_empty_ledger_is_noop() {
    let migrator = migrator();
    let report = migrator.down(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(report.outcome(), RunOutcome::NoOp);
}

// ── Round trip and ordering ────────────────────────────────────────────

#[test]
fn test_round_trip_restores_schema_and_ledger() {
    let migrator = migrator();
    migrator
        .store()
        .conn()
        .execute_batch("CREATE TABLE users (id INTEGER)")
        .unwrap();
    let before = schema_snapshot(&migrator);

    migrator.up(Target::Latest, RunOptions::default()).unwrap();
    assert_ne!(schema_snapshot(&migrator), before);

    let report = migrator.down(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(report.outcome(), RunOutcome::Succeeded);
    assert_eq!(schema_snapshot(&migrator), before);
    assert!(applied(&migrator).is_empty());
}

#[test]
fn test_single_migration_round_trip() {
    let migrator = migrator();
    migrator.up(Target::Steps(2), RunOptions::default()).unwrap();
    let before = schema_snapshot(&migrator);

    migrator.up(Target::Steps(1), RunOptions::default()).unwrap();
    migrator.down(Target::Steps(1), RunOptions::default()).unwrap();

    assert_eq!(schema_snapshot(&migrator), before);
    assert_eq!(applied(&migrator), vec![id(20240101000000), id(20240201000000)]);
}

#[test]
fn test_apply_ascending_revert_descending() {
    let migrator = migrator();
    let up = migrator.up(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(
        up.completed_ids(),
        vec![id(20240101000000), id(20240201000000), id(20240301000000)]
    );
    assert!(up.completed.iter().all(|s| s.direction == Direction::Apply));

    let down = migrator.down(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(
        down.completed_ids(),
        vec![id(20240301000000), id(20240201000000), id(20240101000000)]
    );
}

#[test]
fn test_up_to_target_and_down_to_target() {
    let migrator = migrator();
    migrator
        .up(Target::Identity(id(20240201000000)), RunOptions::default())
        .unwrap();
    assert_eq!(applied(&migrator), vec![id(20240101000000), id(20240201000000)]);

    migrator
        .down(Target::Identity(id(20240101000000)), RunOptions::default())
        .unwrap();
    assert_eq!(applied(&migrator), vec![id(20240101000000)]);

    migrator
        .down(Target::Identity(MigrationId::INITIAL), RunOptions::default())
        .unwrap();
    assert!(applied(&migrator).is_empty());
}

#[test]
fn test_unknown_target_is_rejected() {
    let migrator = migrator();
    let err = migrator
        .up(Target::Identity(id(42)), RunOptions::default())
        .unwrap_err();
    assert!(matches!(err, MigrateError::Plan(CoreError::UnknownTarget { .. })));
}

// ── Atomicity and batch semantics ──────────────────────────────────────

#[test]
fn test_injected_failure_leaves_nothing_behind() {
    let migrator = migrator().with_actions(Box::new(FailAfterChange {
        poisoned: "CREATE TABLE articles",
    }));

    let report = migrator.up(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(report.outcome(), RunOutcome::Failed);
    assert!(!table_exists(&migrator, "articles"));
    assert!(applied(&migrator).is_empty());
}

#[test]
fn test_batch_failure_keeps_earlier_steps() {
    let migrator = migrator().with_actions(Box::new(FailAfterChange {
        poisoned: "pic_file_name",
    }));

    let report = migrator.up(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(report.outcome(), RunOutcome::Partial);
    assert_eq!(report.completed_ids(), vec![id(20240101000000)]);
    assert_eq!(report.skipped, vec![id(20240301000000)]);

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.id, id(20240201000000));
    assert_eq!(failure.name, "add_pic_to_articles");
    assert!(failure.error.to_string().contains("injected failure"));

    assert_eq!(applied(&migrator), vec![id(20240101000000)]);
    assert!(table_exists(&migrator, "articles"));
    assert!(!table_exists(&migrator, "comments"));
    assert!(!schema_snapshot(&migrator)
        .iter()
        .any(|(_, column)| column == "pic_file_name"));
}

#[test]
fn test_irreversible_blocks_whole_revert() {
    let catalog = Catalog::new(vec![
        Migration::new(1, "create_articles", "CREATE TABLE articles (id INTEGER)", "DROP TABLE articles"),
        Migration::irreversible(2, "backfill_titles", "SELECT 1"),
        Migration::new(3, "create_tags", "CREATE TABLE tags (id INTEGER)", "DROP TABLE tags"),
    ])
    .unwrap();
    let migrator = migrator_with(catalog, Config::default());
    migrator.up(Target::Latest, RunOptions::default()).unwrap();

    let err = migrator.down(Target::Latest, RunOptions::default()).unwrap_err();
    match err {
        MigrateError::Plan(CoreError::IrreversibleMigration { id: blocked, name }) => {
            assert_eq!(blocked, id(2));
            assert_eq!(name, "backfill_titles");
        }
        other => panic!("expected IrreversibleMigration, got {other:?}"),
    }
    assert_eq!(applied(&migrator).len(), 3);
    assert!(table_exists(&migrator, "tags"));

    // Reverting only the step above it is still allowed.
    migrator.down(Target::Steps(1), RunOptions::default()).unwrap();
    assert!(!table_exists(&migrator, "tags"));
}

// ── Drift ──────────────────────────────────────────────────────────────

fn with_orphan(config: Config) -> Migrator {
    let migrator = migrator_with(articles_catalog(), config);
    migrator.up(Target::Steps(1), RunOptions::default()).unwrap();
    let store = migrator.store();
    store
        .ledger()
        .record(store.conn(), id(20231231000000), chrono::Utc::now())
        .unwrap();
    migrator
}

fn is_drift(err: &MigrateError) -> bool {
    matches!(
        err,
        MigrateError::Plan(CoreError::UnknownIdentityInLedger { ids }) if ids == &vec![id(20231231000000)]
    )
}

#[test]
fn test_strict_drift_fails_every_command() {
    let migrator = with_orphan(Config::default());

    assert!(is_drift(&migrator.status().unwrap_err()));
    assert!(is_drift(
        &migrator.up(Target::Latest, RunOptions::default()).unwrap_err()
    ));
    assert!(is_drift(
        &migrator.down(Target::Latest, RunOptions::default()).unwrap_err()
    ));
    assert_eq!(applied(&migrator).len(), 2);
}

#[test]
fn test_permissive_drift_ignores_orphans() {
    let mut config = Config::default();
    config.drift = DriftMode::Permissive;
    let migrator = with_orphan(config);

    let report = migrator.up(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(report.outcome(), RunOutcome::Succeeded);
    assert_eq!(report.orphaned, vec![id(20231231000000)]);

    let down = migrator.down(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(down.completed.len(), 3);
    assert_eq!(applied(&migrator), vec![id(20231231000000)]);
}

#[test]
fn test_out_of_order_pending_is_rejected_by_default() {
    let migrator = migrator();
    let store = migrator.store();
    store.ensure_ledger().unwrap();
    store
        .ledger()
        .record(store.conn(), id(20240201000000), chrono::Utc::now())
        .unwrap();

    let err = migrator.up(Target::Latest, RunOptions::default()).unwrap_err();
    match err {
        MigrateError::Plan(CoreError::OutOfOrderMigration { ids }) => {
            assert_eq!(ids, vec![id(20240101000000)]);
        }
        other => panic!("expected OutOfOrderMigration, got {other:?}"),
    }
}

// ── Ledger availability and store capabilities ─────────────────────────

#[test]
fn test_missing_ledger_without_auto_create() {
    let mut config = Config::default();
    config.ledger.auto_create = false;
    let migrator = migrator_with(articles_catalog(), config);

    let err = migrator.up(Target::Latest, RunOptions::default()).unwrap_err();
    assert!(matches!(err, MigrateError::LedgerUnavailable(_)));
    assert!(matches!(
        migrator.status().unwrap_err(),
        MigrateError::LedgerUnavailable(_)
    ));
}

#[test]
fn test_non_transactional_store_refuses_by_default() {
    let mut config = Config::default();
    config.store.transactional_ddl = false;
    let migrator = migrator_with(articles_catalog(), config);

    let report = migrator.up(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(report.outcome(), RunOutcome::Failed);
    assert!(matches!(
        report.failure.unwrap().error,
        MigrateError::NonTransactionalStore { .. }
    ));
    assert!(schema_snapshot(&migrator).is_empty());
}

#[test]
fn test_best_effort_store_applies() {
    let mut config = Config::default();
    config.store.transactional_ddl = false;
    config.store.allow_best_effort = true;
    let migrator = migrator_with(articles_catalog(), config);

    let report = migrator.up(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(report.outcome(), RunOutcome::Succeeded);
    assert!(report.completed.iter().all(|s| !s.transactional));
}

// ── Data loss ──────────────────────────────────────────────────────────

#[test]
fn test_deny_policy_blocks_lossy_revert() {
    let mut config = Config::default();
    config.data_loss = DataLossPolicy::Deny;
    let migrator = migrator_with(articles_catalog(), config);
    migrator.up(Target::Latest, RunOptions::default()).unwrap();

    let err = migrator.down(Target::Steps(1), RunOptions::default()).unwrap_err();
    match &err {
        MigrateError::DataLossRevert { id: blocked, statements, .. } => {
            assert_eq!(*blocked, id(20240301000000));
            assert_eq!(statements.len(), 1);
        }
        other => panic!("expected DataLossRevert, got {other:?}"),
    }
    assert_eq!(applied(&migrator).len(), 3);

    let report = migrator
        .down(
            Target::Steps(1),
            RunOptions {
                allow_data_loss: true,
                ..RunOptions::default()
            },
        )
        .unwrap();
    assert_eq!(report.outcome(), RunOutcome::Succeeded);
    assert_eq!(report.warnings.len(), 1);
}

// ── Advisory lock ──────────────────────────────────────────────────────

#[test]
fn test_concurrent_runner_gets_lock_contention() {
    let config = Config::default();
    let store = MigrationStore::open_memory(&config).unwrap();
    let other = Migrator::new(store.try_clone().unwrap(), articles_catalog(), config.clone());

    let guard = store.acquire_lock(config.lock.stale_after()).unwrap();
    let err = other.up(Target::Latest, RunOptions::default()).unwrap_err();
    match err {
        MigrateError::LockContention { holder, .. } => assert_eq!(holder, guard.holder()),
        other => panic!("expected LockContention, got {other:?}"),
    }
    assert!(matches!(
        other.repair(false).unwrap_err(),
        MigrateError::LockContention { .. }
    ));
    // Status does not need the lock and reports who holds it.
    let status = other.status().unwrap();
    assert_eq!(status.lock.unwrap().holder, guard.holder());

    drop(guard);
    other.up(Target::Latest, RunOptions::default()).unwrap();
    assert!(other.status().unwrap().lock.is_none());
}

#[test]
fn test_stale_lock_is_taken_over() {
    let config = Config::default();
    let store = MigrationStore::open_memory(&config).unwrap();
    let abandoned = store.acquire_lock(config.lock.stale_after()).unwrap();
    std::mem::forget(abandoned);
    store
        .conn()
        .execute_batch(
            "UPDATE tidemark.schema_migrations_lock SET acquired_at = acquired_at - INTERVAL 1 DAY",
        )
        .unwrap();

    let migrator = Migrator::new(store, articles_catalog(), config);
    let report = migrator.up(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(report.outcome(), RunOutcome::Succeeded);
}

#[test]
fn test_unlock_releases_abandoned_lock() {
    let config = Config::default();
    let store = MigrationStore::open_memory(&config).unwrap();
    std::mem::forget(store.acquire_lock(config.lock.stale_after()).unwrap());

    let migrator = Migrator::new(store, articles_catalog(), config);
    assert!(matches!(
        migrator.up(Target::Latest, RunOptions::default()).unwrap_err(),
        MigrateError::LockContention { .. }
    ));
    assert!(migrator.unlock().unwrap().is_some());
    migrator.up(Target::Latest, RunOptions::default()).unwrap();
}

// ── Repair ─────────────────────────────────────────────────────────────

#[test]
fn test_repair_recovers_torn_apply() {
    let catalog = Catalog::new(vec![Migration::new(
        1,
        "create_articles",
        "CREATE TABLE articles (id INTEGER)",
        "DROP TABLE articles",
    )
    .with_probe("SELECT COUNT(*) > 0 FROM information_schema.tables WHERE table_name = 'articles'")])
    .unwrap();
    let migrator = migrator_with(catalog, Config::default());

    // The schema change landed but the ledger never heard about it.
    migrator
        .store()
        .conn()
        .execute_batch("CREATE TABLE articles (id INTEGER)")
        .unwrap();
    let report = migrator.up(Target::Latest, RunOptions::default()).unwrap();
    assert!(matches!(
        report.failure.unwrap().error,
        MigrateError::ActionFailed { .. }
    ));

    let repair = migrator.repair(false).unwrap();
    assert_eq!(repair.recorded, vec![id(1)]);
    assert_eq!(
        migrator.up(Target::Latest, RunOptions::default()).unwrap().outcome(),
        RunOutcome::NoOp
    );
}

// ── Timeout ────────────────────────────────────────────────────────────

#[test]
fn test_timeout_interrupts_and_rolls_back() {
    let catalog = Catalog::new(vec![Migration::new(
        1,
        "expensive_backfill",
        "CREATE TABLE totals AS
         SELECT SUM(a.range * b.range) AS total FROM range(100000) a, range(100000) b",
        "DROP TABLE totals",
    )])
    .unwrap();
    let mut config = Config::default();
    config.timeout_secs = Some(1);
    let migrator = migrator_with(catalog, config);

    let report = migrator.up(Target::Latest, RunOptions::default()).unwrap();
    match report.failure.map(|f| f.error) {
        Some(MigrateError::ActionFailed { cause, .. }) => {
            assert!(cause.contains("timed out after 1s"), "cause: {cause}")
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(!table_exists(&migrator, "totals"));
    assert!(applied(&migrator).is_empty());
}

// ── File-backed store ──────────────────────────────────────────────────

#[test]
fn test_ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("app.duckdb");
    let db_path = db_path.to_str().unwrap();
    let migrations = dir.path().join("migrate");
    std::fs::create_dir_all(&migrations).unwrap();
    write_migration(
        &migrations,
        "20240101000000_create_articles.yml",
        "forward: CREATE TABLE articles (id INTEGER)\nreverse: DROP TABLE articles\n",
    );

    {
        let config = Config::default();
        let store = MigrationStore::open(db_path, &config).unwrap();
        let migrator = Migrator::new(store, Catalog::load(&migrations).unwrap(), config);
        migrator.up(Target::Latest, RunOptions::default()).unwrap();
    }

    let config = Config::default();
    let store = MigrationStore::open(db_path, &config).unwrap();
    let migrator = Migrator::new(store, Catalog::load(&migrations).unwrap(), config);
    let status = migrator.status().unwrap();
    assert!(status.migrations[0].is_applied());
    assert_eq!(
        migrator.up(Target::Latest, RunOptions::default()).unwrap().outcome(),
        RunOutcome::NoOp
    );
}

#[test]
fn test_lock_from_crashed_run_does_not_block_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("app.duckdb");
    let db_path = db_path.to_str().unwrap();
    let config = Config::default();

    // A run that died while holding the lock never released its row.
    {
        let store = MigrationStore::open(db_path, &config).unwrap();
        std::mem::forget(store.acquire_lock(config.lock.stale_after()).unwrap());
    }

    let store = MigrationStore::open(db_path, &config).unwrap();
    let migrator = Migrator::new(store, articles_catalog(), config);
    assert!(migrator.status().unwrap().lock.is_some());

    let report = migrator.up(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(report.outcome(), RunOutcome::Succeeded);
    assert!(migrator.status().unwrap().lock.is_none());
}

fn write_migration(dir: &Path, file: &str, body: &str) {
    std::fs::write(dir.join(file), body).unwrap();
}
