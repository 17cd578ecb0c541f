use super::*;
use tm_core::{DriftMode, Migration};

fn catalog() -> Catalog {
    Catalog::new(vec![
        Migration::new(
            1,
            "create_users",
            "CREATE TABLE users (id INTEGER)",
            "DROP TABLE users",
        )
        .with_description("users table")
        .with_probe(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'users'",
        ),
        Migration::irreversible(2, "seed_users", "INSERT INTO users VALUES (1)"),
    ])
    .unwrap()
}

fn migrator_with(config: Config) -> Migrator {
    let store = MigrationStore::open_memory(&config).unwrap();
    Migrator::new(store, catalog(), config)
}

fn migrator() -> Migrator {
    migrator_with(Config::default())
}

#[test]
fn status_lists_catalog_in_order() {
    let migrator = migrator();
    migrator.up(Target::Steps(1), RunOptions::default()).unwrap();

    let status = migrator.status().unwrap();
    let rows: Vec<(u64, bool)> = status
        .migrations
        .iter()
        .map(|m| (m.id.value(), m.is_applied()))
        .collect();
    assert_eq!(rows, vec![(1, true), (2, false)]);
    assert_eq!(status.pending().count(), 1);
    assert_eq!(status.migrations[0].description.as_deref(), Some("users table"));
    assert!(status.migrations[1].irreversible);
    assert!(status.lock.is_none());
}

#[test]
fn status_reports_orphans_when_permissive() {
    let mut config = Config::default();
    config.drift = DriftMode::Permissive;
    let migrator = migrator_with(config);
    migrator.store().ensure_ledger().unwrap();
    migrator
        .store()
        .ledger()
        .record(migrator.store().conn(), MigrationId::new(99), chrono::Utc::now())
        .unwrap();

    let status = migrator.status().unwrap();
    assert_eq!(status.orphaned, vec![MigrationId::new(99)]);
}

#[test]
fn plan_up_does_not_mutate() {
    let migrator = migrator();
    let plan = migrator.plan_up(Target::Latest).unwrap();
    assert_eq!(plan.len(), 2);
    assert!(migrator.plan_down(Target::Latest).unwrap().is_empty());
    assert_eq!(schema_table_count(&migrator), 0);
}

fn schema_table_count(migrator: &Migrator) -> i64 {
    migrator
        .store()
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'tidemark'",
            [],
            |row| row.get(0),
        )
        .unwrap()
}

#[test]
fn status_on_fresh_database_writes_nothing() {
    let migrator = migrator();
    let status = migrator.status().unwrap();
    assert_eq!(status.pending().count(), 2);
    assert!(status.lock.is_none());
    assert_eq!(schema_table_count(&migrator), 0);

    migrator.up(Target::Latest, RunOptions::default()).unwrap();
    assert_eq!(schema_table_count(&migrator), 2);
}

#[test]
fn repair_records_present_effect() {
    let migrator = migrator();
    migrator
        .store()
        .conn()
        .execute_batch("CREATE TABLE users (id INTEGER)")
        .unwrap();

    let preview = migrator.repair(true).unwrap();
    assert_eq!(preview.recorded, vec![MigrationId::new(1)]);
    assert!(migrator.store().applied().unwrap().is_empty());

    let report = migrator.repair(false).unwrap();
    assert!(report.changed());
    assert_eq!(report.unverified, vec![MigrationId::new(2)]);
    assert_eq!(
        migrator.store().applied_ids().unwrap().into_iter().collect::<Vec<_>>(),
        vec![MigrationId::new(1)]
    );
}

#[test]
fn repair_erases_missing_effect() {
    let migrator = migrator();
    migrator.up(Target::Steps(1), RunOptions::default()).unwrap();
    migrator
        .store()
        .conn()
        .execute_batch("DROP TABLE users")
        .unwrap();

    let report = migrator.repair(false).unwrap();
    assert_eq!(report.erased, vec![MigrationId::new(1)]);
    assert!(migrator.store().applied().unwrap().is_empty());
}

#[test]
fn repair_reports_broken_probe() {
    let catalog = Catalog::new(vec![Migration::new(1, "a", "SELECT 1", "SELECT 1")
        .with_probe("SELECT * FROM missing_table")])
    .unwrap();
    let config = Config::default();
    let store = MigrationStore::open_memory(&config).unwrap();
    let migrator = Migrator::new(store, catalog, config);

    let report = migrator.repair(false).unwrap();
    assert_eq!(report.probe_failures.len(), 1);
    assert!(!report.changed());
}

#[test]
fn lossy_revert_warns_by_default() {
    let migrator = migrator();
    migrator.up(Target::Steps(1), RunOptions::default()).unwrap();

    let report = migrator.down(Target::Steps(1), RunOptions::default()).unwrap();
    assert!(report.is_success());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("1_create_users"));
}

#[test]
fn unlock_without_holder_is_none() {
    assert!(migrator().unlock().unwrap().is_none());
}
