use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use tidemark_common::{DuplicatePolicy, Error, MigrationNumber, Result};
use tidemark_db::{Database, SqliteDatabase};
use tidemark_migrate::{
    Ledger, Migration, MigrationRegistry, MigrationState, Migrator, SqlDirectorySource, StaticSource,
};

/// Write `name` into `dir` with the given up/down sections.
fn write_migration(dir: &Path, name: &str, up: &str, down: &str) {
    std::fs::write(dir.join(name), format!("-- up\n{up}\n-- down\n{down}\n")).unwrap();
}

/// Three migrations creating `a`, `b` and `c`.
fn standard_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_migration(dir.path(), "0001_create_a.sql", "CREATE TABLE a (id INTEGER);", "DROP TABLE a;");
    write_migration(dir.path(), "0002_create_b.sql", "CREATE TABLE b (id INTEGER);", "DROP TABLE b;");
    write_migration(dir.path(), "0003_create_c.sql", "CREATE TABLE c (id INTEGER);", "DROP TABLE c;");
    dir
}

fn table_exists(db: &SqliteDatabase, name: &str) -> bool {
    db.fetch_value(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
        &[name.into()],
    )
    .unwrap()
    .is_some()
}

fn directory_migrator(db: &Arc<SqliteDatabase>, dir: &Path) -> Migrator {
    Migrator::new(db.clone(), MigrationRegistry::new(SqlDirectorySource::new(dir)))
}

struct Failing(i64);

impl Migration for Failing {
    fn number(&self) -> Result<MigrationNumber> {
        MigrationNumber::new(self.0)
    }

    fn up(&self, db: &dyn Database) -> Result<()> {
        db.execute("CREATE TABLE half_done (id INTEGER)", &[])?;
        Err(Error::Other("disk on fire".into()))
    }
}

struct CreateTable(i64, &'static str);

impl Migration for CreateTable {
    fn number(&self) -> Result<MigrationNumber> {
        MigrationNumber::new(self.0)
    }

    fn name(&self) -> &str {
        self.1
    }

    fn up(&self, db: &dyn Database) -> Result<()> {
        db.execute(&format!("CREATE TABLE {} (id INTEGER)", self.1), &[])
    }

    fn down(&self, db: &dyn Database) -> Result<()> {
        db.execute(&format!("DROP TABLE {}", self.1), &[])
    }
}

/// Creates its table on the way up; the way down drops it and then fails.
struct FailingDown(i64, &'static str);

impl Migration for FailingDown {
    fn number(&self) -> Result<MigrationNumber> {
        MigrationNumber::new(self.0)
    }

    fn name(&self) -> &str {
        self.1
    }

    fn up(&self, db: &dyn Database) -> Result<()> {
        db.execute(&format!("CREATE TABLE {} (id INTEGER)", self.1), &[])
    }

    fn down(&self, db: &dyn Database) -> Result<()> {
        db.execute(&format!("DROP TABLE {}", self.1), &[])?;
        Err(Error::Other("cannot revert".into()))
    }
}

fn applied_in_table(db: &SqliteDatabase) -> Vec<i64> {
    Ledger::default()
        .applied_numbers(db)
        .unwrap()
        .iter()
        .map(|n| n.get())
        .collect()
}

#[test]
fn migrates_up_then_down_against_sqlite() {
    let dir = standard_dir();
    let db = Arc::new(SqliteDatabase::in_memory().unwrap());
    let mut migrator = directory_migrator(&db, dir.path());

    assert!(migrator.migrate(None).unwrap());
    assert_eq!(migrator.current_number().unwrap(), 3);
    assert!(table_exists(&db, "a") && table_exists(&db, "b") && table_exists(&db, "c"));

    assert!(migrator.migrate(Some(1)).unwrap());
    assert_eq!(migrator.current_number().unwrap(), 1);
    assert!(table_exists(&db, "a"));
    assert!(!table_exists(&db, "b"));
    assert!(!table_exists(&db, "c"));
}

#[test]
fn second_run_is_a_no_op() {
    let dir = standard_dir();
    let db = Arc::new(SqliteDatabase::in_memory().unwrap());
    let mut migrator = directory_migrator(&db, dir.path());

    assert!(migrator.migrate(None).unwrap());
    assert!(!migrator.migrate(None).unwrap());

    // a fresh migrator reads the same ledger
    let mut again = directory_migrator(&db, dir.path());
    assert!(!again.migrate(None).unwrap());
}

#[test]
fn progress_lines_follow_the_run() {
    let dir = standard_dir();
    let db = Arc::new(SqliteDatabase::in_memory().unwrap());
    let lines = Rc::new(RefCell::new(Vec::new()));
    let sink = lines.clone();
    let mut migrator = directory_migrator(&db, dir.path())
        .with_progress(move |m: &str| sink.borrow_mut().push(m.to_string()));

    migrator.migrate(Some(2)).unwrap();
    migrator.migrate(None).unwrap();
    migrator.migrate(None).unwrap();

    assert_eq!(
        *lines.borrow(),
        vec![
            "Running 2 migrations from migration 0 to 2...",
            " - Migrating up 1...",
            " - Migrating up 2...",
            "Done! 2 migrations migrated!",
            "Running 1 migrations from migration 2 to 3...",
            " - Migrating up 3...",
            "Done! 1 migrations migrated!",
            "No migrations available, things are up to date (migration 3)!",
        ]
    );
}

#[test]
fn invalid_target_leaves_the_ledger_alone() {
    let dir = standard_dir();
    let db = Arc::new(SqliteDatabase::in_memory().unwrap());
    let mut migrator = directory_migrator(&db, dir.path());
    migrator.migrate(Some(1)).unwrap();

    let err = migrator.migrate(Some(7)).unwrap_err();
    assert!(err.is_caller_error());
    assert_eq!(migrator.current_number().unwrap(), 1);
    assert!(!table_exists(&db, "b"));
}

#[test]
fn ledger_ahead_of_the_registry_is_reported() {
    let dir = standard_dir();
    let db = Arc::new(SqliteDatabase::in_memory().unwrap());
    directory_migrator(&db, dir.path()).migrate(None).unwrap();

    std::fs::remove_file(dir.path().join("0003_create_c.sql")).unwrap();
    let mut shrunk = directory_migrator(&db, dir.path());
    match shrunk.migrate(None) {
        Err(Error::InconsistentState { current, latest }) => {
            assert_eq!((current, latest), (3, 2));
        }
        other => panic!("expected inconsistent state, got {other:?}"),
    }

    let status = shrunk.status().unwrap();
    assert_eq!(status.last().map(|s| s.state), Some(MigrationState::Missing));
}

#[test]
fn gaps_in_the_ledger_are_filled() {
    let db = Arc::new(SqliteDatabase::in_memory().unwrap());
    let source = StaticSource::default()
        .with(CreateTable(1, "first"))
        .with(CreateTable(2, "second"));

    // only 2 applied, as if 1 arrived from a merged branch later
    let mut partial = Migrator::new(
        db.clone(),
        MigrationRegistry::new(StaticSource::default().with(CreateTable(2, "second"))),
    );
    partial.migrate(None).unwrap();

    let mut full = Migrator::new(db.clone(), MigrationRegistry::new(source));
    let plan = full.migrations_to(None).unwrap();
    assert_eq!(plan.numbers(), vec![1]);
    assert!(full.migrate(None).unwrap());
    assert!(table_exists(&db, "first"));
    assert_eq!(full.current_number().unwrap(), 2);
}

#[test]
fn failure_keeps_earlier_units_and_rolls_back_the_failing_one() {
    let db = Arc::new(SqliteDatabase::in_memory().unwrap());
    let source = StaticSource::default()
        .with(CreateTable(1, "kept"))
        .with(Failing(2))
        .with(CreateTable(3, "never"));
    let mut migrator = Migrator::new(db.clone(), MigrationRegistry::new(source));

    let err = migrator.migrate(None).unwrap_err();
    assert_eq!(err.to_string(), "disk on fire");

    assert_eq!(migrator.current_number().unwrap(), 1);
    assert!(table_exists(&db, "kept"));
    assert!(!table_exists(&db, "half_done"));
    assert!(!table_exists(&db, "never"));
}

#[test]
fn failed_revert_keeps_its_ledger_row_and_earlier_reverts() {
    let db = Arc::new(SqliteDatabase::in_memory().unwrap());
    let source = StaticSource::default()
        .with(CreateTable(1, "first"))
        .with(FailingDown(2, "second"))
        .with(CreateTable(3, "third"));
    let mut migrator = Migrator::new(db.clone(), MigrationRegistry::new(source));
    migrator.migrate(None).unwrap();
    assert_eq!(applied_in_table(&db), vec![1, 2, 3]);

    let err = migrator.migrate(Some(1)).unwrap_err();
    assert_eq!(err.to_string(), "cannot revert");

    // 3 was reverted and committed before 2 failed
    assert!(!table_exists(&db, "third"));
    assert!(table_exists(&db, "second"));
    assert!(table_exists(&db, "first"));
    assert_eq!(applied_in_table(&db), vec![1, 2]);

    // the migrator rereads the ledger instead of trusting its cache
    assert_eq!(migrator.current_number().unwrap(), 2);
    let applied: Vec<i64> = migrator
        .status()
        .unwrap()
        .iter()
        .filter(|m| m.state == MigrationState::Applied)
        .map(|m| m.number.get())
        .collect();
    assert_eq!(applied, vec![1, 2]);
}

#[test]
fn without_transactions_partial_work_stays_but_is_not_recorded() {
    let db = Arc::new(SqliteDatabase::in_memory().unwrap());
    let source = StaticSource::default()
        .with(CreateTable(1, "kept"))
        .with(Failing(2));
    let mut migrator =
        Migrator::new(db.clone(), MigrationRegistry::new(source)).transactional(false);

    assert!(migrator.migrate(None).is_err());
    assert_eq!(migrator.current_number().unwrap(), 1);
    assert!(table_exists(&db, "half_done"));
}

#[test]
fn duplicate_numbers_follow_the_policy() {
    let dir = tempfile::tempdir().unwrap();
    write_migration(dir.path(), "0001_alpha.sql", "CREATE TABLE alpha (id INTEGER);", "");
    write_migration(dir.path(), "0001_beta.sql", "CREATE TABLE beta (id INTEGER);", "");
    let db = Arc::new(SqliteDatabase::in_memory().unwrap());

    let mut strict = directory_migrator(&db, dir.path());
    assert!(matches!(
        strict.migrate(None),
        Err(Error::DuplicateMigration(1))
    ));

    let registry = MigrationRegistry::new(SqlDirectorySource::new(dir.path()))
        .with_policy(DuplicatePolicy::KeepLast);
    let mut lenient = Migrator::new(db.clone(), registry);
    lenient.migrate(None).unwrap();
    assert!(table_exists(&db, "beta"));
    assert!(!table_exists(&db, "alpha"));
}

#[test]
fn reset_drops_everything_including_the_ledger() {
    let dir = standard_dir();
    let db = Arc::new(SqliteDatabase::in_memory().unwrap());
    let mut migrator = directory_migrator(&db, dir.path());
    migrator.migrate(None).unwrap();

    migrator.reset_database().unwrap();
    for table in ["a", "b", "c", "migrations"] {
        assert!(!table_exists(&db, table), "{table} survived the reset");
    }

    // caches were dropped, so the ledger is recreated and everything reruns
    assert_eq!(migrator.current_number().unwrap(), 0);
    assert!(migrator.migrate(None).unwrap());
    assert!(table_exists(&db, "c"));
}

#[test]
fn reset_drops_tables_whose_names_start_with_sqlite() {
    let db = Arc::new(SqliteDatabase::in_memory().unwrap());
    db.execute_batch(
        "CREATE TABLE sqlitefiles (id INTEGER);
         CREATE TABLE sqlite1 (id INTEGER);
         CREATE TABLE parent (id INTEGER PRIMARY KEY AUTOINCREMENT);
         CREATE TABLE child (parent_id INTEGER REFERENCES parent(id));",
    )
    .unwrap();
    db.execute("INSERT INTO parent DEFAULT VALUES", &[]).unwrap();
    db.execute("INSERT INTO child (parent_id) VALUES (1)", &[]).unwrap();

    let mut migrator = Migrator::new(db.clone(), MigrationRegistry::new(StaticSource::default()));
    migrator.reset_database().unwrap();

    for table in ["sqlitefiles", "sqlite1", "parent", "child"] {
        assert!(!table_exists(&db, table), "{table} survived the reset");
    }
}

#[test]
fn custom_ledger_table_on_a_file_database() {
    let dir = standard_dir();
    let data = tempfile::tempdir().unwrap();
    let path = data.path().join("app.db");

    {
        let db = Arc::new(SqliteDatabase::open(&path).unwrap());
        let mut migrator = directory_migrator(&db, dir.path()).with_table("schema_versions");
        migrator.migrate(Some(2)).unwrap();
        assert!(table_exists(&db, "schema_versions"));
        assert!(!table_exists(&db, "migrations"));
    }

    let db = Arc::new(SqliteDatabase::open(&path).unwrap());
    let mut reopened = directory_migrator(&db, dir.path()).with_table("schema_versions");
    assert_eq!(reopened.current_number().unwrap(), 2);

    let status = reopened.status().unwrap();
    let states: Vec<_> = status.iter().map(|s| s.state).collect();
    assert_eq!(
        states,
        vec![
            MigrationState::Applied,
            MigrationState::Applied,
            MigrationState::Pending
        ]
    );
    assert!(status[0].completed_at.is_some());
}
