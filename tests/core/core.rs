use rusqlite::Connection;
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use trudge::core::apply;
use trudge::core::db;
use trudge::core::error::TrudgeError;
use trudge::core::identity::fingerprint;
use trudge::core::ledger;
use trudge::core::migration::{Direction, Migration};
use trudge::core::progress::{EventLog, ProgressEvent, ProgressReporter};
use trudge::core::source;
use trudge::core::sync::{self, SyncOptions};

const TABLE: &str = ledger::DEFAULT_TABLE;

fn write(dir: &Path, name: &str, body: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(name), body).unwrap();
}

fn write_init(dir: &Path) {
    write(
        dir,
        "001.init.sql",
        "--trudge:upgrade\nCREATE TABLE Users (id INTEGER PRIMARY KEY, email TEXT);\n--trudge:downgrade\nDROP TABLE Users;\n",
    );
}

fn open(root: &Path) -> Connection {
    db::db_connect(&root.join("app.db")).unwrap()
}

#[test]
fn directory_scan_skips_foreign_files_and_parses_sections() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    write_init(&dir);
    write(&dir, "README.md", "not a migration");
    write(&dir, "init.sql", "--trudge:downgrade\nSELECT 1;");
    write(
        &dir,
        "0002.add-index.sql",
        "-- adds an index\nCREATE INDEX users_email ON Users(email);\n--TRUDGE:DOWNGRADE\nDROP INDEX users_email;\n",
    );
    fs::create_dir_all(dir.join("003.nested.sql")).unwrap();

    let mut loaded = source::load_directory(&dir).unwrap();
    loaded.sort_by_key(|m| m.id);
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].name, "init");
    assert_eq!(loaded[1].id, 2);
    assert_eq!(loaded[1].name, "add-index");
    assert_eq!(loaded[1].upgrade, "CREATE INDEX users_email ON Users(email);");
    assert_eq!(loaded[1].downgrade, "DROP INDEX users_email;");
}

#[test]
fn directory_scan_reports_every_duplicate_id() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    let body = "SELECT 1;\n--trudge:downgrade\nSELECT 2;\n";
    write(dir, "1.a.sql", body);
    write(dir, "001.b.sql", body);
    write(dir, "2.c.sql", body);
    write(dir, "4.d.sql", body);
    write(dir, "04.e.sql", body);
    write(dir, "004.f.sql", body);

    match source::load_directory(dir).unwrap_err() {
        TrudgeError::DuplicateId { ids } => assert_eq!(ids, vec![1, 4]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn malformed_file_aborts_the_whole_read() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path();
    write_init(dir);
    write(dir, "002.broken.sql", "CREATE TABLE nope (id INTEGER);\n");

    match source::load_directory(dir).unwrap_err() {
        TrudgeError::MalformedMigration { path, .. } => {
            assert!(path.ends_with("002.broken.sql"))
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn single_file_parse_rejects_bad_names() {
    let tmp = tempdir().unwrap();
    write(tmp.path(), "init.sql", "SELECT 1;\n--trudge:downgrade\nSELECT 2;\n");
    let err = source::load_file(&tmp.path().join("init.sql")).unwrap_err();
    assert!(matches!(err, TrudgeError::MalformedFilename { .. }));

    write_init(tmp.path());
    let m = source::load_file(&tmp.path().join("001.init.sql")).unwrap();
    assert_eq!(m.id, 1);
}

#[test]
fn new_files_are_numbered_and_loadable_once_filled() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("migrations");

    let first = source::create_migration(&dir, "Create Users").unwrap();
    assert_eq!(first, "001.create-users.sql");
    let second = source::create_migration(&dir, "add email").unwrap();
    assert_eq!(second, "002.add-email.sql");

    // Fresh templates have empty sections and must be filled in first.
    assert!(matches!(
        source::load_directory(&dir).unwrap_err(),
        TrudgeError::MalformedMigration { .. }
    ));

    fs::remove_file(dir.join(&second)).unwrap();
    write(
        &dir,
        &first,
        "--trudge:upgrade\nCREATE TABLE users (id INTEGER);\n--trudge:downgrade\nDROP TABLE users;\n",
    );
    let written = source::write_new_file(
        &dir,
        &Migration::new(2, "seed", "INSERT INTO users VALUES (1);", "DELETE FROM users;"),
    )
    .unwrap();
    assert_eq!(written, "002.seed.sql");

    let mut loaded = source::load_directory(&dir).unwrap();
    loaded.sort_by_key(|m| m.id);
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[1].upgrade, "INSERT INTO users VALUES (1);");

    // Never overwrites.
    assert!(source::write_new_file(&dir, &loaded[1]).is_err());
}

#[test]
fn first_sync_applies_init_and_second_is_a_noop() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    write_init(&dir);
    let conn = open(tmp.path());

    let first = sync::synchronize(&conn, &dir, TABLE, &SyncOptions::default()).unwrap();
    assert_eq!(first.changes.len(), 1);
    assert_eq!(first.changes[0].migration.label(), "1.init");
    assert_eq!(first.changes[0].direction, Direction::Upgrade);
    assert_eq!(ledger::read_all(&conn, TABLE).unwrap().len(), 1);
    assert!(db::table_exists(&conn, "Users").unwrap());

    let second = sync::synchronize(&conn, &dir, TABLE, &SyncOptions::default()).unwrap();
    assert!(second.changes.is_empty());
    assert_eq!(second.before, second.after);
}

#[test]
fn deleted_file_aborts_by_default_and_downgrades_first_when_allowed() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    write_init(&dir);
    write(
        &dir,
        "002.audit.sql",
        "--trudge:upgrade\nCREATE TABLE audit (id INTEGER);\n--trudge:downgrade\nDROP TABLE audit;\n",
    );
    let conn = open(tmp.path());
    sync::synchronize(&conn, &dir, TABLE, &SyncOptions::default()).unwrap();

    fs::remove_file(dir.join("002.audit.sql")).unwrap();
    write(
        &dir,
        "003.posts.sql",
        "--trudge:upgrade\nCREATE TABLE posts (id INTEGER);\n--trudge:downgrade\nDROP TABLE posts;\n",
    );

    let aborted = sync::synchronize(&conn, &dir, TABLE, &SyncOptions::default()).unwrap();
    assert!(aborted.aborted);
    assert_eq!(aborted.before.unexpected.len(), 1);
    assert!(aborted.changes.is_empty());
    assert_eq!(aborted.before, aborted.after);
    assert!(db::table_exists(&conn, "audit").unwrap());
    assert!(!db::table_exists(&conn, "posts").unwrap());

    let options = SyncOptions {
        abort_on_unexpected: false,
        ..SyncOptions::default()
    };
    let state = sync::synchronize(&conn, &dir, TABLE, &options).unwrap();
    let order: Vec<(i64, Direction)> = state
        .changes
        .iter()
        .map(|c| (c.migration.id, c.direction))
        .collect();
    assert_eq!(order, vec![(2, Direction::Downgrade), (3, Direction::Upgrade)]);
    assert!(!db::table_exists(&conn, "audit").unwrap());
    assert!(db::table_exists(&conn, "posts").unwrap());
    assert!(state.after.is_synchronized());
}

#[test]
fn edited_migration_is_replaced_by_downgrade_then_upgrade() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    write_init(&dir);
    let conn = open(tmp.path());
    sync::synchronize(&conn, &dir, TABLE, &SyncOptions::default()).unwrap();

    write(
        &dir,
        "001.init.sql",
        "--trudge:upgrade\nCREATE TABLE Users (id INTEGER PRIMARY KEY, email TEXT, name TEXT);\n--trudge:downgrade\nDROP TABLE Users;\n",
    );
    let options = SyncOptions {
        abort_on_unexpected: false,
        ..SyncOptions::default()
    };
    let state = sync::synchronize(&conn, &dir, TABLE, &options).unwrap();
    assert_eq!(state.before.missing.len(), 1);
    assert_eq!(state.before.unexpected.len(), 1);
    assert_ne!(
        fingerprint(&state.before.missing[0]),
        fingerprint(&state.before.unexpected[0])
    );
    assert_eq!(state.changes.len(), 2);
    assert_eq!(state.changes[0].direction, Direction::Downgrade);
    assert_eq!(state.changes[1].direction, Direction::Upgrade);

    let columns: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('Users')",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(columns, 3);
}

#[test]
fn rerun_latest_replays_the_newest_shared_upgrade() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    write_init(&dir);
    write(
        &dir,
        "002.backfill.sql",
        "--trudge:upgrade\nCREATE TABLE IF NOT EXISTS runs (n INTEGER);\nINSERT INTO runs VALUES (1);\n--trudge:downgrade\nDROP TABLE runs;\n",
    );
    let conn = open(tmp.path());
    sync::synchronize(&conn, &dir, TABLE, &SyncOptions::default()).unwrap();

    let options = SyncOptions {
        rerun_latest_if_synchronized: true,
        ..SyncOptions::default()
    };
    let state = sync::synchronize(&conn, &dir, TABLE, &options).unwrap();
    assert_eq!(state.changes.len(), 1);
    assert_eq!(state.changes[0].migration.id, 2);
    assert_eq!(state.changes[0].direction, Direction::Upgrade);
    assert!(state.changes[0].forced);
    assert_eq!(ledger::read_all(&conn, TABLE).unwrap().len(), 2);

    let runs: i64 = conn
        .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))
        .unwrap();
    assert_eq!(runs, 2);
}

#[test]
fn script_failure_mid_run_keeps_prior_commits() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    write_init(&dir);
    write(
        &dir,
        "002.bad.sql",
        "--trudge:upgrade\nINSERT INTO missing_table VALUES (1);\n--trudge:downgrade\nSELECT 1;\n",
    );
    write(
        &dir,
        "003.never.sql",
        "--trudge:upgrade\nCREATE TABLE never (id INTEGER);\n--trudge:downgrade\nDROP TABLE never;\n",
    );
    let conn = open(tmp.path());

    let err = sync::synchronize(&conn, &dir, TABLE, &SyncOptions::default()).unwrap_err();
    match err {
        TrudgeError::ScriptExecutionFailure {
            id,
            name,
            direction,
            ..
        } => {
            assert_eq!(id, 2);
            assert_eq!(name, "bad");
            assert_eq!(direction, Direction::Upgrade);
        }
        other => panic!("unexpected error: {other}"),
    }

    let ids: Vec<i64> = ledger::read_all(&conn, TABLE)
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec![1]);
    assert!(db::table_exists(&conn, "Users").unwrap());
    assert!(!db::table_exists(&conn, "never").unwrap());
}

#[test]
fn abort_runs_no_script_and_reports_nothing() {
    struct Counter(RefCell<usize>);
    impl ProgressReporter for Counter {
        fn report(&self, _event: &ProgressEvent<'_>) {
            *self.0.borrow_mut() += 1;
        }
    }

    let tmp = tempdir().unwrap();
    let conn = open(tmp.path());
    ledger::ensure_table(&conn, TABLE).unwrap();
    let stray = Migration::new(9, "stray", "SELECT 1;", "DROP TABLE Users;");
    apply::apply(&conn, TABLE, &stray, Direction::Upgrade, false).unwrap();
    conn.execute_batch("CREATE TABLE Users (id INTEGER);").unwrap();

    let counter = Counter(RefCell::new(0));
    let options = SyncOptions {
        reporter: &counter,
        ..SyncOptions::default()
    };
    let dir = tmp.path().join("migrations");
    write_init(&dir);
    let state = sync::synchronize(&conn, &dir, TABLE, &options).unwrap();

    assert!(state.aborted);
    assert!(state.changes.is_empty());
    assert_eq!(*counter.0.borrow(), 0);
    assert!(db::table_exists(&conn, "Users").unwrap());
}

#[test]
fn event_log_records_each_apply() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    write_init(&dir);
    let conn = open(tmp.path());
    let log = EventLog::new(&tmp.path().join("trudge.events.jsonl"));

    let options = SyncOptions {
        reporter: &log,
        ..SyncOptions::default()
    };
    sync::synchronize(&conn, &dir, TABLE, &options).unwrap();

    let records = log.read_all().unwrap();
    let statuses: Vec<&str> = records.iter().map(|r| r.status.as_str()).collect();
    assert_eq!(statuses, vec!["pending", "success"]);
    assert!(records.iter().all(|r| r.migration_id == 1));
}

#[test]
fn custom_ledger_table_is_created_lazily() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("migrations");
    write_init(&dir);
    let conn = open(tmp.path());

    assert!(!db::table_exists(&conn, "schema_log").unwrap());
    sync::synchronize(&conn, &dir, "schema_log", &SyncOptions::default()).unwrap();
    assert!(db::table_exists(&conn, "schema_log").unwrap());
    assert!(!db::table_exists(&conn, TABLE).unwrap());
}
