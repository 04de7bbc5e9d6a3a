use super::*;
use crate::mapping::ColumnMapping;
use crate::source::SourceFile;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::PathBuf;

fn setup(script: &str) -> (Database, SchemaCatalog, LockRegistry) {
    let db = Database::open_in_memory().unwrap();
    if !script.is_empty() {
        db.execute_script(script).unwrap();
    }
    let mut catalog = SchemaCatalog::new();
    catalog.populate(&db, None, None, true, false).unwrap();
    (db, catalog, LockRegistry::new())
}

fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

/// The CSV of the error-policy scenarios: row 2 violates the CHECK.
fn checked_csv(dir: &tempfile::TempDir) -> SourceFile {
    let path = write_file(dir, "data.csv", "1,x\n-5,bad\n3,z\n");
    SourceFile::open(path).unwrap()
}

const CHECKED_TABLE: &str = "CREATE TABLE target (n INT CHECK (n > 0), s TEXT);";

fn positional_mapping() -> SheetMapping {
    SheetMapping::into_existing(
        "data",
        "target",
        vec![
            ColumnMapping::by_index(0, "n"),
            ColumnMapping::by_index(1, "s"),
        ],
    )
}

#[test]
fn test_ignore_errors_keeps_good_rows() {
    let (db, mut catalog, locks) = setup(CHECKED_TABLE);
    let dir = tempfile::tempdir().unwrap();
    let source = checked_csv(&dir);

    let mut events: Vec<ImportProgress> = Vec::new();
    let report = ImportEngine::new()
        .run(
            &db,
            &mut catalog,
            &locks,
            &source,
            &[positional_mapping()],
            &mut |progress| {
                events.push(progress.clone());
                ImportDecision::Continue
            },
            &CancelToken::new(),
        )
        .unwrap();

    assert_eq!(report.counts["target"], 2);
    assert_eq!(report.errors["target"], 1);

    let last = events.last().unwrap();
    assert!(last.done);
    assert_eq!(last.count, 2);
    assert_eq!(last.errorcount, 1);

    // The savepoint was released: rows persisted.
    let kept = db.query_value("SELECT COUNT(*) FROM target", &[]).unwrap();
    assert_eq!(kept, Some(Value::Integer(2)));
}

#[test]
fn test_rollback_on_first_error_undoes_everything() {
    let (db, mut catalog, locks) = setup(CHECKED_TABLE);
    let dir = tempfile::tempdir().unwrap();
    let source = checked_csv(&dir);

    let mut saw_done = false;
    let report = ImportEngine::new()
        .run(
            &db,
            &mut catalog,
            &locks,
            &source,
            &[positional_mapping()],
            &mut |progress| {
                if progress.done {
                    saw_done = true;
                    return ImportDecision::Continue;
                }
                if progress.error.is_some() {
                    ImportDecision::Rollback
                } else {
                    ImportDecision::Continue
                }
            },
            &CancelToken::new(),
        )
        .unwrap();

    assert!(saw_done);
    assert_eq!(report.counts["target"], 0);
    assert_eq!(report.errors["target"], 1);
    let kept = db.query_value("SELECT COUNT(*) FROM target", &[]).unwrap();
    assert_eq!(kept, Some(Value::Integer(0)));
}

#[test]
fn test_halt_keeps_rows_inserted_so_far() {
    let (db, mut catalog, locks) = setup(CHECKED_TABLE);
    let dir = tempfile::tempdir().unwrap();
    let source = checked_csv(&dir);

    let report = ImportEngine::new()
        .run(
            &db,
            &mut catalog,
            &locks,
            &source,
            &[positional_mapping()],
            &mut |progress| {
                if progress.error.is_some() {
                    ImportDecision::Halt
                } else {
                    ImportDecision::Continue
                }
            },
            &CancelToken::new(),
        )
        .unwrap();

    // Row 3 was never reached; row 1 stays.
    assert_eq!(report.counts["target"], 1);
    let kept = db.query_value("SELECT COUNT(*) FROM target", &[]).unwrap();
    assert_eq!(kept, Some(Value::Integer(1)));
}

#[test]
fn test_rollback_removes_newly_created_table() {
    let (db, mut catalog, locks) = setup("");
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "data.csv", "1\n2\n");
    let source = SourceFile::open(path).unwrap();

    let mapping = SheetMapping::into_new_table(
        "data",
        "fresh",
        vec![ColumnMapping::by_index(0, "v")],
    );
    ImportEngine::new()
        .run(
            &db,
            &mut catalog,
            &locks,
            &source,
            &[mapping],
            &mut |progress| {
                if progress.done {
                    ImportDecision::Rollback
                } else {
                    ImportDecision::Continue
                }
            },
            &CancelToken::new(),
        )
        .unwrap();

    // Creation happened inside the savepoint, so nothing remains.
    let exists = db
        .query_value(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 'fresh'",
            &[],
        )
        .unwrap();
    assert_eq!(exists, Some(Value::Integer(0)));
}

#[test]
fn test_header_row_resolves_names_and_skips_first_row() {
    let (db, mut catalog, locks) = setup("CREATE TABLE people (name TEXT, age INT);");
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "people.csv", "name,age\nalice,31\n");
    let source = SourceFile::open(path).unwrap();

    let mapping = SheetMapping::into_existing(
        "people",
        "people",
        vec![
            ColumnMapping::by_name("name", "name"),
            ColumnMapping::by_name("AGE", "age"),
        ],
    )
    .with_header_row();

    let report = ImportEngine::new()
        .run(
            &db,
            &mut catalog,
            &locks,
            &source,
            &[mapping],
            &mut |_| ImportDecision::Continue,
            &CancelToken::new(),
        )
        .unwrap();

    assert_eq!(report.counts["people"], 1);
    let out = db.query("SELECT name, age FROM people", &[]).unwrap();
    assert_eq!(
        out.rows,
        vec![vec![Value::Text("alice".into()), Value::Integer(31)]]
    );
}

#[test]
fn test_header_row_only_sheet_imports_nothing() {
    let (db, mut catalog, locks) = setup("CREATE TABLE people (name TEXT);");
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "people.csv", "name\n");
    let source = SourceFile::open(path).unwrap();

    let mapping = SheetMapping::into_existing(
        "people",
        "people",
        vec![ColumnMapping::by_name("name", "name")],
    )
    .with_header_row();

    let mut saw_done = false;
    let report = ImportEngine::new()
        .run(
            &db,
            &mut catalog,
            &locks,
            &source,
            &[mapping],
            &mut |progress| {
                saw_done |= progress.done;
                ImportDecision::Continue
            },
            &CancelToken::new(),
        )
        .unwrap();

    assert!(saw_done);
    assert_eq!(report.counts["people"], 0);
    assert_eq!(report.errors["people"], 0);
}

#[test]
fn test_create_table_with_auto_pk_and_uniquified_columns() {
    let (db, mut catalog, locks) = setup("");
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        &dir,
        "dump.json",
        r#"{"users": [{"id": "a"}, {"id": "b"}]}"#,
    );
    let source = SourceFile::open(path).unwrap();

    // The requested pk name collides with a mapped column: the mapped
    // column gets uniquified.
    let mapping = SheetMapping::into_new_table(
        "users",
        "users",
        vec![ColumnMapping::by_name("id", "id")],
    )
    .with_auto_pk("id");

    let report = ImportEngine::new()
        .run(
            &db,
            &mut catalog,
            &locks,
            &source,
            &[mapping],
            &mut |_| ImportDecision::Continue,
            &CancelToken::new(),
        )
        .unwrap();

    assert_eq!(report.counts["users"], 2);
    // The catalog was refreshed after the run.
    let entity = catalog.get(ObjectCategory::Table, "users").unwrap();
    let meta = entity.table_meta().unwrap();
    assert_eq!(meta.column_names(), vec!["id", "id_2"]);
    assert!(meta.columns[0].autoincrement);

    let out = db.query("SELECT id, id_2 FROM users ORDER BY id", &[]).unwrap();
    assert_eq!(
        out.rows,
        vec![
            vec![Value::Integer(1), Value::Text("a".into())],
            vec![Value::Integer(2), Value::Text("b".into())]
        ]
    );
}

#[test]
fn test_multi_sheet_import_in_order() {
    let (db, mut catalog, locks) = setup("");
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        &dir,
        "dump.json",
        indoc! {r#"
            {
              "first": [{"v": 1}],
              "second": [{"v": 2}, {"v": 3}]
            }
        "#},
    );
    let source = SourceFile::open(path).unwrap();

    let mappings = vec![
        SheetMapping::into_new_table("first", "first", vec![ColumnMapping::by_name("v", "v")]),
        SheetMapping::into_new_table("second", "second", vec![ColumnMapping::by_name("v", "v")]),
    ];
    let mut done_tables: Vec<String> = Vec::new();
    let report = ImportEngine::new()
        .run(
            &db,
            &mut catalog,
            &locks,
            &source,
            &mappings,
            &mut |progress| {
                if progress.done {
                    done_tables.push(progress.table.clone().unwrap());
                }
                ImportDecision::Continue
            },
            &CancelToken::new(),
        )
        .unwrap();

    assert_eq!(done_tables, vec!["first", "second"]);
    assert_eq!(report.counts["first"], 1);
    assert_eq!(report.counts["second"], 2);
}

#[test]
fn test_cancellation_rolls_back() {
    let (db, mut catalog, locks) = setup(CHECKED_TABLE);
    let dir = tempfile::tempdir().unwrap();
    let source = checked_csv(&dir);

    let token = CancelToken::new();
    token.cancel();
    let err = ImportEngine::new()
        .run(
            &db,
            &mut catalog,
            &locks,
            &source,
            &[positional_mapping()],
            &mut |_| ImportDecision::Continue,
            &token,
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
    let kept = db.query_value("SELECT COUNT(*) FROM target", &[]).unwrap();
    assert_eq!(kept, Some(Value::Integer(0)));
}

#[test]
fn test_locked_target_aborts_before_touching_database() {
    let (db, mut catalog, locks) = setup(CHECKED_TABLE);
    locks
        .lock(Some(ObjectCategory::Table), Some("target"), "someone-else")
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let source = checked_csv(&dir);

    let err = ImportEngine::new()
        .run(
            &db,
            &mut catalog,
            &locks,
            &source,
            &[positional_mapping()],
            &mut |_| ImportDecision::Continue,
            &CancelToken::new(),
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_, _)));
    let kept = db.query_value("SELECT COUNT(*) FROM target", &[]).unwrap();
    assert_eq!(kept, Some(Value::Integer(0)));
}
