use indoc::indoc;
use litedesk_core::{
    ConstraintKind, ObjectCategory, ObjectMeta, TriggerEvent, TriggerTiming,
};
use pretty_assertions::assert_eq;

use crate::{generate, parse, parse_as};

fn parse_table(sql: &str) -> litedesk_core::TableMeta {
    match parse(sql).unwrap() {
        ObjectMeta::Table(t) => t,
        other => panic!("expected table, got {:?}", other),
    }
}

#[test]
fn test_parse_simple_table() {
    let meta = parse_table("CREATE TABLE t (a INT PRIMARY KEY, b TEXT)");
    assert_eq!(meta.name, "t");
    assert_eq!(meta.column_names(), vec!["a", "b"]);
    assert!(meta.columns[0].primary_key);
    assert_eq!(meta.columns[0].type_name.as_deref(), Some("INT"));
    assert_eq!(meta.columns[1].type_name.as_deref(), Some("TEXT"));
    assert!(!meta.without_rowid);
}

#[test]
fn test_parse_table_full_column_constraints() {
    let meta = parse_table(indoc! {"
        CREATE TABLE orders (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          ref TEXT NOT NULL UNIQUE COLLATE NOCASE,
          qty INT DEFAULT 1 CHECK (qty > 0),
          price DECIMAL(10, 2) DEFAULT (1 + 2),
          created TEXT DEFAULT CURRENT_TIMESTAMP,
          customer_id INT REFERENCES customers (id) ON DELETE CASCADE
        )
    "});
    let id = &meta.columns[0];
    assert!(id.primary_key && id.autoincrement);

    let r = &meta.columns[1];
    assert!(r.not_null && r.unique);
    assert_eq!(r.collate.as_deref(), Some("NOCASE"));

    let qty = &meta.columns[2];
    assert_eq!(qty.default.as_deref(), Some("1"));
    assert_eq!(qty.check.as_deref(), Some("qty > 0"));

    let price = &meta.columns[3];
    assert_eq!(price.type_name.as_deref(), Some("DECIMAL(10, 2)"));
    assert_eq!(price.default.as_deref(), Some("(1 + 2)"));

    assert_eq!(
        meta.columns[4].default.as_deref(),
        Some("CURRENT_TIMESTAMP")
    );

    let fk = meta.columns[5].references.as_ref().unwrap();
    assert_eq!(fk.table, "customers");
    assert_eq!(fk.columns, vec!["id"]);
    assert_eq!(fk.on_delete.as_deref(), Some("CASCADE"));
}

#[test]
fn test_parse_table_level_constraints() {
    let meta = parse_table(indoc! {"
        CREATE TABLE t (
          a INT,
          b INT,
          CONSTRAINT pk PRIMARY KEY (a, b),
          UNIQUE (b),
          CHECK (a < b),
          FOREIGN KEY (b) REFERENCES u (x) ON UPDATE SET NULL
        )
    "});
    assert_eq!(meta.constraints.len(), 4);
    assert_eq!(meta.constraints[0].kind, ConstraintKind::PrimaryKey);
    assert_eq!(meta.constraints[0].name.as_deref(), Some("pk"));
    assert_eq!(meta.constraints[0].columns, vec!["a", "b"]);
    assert_eq!(meta.constraints[2].check_expr.as_deref(), Some("a < b"));
    let fk = meta.constraints[3].foreign_key.as_ref().unwrap();
    assert_eq!(fk.on_update.as_deref(), Some("SET NULL"));
    assert_eq!(meta.primary_key_columns(), vec!["a", "b"]);
}

#[test]
fn test_parse_without_rowid_and_quoted_names() {
    let meta = parse_table(
        "CREATE TABLE \"odd name\" (`k` TEXT PRIMARY KEY, [v] INT) WITHOUT ROWID",
    );
    assert_eq!(meta.name, "odd name");
    assert_eq!(meta.column_names(), vec!["k", "v"]);
    assert!(meta.without_rowid);
}

#[test]
fn test_parse_schema_qualified_and_if_not_exists() {
    let meta = parse_table("CREATE TABLE IF NOT EXISTS main.t (a)");
    assert_eq!(meta.name, "t");
    assert_eq!(meta.columns[0].type_name, None);
}

#[test]
fn test_parse_generated_column() {
    let meta = parse_table(
        "CREATE TABLE t (a INT, b INT GENERATED ALWAYS AS (a * 2) STORED)",
    );
    let generated = meta.columns[1].generated.as_ref().unwrap();
    assert_eq!(generated.expr, "a * 2");
    assert!(generated.stored);
}

#[test]
fn test_parse_index() {
    let ObjectMeta::Index(meta) =
        parse("CREATE UNIQUE INDEX idx ON t (a DESC, b COLLATE NOCASE, c + 1) WHERE c > 0")
            .unwrap()
    else {
        panic!("expected index");
    };
    assert!(meta.unique);
    assert_eq!(meta.table, "t");
    assert_eq!(meta.columns.len(), 3);
    assert!(meta.columns[0].descending);
    assert_eq!(meta.columns[1].collate.as_deref(), Some("NOCASE"));
    assert_eq!(meta.columns[2].expr, "c + 1");
    assert_eq!(meta.where_expr.as_deref(), Some("c > 0"));
}

#[test]
fn test_parse_view() {
    let ObjectMeta::View(meta) =
        parse("CREATE VIEW v (x, y) AS SELECT a, b FROM t WHERE a > 0").unwrap()
    else {
        panic!("expected view");
    };
    assert_eq!(meta.name, "v");
    assert_eq!(meta.columns, vec!["x", "y"]);
    assert_eq!(meta.select, "SELECT a, b FROM t WHERE a > 0");
}

#[test]
fn test_parse_trigger() {
    let ObjectMeta::Trigger(meta) = parse(indoc! {"
        CREATE TRIGGER trg BEFORE UPDATE OF a, b ON t
        FOR EACH ROW WHEN NEW.a > OLD.a
        BEGIN
          UPDATE log SET n = n + 1;
          INSERT INTO audit VALUES (NEW.a, 'x;y');
        END
    "})
    .unwrap() else {
        panic!("expected trigger");
    };
    assert_eq!(meta.name, "trg");
    assert_eq!(meta.timing, TriggerTiming::Before);
    assert_eq!(
        meta.event,
        TriggerEvent::Update(vec!["a".into(), "b".into()])
    );
    assert_eq!(meta.table, "t");
    assert!(meta.for_each_row);
    assert_eq!(meta.when.as_deref(), Some("NEW.a > OLD.a"));
    assert_eq!(meta.body.len(), 2);
    assert_eq!(meta.body[0], "UPDATE log SET n = n + 1");
    assert_eq!(meta.body[1], "INSERT INTO audit VALUES (NEW.a, 'x;y')");
}

#[test]
fn test_parse_as_category_mismatch() {
    let err = parse_as("CREATE TABLE t (a)", ObjectCategory::View).unwrap_err();
    assert!(err.message.contains("expected a CREATE VIEW"));
}

#[test]
fn test_parse_error_carries_position() {
    let err = parse("CREATE TABLE t\n(a INT,)").unwrap_err();
    assert_eq!(err.line, 2);
    assert!(err.column > 1);
}

#[test]
fn test_parse_rejects_trailing_content() {
    let err = parse("CREATE TABLE t (a); SELECT 1").unwrap_err();
    assert!(err.message.contains("unexpected content"));
}

#[test]
fn test_parse_rejects_non_create() {
    assert!(parse("SELECT 1").is_err());
    assert!(parse("CREATE VIRTUAL TABLE t USING fts5(a)").is_err());
}

/// `parse(generate(meta))` must reproduce the tree (up to column ids).
#[test]
fn test_generate_parse_round_trip() {
    let statements = [
        "CREATE TABLE t (a INT PRIMARY KEY AUTOINCREMENT, b TEXT NOT NULL DEFAULT 'x', \
         c REAL DEFAULT (1 + 2) CHECK (c > 0), d BLOB REFERENCES u (id) ON DELETE CASCADE)",
        "CREATE TABLE \"odd name\" (k TEXT, v INT, PRIMARY KEY (k, v), UNIQUE (v)) WITHOUT ROWID",
        "CREATE UNIQUE INDEX idx ON t (a DESC, b COLLATE NOCASE) WHERE a > 0",
        "CREATE VIEW v (x) AS SELECT a FROM t",
        "CREATE TRIGGER trg AFTER DELETE ON t FOR EACH ROW BEGIN DELETE FROM u WHERE u.id = OLD.id; END",
    ];
    for sql in statements {
        let first = parse(sql).unwrap();
        let generated = generate(&first);
        let second = parse(&generated).unwrap();
        assert_eq!(
            strip_ids(first),
            strip_ids(second),
            "round trip failed for: {}",
            sql
        );
    }
}

/// Zero out column ids so trees from independent parses compare equal.
fn strip_ids(mut meta: ObjectMeta) -> ObjectMeta {
    if let ObjectMeta::Table(table) = &mut meta {
        for column in &mut table.columns {
            column.column_id = uuid::Uuid::nil();
        }
    }
    meta
}
