//! Schema entity model
//!
//! In-memory reflection of database objects: category, name, raw SQL and
//! the parsed statement tree. Column and constraint nodes carry a stable
//! identity assigned at parse time so that edits can be diffed against
//! the original structurally instead of textually.

use crate::{Affinity, ParseError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a schema object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectCategory {
    Table,
    Index,
    View,
    Trigger,
}

impl ObjectCategory {
    /// Parse the `type` column of `sqlite_master` (case-insensitive).
    pub fn from_sqlite_type(s: &str) -> Option<ObjectCategory> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Some(ObjectCategory::Table),
            "index" => Some(ObjectCategory::Index),
            "view" => Some(ObjectCategory::View),
            "trigger" => Some(ObjectCategory::Trigger),
            _ => None,
        }
    }

    /// The keyword used in CREATE/DROP statements.
    pub fn as_sql_keyword(&self) -> &'static str {
        match self {
            ObjectCategory::Table => "TABLE",
            ObjectCategory::Index => "INDEX",
            ObjectCategory::View => "VIEW",
            ObjectCategory::Trigger => "TRIGGER",
        }
    }

    pub fn all() -> [ObjectCategory; 4] {
        [
            ObjectCategory::Table,
            ObjectCategory::Index,
            ObjectCategory::View,
            ObjectCategory::Trigger,
        ]
    }
}

impl std::fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObjectCategory::Table => "table",
            ObjectCategory::Index => "index",
            ObjectCategory::View => "view",
            ObjectCategory::Trigger => "trigger",
        };
        write!(f, "{}", s)
    }
}

/// Case-insensitive ASCII identifier equality.
///
/// Every identifier lookup and collision check in the workspace goes
/// through this (or `ident_key`), never through `==`.
pub fn ident_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Lowercased lookup key for an identifier.
pub fn ident_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Words that force quoting even when the identifier is otherwise bare.
const QUOTED_KEYWORDS: &[&str] = &[
    "add", "all", "alter", "and", "as", "asc", "autoincrement", "between", "case", "check",
    "collate", "column", "commit", "constraint", "create", "default", "delete", "desc", "distinct",
    "drop", "else", "end", "exists", "foreign", "from", "group", "having", "in", "index", "insert",
    "into", "is", "join", "key", "limit", "not", "null", "on", "or", "order", "pragma", "primary",
    "references", "rollback", "select", "set", "table", "then", "to", "transaction", "trigger",
    "union", "unique", "update", "values", "view", "when", "where",
];

/// Double-quote an identifier iff it is not a bare word.
pub fn quote_ident(name: &str) -> String {
    let bare = !name.is_empty()
        && name
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
        && !QUOTED_KEYWORDS.contains(&ident_key(name).as_str());
    if bare {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// A schema object as held by the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEntity {
    /// Stable id; survives repopulation while the same object persists.
    pub id: Uuid,
    pub category: ObjectCategory,
    pub name: String,
    /// The CREATE statement exactly as stored in `sqlite_master`.
    pub sql: String,
    /// Canonical normalized form of `sql`, used for diffing.
    pub sql0: String,
    /// Parsed tree; absent when the statement failed to parse.
    pub meta: Option<ObjectMeta>,
    /// Why parsing failed, when it did.
    pub parse_error: Option<ParseError>,
    /// Collected statistics (tables only).
    pub stats: Option<TableStatistics>,
}

impl SchemaEntity {
    pub fn table_meta(&self) -> Option<&TableMeta> {
        match &self.meta {
            Some(ObjectMeta::Table(t)) => Some(t),
            _ => None,
        }
    }
}

/// Parsed form of an entity's CREATE statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectMeta {
    Table(TableMeta),
    Index(IndexMeta),
    View(ViewMeta),
    Trigger(TriggerMeta),
}

impl ObjectMeta {
    pub fn category(&self) -> ObjectCategory {
        match self {
            ObjectMeta::Table(_) => ObjectCategory::Table,
            ObjectMeta::Index(_) => ObjectCategory::Index,
            ObjectMeta::View(_) => ObjectCategory::View,
            ObjectMeta::Trigger(_) => ObjectCategory::Trigger,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ObjectMeta::Table(t) => &t.name,
            ObjectMeta::Index(i) => &i.name,
            ObjectMeta::View(v) => &v.name,
            ObjectMeta::Trigger(t) => &t.name,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        match self {
            ObjectMeta::Table(t) => t.name = name,
            ObjectMeta::Index(i) => i.name = name,
            ObjectMeta::View(v) => v.name = name,
            ObjectMeta::Trigger(t) => t.name = name,
        }
    }
}

/// Parsed CREATE TABLE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<TableConstraint>,
    pub without_rowid: bool,
}

impl TableMeta {
    /// Find a column by name, case-insensitively.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| ident_eq(&c.name, name))
    }

    /// Find a column by its stable id.
    pub fn column_by_id(&self, id: Uuid) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.column_id == id)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Primary key columns, in key order: a table-level PRIMARY KEY
    /// constraint wins, otherwise the column-level flags in column order.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        for constraint in &self.constraints {
            if constraint.kind == ConstraintKind::PrimaryKey {
                return constraint.columns.iter().map(|c| c.as_str()).collect();
            }
        }
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Every foreign key, column-level clauses first.
    pub fn foreign_keys(&self) -> Vec<&ForeignKeyClause> {
        let mut keys: Vec<&ForeignKeyClause> = self
            .columns
            .iter()
            .filter_map(|c| c.references.as_ref())
            .collect();
        keys.extend(
            self.constraints
                .iter()
                .filter_map(|c| c.foreign_key.as_ref()),
        );
        keys
    }

    /// The single INTEGER PRIMARY KEY column (the rowid alias), if the
    /// table has exactly one such key. Used for insert rowid write-back.
    pub fn single_integer_pk(&self) -> Option<&ColumnDef> {
        let pks = self.primary_key_columns();
        if pks.len() != 1 {
            return None;
        }
        let col = self.column(pks[0])?;
        (Affinity::of_declared_type(col.type_name.as_deref()) == Affinity::Integer).then_some(col)
    }

    pub fn has_autoincrement(&self) -> bool {
        self.columns.iter().any(|c| c.autoincrement)
    }

    /// Whether any column declares a DEFAULT expression.
    pub fn has_defaults(&self) -> bool {
        self.columns.iter().any(|c| c.default.is_some())
    }
}

/// A column definition inside a CREATE TABLE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Stable identity assigned at parse time, preserved across edits.
    pub column_id: Uuid,
    pub name: String,
    /// Declared type, verbatim (SQLite accepts anything here).
    pub type_name: Option<String>,
    pub not_null: bool,
    pub primary_key: bool,
    /// PK sort direction, only meaningful with `primary_key`.
    pub pk_descending: bool,
    pub autoincrement: bool,
    pub unique: bool,
    /// DEFAULT expression, verbatim.
    pub default: Option<String>,
    pub collate: Option<String>,
    /// CHECK expression, verbatim.
    pub check: Option<String>,
    pub references: Option<ForeignKeyClause>,
    /// GENERATED ALWAYS AS expression, verbatim.
    pub generated: Option<GeneratedColumn>,
}

/// Computed column clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedColumn {
    pub expr: String,
    pub stored: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            column_id: Uuid::new_v4(),
            name: name.into(),
            type_name: None,
            not_null: false,
            primary_key: false,
            pk_descending: false,
            autoincrement: false,
            unique: false,
            default: None,
            collate: None,
            check: None,
            references: None,
            generated: None,
        }
    }

    /// Builder: set declared type
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Builder: set as primary key
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Builder: set as not null
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Builder: set default expression
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn affinity(&self) -> Affinity {
        Affinity::of_declared_type(self.type_name.as_deref())
    }
}

/// Kind of a table-level constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    Check,
}

/// A table-level constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConstraint {
    pub kind: ConstraintKind,
    pub name: Option<String>,
    /// Key columns for PRIMARY KEY / UNIQUE / FOREIGN KEY.
    pub columns: Vec<String>,
    /// Expression for CHECK, verbatim.
    pub check_expr: Option<String>,
    pub foreign_key: Option<ForeignKeyClause>,
    /// ON CONFLICT clause, verbatim (e.g. `REPLACE`).
    pub conflict_clause: Option<String>,
}

/// REFERENCES clause, at column or table level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyClause {
    pub table: String,
    pub columns: Vec<String>,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
    pub deferred: bool,
}

/// Parsed CREATE INDEX
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IndexMeta {
    pub name: String,
    pub table: String,
    pub unique: bool,
    pub columns: Vec<IndexedColumn>,
    /// Partial-index WHERE expression, verbatim.
    pub where_expr: Option<String>,
}

/// One indexed column or expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedColumn {
    /// Column name or expression, verbatim.
    pub expr: String,
    pub descending: bool,
    pub collate: Option<String>,
}

/// Parsed CREATE VIEW
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ViewMeta {
    pub name: String,
    /// Explicit column list, empty when the view takes its columns
    /// from the select.
    pub columns: Vec<String>,
    /// The SELECT body, verbatim.
    pub select: String,
}

/// Trigger firing time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TriggerTiming {
    Before,
    #[default]
    After,
    InsteadOf,
}

/// Trigger firing event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TriggerEvent {
    Insert,
    Delete,
    /// UPDATE, optionally restricted to columns.
    Update(Vec<String>),
}

impl Default for TriggerEvent {
    fn default() -> Self {
        TriggerEvent::Insert
    }
}

/// Parsed CREATE TRIGGER
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TriggerMeta {
    pub name: String,
    /// The table (or view, for INSTEAD OF) the trigger is on.
    pub table: String,
    pub timing: TriggerTiming,
    pub event: TriggerEvent,
    pub for_each_row: bool,
    /// WHEN expression, verbatim.
    pub when: Option<String>,
    /// Body statements between BEGIN and END, verbatim.
    pub body: Vec<String>,
}

/// Row count and size statistics for a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TableStatistics {
    pub row_count: u64,
    pub total_bytes: Option<u64>,
    /// True when `row_count` came from `sqlite_stat1` rather than COUNT(*).
    pub is_count_estimated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_eq_is_ascii_case_insensitive() {
        assert!(ident_eq("Users", "USERS"));
        assert!(!ident_eq("users", "user"));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "users");
        assert_eq!(quote_ident("user name"), "\"user name\"");
        assert_eq!(quote_ident("select"), "\"select\"");
        assert_eq!(quote_ident("2nd"), "\"2nd\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_primary_key_columns_table_level_wins() {
        let mut meta = TableMeta {
            name: "t".into(),
            columns: vec![ColumnDef::new("a").primary_key(), ColumnDef::new("b")],
            constraints: vec![],
            without_rowid: false,
        };
        assert_eq!(meta.primary_key_columns(), vec!["a"]);

        meta.constraints.push(TableConstraint {
            kind: ConstraintKind::PrimaryKey,
            name: None,
            columns: vec!["b".into(), "a".into()],
            check_expr: None,
            foreign_key: None,
            conflict_clause: None,
        });
        assert_eq!(meta.primary_key_columns(), vec!["b", "a"]);
    }

    #[test]
    fn test_single_integer_pk() {
        let meta = TableMeta {
            name: "t".into(),
            columns: vec![
                ColumnDef::new("id").with_type("INTEGER").primary_key(),
                ColumnDef::new("v").with_type("TEXT"),
            ],
            constraints: vec![],
            without_rowid: false,
        };
        assert_eq!(meta.single_integer_pk().map(|c| c.name.as_str()), Some("id"));

        let text_pk = TableMeta {
            name: "t".into(),
            columns: vec![ColumnDef::new("id").with_type("TEXT").primary_key()],
            constraints: vec![],
            without_rowid: false,
        };
        assert!(text_pk.single_integer_pk().is_none());
    }
}
