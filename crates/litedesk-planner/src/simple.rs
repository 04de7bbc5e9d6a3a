//! Simple-path decision and emission
//!
//! A table edit qualifies for in-place ALTER statements only when it is
//! nothing but column renames and trailing column additions (plus an
//! optional table rename). Everything else goes through the rebuild
//! path. The decision diffs columns by their stable ids, and catches
//! "anything else changed" by comparing both statements with every
//! column name replaced by its id.

use indexmap::IndexMap;
use uuid::Uuid;

use litedesk_core::{ColumnDef, ObjectCategory, ObjectMeta, TableMeta, ident_eq, quote_ident};
use litedesk_grammar::{RenameMap, canonical_sql, column_def_sql, generate, transform};
use litedesk_db::SchemaCatalog;

use crate::capabilities::EngineCapabilities;

/// Column-level difference between original and edited table metadata.
#[derive(Debug, Default)]
pub(crate) struct TableDiff {
    /// Renamed columns, original name to new name.
    pub renames: IndexMap<String, String>,
    /// Columns present only in the edited meta.
    pub added: Vec<ColumnDef>,
    /// Original column names no longer present.
    pub dropped: Vec<String>,
    pub table_renamed: bool,
}

pub(crate) fn diff_tables(original: &TableMeta, edited: &TableMeta) -> TableDiff {
    let original_ids: IndexMap<Uuid, &ColumnDef> =
        original.columns.iter().map(|c| (c.column_id, c)).collect();
    let edited_ids: Vec<Uuid> = edited.columns.iter().map(|c| c.column_id).collect();

    let mut diff = TableDiff {
        table_renamed: !ident_eq(&original.name, &edited.name),
        ..TableDiff::default()
    };
    for column in &edited.columns {
        match original_ids.get(&column.column_id) {
            Some(previous) if !ident_eq(&previous.name, &column.name) => {
                diff.renames
                    .insert(previous.name.clone(), column.name.clone());
            }
            Some(_) => {}
            None => diff.added.push(column.clone()),
        }
    }
    for column in &original.columns {
        if !edited_ids.contains(&column.column_id) {
            diff.dropped.push(column.name.clone());
        }
    }
    diff
}

/// Defaults that ADD COLUMN cannot carry.
const DYNAMIC_DEFAULTS: &[&str] = &["CURRENT_TIME", "CURRENT_DATE", "CURRENT_TIMESTAMP"];

/// The simple-vs-complex decision.
pub(crate) fn qualifies_simple(
    catalog: &SchemaCatalog,
    caps: &EngineCapabilities,
    original: &TableMeta,
    edited: &TableMeta,
    diff: &TableDiff,
) -> bool {
    // Rowid-ness cannot change in place.
    if original.without_rowid != edited.without_rowid {
        return false;
    }
    // No column deletions.
    if !diff.dropped.is_empty() {
        return false;
    }
    // Table-level constraints cannot be added, removed or reordered.
    if original.constraints.len() != edited.constraints.len()
        || original
            .constraints
            .iter()
            .zip(&edited.constraints)
            .any(|(a, b)| a.kind != b.kind)
    {
        return false;
    }
    // Renaming columns needs engine support.
    if !diff.renames.is_empty() && !caps.rename_column {
        return false;
    }
    // Surviving columns keep their order; additions go at the end.
    let surviving: Vec<Uuid> = edited
        .columns
        .iter()
        .map(|c| c.column_id)
        .filter(|id| original.column_by_id(*id).is_some())
        .collect();
    if surviving != original.columns.iter().map(|c| c.column_id).collect::<Vec<_>>() {
        return false;
    }
    let surviving_len = surviving.len();
    if edited.columns[..surviving_len]
        .iter()
        .any(|c| original.column_by_id(c.column_id).is_none())
    {
        return false;
    }
    // Added columns must be expressible as ADD COLUMN.
    for column in &diff.added {
        if !addable(column, caps) {
            return false;
        }
    }
    // A table rename must either fix up references itself, or have no
    // references to fix.
    if diff.table_renamed && !caps.full_rename_table {
        let related = catalog.get_related(ObjectCategory::Table, &original.name, false);
        let referenced_elsewhere = !related.is_empty()
            || catalog.iter().any(|e| {
                !ident_eq(&e.name, &original.name)
                    && e.category == ObjectCategory::Table
                    && litedesk_grammar::Lexer::tokenize(&e.sql0)
                        .map(|tokens| {
                            tokens
                                .iter()
                                .filter(|t| t.kind.is_name())
                                .any(|t| ident_eq(&t.ident_text(&e.sql0), &original.name))
                        })
                        .unwrap_or(true)
            });
        if referenced_elsewhere {
            return false;
        }
    }
    // Beyond renames and trailing additions, nothing may differ: compare
    // both statements with column names replaced by their ids.
    let mut stripped = edited.clone();
    stripped
        .columns
        .retain(|c| original.column_by_id(c.column_id).is_some());
    id_substituted_sql(original) == id_substituted_sql(&stripped)
}

fn addable(column: &ColumnDef, caps: &EngineCapabilities) -> bool {
    if column.primary_key || column.unique {
        return false;
    }
    if let Some(default) = &column.default {
        let upper = default.trim().to_ascii_uppercase();
        if DYNAMIC_DEFAULTS.contains(&upper.as_str()) || upper.starts_with('(') {
            return false;
        }
        if column.not_null && upper == "NULL" {
            return false;
        }
    } else if column.not_null {
        return false;
    }
    if column.references.is_some() && caps.foreign_keys_enabled {
        let default_is_null = column
            .default
            .as_deref()
            .map(|d| d.trim().eq_ignore_ascii_case("NULL"))
            .unwrap_or(true);
        if !default_is_null {
            return false;
        }
    }
    true
}

/// Canonical text of the table statement with its own name and every
/// column name replaced by stable tokens, so two metas compare equal
/// exactly when only names differ.
fn id_substituted_sql(meta: &TableMeta) -> String {
    let mut map = RenameMap::new();
    map.rename_table(&meta.name, "self_");
    for column in &meta.columns {
        map.rename_column(
            &meta.name,
            &column.name,
            format!("c_{}", column.column_id.simple()),
        );
    }
    let sql = generate(&ObjectMeta::Table(meta.clone()));
    match transform(&sql, &map) {
        Ok(substituted) => canonical_sql(&substituted),
        Err(_) => canonical_sql(&sql),
    }
}

/// The rename map a dependent statement must be rewritten under.
pub(crate) fn dependent_rename_map(original: &TableMeta, edited: &TableMeta, diff: &TableDiff) -> RenameMap {
    let mut map = RenameMap::new();
    if diff.table_renamed {
        map.rename_table(&original.name, edited.name.clone());
    }
    for (old, new) in &diff.renames {
        map.rename_column(&original.name, old, new.clone());
    }
    map
}

/// Emit the in-place statement sequence: RENAME COLUMN, ADD COLUMN,
/// RENAME TO, then an `UPDATE sqlite_master` rewrite for every dependent
/// whose SQL the rename map touches.
pub(crate) fn emit_simple(
    catalog: &SchemaCatalog,
    original: &TableMeta,
    edited: &TableMeta,
    diff: &TableDiff,
) -> (Vec<String>, Vec<String>) {
    let table = quote_ident(&original.name);
    let mut statements = Vec::new();

    for (old, new) in &diff.renames {
        statements.push(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            table,
            quote_ident(old),
            quote_ident(new)
        ));
    }
    for column in &diff.added {
        statements.push(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            table,
            column_def_sql(column)
        ));
    }
    if diff.table_renamed {
        statements.push(format!(
            "ALTER TABLE {} RENAME TO {}",
            table,
            quote_ident(&edited.name)
        ));
    }

    let map = dependent_rename_map(original, edited, diff);
    let mut rewrites = Vec::new();
    if !map.is_empty() {
        for entities in catalog
            .get_related(ObjectCategory::Table, &original.name, false)
            .values()
        {
            for entity in entities {
                let Ok(new_sql) = transform(&entity.sql, &map) else {
                    continue;
                };
                if canonical_sql(&new_sql) != entity.sql0 {
                    rewrites.push(format!(
                        "UPDATE sqlite_master SET sql = '{}' WHERE type = '{}' AND name = '{}'",
                        new_sql.replace('\'', "''"),
                        entity.category,
                        entity.name.replace('\'', "''")
                    ));
                }
            }
        }
    }

    let mut short = statements.clone();
    short.extend(rewrites.iter().cloned());

    let savepoint = format!("litedesk_alter_{}", sanitize(&original.name));
    let mut full = vec![format!("SAVEPOINT \"{}\"", savepoint)];
    full.extend(statements);
    if !rewrites.is_empty() {
        full.push("PRAGMA writable_schema = ON".to_string());
        full.extend(rewrites);
        full.push("PRAGMA writable_schema = OFF".to_string());
    }
    full.push(format!("RELEASE SAVEPOINT \"{}\"", savepoint));
    (short, full)
}

pub(crate) fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
