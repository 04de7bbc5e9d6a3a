//! Rebuild-and-rename emission
//!
//! When an edit cannot be expressed in place, the table is recreated
//! under a temporary name, data is copied across by column identity,
//! and every dependent object is dropped up front and recreated with
//! rename-transformed SQL, all inside one savepoint.

use litedesk_core::{ObjectCategory, ObjectMeta, SchemaEntity, TableMeta, ident_eq, quote_ident};
use litedesk_grammar::{generate, transform};
use litedesk_db::SchemaCatalog;

use crate::capabilities::EngineCapabilities;
use crate::simple::{TableDiff, dependent_rename_map, sanitize};

/// Dependents of the table being rebuilt, split by recreation order.
struct Dependents {
    indexes: Vec<SchemaEntity>,
    views: Vec<SchemaEntity>,
    table_triggers: Vec<SchemaEntity>,
    view_triggers: Vec<SchemaEntity>,
}

fn collect_dependents(catalog: &SchemaCatalog, table: &str) -> Dependents {
    let related = catalog.get_related(ObjectCategory::Table, table, false);
    let views: Vec<SchemaEntity> = related
        .get(&ObjectCategory::View)
        .cloned()
        .unwrap_or_default();
    let mut table_triggers = Vec::new();
    let mut view_triggers = Vec::new();
    for trigger in related
        .get(&ObjectCategory::Trigger)
        .cloned()
        .unwrap_or_default()
    {
        let on_view = match &trigger.meta {
            Some(ObjectMeta::Trigger(meta)) => {
                views.iter().any(|v| ident_eq(&v.name, &meta.table))
            }
            _ => false,
        };
        if on_view {
            view_triggers.push(trigger);
        } else {
            table_triggers.push(trigger);
        }
    }
    Dependents {
        indexes: related
            .get(&ObjectCategory::Index)
            .cloned()
            .unwrap_or_default(),
        views,
        table_triggers,
        view_triggers,
    }
}

/// Emit the full rebuild script. Returns `(short, full, temp_name)`.
pub(crate) fn emit_rebuild(
    catalog: &SchemaCatalog,
    caps: &EngineCapabilities,
    original: &TableMeta,
    edited: &TableMeta,
    diff: &TableDiff,
) -> (Vec<String>, Vec<String>, String) {
    let temp_name = catalog.uniquify_name(&format!("{}_tmp", original.name));
    let dependents = collect_dependents(catalog, &original.name);
    let map = dependent_rename_map(original, edited, diff);

    let mut statements = Vec::new();

    // Dependent triggers and views go first; indexes die with the table.
    for trigger in dependents
        .view_triggers
        .iter()
        .chain(&dependents.table_triggers)
    {
        statements.push(format!("DROP TRIGGER {}", quote_ident(&trigger.name)));
    }
    for view in dependents.views.iter().rev() {
        statements.push(format!("DROP VIEW {}", quote_ident(&view.name)));
    }

    let mut temp_meta = edited.clone();
    temp_meta.name = temp_name.clone();
    statements.push(generate(&ObjectMeta::Table(temp_meta)));

    // Copy rows across, matching columns by identity: dropped columns
    // are omitted, added columns take their defaults.
    let mut insert_cols = Vec::new();
    let mut select_cols = Vec::new();
    for column in &edited.columns {
        if let Some(previous) = original.column_by_id(column.column_id) {
            insert_cols.push(quote_ident(&column.name));
            select_cols.push(quote_ident(&previous.name));
        }
    }
    if !insert_cols.is_empty() {
        statements.push(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_ident(&temp_name),
            insert_cols.join(", "),
            select_cols.join(", "),
            quote_ident(&original.name)
        ));
    }

    statements.push(format!("DROP TABLE {}", quote_ident(&original.name)));
    statements.push(format!(
        "ALTER TABLE {} RENAME TO {}",
        quote_ident(&temp_name),
        quote_ident(&edited.name)
    ));

    // Recreate dependents in dependency order: indexes, views, table
    // triggers, then triggers of views.
    for entity in dependents
        .indexes
        .iter()
        .chain(&dependents.views)
        .chain(&dependents.table_triggers)
        .chain(&dependents.view_triggers)
    {
        let recreated = transform(&entity.sql, &map).unwrap_or_else(|_| entity.sql.clone());
        statements.push(recreated);
    }

    let short = statements.clone();

    let savepoint = format!("litedesk_alter_{}", sanitize(&original.name));
    let restored_fk = if caps.foreign_keys_enabled { "ON" } else { "OFF" };
    let mut full = vec![
        format!("SAVEPOINT \"{}\"", savepoint),
        "PRAGMA foreign_keys = OFF".to_string(),
    ];
    full.extend(statements);
    full.push(format!("PRAGMA foreign_keys = {}", restored_fk));
    full.push(format!("RELEASE SAVEPOINT \"{}\"", savepoint));

    (short, full, temp_name)
}
