//! Plan orchestration and pre-emission validation

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use litedesk_core::{
    CoreError, ObjectCategory, ObjectMeta, Result, SchemaEntity, ident_eq, ident_key, quote_ident,
};
use litedesk_grammar::{RenameMap, generate, parse, transform};
use litedesk_db::{Database, SchemaCatalog};

use crate::capabilities::EngineCapabilities;
use crate::rebuild::emit_rebuild;
use crate::simple::{diff_tables, emit_simple, qualifies_simple, sanitize};

/// Which path the planner chose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlterStrategy {
    /// In-place ALTER statements.
    Simple,
    /// Rebuild under a temporary name and rename into place.
    Rebuild { temp_name: String },
    /// Drop and recreate (indexes, views, triggers).
    DropCreate,
}

/// Structured description of what the plan does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlterArgs {
    pub category: ObjectCategory,
    pub old_name: String,
    pub new_name: String,
    pub strategy: AlterStrategy,
    /// Renamed columns, old name to new name (tables only).
    pub column_renames: IndexMap<String, String>,
    pub added_columns: Vec<String>,
    pub dropped_columns: Vec<String>,
}

/// The emitted plan: a short script for display, the full transactional
/// script for execution, and the structured argument set.
#[derive(Debug, Clone)]
pub struct AlterPlan {
    pub short_sql: Vec<String>,
    pub full_sql: Vec<String>,
    pub args: AlterArgs,
}

impl AlterPlan {
    pub fn short_script(&self) -> String {
        self.short_sql.join(";\n")
    }

    pub fn full_script(&self) -> String {
        self.full_sql.join(";\n")
    }
}

/// The schema change planner.
pub struct Planner<'a> {
    catalog: &'a SchemaCatalog,
    caps: EngineCapabilities,
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a SchemaCatalog, caps: EngineCapabilities) -> Self {
        Self { catalog, caps }
    }

    /// Produce the statement plan turning `original` into `edited`.
    pub fn plan(&self, original: &SchemaEntity, edited: &ObjectMeta) -> Result<AlterPlan> {
        if original.category != edited.category() {
            return Err(CoreError::Validation(format!(
                "cannot turn a {} into a {}",
                original.category,
                edited.category()
            )));
        }
        self.validate(original, edited)?;

        let plan = match edited {
            ObjectMeta::Table(edited_table) => {
                let original_meta = original.table_meta().ok_or_else(|| {
                    CoreError::Validation(format!(
                        "the stored statement of table {} did not parse; it can only be edited as raw SQL",
                        original.name
                    ))
                })?;
                let diff = diff_tables(original_meta, edited_table);
                if qualifies_simple(self.catalog, &self.caps, original_meta, edited_table, &diff) {
                    tracing::info!(table = %original.name, "planning simple in-place ALTER");
                    let (short_sql, full_sql) =
                        emit_simple(self.catalog, original_meta, edited_table, &diff);
                    AlterPlan {
                        short_sql,
                        full_sql,
                        args: AlterArgs {
                            category: ObjectCategory::Table,
                            old_name: original.name.clone(),
                            new_name: edited_table.name.clone(),
                            strategy: AlterStrategy::Simple,
                            column_renames: diff.renames.clone(),
                            added_columns: diff.added.iter().map(|c| c.name.clone()).collect(),
                            dropped_columns: diff.dropped.clone(),
                        },
                    }
                } else {
                    tracing::info!(table = %original.name, "planning table rebuild");
                    let (short_sql, full_sql, temp_name) = emit_rebuild(
                        self.catalog,
                        &self.caps,
                        original_meta,
                        edited_table,
                        &diff,
                    );
                    AlterPlan {
                        short_sql,
                        full_sql,
                        args: AlterArgs {
                            category: ObjectCategory::Table,
                            old_name: original.name.clone(),
                            new_name: edited_table.name.clone(),
                            strategy: AlterStrategy::Rebuild { temp_name },
                            column_renames: diff.renames.clone(),
                            added_columns: diff.added.iter().map(|c| c.name.clone()).collect(),
                            dropped_columns: diff.dropped.clone(),
                        },
                    }
                }
            }
            _ => self.plan_drop_create(original, edited)?,
        };
        Ok(plan)
    }

    /// Indexes, views and triggers have no in-place ALTER: drop and
    /// recreate inside a savepoint. Renaming a view additionally
    /// rewrites every dependent view and trigger.
    fn plan_drop_create(&self, original: &SchemaEntity, edited: &ObjectMeta) -> Result<AlterPlan> {
        let category = original.category;
        let new_name = edited.name().to_string();
        let mut statements = vec![
            format!(
                "DROP {} {}",
                category.as_sql_keyword(),
                quote_ident(&original.name)
            ),
            generate(edited),
        ];

        if category == ObjectCategory::View {
            let map = view_rename_map(original, edited);
            if !map.is_empty() {
                for entities in self
                    .catalog
                    .get_related(ObjectCategory::View, &original.name, false)
                    .values()
                {
                    for entity in entities {
                        let rewritten =
                            transform(&entity.sql, &map).unwrap_or_else(|_| entity.sql.clone());
                        statements.push(format!(
                            "DROP {} {}",
                            entity.category.as_sql_keyword(),
                            quote_ident(&entity.name)
                        ));
                        statements.push(rewritten);
                    }
                }
            }
        }

        let short = statements.clone();
        let savepoint = format!("litedesk_alter_{}", sanitize(&original.name));
        let mut full = vec![format!("SAVEPOINT \"{}\"", savepoint)];
        full.extend(statements);
        full.push(format!("RELEASE SAVEPOINT \"{}\"", savepoint));

        Ok(AlterPlan {
            short_sql: short,
            full_sql: full,
            args: AlterArgs {
                category,
                old_name: original.name.clone(),
                new_name,
                strategy: AlterStrategy::DropCreate,
                column_renames: IndexMap::new(),
                added_columns: Vec::new(),
                dropped_columns: Vec::new(),
            },
        })
    }

    /// Structural validation, always before any statement is emitted.
    fn validate(&self, original: &SchemaEntity, edited: &ObjectMeta) -> Result<()> {
        // Name and category-appropriate children.
        if edited.name().trim().is_empty() {
            return Err(CoreError::Validation("name must not be empty".into()));
        }
        match edited {
            ObjectMeta::Table(table) => {
                if table.columns.is_empty() {
                    return Err(CoreError::Validation(format!(
                        "table {} needs at least one column",
                        table.name
                    )));
                }
                let mut seen = Vec::new();
                for column in &table.columns {
                    if column.name.trim().is_empty() {
                        return Err(CoreError::Validation(format!(
                            "table {} has a column without a name",
                            table.name
                        )));
                    }
                    let key = ident_key(&column.name);
                    if seen.contains(&key) {
                        return Err(CoreError::Validation(format!(
                            "duplicate column name: {}",
                            column.name
                        )));
                    }
                    seen.push(key);
                }
            }
            ObjectMeta::Index(index) => {
                if index.table.trim().is_empty() || index.columns.is_empty() {
                    return Err(CoreError::Validation(format!(
                        "index {} needs a target table and columns",
                        index.name
                    )));
                }
            }
            ObjectMeta::Trigger(trigger) => {
                if trigger.table.trim().is_empty() {
                    return Err(CoreError::Validation(format!(
                        "trigger {} needs a target",
                        trigger.name
                    )));
                }
                if trigger.body.is_empty() {
                    return Err(CoreError::Validation(format!(
                        "trigger {} needs a body",
                        trigger.name
                    )));
                }
            }
            ObjectMeta::View(view) => {
                if view.select.trim().is_empty() {
                    return Err(CoreError::Validation(format!(
                        "view {} needs a select",
                        view.name
                    )));
                }
            }
        }

        // A new name must not collide with any existing object.
        if !ident_eq(&original.name, edited.name()) && self.catalog.name_taken(edited.name()) {
            return Err(CoreError::Validation(format!(
                "an object named {} already exists",
                edited.name()
            )));
        }

        // Dropped columns must not be referenced by surviving objects.
        if let (Some(original_meta), ObjectMeta::Table(edited_table)) =
            (original.table_meta(), edited)
        {
            let diff = diff_tables(original_meta, edited_table);
            if !diff.dropped.is_empty() {
                let dependents = self
                    .catalog
                    .get_column_dependents(&original.name, &diff.dropped);
                let mut offenders: Vec<String> = Vec::new();
                for (category, names) in &dependents {
                    for name in names {
                        offenders.push(format!("{} {}", category, name));
                    }
                }
                if !offenders.is_empty() {
                    return Err(CoreError::validation_list(
                        format!(
                            "columns {} are still referenced by",
                            diff.dropped.join(", ")
                        ),
                        &offenders,
                    ));
                }
            }
        }

        // The generated statement must round-trip through the parser.
        let sql = generate(edited);
        parse(&sql).map_err(|e| {
            CoreError::Validation(format!("generated SQL does not parse: {} ({})", e, sql))
        })?;
        Ok(())
    }

    /// Run a plan inside a savepoint and roll it back, reporting the
    /// first error if any.
    pub fn test(&self, db: &Database, plan: &AlterPlan) -> Result<()> {
        const SAVEPOINT: &str = "litedesk_plan_test";
        tracing::debug!(object = %plan.args.old_name, "test-running plan");
        db.savepoint(SAVEPOINT)?;
        let result = db.execute_script(&plan.full_script());
        let _ = db.rollback_to(SAVEPOINT);
        let _ = db.release(SAVEPOINT);
        result
    }
}

/// Rename map for a view edit: the view name plus positionally renamed
/// explicit columns.
fn view_rename_map(original: &SchemaEntity, edited: &ObjectMeta) -> RenameMap {
    let mut map = RenameMap::new();
    if !ident_eq(&original.name, edited.name()) {
        map.rename_table(&original.name, edited.name().to_string());
    }
    if let (Some(ObjectMeta::View(old_view)), ObjectMeta::View(new_view)) =
        (&original.meta, edited)
    {
        if old_view.columns.len() == new_view.columns.len() {
            for (old, new) in old_view.columns.iter().zip(&new_view.columns) {
                if !ident_eq(old, new) {
                    map.rename_column(&original.name, old, new.clone());
                }
            }
        }
    }
    map
}
