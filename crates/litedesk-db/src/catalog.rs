//! Schema catalog
//!
//! In-memory reflection of every database object, refreshed from
//! `sqlite_master`. Entities keep a stable id across repopulation while
//! the same object persists; an object that was dropped and re-created
//! comes back under a fresh id.

use indexmap::IndexMap;
use uuid::Uuid;

use litedesk_core::{
    CoreError, ForeignKeyClause, ObjectCategory, ObjectMeta, Result, SchemaEntity,
    TableStatistics, Value, ident_eq, ident_key,
};
use litedesk_grammar::{Lexer, canonical_sql, parse};

use crate::connection::Database;

/// Row-count size above which the catalog reports the `sqlite_stat1`
/// estimate instead of running an exact COUNT(*).
const ESTIMATE_THRESHOLD: u64 = 1_000_000;

/// Related entities grouped by category.
pub type RelatedEntities = IndexMap<ObjectCategory, Vec<SchemaEntity>>;

/// Replacement SQL per category and object name, for direct
/// `sqlite_master` rewrites.
pub type SqlRewrites = IndexMap<ObjectCategory, IndexMap<String, String>>;

/// The schema catalog
#[derive(Default)]
pub struct SchemaCatalog {
    entities: IndexMap<(ObjectCategory, String), SchemaEntity>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload from `sqlite_master`.
    ///
    /// With `category`/`name` given only the matching subset is
    /// refreshed (and removed when gone from the database). `parse`
    /// re-parses statement trees, `count` collects table statistics.
    pub fn populate(
        &mut self,
        db: &Database,
        category: Option<ObjectCategory>,
        name: Option<&str>,
        parse_meta: bool,
        count: bool,
    ) -> Result<()> {
        tracing::debug!(?category, ?name, parse_meta, count, "populating schema catalog");
        let mut sql = String::from(
            "SELECT type, name, sql FROM sqlite_master \
             WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'",
        );
        let mut params: Vec<Value> = Vec::new();
        if let Some(category) = category {
            sql.push_str(" AND LOWER(type) = ?1");
            params.push(Value::Text(category.to_string()));
        }
        if let Some(name) = name {
            sql.push_str(&format!(" AND name = ?{} COLLATE NOCASE", params.len() + 1));
            params.push(Value::Text(name.to_string()));
        }
        let output = db.query(&sql, &params)?;

        let mut fresh: IndexMap<(ObjectCategory, String), SchemaEntity> = IndexMap::new();
        for row in output.rows {
            let (Some(type_text), Some(obj_name), Some(obj_sql)) = (
                row.first().and_then(|v| v.as_str()),
                row.get(1).and_then(|v| v.as_str()),
                row.get(2).and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            let Some(obj_category) = ObjectCategory::from_sqlite_type(type_text) else {
                continue;
            };
            let key = (obj_category, ident_key(obj_name));

            let previous = self.entities.get(&key);
            let id = previous.map(|e| e.id).unwrap_or_else(Uuid::new_v4);

            let (meta, parse_error) = if parse_meta {
                match parse(obj_sql) {
                    Ok(meta) => (Some(meta), None),
                    Err(e) => {
                        tracing::warn!(name = %obj_name, error = %e, "statement did not parse");
                        (None, Some(e))
                    }
                }
            } else {
                (
                    previous.and_then(|e| e.meta.clone()),
                    previous.and_then(|e| e.parse_error.clone()),
                )
            };

            let stats = if count && obj_category == ObjectCategory::Table {
                Some(collect_statistics(db, obj_name))
            } else {
                previous.and_then(|e| e.stats.clone())
            };

            fresh.insert(
                key,
                SchemaEntity {
                    id,
                    category: obj_category,
                    name: obj_name.to_string(),
                    sql: obj_sql.to_string(),
                    sql0: canonical_sql(obj_sql),
                    meta,
                    parse_error,
                    stats,
                },
            );
        }

        if category.is_none() && name.is_none() {
            self.entities = fresh;
        } else {
            // Partial refresh: splice the subset in, dropping entries
            // that matched the filter but no longer exist.
            self.entities.retain(|(cat, key), _| {
                if category.is_some_and(|c| c != *cat) {
                    return true;
                }
                if name.is_some_and(|n| ident_key(n) != *key) {
                    return true;
                }
                false
            });
            self.entities.extend(fresh);
        }
        Ok(())
    }

    pub fn get(&self, category: ObjectCategory, name: &str) -> Option<&SchemaEntity> {
        self.entities.get(&(category, ident_key(name)))
    }

    pub fn all(&self, category: ObjectCategory) -> impl Iterator<Item = &SchemaEntity> {
        self.entities
            .values()
            .filter(move |e| e.category == category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaEntity> {
        self.entities.values()
    }

    pub fn names(&self, category: ObjectCategory) -> Vec<&str> {
        self.all(category).map(|e| e.name.as_str()).collect()
    }

    /// Case-insensitive existence check across every category, for
    /// collision validation.
    pub fn name_taken(&self, name: &str) -> bool {
        let key = ident_key(name);
        self.entities.keys().any(|(_, k)| *k == key)
    }

    /// Derive a free object name from `base` by appending a counter.
    pub fn uniquify_name(&self, base: &str) -> String {
        if !self.name_taken(base) {
            return base.to_string();
        }
        let mut counter = 2;
        loop {
            let candidate = format!("{}_{}", base, counter);
            if !self.name_taken(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Primary key columns and foreign keys of a table.
    pub fn get_keys(&self, name: &str) -> (Vec<String>, Vec<ForeignKeyClause>) {
        let Some(meta) = self
            .get(ObjectCategory::Table, name)
            .and_then(|e| e.table_meta())
        else {
            return (Vec::new(), Vec::new());
        };
        (
            meta.primary_key_columns()
                .into_iter()
                .map(|c| c.to_string())
                .collect(),
            meta.foreign_keys().into_iter().cloned().collect(),
        )
    }

    /// Entities related to an object, grouped by category.
    ///
    /// With `own` only directly attached objects are returned (indexes
    /// and triggers on a table, triggers on a view). Otherwise the
    /// result additionally walks every view or trigger whose SQL
    /// references the object, recursively, so that dropping or renaming
    /// it can take the whole dependency cone along.
    pub fn get_related(&self, category: ObjectCategory, name: &str, own: bool) -> RelatedEntities {
        let mut related: RelatedEntities = IndexMap::new();
        let mut seen: Vec<(ObjectCategory, String)> = vec![(category, ident_key(name))];
        let mut queue: Vec<(ObjectCategory, String)> = vec![(category, name.to_string())];

        while let Some((current_category, current_name)) = queue.pop() {
            for entity in self.entities.values() {
                if seen.contains(&(entity.category, ident_key(&entity.name))) {
                    continue;
                }
                let attached = match &entity.meta {
                    Some(ObjectMeta::Index(i)) => ident_eq(&i.table, &current_name),
                    Some(ObjectMeta::Trigger(t)) => ident_eq(&t.table, &current_name),
                    _ => false,
                };
                let referencing = !own
                    && matches!(
                        entity.category,
                        ObjectCategory::View | ObjectCategory::Trigger
                    )
                    && sql_mentions(&entity.sql0, &current_name);
                // Attachment only counts for the root object; the
                // recursive part follows textual references.
                let is_root = ident_eq(&current_name, name) && current_category == category;
                if (attached && is_root) || referencing {
                    seen.push((entity.category, ident_key(&entity.name)));
                    related
                        .entry(entity.category)
                        .or_default()
                        .push(entity.clone());
                    if entity.category == ObjectCategory::View {
                        queue.push((entity.category, entity.name.clone()));
                    }
                }
            }
        }
        related
    }

    /// Objects that reference any of the named columns of a table.
    /// Used to veto column drops.
    pub fn get_column_dependents(
        &self,
        table: &str,
        columns: &[String],
    ) -> IndexMap<ObjectCategory, Vec<String>> {
        let mut dependents: IndexMap<ObjectCategory, Vec<String>> = IndexMap::new();
        for entity in self.entities.values() {
            let hit = match &entity.meta {
                Some(ObjectMeta::Index(index)) => {
                    ident_eq(&index.table, table)
                        && index.columns.iter().any(|ic| {
                            columns
                                .iter()
                                .any(|c| ident_eq(&ic.expr, c) || sql_mentions(&ic.expr, c))
                        })
                }
                Some(ObjectMeta::Trigger(trigger)) => {
                    let on_table = ident_eq(&trigger.table, table);
                    let references_table = on_table || sql_mentions(&entity.sql0, table);
                    references_table
                        && columns.iter().any(|c| {
                            match &trigger.event {
                                litedesk_core::TriggerEvent::Update(cols)
                                    if cols.iter().any(|tc| ident_eq(tc, c)) =>
                                {
                                    return true;
                                }
                                _ => {}
                            }
                            sql_mentions(&entity.sql0, c)
                        })
                }
                Some(ObjectMeta::View(_)) => {
                    sql_mentions(&entity.sql0, table)
                        && columns.iter().any(|c| sql_mentions(&entity.sql0, c))
                }
                _ => false,
            };
            if hit {
                dependents
                    .entry(entity.category)
                    .or_default()
                    .push(entity.name.clone());
            }
        }
        dependents
    }

    /// Rewrite dependent statements directly in `sqlite_master`.
    ///
    /// This is the simple-ALTER path for dependents: their data is
    /// untouched, only the stored SQL changes. The schema version is
    /// bumped so other connections drop their cached schema.
    pub fn update_sqlite_master(&self, db: &Database, rewrites: &SqlRewrites) -> Result<()> {
        if rewrites.values().all(|m| m.is_empty()) {
            return Ok(());
        }
        let version = db
            .pragma("schema_version")?
            .and_then(|v| v.as_i64())
            .ok_or_else(|| CoreError::Sql("cannot read schema_version".into()))?;

        db.set_pragma("writable_schema", "ON")?;
        let result = (|| -> Result<()> {
            for (category, names) in rewrites {
                for (obj_name, new_sql) in names {
                    tracing::info!(category = %category, name = %obj_name, "rewriting sqlite_master entry");
                    db.execute(
                        "UPDATE sqlite_master SET sql = ?1 WHERE LOWER(type) = ?2 AND name = ?3 COLLATE NOCASE",
                        &[
                            Value::Text(new_sql.clone()),
                            Value::Text(category.to_string()),
                            Value::Text(obj_name.clone()),
                        ],
                    )?;
                }
            }
            db.execute(&format!("PRAGMA schema_version = {}", version + 1), &[])?;
            Ok(())
        })();
        db.set_pragma("writable_schema", "OFF")?;
        result
    }
}

/// Whether `sql` references `name` as an identifier (not inside a
/// string or a longer word). Falls back to a substring test when the
/// text does not lex.
pub(crate) fn sql_mentions(sql: &str, name: &str) -> bool {
    match Lexer::tokenize(sql) {
        Ok(tokens) => tokens
            .iter()
            .filter(|t| t.kind.is_name())
            .any(|t| ident_eq(&t.ident_text(sql), name)),
        Err(_) => ident_key(sql).contains(&ident_key(name)),
    }
}

/// Table statistics: exact count, or the ANALYZE estimate for tables
/// whose estimate already exceeds the threshold.
fn collect_statistics(db: &Database, table: &str) -> TableStatistics {
    let quoted = format!("\"{}\"", table.replace('"', "\"\""));

    let estimate = db
        .query(
            "SELECT stat FROM sqlite_stat1 WHERE tbl = ?1 COLLATE NOCASE",
            &[Value::Text(table.to_string())],
        )
        .ok()
        .map(|out| {
            out.rows
                .iter()
                .filter_map(|r| r.first())
                .filter_map(|v| v.as_str().and_then(|s| s.split_whitespace().next()?.parse::<u64>().ok()))
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0);

    let (row_count, is_count_estimated) = if estimate > ESTIMATE_THRESHOLD {
        (estimate, true)
    } else {
        let exact = db
            .query_value(&format!("SELECT COUNT(*) FROM {}", quoted), &[])
            .ok()
            .flatten()
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        (exact.max(0) as u64, false)
    };

    // dbstat is an optional module; size stays unknown without it.
    let total_bytes = db
        .query_value(
            "SELECT SUM(pgsize) FROM dbstat WHERE name = ?1 COLLATE NOCASE",
            &[Value::Text(table.to_string())],
        )
        .ok()
        .flatten()
        .and_then(|v| v.as_i64())
        .map(|v| v.max(0) as u64);

    TableStatistics {
        row_count,
        total_bytes,
        is_count_estimated,
    }
}

#[cfg(test)]
mod tests;
