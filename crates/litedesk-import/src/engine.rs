//! The import engine
//!
//! One savepoint bounds the whole run, table creation included, so a
//! rollback leaves no trace. Rows are inserted one by one; every error
//! is offered to the progress callback, whose return value decides
//! whether the run continues, stops keeping what was done, or stops
//! and rolls everything back.

use indexmap::IndexMap;
use uuid::Uuid;

use litedesk_core::{
    ColumnDef, CoreError, ObjectCategory, ObjectMeta, Result, TableMeta, Value, ident_eq,
};
use litedesk_grammar::generate;
use litedesk_db::{Database, LockRegistry, SchemaCatalog};
use litedesk_worker::CancelToken;

use crate::mapping::{ColumnSource, SheetMapping};
use crate::source::{SourceFile, SourceRow};

/// What the progress callback tells the engine to do next.
/// Mirrors the truthy / false / null contract of the progress protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportDecision {
    Continue,
    /// Stop now, keep what was imported.
    Halt,
    /// Stop now and roll the whole run back.
    Rollback,
}

/// One progress report.
#[derive(Debug, Clone, Default)]
pub struct ImportProgress {
    pub table: Option<String>,
    pub count: u64,
    pub errorcount: u64,
    pub error: Option<String>,
    /// Source row index the report refers to, 0-based.
    pub index: Option<usize>,
    pub done: bool,
}

/// Final tally per target table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub counts: IndexMap<String, u64>,
    pub errors: IndexMap<String, u64>,
}

/// Rows between routine progress reports.
const PROGRESS_STEP: u64 = 100;
/// Savepoint bounding the run.
const SAVEPOINT: &str = "IMPORT";

/// The streaming import engine.
pub struct ImportEngine {
    owner: String,
}

impl ImportEngine {
    pub fn new() -> Self {
        Self {
            owner: format!("import-{}", Uuid::new_v4()),
        }
    }

    /// Run the import. The callback is invoked from the calling (worker)
    /// thread; cancellation is polled between rows and rolls back.
    pub fn run(
        &self,
        db: &Database,
        catalog: &mut SchemaCatalog,
        locks: &LockRegistry,
        source: &SourceFile,
        mappings: &[SheetMapping],
        progress: &mut dyn FnMut(&ImportProgress) -> ImportDecision,
        cancel: &CancelToken,
    ) -> Result<ImportReport> {
        // Exclusive access to every target for the duration of the run.
        let mut held: Vec<String> = Vec::new();
        for mapping in mappings {
            match locks.lock(Some(ObjectCategory::Table), Some(&mapping.target_table), &self.owner)
            {
                Ok(()) => held.push(mapping.target_table.clone()),
                Err(e) => {
                    self.unlock_all(locks, &held);
                    return Err(e);
                }
            }
        }

        db.savepoint(SAVEPOINT).inspect_err(|_| {
            self.unlock_all(locks, &held);
        })?;
        let outcome = self.run_sheets(db, source, mappings, progress, cancel);
        let result = match outcome {
            Ok((mut report, rollback)) => {
                if rollback {
                    tracing::info!("import rolled back on caller decision");
                    db.rollback_to(SAVEPOINT)?;
                    db.release(SAVEPOINT)?;
                    for count in report.counts.values_mut() {
                        *count = 0;
                    }
                } else {
                    db.release(SAVEPOINT)?;
                }
                Ok(report)
            }
            Err(e) => {
                // Cancellation and hard failures leave nothing behind.
                let _ = db.rollback_to(SAVEPOINT);
                let _ = db.release(SAVEPOINT);
                Err(e)
            }
        };
        self.unlock_all(locks, &held);

        if result.is_ok() {
            catalog.populate(db, None, None, true, false)?;
        }
        result
    }

    fn unlock_all(&self, locks: &LockRegistry, tables: &[String]) {
        for table in tables {
            locks.unlock(Some(ObjectCategory::Table), Some(table), &self.owner);
        }
    }

    fn run_sheets(
        &self,
        db: &Database,
        source: &SourceFile,
        mappings: &[SheetMapping],
        progress: &mut dyn FnMut(&ImportProgress) -> ImportDecision,
        cancel: &CancelToken,
    ) -> Result<(ImportReport, bool)> {
        let mut report = ImportReport::default();
        let mut stop = false;
        let mut rollback = false;

        for mapping in mappings {
            if stop || rollback {
                break;
            }
            let sheet = source
                .sheet(&mapping.sheet)
                .ok_or_else(|| CoreError::Source(format!("no such sheet: {}", mapping.sheet)))?
                .clone();
            tracing::info!(sheet = %sheet.name, table = %mapping.target_table, "importing sheet");

            let mut count = 0u64;
            let mut errorcount = 0u64;

            // A created table may uniquify the requested column names;
            // inserts must target what actually exists.
            let insert_columns: Vec<String>;
            if mapping.create_table {
                let (create_sql, created_names) = create_table_plan(mapping);
                insert_columns = created_names;
                if let Err(e) = db.execute(&create_sql, &[]) {
                    errorcount += 1;
                    let decision = progress(&ImportProgress {
                        table: Some(mapping.target_table.clone()),
                        errorcount,
                        error: Some(e.to_string()),
                        ..ImportProgress::default()
                    });
                    *report.errors.entry(mapping.target_table.clone()).or_default() += 1;
                    match decision {
                        ImportDecision::Rollback => rollback = true,
                        _ => stop = true,
                    }
                    continue;
                }
            } else {
                insert_columns = mapping.columns.iter().map(|c| c.target.clone()).collect();
            }

            let insert_sql = insert_sql(&mapping.target_table, &insert_columns);
            let mut header_names: Option<Vec<String>> = None;
            let mut rows = source.iter_rows(&sheet.name)?;
            let mut index = 0usize;

            while let Some(row) = rows.next() {
                if cancel.is_cancelled() {
                    return Err(CoreError::Cancelled);
                }
                let current = index;
                index += 1;

                let row = match row {
                    Ok(row) => row,
                    Err(e) => {
                        errorcount += 1;
                        let decision = progress(&ImportProgress {
                            table: Some(mapping.target_table.clone()),
                            count,
                            errorcount,
                            error: Some(e.to_string()),
                            index: Some(current),
                            ..ImportProgress::default()
                        });
                        match decision {
                            ImportDecision::Continue => continue,
                            ImportDecision::Halt => {
                                stop = true;
                                break;
                            }
                            ImportDecision::Rollback => {
                                rollback = true;
                                break;
                            }
                        }
                    }
                };

                // A header row names the positional columns; it is never
                // inserted.
                if mapping.header_row && current == 0 {
                    if let SourceRow::Positional(cells) = &row {
                        header_names =
                            Some(cells.iter().map(|v| v.display_text()).collect());
                        continue;
                    }
                }

                let params = resolve_row(&row, mapping, header_names.as_deref());
                match db.execute(&insert_sql, &params) {
                    Ok(_) => {
                        count += 1;
                        if count % PROGRESS_STEP == 0 {
                            let decision = progress(&ImportProgress {
                                table: Some(mapping.target_table.clone()),
                                count,
                                errorcount,
                                index: Some(current),
                                ..ImportProgress::default()
                            });
                            match decision {
                                ImportDecision::Continue => {}
                                ImportDecision::Halt => {
                                    stop = true;
                                    break;
                                }
                                ImportDecision::Rollback => {
                                    rollback = true;
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        errorcount += 1;
                        let decision = progress(&ImportProgress {
                            table: Some(mapping.target_table.clone()),
                            count,
                            errorcount,
                            error: Some(e.to_string()),
                            index: Some(current),
                            ..ImportProgress::default()
                        });
                        match decision {
                            ImportDecision::Continue => {}
                            ImportDecision::Halt => {
                                stop = true;
                                break;
                            }
                            ImportDecision::Rollback => {
                                rollback = true;
                                break;
                            }
                        }
                    }
                }
            }

            *report
                .counts
                .entry(mapping.target_table.clone())
                .or_default() += count;
            *report
                .errors
                .entry(mapping.target_table.clone())
                .or_default() += errorcount;

            // The sheet is over, one way or another.
            let decision = progress(&ImportProgress {
                table: Some(mapping.target_table.clone()),
                count,
                errorcount,
                done: true,
                ..ImportProgress::default()
            });
            if decision == ImportDecision::Rollback {
                rollback = true;
            } else if decision == ImportDecision::Halt {
                stop = true;
            }
        }

        Ok((report, rollback))
    }
}

impl Default for ImportEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// CREATE TABLE statement for a new target: the optional auto-increment
/// key first, then the mapped targets with uniquified names. Returns
/// the statement plus the names the mapped columns actually got.
fn create_table_plan(mapping: &SheetMapping) -> (String, Vec<String>) {
    let mut columns: Vec<ColumnDef> = Vec::new();
    let mut taken: Vec<String> = Vec::new();
    let mut claim = |base: &str, taken: &mut Vec<String>| -> String {
        let mut name = base.to_string();
        let mut counter = 2;
        while taken.iter().any(|t| ident_eq(t, &name)) {
            name = format!("{}_{}", base, counter);
            counter += 1;
        }
        taken.push(name.clone());
        name
    };

    if let Some(pk) = &mapping.add_pk {
        let name = claim(pk, &mut taken);
        let mut column = ColumnDef::new(name).with_type("INTEGER").primary_key();
        column.autoincrement = true;
        columns.push(column);
    }
    let mut mapped_names = Vec::with_capacity(mapping.columns.len());
    for column_mapping in &mapping.columns {
        let name = claim(&column_mapping.target, &mut taken);
        mapped_names.push(name.clone());
        columns.push(ColumnDef::new(name));
    }

    let sql = generate(&ObjectMeta::Table(TableMeta {
        name: mapping.target_table.clone(),
        columns,
        constraints: Vec::new(),
        without_rowid: false,
    }));
    (sql, mapped_names)
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    let quoted: Vec<String> = columns
        .iter()
        .map(|c| format!("\"{}\"", c.replace('"', "\"\"")))
        .collect();
    let holes: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        table.replace('"', "\"\""),
        quoted.join(", "),
        holes.join(", ")
    )
}

/// Pull the mapped values out of one source row; anything unresolvable
/// inserts as NULL.
fn resolve_row(row: &SourceRow, mapping: &SheetMapping, header: Option<&[String]>) -> Vec<Value> {
    mapping
        .columns
        .iter()
        .map(|column| match (&column.source, row) {
            (ColumnSource::Index(i), SourceRow::Positional(cells)) => {
                cells.get(*i).cloned().unwrap_or(Value::Null)
            }
            (ColumnSource::Index(i), SourceRow::Named(map)) => map
                .get_index(*i)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Null),
            (ColumnSource::Name(name), SourceRow::Named(map)) => map
                .iter()
                .find(|(k, _)| ident_eq(k, name))
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Null),
            (ColumnSource::Name(name), SourceRow::Positional(cells)) => header
                .and_then(|names| names.iter().position(|n| ident_eq(n, name)))
                .and_then(|i| cells.get(i).cloned())
                .unwrap_or(Value::Null),
        })
        .collect()
}

#[cfg(test)]
mod tests;
