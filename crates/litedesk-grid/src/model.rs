//! The grid model
//!
//! Rows materialise lazily from a `RowCursor` in chunks; filtering and
//! sorting only re-project the visible rows and never touch the records
//! or the change-tracking sets.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use uuid::Uuid;

use litedesk_core::{Affinity, CoreError, ObjectCategory, Result, TableMeta, Value, ident_eq};
use litedesk_db::{Database, LockRegistry, RowCursor, SchemaCatalog};

use crate::changes::{ChangeSnapshot, ChangedRow, DeletedRow};
use crate::record::{RowRecord, RowState};

/// Rows pulled from the cursor per materialisation step.
pub const SEEK_CHUNK: u64 = 200;
/// Hard cap on materialised rows; beyond it the grid reports complete.
pub const MAX_ROWS: u64 = 5_000_000;

/// Which count `row_count` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCountKind {
    /// Rows after filtering.
    Visible,
    /// Full underlying count (possibly estimated).
    Total,
    /// Rows materialised so far.
    Present,
}

/// What a commit applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitOutcome {
    pub updated: u64,
    pub inserted: u64,
    pub deleted: u64,
}

enum GridSource {
    Query,
    Table {
        name: String,
        meta: Option<TableMeta>,
        with_rowid: bool,
    },
}

#[derive(Clone, Copy)]
struct SortState {
    column: usize,
    descending: bool,
}

/// Editable grid over a query result or a table.
pub struct GridModel {
    /// Lock-registry owner id for this grid.
    id: String,
    db: Database,
    source: GridSource,
    cursor: RowCursor,
    columns: Vec<String>,
    affinities: Vec<Affinity>,
    /// Every materialised record, NEW and DELETED included, by uid.
    rows: IndexMap<u64, RowRecord>,
    /// Base display order: NEW rows first, then materialisation order.
    order: Vec<u64>,
    /// Projection after filter and sort.
    visible: Vec<u64>,
    changed_ids: BTreeSet<u64>,
    new_ids: BTreeSet<u64>,
    deleted_ids: BTreeSet<u64>,
    filters: IndexMap<usize, String>,
    sort: Option<SortState>,
    next_uid: u64,
    total_rows: Option<u64>,
    is_total_estimated: bool,
    complete: bool,
}

impl GridModel {
    /// Grid over an arbitrary SELECT. Read-only: commit is refused.
    pub fn open_query(db: &Database, sql: &str) -> Result<Self> {
        let cursor = RowCursor::over_query(db, sql)?;
        let columns = cursor.columns().to_vec();
        let affinities = vec![Affinity::Text; columns.len()];
        let mut grid = Self::assemble(db, GridSource::Query, cursor, columns, affinities, None, false);
        grid.materialise_chunk()?;
        Ok(grid)
    }

    /// Grid over a table or view from the catalog.
    pub fn open_object(
        db: &Database,
        catalog: &SchemaCatalog,
        category: ObjectCategory,
        name: &str,
    ) -> Result<Self> {
        if !matches!(category, ObjectCategory::Table | ObjectCategory::View) {
            return Err(CoreError::Validation(format!(
                "cannot open a grid over a {}",
                category
            )));
        }
        let entity = catalog.get(category, name).ok_or_else(|| {
            CoreError::Validation(format!("no such {}: {}", category, name))
        })?;
        let meta = entity.table_meta().cloned();
        let with_rowid = category == ObjectCategory::Table
            && !meta.as_ref().is_some_and(|m| m.without_rowid);
        let cursor = RowCursor::over_table(db, &entity.name, with_rowid)?;
        let columns = cursor.columns().to_vec();
        let affinities = columns
            .iter()
            .map(|c| {
                meta.as_ref()
                    .and_then(|m| m.column(c))
                    .map(|col| col.affinity())
                    .unwrap_or_default()
            })
            .collect();

        let (total, estimated) = match &entity.stats {
            Some(stats) => (Some(stats.row_count), stats.is_count_estimated),
            None => {
                let count = db
                    .query_value(
                        &format!("SELECT COUNT(*) FROM {}", quoted(&entity.name)),
                        &[],
                    )
                    .ok()
                    .flatten()
                    .and_then(|v| v.as_i64());
                (count.map(|c| c.max(0) as u64), false)
            }
        };

        let source = GridSource::Table {
            name: entity.name.clone(),
            meta,
            with_rowid,
        };
        let mut grid = Self::assemble(db, source, cursor, columns, affinities, total, estimated);
        grid.materialise_chunk()?;
        Ok(grid)
    }

    fn assemble(
        db: &Database,
        source: GridSource,
        cursor: RowCursor,
        columns: Vec<String>,
        affinities: Vec<Affinity>,
        total_rows: Option<u64>,
        is_total_estimated: bool,
    ) -> Self {
        Self {
            id: format!("grid-{}", Uuid::new_v4()),
            db: db.clone(),
            source,
            cursor,
            columns,
            affinities,
            rows: IndexMap::new(),
            order: Vec::new(),
            visible: Vec::new(),
            changed_ids: BTreeSet::new(),
            new_ids: BTreeSet::new(),
            deleted_ids: BTreeSet::new(),
            filters: IndexMap::new(),
            sort: None,
            next_uid: 0,
            total_rows,
            is_total_estimated,
            complete: false,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the underlying data is fully materialised (or capped).
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_total_estimated(&self) -> bool {
        self.is_total_estimated
    }

    pub fn row_count(&self, kind: RowCountKind) -> u64 {
        match kind {
            RowCountKind::Visible => self.visible.len() as u64,
            RowCountKind::Present => self.cursor.position(),
            RowCountKind::Total => {
                let total = if self.complete {
                    self.cursor.position()
                } else {
                    self.total_rows.unwrap_or_else(|| self.cursor.position())
                };
                total.min(MAX_ROWS)
            }
        }
    }

    // ------------------------------------------------------------------
    // Materialisation

    /// Pull one more chunk from the cursor. A cursor failure ends
    /// materialisation: rows obtained so far stay valid and the total
    /// snaps to the present count.
    fn materialise_chunk(&mut self) -> Result<bool> {
        if self.complete {
            return Ok(false);
        }
        let headroom = MAX_ROWS.saturating_sub(self.cursor.position());
        if headroom == 0 {
            self.complete = true;
            return Ok(false);
        }
        let chunk = match self.cursor.fetch_chunk(&self.db, SEEK_CHUNK.min(headroom)) {
            Ok(chunk) => chunk,
            Err(CoreError::Cursor(message)) => {
                tracing::warn!(error = %message, "cursor failed, keeping rows materialised so far");
                self.complete = true;
                self.total_rows = Some(self.cursor.position());
                return Ok(false);
            }
            Err(other) => return Err(other),
        };
        let got_rows = !chunk.is_empty();
        for row in chunk {
            let uid = self.next_uid;
            self.next_uid += 1;
            let record = RowRecord::pristine(uid, row.values, row.rowid);
            let passes = self.matches_filters(&record);
            self.rows.insert(uid, record);
            self.order.push(uid);
            if passes && self.sort.is_none() {
                self.visible.push(uid);
            }
        }
        if self.cursor.is_exhausted() || self.cursor.position() >= MAX_ROWS {
            self.complete = true;
        }
        if self.sort.is_some() && got_rows {
            self.project();
        }
        Ok(got_rows)
    }

    /// Materialise until display row `row` exists or the data ends.
    pub fn seek_to_row(&mut self, row: usize) -> Result<()> {
        while row >= self.visible.len() && !self.complete {
            self.materialise_chunk()?;
        }
        Ok(())
    }

    /// Materialise one further chunk, or everything up to the cap.
    pub fn seek_ahead(&mut self, end: bool) -> Result<()> {
        if end {
            while !self.complete {
                self.materialise_chunk()?;
            }
        } else {
            self.materialise_chunk()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Cell access

    fn uid_at(&self, row: usize) -> Result<u64> {
        self.visible
            .get(row)
            .copied()
            .ok_or_else(|| CoreError::Validation(format!("row {} is out of range", row)))
    }

    /// Current (possibly edited) value of a cell, extending
    /// materialisation as needed.
    pub fn value_at(&mut self, row: usize, col: usize) -> Result<Value> {
        self.seek_to_row(row)?;
        let uid = self.uid_at(row)?;
        let record = &self.rows[&uid];
        record
            .values
            .get_index(col)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| CoreError::Validation(format!("column {} is out of range", col)))
    }

    /// Cell text for display; blobs come out escape-encoded.
    pub fn display_at(&mut self, row: usize, col: usize) -> Result<String> {
        Ok(self.value_at(row, col)?.display_text())
    }

    /// Write a cell from raw text, coercing per the column affinity.
    /// The first change of a pristine row snapshots it; editing a row
    /// back to its backup clears the change atomically.
    pub fn set_value(&mut self, row: usize, col: usize, raw: &str) -> Result<()> {
        self.seek_to_row(row)?;
        let uid = self.uid_at(row)?;
        if col >= self.columns.len() {
            return Err(CoreError::Validation(format!(
                "column {} is out of range",
                col
            )));
        }
        let affinity = self.affinities[col];
        let record = self.rows.get_mut(&uid).expect("visible uid exists");
        if record.state == RowState::Deleted {
            return Err(CoreError::Validation("cannot edit a deleted row".into()));
        }
        let value = Value::coerce(raw, affinity);
        if record.state == RowState::Pristine {
            if record.values.get_index(col).map(|(_, v)| v) == Some(&value) {
                return Ok(());
            }
            record.begin_change();
            self.changed_ids.insert(uid);
        }
        if let Some((_, slot)) = record.values.get_index_mut(col) {
            *slot = value;
        }
        if record.state == RowState::Changed && record.matches_backup() {
            record.clear_change();
            self.changed_ids.remove(&uid);
        }
        Ok(())
    }

    /// Set a cell to NULL explicitly (coercion never produces NULL).
    pub fn set_null(&mut self, row: usize, col: usize) -> Result<()> {
        self.seek_to_row(row)?;
        let uid = self.uid_at(row)?;
        let record = self.rows.get_mut(&uid).expect("visible uid exists");
        if record.state == RowState::Deleted {
            return Err(CoreError::Validation("cannot edit a deleted row".into()));
        }
        if record.state == RowState::Pristine {
            record.begin_change();
            self.changed_ids.insert(uid);
        }
        if let Some((_, slot)) = record.values.get_index_mut(col) {
            *slot = Value::Null;
        }
        if record.state == RowState::Changed && record.matches_backup() {
            record.clear_change();
            self.changed_ids.remove(&uid);
        }
        Ok(())
    }

    /// Prepend a NEW row, all columns NULL. Returns its uid.
    pub fn insert_row(&mut self) -> u64 {
        let uid = self.next_uid;
        self.next_uid += 1;
        let record = RowRecord::inserted(uid, &self.columns);
        self.rows.insert(uid, record);
        self.order.insert(0, uid);
        self.visible.insert(0, uid);
        self.new_ids.insert(uid);
        uid
    }

    /// Delete a display row. A NEW row is discarded outright; anything
    /// else moves to the deleted set, dropping any change state.
    pub fn delete_row(&mut self, row: usize) -> Result<()> {
        let uid = self.uid_at(row)?;
        let record = self.rows.get_mut(&uid).expect("visible uid exists");
        if record.state == RowState::New {
            self.rows.shift_remove(&uid);
            self.order.retain(|u| *u != uid);
            self.new_ids.remove(&uid);
        } else {
            record.backup = None;
            record.state = RowState::Deleted;
            self.changed_ids.remove(&uid);
            self.deleted_ids.insert(uid);
        }
        self.visible.remove(row);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Filter and sort

    /// Substring filter on one column; an empty string clears it.
    pub fn set_filter(&mut self, col: usize, text: &str) {
        if text.is_empty() {
            self.filters.shift_remove(&col);
        } else {
            self.filters.insert(col, text.to_string());
        }
        self.project();
    }

    /// Clear one or every filter.
    pub fn clear_filter(&mut self, col: Option<usize>) {
        match col {
            Some(col) => {
                self.filters.shift_remove(&col);
            }
            None => self.filters.clear(),
        }
        self.project();
    }

    /// Cycle sorting on a column: ascending, descending, unsorted.
    /// Sorting materialises everything first so the order is total.
    pub fn sort(&mut self, col: usize) -> Result<()> {
        self.seek_ahead(true)?;
        self.sort = match self.sort {
            Some(SortState { column, descending }) if column == col => {
                if descending {
                    None
                } else {
                    Some(SortState {
                        column: col,
                        descending: true,
                    })
                }
            }
            _ => Some(SortState {
                column: col,
                descending: false,
            }),
        };
        self.project();
        Ok(())
    }

    fn matches_filters(&self, record: &RowRecord) -> bool {
        for (&col, needle) in &self.filters {
            let Some((_, value)) = record.values.get_index(col) else {
                return false;
            };
            let haystack = value.display_text().to_lowercase();
            let mut needle = needle.to_lowercase();
            if self.is_numeric_column(col) {
                // Decimal-comma input matches decimal-point data.
                needle = needle.replace(',', ".");
            }
            if !haystack.contains(&needle) {
                return false;
            }
        }
        true
    }

    fn is_numeric_column(&self, col: usize) -> bool {
        if self.affinities.get(col).is_some_and(|a| a.is_numeric()) {
            return true;
        }
        // Query grids carry no declared types: a column whose non-null
        // values are all numeric sorts and filters numerically.
        let mut any = false;
        for record in self.rows.values() {
            match record.values.get_index(col).map(|(_, v)| v) {
                Some(Value::Integer(_)) | Some(Value::Real(_)) => any = true,
                Some(Value::Null) | None => {}
                _ => return false,
            }
        }
        any
    }

    /// Rebuild the visible projection from the base order.
    fn project(&mut self) {
        let mut visible: Vec<u64> = self
            .order
            .iter()
            .copied()
            .filter(|uid| {
                let record = &self.rows[uid];
                record.state != RowState::Deleted && self.matches_filters(record)
            })
            .collect();

        if let Some(SortState { column, descending }) = self.sort {
            if self.is_numeric_column(column) {
                // NULL and unparsable cells sort lowest.
                visible.sort_by(|a, b| {
                    let ka = self.numeric_key(*a, column);
                    let kb = self.numeric_key(*b, column);
                    ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
                });
            } else {
                visible.sort_by_cached_key(|uid| self.text_key(*uid, column));
            }
            if descending {
                visible.reverse();
            }
        }
        self.visible = visible;
    }

    fn numeric_key(&self, uid: u64, col: usize) -> f64 {
        self.rows[&uid]
            .values
            .get_index(col)
            .and_then(|(_, v)| v.as_f64())
            .unwrap_or(f64::NEG_INFINITY)
    }

    fn text_key(&self, uid: u64, col: usize) -> String {
        match self.rows[&uid].values.get_index(col) {
            Some((_, Value::Null)) | None => String::new(),
            Some((_, value)) => value.display_text().to_lowercase(),
        }
    }

    // ------------------------------------------------------------------
    // Commit and rollback

    /// Apply uncommitted changes in order: CHANGED, NEW, DELETED.
    ///
    /// The first failing row aborts the remainder; rows already applied
    /// stay applied and have left their tracking sets. Committed rows
    /// are re-selected when the table carries column defaults or
    /// INSERT/UPDATE triggers, so their mutations become visible.
    pub fn commit(&mut self, locks: &LockRegistry) -> Result<CommitOutcome> {
        let GridSource::Table { name, .. } = &self.source else {
            return Err(CoreError::Validation(
                "only table data can be committed".into(),
            ));
        };
        let table = name.clone();
        if let Some(holder) = locks.get_lock(Some(ObjectCategory::Table), Some(&table), Some(&self.id))
        {
            return Err(CoreError::Conflict(format!("table {}", table), holder));
        }
        locks.lock(Some(ObjectCategory::Table), Some(&table), &self.id)?;
        let result = self.commit_inner(&table);
        locks.unlock(Some(ObjectCategory::Table), Some(&table), &self.id);
        result
    }

    fn commit_inner(&mut self, table: &str) -> Result<CommitOutcome> {
        let GridSource::Table {
            meta: Some(meta),
            with_rowid,
            ..
        } = &self.source
        else {
            return Err(CoreError::Validation(format!(
                "table {} has no parsed schema to commit against",
                table
            )));
        };
        let meta = meta.clone();
        let with_rowid = *with_rowid;
        let pk_cols: Vec<String> = meta
            .primary_key_columns()
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        let reload = meta.has_defaults() || self.has_insert_update_triggers(table)?;
        tracing::info!(
            table = %table,
            changed = self.changed_ids.len(),
            new = self.new_ids.len(),
            deleted = self.deleted_ids.len(),
            "committing grid changes"
        );
        let mut outcome = CommitOutcome::default();

        for uid in self.changed_ids.clone() {
            let record = &self.rows[&uid];
            let (where_sql, mut where_params) =
                row_target(record, &pk_cols, true).ok_or_else(|| row_target_error(table))?;
            let assignments: Vec<String> = self
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{} = ?{}", quoted(c), i + 1))
                .collect();
            let mut params: Vec<Value> = record.values.values().cloned().collect();
            let where_sql = shift_placeholders(&where_sql, params.len());
            params.append(&mut where_params);
            let sql = format!(
                "UPDATE {} SET {} WHERE {}",
                quoted(table),
                assignments.join(", "),
                where_sql
            );
            self.db.execute(&sql, &params)?;
            let record = self.rows.get_mut(&uid).expect("row exists");
            record.clear_change();
            self.changed_ids.remove(&uid);
            outcome.updated += 1;
            if reload {
                self.reselect_row(table, uid, &pk_cols)?;
            }
        }

        for uid in self.new_ids.clone() {
            let record = &self.rows[&uid];
            let provided: Vec<(String, Value)> = record
                .values
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(c, v)| (c.clone(), v.clone()))
                .collect();
            let sql = if provided.is_empty() {
                format!("INSERT INTO {} DEFAULT VALUES", quoted(table))
            } else {
                let cols: Vec<String> = provided.iter().map(|(c, _)| quoted(c)).collect();
                let holes: Vec<String> =
                    (1..=provided.len()).map(|i| format!("?{}", i)).collect();
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quoted(table),
                    cols.join(", "),
                    holes.join(", ")
                )
            };
            let params: Vec<Value> = provided.into_iter().map(|(_, v)| v).collect();
            self.db.execute(&sql, &params)?;
            let rowid = self.db.last_insert_rowid();

            let record = self.rows.get_mut(&uid).expect("row exists");
            if with_rowid {
                record.rowid = Some(rowid);
            }
            // A single INTEGER PRIMARY KEY the user left empty takes the
            // generated rowid.
            if let Some(pk) = meta.single_integer_pk() {
                if let Some(slot) = record.values.get_mut(&pk.name) {
                    if slot.is_null() {
                        *slot = Value::Integer(rowid);
                    }
                }
            }
            record.state = RowState::Pristine;
            self.new_ids.remove(&uid);
            outcome.inserted += 1;
            if reload {
                self.reselect_row(table, uid, &pk_cols)?;
            }
        }

        for uid in self.deleted_ids.clone() {
            let record = &self.rows[&uid];
            let (where_sql, params) =
                row_target(record, &pk_cols, false).ok_or_else(|| row_target_error(table))?;
            let sql = format!("DELETE FROM {} WHERE {}", quoted(table), where_sql);
            self.db.execute(&sql, &params)?;
            self.rows.shift_remove(&uid);
            self.order.retain(|u| *u != uid);
            self.deleted_ids.remove(&uid);
            outcome.deleted += 1;
        }

        Ok(outcome)
    }

    /// Pull a just-committed row back from the database so DEFAULT and
    /// trigger mutations show up. A row with neither key nor rowid is
    /// left as-is.
    fn reselect_row(&mut self, table: &str, uid: u64, pk_cols: &[String]) -> Result<()> {
        let record = &self.rows[&uid];
        let Some((where_sql, params)) = row_target(record, pk_cols, false) else {
            return Ok(());
        };
        let sql = format!(
            "SELECT * FROM {} WHERE {} LIMIT 1",
            quoted(table),
            where_sql
        );
        let output = self.db.query(&sql, &params)?;
        if let Some(row) = output.rows.first() {
            let record = self.rows.get_mut(&uid).expect("row exists");
            for (column, value) in output.columns.iter().zip(row.iter()) {
                if let Some(slot) = record.values.get_mut(column) {
                    *slot = value.clone();
                }
            }
        }
        Ok(())
    }

    fn has_insert_update_triggers(&self, table: &str) -> Result<bool> {
        let count = self.db.query_value(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger' \
             AND tbl_name = ?1 COLLATE NOCASE \
             AND (sql LIKE '%insert%' OR sql LIKE '%update%')",
            &[Value::Text(table.to_string())],
        )?;
        Ok(count.and_then(|v| v.as_i64()).unwrap_or(0) > 0)
    }

    /// Undo every uncommitted change: restore CHANGED rows from their
    /// backups, drop NEW rows, resurrect DELETED rows.
    pub fn rollback(&mut self) {
        for uid in std::mem::take(&mut self.changed_ids) {
            if let Some(record) = self.rows.get_mut(&uid) {
                record.restore_backup();
            }
        }
        for uid in std::mem::take(&mut self.new_ids) {
            self.rows.shift_remove(&uid);
            self.order.retain(|u| *u != uid);
        }
        for uid in std::mem::take(&mut self.deleted_ids) {
            if let Some(record) = self.rows.get_mut(&uid) {
                record.state = RowState::Pristine;
            }
        }
        self.project();
    }

    // ------------------------------------------------------------------
    // Change snapshots

    /// Capture the uncommitted state for replay after a reload.
    pub fn get_changes(&self) -> ChangeSnapshot {
        let mut snapshot = ChangeSnapshot::default();
        for uid in &self.new_ids {
            snapshot.new.push(self.rows[uid].values.clone());
        }
        for uid in &self.changed_ids {
            let record = &self.rows[uid];
            snapshot.changed.push(ChangedRow {
                values: record.values.clone(),
                backup: record.backup.clone().unwrap_or_default(),
                rowid: record.rowid,
            });
        }
        for uid in &self.deleted_ids {
            let record = &self.rows[uid];
            snapshot.deleted.push(DeletedRow {
                values: record.values.clone(),
                rowid: record.rowid,
            });
        }
        snapshot
    }

    /// Replay a snapshot onto this (freshly constructed) grid. Rows are
    /// matched by rowid when available, else by their pre-edit values.
    pub fn set_changes(&mut self, snapshot: &ChangeSnapshot) -> Result<()> {
        for values in &snapshot.new {
            let uid = self.insert_row();
            let record = self.rows.get_mut(&uid).expect("row exists");
            for (column, value) in values {
                if let Some(slot) = record.values.get_mut(column) {
                    *slot = value.clone();
                }
            }
        }
        for changed in &snapshot.changed {
            if let Some(uid) = self.find_record(changed.rowid, &changed.backup) {
                let record = self.rows.get_mut(&uid).expect("row exists");
                if record.state == RowState::Pristine {
                    record.begin_change();
                    self.changed_ids.insert(uid);
                }
                for (column, value) in &changed.values {
                    if let Some(slot) = record.values.get_mut(column) {
                        *slot = value.clone();
                    }
                }
            }
        }
        for deleted in &snapshot.deleted {
            if let Some(uid) = self.find_record(deleted.rowid, &deleted.values) {
                let record = self.rows.get_mut(&uid).expect("row exists");
                if record.state != RowState::New {
                    record.backup = None;
                    record.state = RowState::Deleted;
                    self.changed_ids.remove(&uid);
                    self.deleted_ids.insert(uid);
                }
            }
        }
        self.project();
        Ok(())
    }

    fn find_record(&self, rowid: Option<i64>, values: &IndexMap<String, Value>) -> Option<u64> {
        self.rows
            .values()
            .find(|r| {
                r.state == RowState::Pristine
                    && match (rowid, r.rowid) {
                        (Some(a), Some(b)) => a == b,
                        _ => r.values == *values,
                    }
            })
            .map(|r| r.uid)
    }

    // ------------------------------------------------------------------
    // Clipboard-shaped input

    /// Write a block of text starting at (row, col): lines are rows,
    /// tabs are columns, clipped to the grid bounds.
    pub fn paste(&mut self, row: usize, col: usize, text: &str) -> Result<()> {
        for (i, line) in text.split('\n').enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let target_row = row + i;
            if target_row >= self.visible.len() {
                break;
            }
            for (j, cell) in line.split('\t').enumerate() {
                let target_col = col + j;
                if target_col >= self.columns.len() {
                    break;
                }
                self.set_value(target_row, target_col, cell)?;
            }
        }
        Ok(())
    }

    // Test-facing inspection helpers.

    pub fn changed_count(&self) -> usize {
        self.changed_ids.len()
    }

    pub fn new_count(&self) -> usize {
        self.new_ids.len()
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted_ids.len()
    }

    /// State of the record at a display row.
    pub fn row_state(&self, row: usize) -> Result<RowState> {
        let uid = self.uid_at(row)?;
        Ok(self.rows[&uid].state)
    }

    /// The record uid at a display row.
    pub fn row_uid(&self, row: usize) -> Result<u64> {
        self.uid_at(row)
    }
}

fn quoted(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn row_target_error(table: &str) -> CoreError {
    CoreError::Sql(format!(
        "cannot address rows of {} without a primary key or rowid",
        table
    ))
}

/// WHERE clause and parameters targeting one row: by primary key
/// columns (from the backup when `use_backup`, so an edited key still
/// finds the original row), else by stored rowid.
fn row_target(
    record: &RowRecord,
    pk_cols: &[String],
    use_backup: bool,
) -> Option<(String, Vec<Value>)> {
    if !pk_cols.is_empty() {
        let source = if use_backup {
            record.backup.as_ref().unwrap_or(&record.values)
        } else {
            &record.values
        };
        let mut clauses = Vec::with_capacity(pk_cols.len());
        let mut params = Vec::with_capacity(pk_cols.len());
        for (i, pk) in pk_cols.iter().enumerate() {
            let value = source
                .iter()
                .find(|(c, _)| ident_eq(c, pk))
                .map(|(_, v)| v.clone())?;
            clauses.push(format!("{} = ?{}", quoted(pk), i + 1));
            params.push(value);
        }
        return Some((clauses.join(" AND "), params));
    }
    record
        .rowid
        .map(|rowid| ("rowid = ?1".to_string(), vec![Value::Integer(rowid)]))
}

/// Shift `?N` placeholders in a WHERE clause by `offset` so it can
/// follow `offset` SET parameters.
fn shift_placeholders(where_sql: &str, offset: usize) -> String {
    let mut out = String::with_capacity(where_sql.len());
    let mut chars = where_sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '?' {
            let mut number = String::new();
            while chars.peek().is_some_and(|d| d.is_ascii_digit()) {
                number.push(chars.next().unwrap());
            }
            let n: usize = number.parse().unwrap_or(0);
            out.push('?');
            out.push_str(&(n + offset).to_string());
        } else {
            out.push(c);
        }
    }
    out
}
