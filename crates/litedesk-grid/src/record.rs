//! Grid row records

use indexmap::IndexMap;
use litedesk_core::Value;
use serde::{Deserialize, Serialize};

/// Edit state of a row. A row is in exactly one state at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowState {
    /// As read from the database, unedited.
    Pristine,
    /// Inserted in the grid, not yet in the database.
    New,
    /// Edited; `backup` holds the pre-edit snapshot.
    Changed,
    /// Marked for deletion.
    Deleted,
}

/// One row of the grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowRecord {
    /// Grid-internal id, ever-increasing, stable across filter/sort.
    pub uid: u64,
    pub state: RowState,
    /// Current values keyed by column name, in column order.
    pub values: IndexMap<String, Value>,
    /// Pre-edit snapshot; present iff `state == Changed`.
    pub backup: Option<IndexMap<String, Value>>,
    /// Underlying rowid for table-backed grids on rowid tables.
    pub rowid: Option<i64>,
}

impl RowRecord {
    pub fn pristine(uid: u64, values: IndexMap<String, Value>, rowid: Option<i64>) -> Self {
        Self {
            uid,
            state: RowState::Pristine,
            values,
            backup: None,
            rowid,
        }
    }

    /// A fresh NEW row with every column NULL.
    pub fn inserted(uid: u64, columns: &[String]) -> Self {
        Self {
            uid,
            state: RowState::New,
            values: columns
                .iter()
                .map(|c| (c.clone(), Value::Null))
                .collect(),
            backup: None,
            rowid: None,
        }
    }

    /// First edit of a pristine row: snapshot and flip to Changed.
    pub fn begin_change(&mut self) {
        if self.state == RowState::Pristine {
            self.backup = Some(self.values.clone());
            self.state = RowState::Changed;
        }
    }

    /// Whether the current values equal the backup again.
    pub fn matches_backup(&self) -> bool {
        self.backup.as_ref().is_some_and(|b| *b == self.values)
    }

    /// Drop the Changed state and its backup together.
    pub fn clear_change(&mut self) {
        self.backup = None;
        if self.state == RowState::Changed {
            self.state = RowState::Pristine;
        }
    }

    /// Restore the backup values, dropping the Changed state.
    pub fn restore_backup(&mut self) {
        if let Some(backup) = self.backup.take() {
            self.values = backup;
        }
        if self.state == RowState::Changed {
            self.state = RowState::Pristine;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RowRecord {
        let mut values = IndexMap::new();
        values.insert("a".to_string(), Value::Integer(1));
        RowRecord::pristine(1, values, Some(10))
    }

    #[test]
    fn test_begin_change_snapshots_once() {
        let mut row = record();
        row.begin_change();
        assert_eq!(row.state, RowState::Changed);
        row.values["a"] = Value::Integer(2);
        // A second begin_change must not overwrite the original backup.
        row.begin_change();
        assert_eq!(row.backup.as_ref().unwrap()["a"], Value::Integer(1));
    }

    #[test]
    fn test_backup_present_iff_changed() {
        let mut row = record();
        assert!(row.backup.is_none());
        row.begin_change();
        assert!(row.backup.is_some());
        row.restore_backup();
        assert_eq!(row.state, RowState::Pristine);
        assert!(row.backup.is_none());
    }

    #[test]
    fn test_matches_backup_after_revert() {
        let mut row = record();
        row.begin_change();
        row.values["a"] = Value::Integer(5);
        assert!(!row.matches_backup());
        row.values["a"] = Value::Integer(1);
        assert!(row.matches_backup());
    }
}
