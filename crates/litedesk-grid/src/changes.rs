//! Serializable uncommitted-change snapshots
//!
//! `GridModel::get_changes` captures the current edit state so it can
//! survive a reload of the grid; `set_changes` replays it onto a fresh
//! grid over the same data.

use indexmap::IndexMap;
use litedesk_core::Value;
use serde::{Deserialize, Serialize};

/// A changed row: its edited values plus the pre-edit snapshot used to
/// relocate it after a reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedRow {
    pub values: IndexMap<String, Value>,
    pub backup: IndexMap<String, Value>,
    pub rowid: Option<i64>,
}

/// A deleted row, identified by its values or rowid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedRow {
    pub values: IndexMap<String, Value>,
    pub rowid: Option<i64>,
}

/// The full uncommitted state of a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChangeSnapshot {
    pub new: Vec<IndexMap<String, Value>>,
    pub changed: Vec<ChangedRow>,
    pub deleted: Vec<DeletedRow>,
}

impl ChangeSnapshot {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }
}
