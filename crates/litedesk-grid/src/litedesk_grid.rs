//! Litedesk grid data model
//!
//! An incrementally materialised, filterable, sortable, editable view
//! over a query result or a table. Uncommitted edits are tracked per row
//! with full rollback; commit applies them to the database in a
//! deterministic order.

mod changes;
mod model;
mod record;

pub use changes::{ChangeSnapshot, ChangedRow, DeletedRow};
pub use model::{CommitOutcome, GridModel, RowCountKind, MAX_ROWS, SEEK_CHUNK};
pub use record::{RowRecord, RowState};
