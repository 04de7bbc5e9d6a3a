//! Litedesk streaming import
//!
//! Reads tabular rows out of a CSV, JSON or YAML file (CSV streams, so
//! the file may be larger than memory), maps columns onto an existing
//! or freshly created table, and inserts under a caller-controlled
//! error policy with live progress reporting and full rollback.

mod engine;
mod mapping;
mod source;

pub use engine::{ImportDecision, ImportEngine, ImportProgress, ImportReport};
pub use mapping::{ColumnMapping, ColumnSource, SheetMapping};
pub use source::{SheetInfo, SourceFile, SourceFormat, SourceInfo, SourceRow};
