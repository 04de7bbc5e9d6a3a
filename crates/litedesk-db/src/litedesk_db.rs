//! Litedesk database layer
//!
//! Wraps the single blocking SQLite connection, provides the chunked
//! forward-only row cursor, the schema catalog reflected from
//! `sqlite_master`, and the in-memory lock registry that serializes
//! structural edits per object.

mod catalog;
mod connection;
mod cursor;
mod locks;

pub use catalog::{RelatedEntities, SchemaCatalog, SqlRewrites};
pub use connection::{Database, QueryOutput};
pub use cursor::{CursorRow, RowCursor};
pub use locks::LockRegistry;
