//! Litedesk Core - shared types for the SQLite editor engine
//!
//! This crate provides the fundamental types that all other litedesk
//! crates depend on:
//!
//! - `Value` - the SQLite scalar with affinity-aware coercion
//! - `SchemaEntity` and the parsed `ObjectMeta` variants
//! - `CoreError` - the common error taxonomy

mod error;
mod schema;
mod value;

pub use error::*;
pub use schema::*;
pub use value::*;
