//! SQLite DDL grammar
//!
//! Bidirectional: `parse` turns a CREATE statement into an `ObjectMeta`
//! tree, `generate` renders canonical DDL text from a tree, `transform`
//! rewrites a statement under a rename map while leaving comments,
//! whitespace and quoting untouched.
//!
//! The grammar is hand-written recursive descent over a lossless token
//! stream: whitespace and comments are real tokens, which is what lets
//! `transform` re-emit everything it does not rename byte-for-byte.

mod generate;
mod lexer;
mod parser;
mod transform;

pub use generate::{canonical_sql, column_def_sql, generate};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{parse, parse_as};
pub use transform::{RenameMap, transform};
