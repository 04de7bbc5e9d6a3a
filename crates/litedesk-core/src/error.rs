//! Error types for litedesk

use thiserror::Error;

/// Location-carrying SQL parse failure.
///
/// Lives in core (rather than the grammar crate) so that catalog entries
/// can record why their statement failed to parse without a dependency
/// on the parser itself.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParseError {
    /// 1-based line of the offending token.
    pub line: usize,
    /// 1-based column of the offending token.
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}:{}: {}", self.line, self.column, self.message)
    }
}

/// Core error type for litedesk operations
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Parse error: {0}")]
    Parse(ParseError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("SQL error: {0}")]
    Sql(String),

    #[error("Cursor error: {0}")]
    Cursor(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("{0} is currently in use by {1}")]
    Conflict(String, String),

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Validation failure listing the offending names, formatted for a modal.
    pub fn validation_list(what: impl Into<String>, offenders: &[String]) -> Self {
        CoreError::Validation(format!("{}: {}", what.into(), offenders.join(", ")))
    }
}

impl From<ParseError> for CoreError {
    fn from(e: ParseError) -> Self {
        CoreError::Parse(e)
    }
}

/// Result type alias for litedesk operations
pub type Result<T> = std::result::Result<T, CoreError>;
