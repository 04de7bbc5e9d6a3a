//! Sheet-to-table mapping

use serde::{Deserialize, Serialize};

/// Where a target column takes its data from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnSource {
    /// Cell position, for positional sheets.
    Index(usize),
    /// Field name, for named sheets (or a positional sheet with a
    /// header row).
    Name(String),
}

/// One source-to-target column assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source: ColumnSource,
    pub target: String,
}

impl ColumnMapping {
    pub fn by_index(index: usize, target: impl Into<String>) -> Self {
        Self {
            source: ColumnSource::Index(index),
            target: target.into(),
        }
    }

    pub fn by_name(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: ColumnSource::Name(name.into()),
            target: target.into(),
        }
    }
}

/// How one sheet lands in one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetMapping {
    /// Source sheet name.
    pub sheet: String,
    /// Target table, existing or to be created.
    pub target_table: String,
    /// Create the target table first.
    pub create_table: bool,
    pub columns: Vec<ColumnMapping>,
    /// Name of an auto-increment primary key column to add to a newly
    /// created table.
    pub add_pk: Option<String>,
    /// Consume the first positional row as column names.
    pub header_row: bool,
}

impl SheetMapping {
    /// Append-into-existing-table mapping.
    pub fn into_existing(
        sheet: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<ColumnMapping>,
    ) -> Self {
        Self {
            sheet: sheet.into(),
            target_table: table.into(),
            create_table: false,
            columns,
            add_pk: None,
            header_row: false,
        }
    }

    /// Create-and-fill mapping.
    pub fn into_new_table(
        sheet: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<ColumnMapping>,
    ) -> Self {
        Self {
            sheet: sheet.into(),
            target_table: table.into(),
            create_table: true,
            columns,
            add_pk: None,
            header_row: false,
        }
    }

    pub fn with_header_row(mut self) -> Self {
        self.header_row = true;
        self
    }

    pub fn with_auto_pk(mut self, name: impl Into<String>) -> Self {
        self.add_pk = Some(name.into());
        self
    }
}
