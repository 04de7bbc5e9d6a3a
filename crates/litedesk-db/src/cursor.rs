//! Chunked forward-only row cursor
//!
//! Lazy reader over a SELECT or a table. Rows are pulled in chunks via
//! LIMIT/OFFSET continuation so the connection lock is held only for the
//! duration of one chunk; the cursor itself keeps no statement open.

use indexmap::IndexMap;

use litedesk_core::{CoreError, Result, Value};

use crate::connection::Database;

/// One row out of the cursor.
#[derive(Debug, Clone)]
pub struct CursorRow {
    /// Values keyed by column name, in select order.
    pub values: IndexMap<String, Value>,
    /// The underlying rowid for table-backed cursors on rowid tables.
    pub rowid: Option<i64>,
}

/// Lazy forward-only cursor.
#[derive(Debug)]
pub struct RowCursor {
    /// The wrapped statement, without LIMIT/OFFSET.
    select_sql: String,
    columns: Vec<String>,
    /// Alias under which the rowid is selected, for table cursors.
    rowid_alias: Option<String>,
    offset: u64,
    exhausted: bool,
}

impl RowCursor {
    /// Cursor over an arbitrary SELECT.
    pub fn over_query(db: &Database, sql: &str) -> Result<Self> {
        let wrapped = format!("SELECT * FROM ({})", sql.trim().trim_end_matches(';'));
        let columns = db.statement_columns(&wrapped).map_err(cursor_err)?;
        Ok(Self {
            select_sql: wrapped,
            columns,
            rowid_alias: None,
            offset: 0,
            exhausted: false,
        })
    }

    /// Cursor over a whole table or view. `with_rowid` selects the rowid
    /// under a collision-free alias so edits can target PK-less rows.
    pub fn over_table(db: &Database, name: &str, with_rowid: bool) -> Result<Self> {
        let quoted = format!("\"{}\"", name.replace('"', "\"\""));
        let columns = db
            .statement_columns(&format!("SELECT * FROM {}", quoted))
            .map_err(cursor_err)?;
        let (select_sql, rowid_alias) = if with_rowid {
            // Collision-breaking: append underscores until unique.
            let mut alias = "_rowid".to_string();
            while columns.iter().any(|c| c.eq_ignore_ascii_case(&alias)) {
                alias.push('_');
            }
            (
                format!("SELECT rowid AS \"{}\", * FROM {}", alias, quoted),
                Some(alias),
            )
        } else {
            (format!("SELECT * FROM {}", quoted), None)
        };
        Ok(Self {
            select_sql,
            columns,
            rowid_alias,
            offset: 0,
            exhausted: false,
        })
    }

    /// Column names of the underlying data, the rowid alias excluded.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Rows fetched so far.
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Pull up to `n` more rows. A short chunk marks the cursor
    /// exhausted; a failed read surfaces as `CoreError::Cursor` and also
    /// ends the cursor (rows already obtained stay valid).
    pub fn fetch_chunk(&mut self, db: &Database, n: u64) -> Result<Vec<CursorRow>> {
        if self.exhausted || n == 0 {
            return Ok(Vec::new());
        }
        let sql = format!("{} LIMIT {} OFFSET {}", self.select_sql, n, self.offset);
        let output = match db.query(&sql, &[]) {
            Ok(output) => output,
            Err(e) => {
                self.exhausted = true;
                return Err(cursor_err(e));
            }
        };

        let mut rows = Vec::with_capacity(output.rows.len());
        for row in output.rows {
            let mut values = IndexMap::with_capacity(self.columns.len());
            let mut rowid = None;
            for (column, value) in output.columns.iter().zip(row) {
                if self.rowid_alias.as_deref() == Some(column.as_str()) {
                    rowid = value.as_i64();
                } else {
                    values.insert(column.clone(), value);
                }
            }
            rows.push(CursorRow { values, rowid });
        }

        if (rows.len() as u64) < n {
            self.exhausted = true;
        }
        self.offset += rows.len() as u64;
        Ok(rows)
    }
}

fn cursor_err(e: CoreError) -> CoreError {
    match e {
        CoreError::Sql(msg) | CoreError::Cursor(msg) => CoreError::Cursor(msg),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_db(rows: i64) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (a INT, b TEXT)", &[]).unwrap();
        for i in 0..rows {
            db.execute(
                "INSERT INTO t VALUES (?1, ?2)",
                &[Value::Integer(i), Value::Text(format!("row{}", i))],
            )
            .unwrap();
        }
        db
    }

    #[test]
    fn test_chunked_fetch_until_exhausted() {
        let db = seeded_db(7);
        let mut cursor = RowCursor::over_query(&db, "SELECT * FROM t ORDER BY a").unwrap();
        assert_eq!(cursor.columns(), &["a", "b"]);

        let first = cursor.fetch_chunk(&db, 3).unwrap();
        assert_eq!(first.len(), 3);
        assert!(!cursor.is_exhausted());

        let second = cursor.fetch_chunk(&db, 3).unwrap();
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].values["a"], Value::Integer(3));

        let last = cursor.fetch_chunk(&db, 3).unwrap();
        assert_eq!(last.len(), 1);
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.position(), 7);
        assert!(cursor.fetch_chunk(&db, 3).unwrap().is_empty());
    }

    #[test]
    fn test_table_cursor_carries_rowid() {
        let db = seeded_db(2);
        let mut cursor = RowCursor::over_table(&db, "t", true).unwrap();
        let rows = cursor.fetch_chunk(&db, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].rowid, Some(1));
        // The alias never leaks into the row values.
        assert_eq!(rows[0].values.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_rowid_alias_collision_breaking() {
        let db = Database::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (\"_rowid\" INT)", &[]).unwrap();
        db.execute("INSERT INTO t VALUES (42)", &[]).unwrap();
        let mut cursor = RowCursor::over_table(&db, "t", true).unwrap();
        let rows = cursor.fetch_chunk(&db, 10).unwrap();
        assert_eq!(rows[0].values["_rowid"], Value::Integer(42));
        assert_eq!(rows[0].rowid, Some(1));
    }

    #[test]
    fn test_bad_query_is_a_cursor_error() {
        let db = seeded_db(1);
        let err = RowCursor::over_query(&db, "SELECT nope FROM t").unwrap_err();
        assert!(matches!(err, CoreError::Cursor(_)));
    }
}
