//! SQLite connection wrapper
//!
//! One blocking rusqlite connection behind a mutex. Every litedesk
//! subsystem shares a clone of `Database`; a method holds the lock only
//! for its own duration, which is what makes chunked cursor pulls
//! interleave with UI-thread edits.

use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, InterruptHandle, OpenFlags};
use std::sync::Arc;

use litedesk_core::{CoreError, Result, Value};

/// Fully materialized query result, used for catalog and metadata work.
/// Grid data goes through `RowCursor` instead.
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryOutput {
    /// First value of the first row, if any.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.first())
    }
}

/// Shared handle to the SQLite database
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<RusqliteConnection>>,
    interrupt_handle: Arc<InterruptHandle>,
}

impl Database {
    /// Open a database file, creating it when missing.
    pub fn open(path: &str) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = RusqliteConnection::open_with_flags(path, flags)
            .map_err(|e| CoreError::Sql(format!("Failed to open database '{}': {}", path, e)))?;
        Ok(Self::wrap(conn))
    }

    /// Open a fresh in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = RusqliteConnection::open_in_memory()
            .map_err(|e| CoreError::Sql(format!("Failed to open in-memory database: {}", e)))?;
        Ok(Self::wrap(conn))
    }

    fn wrap(conn: RusqliteConnection) -> Self {
        let interrupt_handle = Arc::new(conn.get_interrupt_handle());
        Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt_handle,
        }
    }

    /// Interrupt whatever statement is currently running; it fails with
    /// SQLITE_INTERRUPT. Callable from any thread.
    pub fn interrupt(&self) {
        tracing::debug!("interrupting running statement");
        self.interrupt_handle.interrupt();
    }

    /// Execute a non-query statement, returning the affected row count.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(sql_err)?;
        stmt.execute(rusqlite::params_from_iter(params.iter().map(to_sql_value)))
            .map_err(sql_err)
    }

    /// Execute a query, materializing every row.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<QueryOutput> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(sql_err)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter().map(to_sql_value)))
            .map_err(sql_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(sql_err)? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(from_sql_ref(row.get_ref(i).map_err(sql_err)?));
            }
            out.push(values);
        }
        Ok(QueryOutput { columns, rows: out })
    }

    /// Single scalar convenience.
    pub fn query_value(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        Ok(self.query(sql, params)?.scalar().cloned())
    }

    /// Execute a multi-statement script.
    pub fn execute_script(&self, sql: &str) -> Result<()> {
        tracing::debug!("executing SQL script");
        let conn = self.conn.lock();
        conn.execute_batch(sql).map_err(sql_err)
    }

    /// Column names of a statement without running it.
    pub fn statement_columns(&self, sql: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let stmt = conn.prepare(sql).map_err(sql_err)?;
        Ok(stmt.column_names().iter().map(|c| c.to_string()).collect())
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.lock().last_insert_rowid()
    }

    pub fn savepoint(&self, name: &str) -> Result<()> {
        self.execute(&format!("SAVEPOINT \"{}\"", name), &[]).map(|_| ())
    }

    pub fn release(&self, name: &str) -> Result<()> {
        self.execute(&format!("RELEASE SAVEPOINT \"{}\"", name), &[])
            .map(|_| ())
    }

    pub fn rollback_to(&self, name: &str) -> Result<()> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT \"{}\"", name), &[])
            .map(|_| ())
    }

    /// Read a pragma value.
    pub fn pragma(&self, name: &str) -> Result<Option<Value>> {
        self.query_value(&format!("PRAGMA {}", name), &[])
    }

    /// Set a pragma value.
    pub fn set_pragma(&self, name: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.pragma_update(None, name, value).map_err(sql_err)
    }

    /// The linked SQLite version as a number, e.g. 3045001.
    pub fn sqlite_version_number(&self) -> i32 {
        rusqlite::version_number()
    }
}

fn sql_err(e: rusqlite::Error) -> CoreError {
    CoreError::Sql(e.to_string())
}

/// Convert a litedesk value into the rusqlite owned value.
pub(crate) fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(v) => rusqlite::types::Value::Integer(*v),
        Value::Real(v) => rusqlite::types::Value::Real(*v),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Blob(b) => rusqlite::types::Value::Blob(b.clone()),
    }
}

/// Convert a rusqlite value reference into the litedesk value.
pub(crate) fn from_sql_ref(value: rusqlite::types::ValueRef<'_>) -> Value {
    match value {
        rusqlite::types::ValueRef::Null => Value::Null,
        rusqlite::types::ValueRef::Integer(v) => Value::Integer(v),
        rusqlite::types::ValueRef::Real(v) => Value::Real(v),
        rusqlite::types::ValueRef::Text(t) => {
            Value::Text(String::from_utf8_lossy(t).into_owned())
        }
        rusqlite::types::ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}
