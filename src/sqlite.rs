//! Connection adapter over a single `rusqlite` connection.
//!
//! Operations are serialized on the connection's mutex; the guard handed
//! out by [`SqliteProvider::connection`] holds it until dropped. Result rows
//! are read eagerly.

use crate::connection::{
    Connection, ConnectionProvider, DatabaseError, DbResult, PreparedStatement, RowCursor, VecCursor,
};
use crate::error::{OrmError, OrmResult};
use parking_lot::{Mutex, MutexGuard};
use relstore_sql::Value;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use std::path::Path;

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        DatabaseError::new(e.to_string())
    }
}

pub struct SqliteProvider {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteProvider {
    pub fn open_in_memory() -> OrmResult<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(|e| OrmError::Connection(e.into()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn open(path: impl AsRef<Path>) -> OrmResult<Self> {
        let path = path.as_ref();
        let conn = rusqlite::Connection::open(path).map_err(|e| OrmError::Connection(e.into()))?;
        tracing::info!("Opened SQLite database at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Runs semicolon-separated statements, e.g. a schema.
    pub fn execute_batch(&self, sql: &str) -> OrmResult<()> {
        self.conn
            .lock()
            .execute_batch(sql)
            .map_err(|e| OrmError::Connection(e.into()))
    }
}

impl ConnectionProvider for SqliteProvider {
    fn connection(&self) -> DbResult<Box<dyn Connection + '_>> {
        Ok(Box::new(SqliteConnection {
            guard: self.conn.lock(),
        }))
    }
}

struct SqliteConnection<'a> {
    guard: MutexGuard<'a, rusqlite::Connection>,
}

impl Connection for SqliteConnection<'_> {
    fn prepare(&self, sql: &str) -> DbResult<Box<dyn PreparedStatement + '_>> {
        Ok(Box::new(SqliteStatement {
            stmt: self.guard.prepare(sql)?,
        }))
    }

    fn last_insert_id(&self, _table: &str, _column: &str) -> DbResult<Option<Value>> {
        let id = self.guard.last_insert_rowid();
        Ok((id != 0).then_some(Value::Int(id)))
    }
}

struct SqliteStatement<'c> {
    stmt: rusqlite::Statement<'c>,
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::Date(d) => SqliteValue::Text(d.format("%Y-%m-%d").to_string()),
        Value::Timestamp(ts) => SqliteValue::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

impl PreparedStatement for SqliteStatement<'_> {
    fn bind(&mut self, index: usize, value: &Value) -> DbResult<()> {
        self.stmt.raw_bind_parameter(index, to_sqlite(value))?;
        Ok(())
    }

    fn execute_query(&mut self) -> DbResult<Box<dyn RowCursor + '_>> {
        let columns = self.stmt.column_count();
        let mut rows = self.stmt.raw_query();
        let mut materialized = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..columns)
                .map(|i| row.get_ref(i).map(from_sqlite))
                .collect::<Result<Vec<_>, _>>()?;
            materialized.push(values);
        }
        Ok(Box::new(VecCursor::new(columns, materialized)))
    }

    fn execute_update(&mut self) -> DbResult<u64> {
        Ok(self.stmt.raw_execute()? as u64)
    }
}
