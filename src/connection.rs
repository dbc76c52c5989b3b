//! Database access seams.
//!
//! The persistence core never talks to a driver directly. It prepares
//! statements on a [`Connection`] obtained from a [`ConnectionProvider`],
//! binds positional [`Value`]s and walks the resulting [`RowCursor`].

use crate::error::{OrmError, OrmResult};
use chrono::{NaiveDate, NaiveDateTime};
use relstore_sql::{ColumnType, Value};
use thiserror::Error;

/// Failure reported by the underlying driver.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct DatabaseError {
    pub message: String,
}

impl DatabaseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type DbResult<T> = Result<T, DatabaseError>;

/// Forward-only cursor over a query result.
pub trait RowCursor {
    /// Moves to the next row, returning false when the rows are exhausted.
    fn advance(&mut self) -> DbResult<bool>;

    fn column_count(&self) -> usize;

    /// Value of the 0-based column `index` in the current row.
    fn get(&self, index: usize) -> DbResult<Value>;
}

pub trait PreparedStatement {
    /// Binds the 1-based parameter `index`.
    fn bind(&mut self, index: usize, value: &Value) -> DbResult<()>;

    fn execute_query(&mut self) -> DbResult<Box<dyn RowCursor + '_>>;

    /// Runs a modifying statement and returns the affected row count.
    fn execute_update(&mut self) -> DbResult<u64>;
}

pub trait Connection {
    fn prepare(&self, sql: &str) -> DbResult<Box<dyn PreparedStatement + '_>>;

    /// Key generated by the last insert into `table`, if the database assigned one.
    fn last_insert_id(&self, table: &str, column: &str) -> DbResult<Option<Value>>;
}

/// Hands out connections for the duration of one operation. The returned
/// guard releases the connection when dropped.
pub trait ConnectionProvider: Send + Sync {
    fn connection(&self) -> DbResult<Box<dyn Connection + '_>>;
}

/// A fully materialized result, for drivers that cannot stream rows.
#[derive(Debug, Clone, Default)]
pub struct VecCursor {
    columns: usize,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
}

impl VecCursor {
    pub fn new(columns: usize, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            position: None,
        }
    }
}

impl RowCursor for VecCursor {
    fn advance(&mut self) -> DbResult<bool> {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }

    fn column_count(&self) -> usize {
        self.columns
    }

    fn get(&self, index: usize) -> DbResult<Value> {
        let row = self
            .position
            .and_then(|p| self.rows.get(p))
            .ok_or_else(|| DatabaseError::new("cursor is not positioned on a row"))?;
        row.get(index)
            .cloned()
            .ok_or_else(|| DatabaseError::new(format!("column index {} out of range", index)))
    }
}

/// Typed conversion out of a column [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: Value) -> OrmResult<Self>;
}

fn mismatch<T>(expected: &str, value: &Value) -> OrmResult<T> {
    Err(OrmError::Marshal(format!(
        "expected {}, found {} ({})",
        expected,
        value.type_name(),
        value
    )))
}

impl FromValue for Value {
    fn from_value(value: Value) -> OrmResult<Self> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Int(i) => Ok(i),
            Value::Bool(b) => Ok(i64::from(b)),
            other => mismatch("integer", &other),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> OrmResult<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| OrmError::Marshal(format!("{} does not fit in i32", wide)))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value.as_f64() {
            Some(f) => Ok(f),
            None => mismatch("number", &value),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            other => mismatch("boolean", &other),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => mismatch("text", &other),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            other => mismatch("bytes", &other),
        }
    }
}

/// Dates stored as text are parsed as `YYYY-MM-DD`.
impl FromValue for NaiveDate {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Date(d) => Ok(d),
            Value::Timestamp(ts) => Ok(ts.date()),
            Value::Text(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| OrmError::Marshal(format!("bad date '{}': {}", s, e))),
            other => mismatch("date", &other),
        }
    }
}

/// Timestamps stored as text are parsed as `YYYY-MM-DD HH:MM:SS[.fff]`.
impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            Value::Text(s) => NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
                .map_err(|e| OrmError::Marshal(format!("bad timestamp '{}': {}", s, e))),
            other => mismatch("timestamp", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> OrmResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// `value` as read from a column of `column_type`, converted to the form a
/// record's own field values take. Drivers without native date or boolean
/// storage hand those back as text or integers.
pub fn column_value(column_type: ColumnType, value: Value) -> OrmResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    Ok(match column_type {
        ColumnType::Boolean => Value::Bool(bool::from_value(value)?),
        ColumnType::Byte | ColumnType::Short | ColumnType::Integer | ColumnType::Long => {
            Value::Int(i64::from_value(value)?)
        }
        ColumnType::Float | ColumnType::Double => Value::Float(f64::from_value(value)?),
        ColumnType::String => Value::Text(String::from_value(value)?),
        ColumnType::Date => Value::Date(NaiveDate::from_value(value)?),
        ColumnType::Timestamp => Value::Timestamp(NaiveDateTime::from_value(value)?),
        ColumnType::Blob => Value::Bytes(Vec::<u8>::from_value(value)?),
        ColumnType::Time => value,
    })
}

/// By-name access to the current row of a cursor, for a select whose
/// columns are `fields` in order.
pub struct RowReader<'a> {
    cursor: &'a dyn RowCursor,
    fields: &'a [String],
}

impl<'a> RowReader<'a> {
    pub fn new(cursor: &'a dyn RowCursor, fields: &'a [String]) -> Self {
        Self { cursor, fields }
    }

    pub fn value(&self, field: &str) -> OrmResult<Value> {
        let index = self
            .fields
            .iter()
            .position(|f| f == field)
            .ok_or_else(|| OrmError::Marshal(format!("field '{}' was not selected", field)))?;
        self.cursor.get(index).map_err(|e| OrmError::Marshal(e.message))
    }

    pub fn get<T: FromValue>(&self, field: &str) -> OrmResult<T> {
        T::from_value(self.value(field)?)
            .map_err(|e| OrmError::Marshal(format!("field '{}': {}", field, e)))
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}
