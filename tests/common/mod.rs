//! Common test utilities
//!
//! Provides shared helpers for:
//! - Mapped `Person`, `Pet` and `Holiday` records
//! - A repository over an in-memory SQLite database
//! - Counting the statements a test issues

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use relstore::{
    Connection, ConnectionProvider, DbResult, FromValue, OrmError, OrmResult, PersistenceConfig,
    PersistenceContext, PersistentRecord, PreparedStatement, Repository, RowReader, SqliteProvider,
};
use relstore_sql::{ColumnType, DialectKind, FieldDef, Key, RecordType, Value};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub born: Option<NaiveDateTime>,
}

impl Person {
    pub fn new(name: &str, age: i64) -> Self {
        Person {
            id: 0,
            name: name.to_string(),
            age,
            born: None,
        }
    }
}

impl PersistentRecord for Person {
    fn describe() -> OrmResult<RecordType> {
        Ok(RecordType::builder("Person", "person")
            .field(FieldDef::new("id", ColumnType::Long))
            .field(FieldDef::new("name", ColumnType::String).length(80))
            .field(FieldDef::new("age", ColumnType::Integer))
            .field(FieldDef::new("born", ColumnType::Timestamp).nullable())
            .primary_key(["id"])
            .identity("id")
            .build()?)
    }

    fn from_row(row: &RowReader<'_>) -> OrmResult<Self> {
        Ok(Person {
            id: row.get("id")?,
            name: row.get("name")?,
            age: row.get("age")?,
            born: row.get("born")?,
        })
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.clone().into()),
            "age" => Some(self.age.into()),
            "born" => Some(self.born.into()),
            _ => None,
        }
    }

    fn set_field_value(&mut self, field: &str, value: Value) -> OrmResult<()> {
        match field {
            "id" => self.id = i64::from_value(value)?,
            "name" => self.name = String::from_value(value)?,
            "age" => self.age = i64::from_value(value)?,
            "born" => self.born = Option::<NaiveDateTime>::from_value(value)?,
            other => return Err(OrmError::Marshal(format!("Person has no field {}", other))),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pet {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
}

impl PersistentRecord for Pet {
    fn describe() -> OrmResult<RecordType> {
        Ok(RecordType::builder("Pet", "pet")
            .field(FieldDef::new("id", ColumnType::Long))
            .field(FieldDef::new("owner_id", ColumnType::Long))
            .field(FieldDef::new("name", ColumnType::String).length(40))
            .primary_key(["id"])
            .identity("id")
            .build()?)
    }

    fn from_row(row: &RowReader<'_>) -> OrmResult<Self> {
        Ok(Pet {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            name: row.get("name")?,
        })
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(self.id.into()),
            "owner_id" => Some(self.owner_id.into()),
            "name" => Some(self.name.clone().into()),
            _ => None,
        }
    }

    fn set_field_value(&mut self, field: &str, value: Value) -> OrmResult<()> {
        match field {
            "id" => self.id = i64::from_value(value)?,
            "owner_id" => self.owner_id = i64::from_value(value)?,
            "name" => self.name = String::from_value(value)?,
            other => return Err(OrmError::Marshal(format!("Pet has no field {}", other))),
        }
        Ok(())
    }
}

/// Keyed by a date, which SQLite stores as text.
#[derive(Debug, Clone, PartialEq)]
pub struct Holiday {
    pub day: NaiveDate,
    pub name: String,
    pub closed: bool,
}

impl Holiday {
    pub fn new(year: i32, month: u32, day: u32, name: &str) -> Self {
        Holiday {
            day: NaiveDate::from_ymd_opt(year, month, day).expect("valid date"),
            name: name.to_string(),
            closed: true,
        }
    }
}

impl PersistentRecord for Holiday {
    fn describe() -> OrmResult<RecordType> {
        Ok(RecordType::builder("Holiday", "holiday")
            .field(FieldDef::new("day", ColumnType::Date))
            .field(FieldDef::new("name", ColumnType::String).length(40))
            .field(FieldDef::new("closed", ColumnType::Boolean))
            .primary_key(["day"])
            .build()?)
    }

    fn from_row(row: &RowReader<'_>) -> OrmResult<Self> {
        Ok(Holiday {
            day: row.get("day")?,
            name: row.get("name")?,
            closed: row.get("closed")?,
        })
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        match field {
            "day" => Some(self.day.into()),
            "name" => Some(self.name.clone().into()),
            "closed" => Some(self.closed.into()),
            _ => None,
        }
    }

    fn set_field_value(&mut self, field: &str, value: Value) -> OrmResult<()> {
        match field {
            "day" => self.day = NaiveDate::from_value(value)?,
            "name" => self.name = String::from_value(value)?,
            "closed" => self.closed = bool::from_value(value)?,
            other => return Err(OrmError::Marshal(format!("Holiday has no field {}", other))),
        }
        Ok(())
    }
}

const SCHEMA: &str = "
    create table person (
        id integer primary key autoincrement,
        name text not null,
        age integer not null,
        born text
    );
    create table pet (
        id integer primary key autoincrement,
        owner_id integer not null,
        name text not null
    );
    create table holiday (
        day text primary key,
        name text not null,
        closed integer not null
    );
";

/// SQLite provider that records every statement it prepares.
pub struct CountingProvider {
    inner: SqliteProvider,
    statements: Mutex<Vec<String>>,
    before_fetch: Mutex<Option<String>>,
}

impl CountingProvider {
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    pub fn reset(&self) {
        self.statements.lock().clear();
    }

    /// Runs `sql` once, on the same connection, right before the next
    /// select by a list of keys.
    pub fn before_next_fetch(&self, sql: &str) {
        *self.before_fetch.lock() = Some(sql.to_string());
    }

    /// Selects issued against `table` since the last reset.
    pub fn selects_on(&self, table: &str) -> usize {
        let from = format!("from \"{}\"", table);
        self.statements
            .lock()
            .iter()
            .filter(|sql| sql.starts_with("select") && sql.contains(&from))
            .count()
    }
}

struct CountingConnection<'a> {
    inner: Box<dyn Connection + 'a>,
    statements: &'a Mutex<Vec<String>>,
    before_fetch: &'a Mutex<Option<String>>,
}

impl Connection for CountingConnection<'_> {
    fn prepare(&self, sql: &str) -> DbResult<Box<dyn PreparedStatement + '_>> {
        if sql.contains(" in (") {
            let pending = self.before_fetch.lock().take();
            if let Some(pending) = pending {
                self.inner.prepare(&pending)?.execute_update()?;
            }
        }
        self.statements.lock().push(sql.to_string());
        self.inner.prepare(sql)
    }

    fn last_insert_id(&self, table: &str, column: &str) -> DbResult<Option<Value>> {
        self.inner.last_insert_id(table, column)
    }
}

impl ConnectionProvider for CountingProvider {
    fn connection(&self) -> DbResult<Box<dyn Connection + '_>> {
        Ok(Box::new(CountingConnection {
            inner: self.inner.connection()?,
            statements: &self.statements,
            before_fetch: &self.before_fetch,
        }))
    }
}

pub struct TestDb {
    pub repo: Repository,
    pub db: Arc<CountingProvider>,
}

pub fn sqlite_config() -> PersistenceConfig {
    PersistenceConfig {
        dialect: DialectKind::Sqlite,
        ..PersistenceConfig::default()
    }
}

pub fn setup() -> TestDb {
    setup_with(sqlite_config())
}

pub fn setup_with(config: PersistenceConfig) -> TestDb {
    init_tracing();
    let inner = SqliteProvider::open_in_memory().expect("Failed to open SQLite");
    inner.execute_batch(SCHEMA).expect("Failed to create schema");
    let db = Arc::new(CountingProvider {
        inner,
        statements: Mutex::new(Vec::new()),
        before_fetch: Mutex::new(None),
    });
    let ctx = PersistenceContext::new(db.clone(), config).expect("Failed to build context");
    TestDb {
        repo: Repository::new(ctx),
        db,
    }
}

/// Inserts people in order; their ids are 1, 2, 3, ...
pub fn seed_people(repo: &Repository, people: &[(&str, i64)]) -> Vec<Person> {
    people
        .iter()
        .map(|(name, age)| {
            let mut person = Person::new(name, *age);
            repo.insert(&mut person).expect("Failed to insert person");
            person
        })
        .collect()
}

pub fn person_key(id: i64) -> Key {
    let record = Person::record_type().expect("Person mapping");
    Key::from_values(&record, vec![Value::Int(id)]).expect("valid key")
}

pub fn holiday_key(day: NaiveDate) -> Key {
    let record = Holiday::record_type().expect("Holiday mapping");
    Key::from_values(&record, vec![Value::Date(day)]).expect("valid key")
}

/// Drops every cached Person so the next read starts cold.
pub fn forget_people(repo: &Repository) {
    repo.context().cache().clear("person", true);
    repo.context().cache().clear("personQuery", true);
}
