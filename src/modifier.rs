//! Write path.
//!
//! A [`Modifier`] is run by
//! [`PersistenceContext::invoke_modifier`](crate::PersistenceContext::invoke_modifier),
//! which invalidates before the statement executes and caches
//! [`Modifier::cached_result`] only after it succeeded.

use crate::cache::{CacheInvalidator, CachedValue, WhereInvalidator};
use crate::connection::Connection;
use crate::context::PersistenceContext;
use crate::error::{OrmError, OrmResult};
use crate::marshaller::{Marshaller, PersistentRecord};
use relstore_sql::{
    build_delete, build_insert, build_update, DeleteClause, Expression, Key, RecordRef, UpdateClause,
    WhereClause,
};

pub trait Modifier {
    fn record_type(&self) -> &RecordRef;

    /// Run against the cache before the statement executes.
    fn invalidator(&self) -> Option<Box<dyn CacheInvalidator + '_>> {
        None
    }

    /// Executes the statement, returning the affected row count.
    fn invoke(&mut self, ctx: &PersistenceContext, conn: &dyn Connection) -> OrmResult<u64>;

    /// Record to cache after a successful invoke.
    fn cached_result(&self) -> Option<(Key, CachedValue)> {
        None
    }
}

fn insert_record<T: PersistentRecord>(
    marshaller: &Marshaller<T>,
    ctx: &PersistenceContext,
    conn: &dyn Connection,
    record: &mut T,
) -> OrmResult<u64> {
    let stmt = build_insert(ctx.dialect(), &marshaller.insert_clause(record)?)?;
    let count = ctx.execute(conn, &stmt, "insert", marshaller.table_name())?;
    marshaller.assign_primary_key(conn, record)?;
    Ok(count)
}

fn update_record<T: PersistentRecord>(
    marshaller: &Marshaller<T>,
    ctx: &PersistenceContext,
    conn: &dyn Connection,
    record: &T,
    key: &Key,
    fields: &[String],
) -> OrmResult<u64> {
    let clause = UpdateClause::new(
        marshaller.record_type(),
        WhereClause::Key(key.clone()),
        fields.to_vec(),
        marshaller.update_values(record, fields)?,
    )?;
    let stmt = build_update(ctx.dialect(), &clause)?;
    ctx.execute(conn, &stmt, "update", marshaller.table_name())
}

fn writable<T: PersistentRecord>(marshaller: &Marshaller<T>) -> OrmResult<()> {
    if marshaller.record_type().is_computed() {
        return Err(OrmError::InvalidArgument(format!(
            "{} is computed and can't be written",
            marshaller.record_type().name()
        )));
    }
    Ok(())
}

/// Inserts a record. A database-assigned identity is copied back into it.
pub struct Insert<T> {
    marshaller: Marshaller<T>,
    record: T,
    inserted: bool,
}

impl<T: PersistentRecord> Insert<T> {
    pub fn new(record: T) -> OrmResult<Self> {
        let marshaller = Marshaller::new()?;
        writable(&marshaller)?;
        Ok(Self {
            marshaller,
            record,
            inserted: false,
        })
    }

    pub fn into_record(self) -> T {
        self.record
    }
}

impl<T: PersistentRecord> Modifier for Insert<T> {
    fn record_type(&self) -> &RecordRef {
        self.marshaller.record_type()
    }

    fn invoke(&mut self, ctx: &PersistenceContext, conn: &dyn Connection) -> OrmResult<u64> {
        let count = insert_record(&self.marshaller, ctx, conn, &mut self.record)?;
        self.inserted = count > 0;
        Ok(count)
    }

    fn cached_result(&self) -> Option<(Key, CachedValue)> {
        if !self.inserted {
            return None;
        }
        let key = self.marshaller.primary_key(&self.record)?;
        Some((key, CachedValue::of(self.record.clone())))
    }
}

/// Updates a record by its primary key: every non-key field, or a chosen
/// subset. Only whole-record updates are cached afterwards.
pub struct Update<T> {
    marshaller: Marshaller<T>,
    record: T,
    key: Key,
    fields: Vec<String>,
    whole: bool,
    updated: bool,
}

impl<T: PersistentRecord> Update<T> {
    pub fn new(record: T) -> OrmResult<Self> {
        let marshaller = Marshaller::<T>::new()?;
        let fields = marshaller.updatable_fields();
        Self::build(marshaller, record, fields, true)
    }

    pub fn with_fields(record: T, fields: &[&str]) -> OrmResult<Self> {
        let marshaller = Marshaller::<T>::new()?;
        let fields = fields.iter().map(|f| f.to_string()).collect();
        Self::build(marshaller, record, fields, false)
    }

    fn build(marshaller: Marshaller<T>, record: T, fields: Vec<String>, whole: bool) -> OrmResult<Self> {
        writable(&marshaller)?;
        let key = marshaller.row_key(&record)?;
        if fields.is_empty() {
            return Err(OrmError::InvalidArgument(format!(
                "{} has no fields to update",
                marshaller.record_type().name()
            )));
        }
        Ok(Self {
            marshaller,
            record,
            key,
            fields,
            whole,
            updated: false,
        })
    }
}

impl<T: PersistentRecord> Modifier for Update<T> {
    fn record_type(&self) -> &RecordRef {
        self.marshaller.record_type()
    }

    fn invalidator(&self) -> Option<Box<dyn CacheInvalidator + '_>> {
        Some(Box::new(self.key.clone()))
    }

    fn invoke(&mut self, ctx: &PersistenceContext, conn: &dyn Connection) -> OrmResult<u64> {
        let count = update_record(&self.marshaller, ctx, conn, &self.record, &self.key, &self.fields)?;
        self.updated = count > 0;
        Ok(count)
    }

    fn cached_result(&self) -> Option<(Key, CachedValue)> {
        (self.whole && self.updated).then(|| (self.key.clone(), CachedValue::of(self.record.clone())))
    }
}

/// Sets fields to expressions on every row matching a WHERE clause. The
/// affected records are invalidated, never cached.
pub struct UpdatePartial {
    clause: UpdateClause,
}

impl UpdatePartial {
    pub fn new(
        record: &RecordRef,
        where_clause: WhereClause,
        fields: Vec<String>,
        values: Vec<Expression>,
    ) -> OrmResult<Self> {
        Ok(Self {
            clause: UpdateClause::new(record, where_clause, fields, values)?,
        })
    }
}

impl Modifier for UpdatePartial {
    fn record_type(&self) -> &RecordRef {
        &self.clause.record
    }

    fn invalidator(&self) -> Option<Box<dyn CacheInvalidator + '_>> {
        Some(Box::new(WhereInvalidator::new(
            &self.clause.record,
            &self.clause.where_clause,
        )))
    }

    fn invoke(&mut self, ctx: &PersistenceContext, conn: &dyn Connection) -> OrmResult<u64> {
        let stmt = build_update(ctx.dialect(), &self.clause)?;
        ctx.execute(conn, &stmt, "update", self.clause.record.table())
    }
}

/// Partial update whose values are SQL fragments, e.g. `visits + 1`.
pub struct UpdateLiteral {
    inner: UpdatePartial,
}

impl UpdateLiteral {
    pub fn new(
        record: &RecordRef,
        where_clause: WhereClause,
        fields: Vec<String>,
        literals: &[&str],
    ) -> OrmResult<Self> {
        let values = literals.iter().map(|sql| Expression::literal(sql)).collect();
        Ok(Self {
            inner: UpdatePartial::new(record, where_clause, fields, values)?,
        })
    }
}

impl Modifier for UpdateLiteral {
    fn record_type(&self) -> &RecordRef {
        self.inner.record_type()
    }

    fn invalidator(&self) -> Option<Box<dyn CacheInvalidator + '_>> {
        self.inner.invalidator()
    }

    fn invoke(&mut self, ctx: &PersistenceContext, conn: &dyn Connection) -> OrmResult<u64> {
        self.inner.invoke(ctx, conn)
    }
}

/// Update-or-insert. A record with a key is updated; when that matches no
/// row, or the record has no key yet, it is inserted.
pub struct Store<T> {
    marshaller: Marshaller<T>,
    record: T,
    stored: Option<Key>,
}

impl<T: PersistentRecord> Store<T> {
    pub fn new(record: T) -> OrmResult<Self> {
        let marshaller = Marshaller::new()?;
        writable(&marshaller)?;
        Ok(Self {
            marshaller,
            record,
            stored: None,
        })
    }

    pub fn into_record(self) -> T {
        self.record
    }
}

impl<T: PersistentRecord> Modifier for Store<T> {
    fn record_type(&self) -> &RecordRef {
        self.marshaller.record_type()
    }

    fn invalidator(&self) -> Option<Box<dyn CacheInvalidator + '_>> {
        let key = self.marshaller.primary_key(&self.record)?;
        Some(Box::new(key))
    }

    fn invoke(&mut self, ctx: &PersistenceContext, conn: &dyn Connection) -> OrmResult<u64> {
        if let Some(key) = self.marshaller.primary_key(&self.record) {
            // key-only records "update" their key to itself to test existence
            let mut fields = self.marshaller.updatable_fields();
            if fields.is_empty() {
                fields = self.marshaller.primary_key_fields().to_vec();
            }
            let count = update_record(&self.marshaller, ctx, conn, &self.record, &key, &fields)?;
            if count > 0 {
                self.stored = Some(key);
                return Ok(count);
            }
            tracing::debug!("{} matched no row, inserting", key);
        }
        let count = insert_record(&self.marshaller, ctx, conn, &mut self.record)?;
        if count > 0 {
            self.stored = self.marshaller.primary_key(&self.record);
        }
        Ok(count)
    }

    fn cached_result(&self) -> Option<(Key, CachedValue)> {
        let key = self.stored.clone()?;
        Some((key, CachedValue::of(self.record.clone())))
    }
}

/// Deletes every row matching a WHERE clause.
pub struct Delete {
    clause: DeleteClause,
}

impl Delete {
    pub fn new(record: &RecordRef, where_clause: WhereClause) -> Self {
        Self {
            clause: DeleteClause::new(record, where_clause),
        }
    }
}

impl Modifier for Delete {
    fn record_type(&self) -> &RecordRef {
        &self.clause.record
    }

    fn invalidator(&self) -> Option<Box<dyn CacheInvalidator + '_>> {
        Some(Box::new(WhereInvalidator::new(
            &self.clause.record,
            &self.clause.where_clause,
        )))
    }

    fn invoke(&mut self, ctx: &PersistenceContext, conn: &dyn Connection) -> OrmResult<u64> {
        let stmt = build_delete(ctx.dialect(), &self.clause)?;
        ctx.execute(conn, &stmt, "delete", self.clause.record.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheAdapter, CacheCategory, CacheKey, InMemoryCache};
    use crate::config::PersistenceConfig;
    use crate::connection::{
        ConnectionProvider, DatabaseError, DbResult, PreparedStatement, RowCursor, RowReader,
    };
    use parking_lot::Mutex;
    use relstore_sql::{ColumnType, DialectKind, FieldDef, RecordType, Value};
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Clone, Debug, PartialEq)]
    struct Counter {
        id: i64,
        hits: i64,
    }

    impl PersistentRecord for Counter {
        fn describe() -> OrmResult<RecordType> {
            Ok(RecordType::builder("Counter", "counter")
                .field(FieldDef::new("id", ColumnType::Long))
                .field(FieldDef::new("hits", ColumnType::Long))
                .primary_key(["id"])
                .identity("id")
                .build()?)
        }

        fn from_row(row: &RowReader<'_>) -> OrmResult<Self> {
            Ok(Counter {
                id: row.get("id")?,
                hits: row.get("hits")?,
            })
        }

        fn field_value(&self, field: &str) -> Option<Value> {
            match field {
                "id" => Some(self.id.into()),
                "hits" => Some(self.hits.into()),
                _ => None,
            }
        }

        fn set_field_value(&mut self, field: &str, value: Value) -> OrmResult<()> {
            let v = value
                .as_i64()
                .ok_or_else(|| OrmError::Marshal(format!("{} is not an integer", value)))?;
            match field {
                "id" => self.id = v,
                "hits" => self.hits = v,
                _ => {}
            }
            Ok(())
        }
    }

    /// Answers each update with the next scripted row count and records SQL.
    #[derive(Default)]
    struct Scripted {
        counts: Mutex<VecDeque<u64>>,
        log: Mutex<Vec<String>>,
    }

    struct ScriptedStatement<'a> {
        db: &'a Scripted,
    }

    impl PreparedStatement for ScriptedStatement<'_> {
        fn bind(&mut self, _index: usize, _value: &Value) -> DbResult<()> {
            Ok(())
        }

        fn execute_query(&mut self) -> DbResult<Box<dyn RowCursor + '_>> {
            Err(DatabaseError::new("no queries here"))
        }

        fn execute_update(&mut self) -> DbResult<u64> {
            self.db
                .counts
                .lock()
                .pop_front()
                .ok_or_else(|| DatabaseError::new("unexpected statement"))
        }
    }

    struct ScriptedConnection<'a> {
        db: &'a Scripted,
    }

    impl Connection for ScriptedConnection<'_> {
        fn prepare(&self, sql: &str) -> DbResult<Box<dyn PreparedStatement + '_>> {
            self.db.log.lock().push(sql.to_string());
            Ok(Box::new(ScriptedStatement { db: self.db }))
        }

        fn last_insert_id(&self, _table: &str, _column: &str) -> DbResult<Option<Value>> {
            Ok(Some(Value::Int(77)))
        }
    }

    impl ConnectionProvider for Scripted {
        fn connection(&self) -> DbResult<Box<dyn Connection + '_>> {
            Ok(Box::new(ScriptedConnection { db: self }))
        }
    }

    fn context(counts: &[u64]) -> (Arc<Scripted>, Arc<InMemoryCache>, PersistenceContext) {
        let db = Arc::new(Scripted::default());
        db.counts.lock().extend(counts.iter().copied());
        let cache = Arc::new(InMemoryCache::default());
        let config = PersistenceConfig {
            dialect: DialectKind::Sqlite,
            ..PersistenceConfig::default()
        };
        let ctx = PersistenceContext::with_cache(db.clone(), config, cache.clone()).unwrap();
        (db, cache, ctx)
    }

    #[test]
    fn test_store_falls_back_to_insert() {
        let (db, cache, ctx) = context(&[0, 1]);
        let mut store = Store::new(Counter { id: 5, hits: 1 }).unwrap();
        assert_eq!(ctx.invoke_modifier(&mut store).unwrap(), 1);
        assert_eq!(
            *db.log.lock(),
            vec![
                r#"update "counter" set "hits" = ? where ("id" = ?)"#.to_string(),
                r#"insert into "counter" ("id", "hits") values (?, ?)"#.to_string(),
            ]
        );
        let key = store.cached_result().unwrap().0;
        assert!(cache.lookup(&key.cache_id(), &key.cache_key()).is_some());
    }

    #[test]
    fn test_store_without_key_inserts() {
        let (db, _cache, ctx) = context(&[1]);
        let mut store = Store::new(Counter { id: 0, hits: 3 }).unwrap();
        ctx.invoke_modifier(&mut store).unwrap();
        assert_eq!(db.log.lock().len(), 1);
        assert_eq!(store.into_record(), Counter { id: 77, hits: 3 });
    }

    #[test]
    fn test_failed_update_leaves_entry_invalidated() {
        let (_db, cache, ctx) = context(&[]);
        let counter = Counter { id: 5, hits: 1 };
        let key = Marshaller::<Counter>::new().unwrap().row_key(&counter).unwrap();
        cache.store(CacheCategory::Record, &key.cache_id(), key.cache_key(), CachedValue::of(counter.clone()));

        let mut update = Update::new(counter).unwrap();
        assert!(ctx.invoke_modifier(&mut update).is_err());
        assert!(cache.lookup(&key.cache_id(), &key.cache_key()).is_none());
    }

    #[test]
    fn test_partial_update_is_not_cached() {
        let (_db, cache, ctx) = context(&[1]);
        let record = Counter::record_type().unwrap();
        let key = Key::from_values(&record, vec![Value::Int(5)]).unwrap();
        let mut update = UpdateLiteral::new(
            &record,
            WhereClause::Key(key.clone()),
            vec!["hits".to_string()],
            &["hits + 1"],
        )
        .unwrap();
        assert_eq!(ctx.invoke_modifier(&mut update).unwrap(), 1);
        assert!(update.cached_result().is_none());
        assert!(cache.lookup(&key.cache_id(), &key.cache_key()).is_none());
    }

    #[test]
    fn test_update_needs_key() {
        assert!(matches!(
            Update::new(Counter { id: 0, hits: 1 }),
            Err(OrmError::InvalidArgument(_))
        ));
    }
}
