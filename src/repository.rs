//! Typed entry point for reads and writes.

use crate::connection::RowReader;
use crate::context::PersistenceContext;
use crate::error::{OrmError, OrmResult};
use crate::marshaller::{Marshaller, PersistentRecord};
use crate::modifier::{Delete, Insert, Store, Update, UpdateLiteral, UpdatePartial};
use crate::query::{CacheStrategy, Explicit, FindKeys, FindOne, WithCache, WithKeys};
use relstore_sql::{
    ColumnType, Expression, FieldDef, FieldOverride, FromOverride, GroupBy, Join, Key, KeyProjection,
    Limit, OrderBy, QueryClause, RecordType, SelectClause, Value, WhereClause,
};
use std::marker::PhantomData;
use std::sync::Arc;

fn split<V>(changes: Vec<(&str, V)>) -> (Vec<String>, Vec<V>) {
    changes.into_iter().map(|(f, v)| (f.to_string(), v)).unzip()
}

#[derive(Clone)]
pub struct Repository {
    ctx: Arc<PersistenceContext>,
}

impl Repository {
    pub fn new(ctx: PersistenceContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn from_context(ctx: Arc<PersistenceContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PersistenceContext {
        &self.ctx
    }

    /// Record with primary key `key`, from the cache when possible.
    pub fn load<T: PersistentRecord>(&self, key: &Key) -> OrmResult<Option<T>> {
        let mut query = FindOne::<T>::by_key(key.clone())?;
        self.ctx.invoke(&mut query)
    }

    /// First record matching `where_clause`.
    pub fn load_where<T: PersistentRecord>(&self, where_clause: impl Into<WhereClause>) -> OrmResult<Option<T>> {
        let record = T::record_type()?;
        let select = SelectClause::all_fields(&record, [QueryClause::Where(where_clause.into())])?;
        self.ctx.invoke(&mut FindOne::<T>::new(select)?)
    }

    pub fn find_all<T: PersistentRecord>(&self, clauses: Vec<QueryClause>) -> OrmResult<Vec<T>> {
        self.find_all_with(clauses, CacheStrategy::default())
    }

    /// Runs the clauses two-phase when they can be answered by key columns
    /// alone and `strategy` allows it, in a single pass otherwise.
    pub fn find_all_with<T: PersistentRecord>(
        &self,
        clauses: Vec<QueryClause>,
        strategy: CacheStrategy,
    ) -> OrmResult<Vec<T>> {
        let record = T::record_type()?;
        let single_pass = match (strategy, KeyProjection::obstacle(&record, &clauses)) {
            (CacheStrategy::None, _) => true,
            (_, Some(reason)) => {
                tracing::debug!("Loading {} in a single pass: {}", record.name(), reason);
                true
            }
            (_, None) => false,
        };
        if single_pass {
            let select = SelectClause::all_fields(&record, clauses)?;
            return self.ctx.invoke(&mut Explicit::<T>::new(select)?);
        }
        let projection = KeyProjection::new(&record, clauses)?;
        self.ctx
            .invoke(&mut WithCache::<T>::new(projection, strategy.keyset_category())?)
    }

    /// Records for `keys`, in that order. Missing rows are left out.
    pub fn load_all<T: PersistentRecord>(&self, keys: Vec<Key>) -> OrmResult<Vec<T>> {
        self.ctx.invoke(&mut WithKeys::<T>::new(keys)?)
    }

    pub fn find_all_keys<T: PersistentRecord>(&self, clauses: Vec<QueryClause>) -> OrmResult<Vec<Key>> {
        self.find_keys_with::<T>(clauses, CacheStrategy::default())
    }

    fn find_keys_with<T: PersistentRecord>(
        &self,
        clauses: Vec<QueryClause>,
        strategy: CacheStrategy,
    ) -> OrmResult<Vec<Key>> {
        let projection = KeyProjection::new(&T::record_type()?, clauses)?;
        self.ctx
            .invoke(&mut FindKeys::<T>::new(projection, strategy.keyset_category())?)
    }

    /// Number of `T` rows matching the clauses.
    pub fn select_count<T: PersistentRecord>(&self, mut clauses: Vec<QueryClause>) -> OrmResult<i64> {
        let target = T::record_type()?;
        let count = RowCount::record_type()?;
        clauses.push(FieldOverride::new("count", Expression::count_all()).into());
        clauses.push(FromOverride::new(&[&target]).into());
        let select = SelectClause::all_fields(&count, clauses)?;
        let rows = self.ctx.invoke(&mut Explicit::<RowCount>::new(select)?)?;
        Ok(rows.first().map_or(0, |c| c.0))
    }

    /// Inserts `record`, copying a database-assigned key back into it.
    pub fn insert<T: PersistentRecord>(&self, record: &mut T) -> OrmResult<u64> {
        let mut insert = Insert::new(record.clone())?;
        let count = self.ctx.invoke_modifier(&mut insert)?;
        *record = insert.into_record();
        Ok(count)
    }

    pub fn update<T: PersistentRecord>(&self, record: &T) -> OrmResult<u64> {
        self.ctx.invoke_modifier(&mut Update::new(record.clone())?)
    }

    /// Writes only `fields` of `record`.
    pub fn update_fields<T: PersistentRecord>(&self, record: &T, fields: &[&str]) -> OrmResult<u64> {
        self.ctx
            .invoke_modifier(&mut Update::with_fields(record.clone(), fields)?)
    }

    /// Sets fields of the row with primary key `key`.
    pub fn update_partial(&self, key: &Key, changes: Vec<(&str, Value)>) -> OrmResult<u64> {
        let (fields, values) = split(changes);
        let values = values.into_iter().map(Expression::Value).collect();
        let mut update = UpdatePartial::new(key.record_type(), WhereClause::Key(key.clone()), fields, values)?;
        self.ctx.invoke_modifier(&mut update)
    }

    /// Sets fields to expressions on every `T` row matching `where_clause`.
    pub fn update_partial_where<T: PersistentRecord>(
        &self,
        where_clause: impl Into<WhereClause>,
        changes: Vec<(&str, Expression)>,
    ) -> OrmResult<u64> {
        let (fields, values) = split(changes);
        let mut update = UpdatePartial::new(&T::record_type()?, where_clause.into(), fields, values)?;
        self.ctx.invoke_modifier(&mut update)
    }

    /// Like [`Repository::update_partial_where`] with raw SQL values.
    pub fn update_literal<T: PersistentRecord>(
        &self,
        where_clause: impl Into<WhereClause>,
        changes: &[(&str, &str)],
    ) -> OrmResult<u64> {
        let fields = changes.iter().map(|(f, _)| f.to_string()).collect();
        let literals: Vec<&str> = changes.iter().map(|(_, sql)| *sql).collect();
        let mut update = UpdateLiteral::new(&T::record_type()?, where_clause.into(), fields, &literals)?;
        self.ctx.invoke_modifier(&mut update)
    }

    /// Updates `record`, or inserts it when it has no key or no row yet.
    pub fn store<T: PersistentRecord>(&self, record: &mut T) -> OrmResult<u64> {
        let mut store = Store::new(record.clone())?;
        let count = self.ctx.invoke_modifier(&mut store)?;
        *record = store.into_record();
        Ok(count)
    }

    pub fn delete<T: PersistentRecord>(&self, record: &T) -> OrmResult<u64> {
        let marshaller = Marshaller::<T>::new()?;
        let key = marshaller.row_key(record)?;
        self.ctx
            .invoke_modifier(&mut Delete::new(marshaller.record_type(), WhereClause::Key(key)))
    }

    pub fn delete_all<T: PersistentRecord>(&self, where_clause: impl Into<WhereClause>) -> OrmResult<u64> {
        self.ctx
            .invoke_modifier(&mut Delete::new(&T::record_type()?, where_clause.into()))
    }

    pub fn query<T: PersistentRecord>(&self) -> QueryBuilder<'_, T> {
        QueryBuilder {
            repo: self,
            clauses: Vec::new(),
            strategy: CacheStrategy::default(),
            _marker: PhantomData,
        }
    }
}

/// Projection holding one `count(*)`.
#[derive(Clone)]
struct RowCount(i64);

impl PersistentRecord for RowCount {
    fn describe() -> OrmResult<RecordType> {
        Ok(RecordType::builder("RowCount", "row_count")
            .field(FieldDef::new("count", ColumnType::Long).computed())
            .computed()
            .build()?)
    }

    fn from_row(row: &RowReader<'_>) -> OrmResult<Self> {
        Ok(RowCount(row.get("count")?))
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        (field == "count").then_some(Value::Int(self.0))
    }

    fn set_field_value(&mut self, field: &str, value: Value) -> OrmResult<()> {
        match (field, value.as_i64()) {
            ("count", Some(count)) => {
                self.0 = count;
                Ok(())
            }
            _ => Err(OrmError::Marshal(format!("can't set {} to {}", field, value))),
        }
    }
}

/// Fluent clause collection for one record type.
///
/// ```rust,ignore
/// let adults: Vec<Person> = repo
///     .query::<Person>()
///     .where_(Person::column("age")?.greater_equal(18))
///     .order_by(OrderBy::ascending(Person::column("name")?))
///     .limit(0, 20)
///     .select()?;
/// ```
pub struct QueryBuilder<'r, T> {
    repo: &'r Repository,
    clauses: Vec<QueryClause>,
    strategy: CacheStrategy,
    _marker: PhantomData<fn() -> T>,
}

impl<T: PersistentRecord> QueryBuilder<'_, T> {
    pub fn clause(mut self, clause: impl Into<QueryClause>) -> Self {
        self.clauses.push(clause.into());
        self
    }

    pub fn where_(self, where_clause: impl Into<WhereClause>) -> Self {
        self.clause(QueryClause::Where(where_clause.into()))
    }

    pub fn join(self, join: Join) -> Self {
        self.clause(join)
    }

    pub fn order_by(self, order: OrderBy) -> Self {
        self.clause(order)
    }

    pub fn group_by(self, expressions: Vec<Expression>) -> Self {
        self.clause(GroupBy::new(expressions))
    }

    pub fn limit(self, offset: u64, count: u64) -> Self {
        self.clause(Limit::new(offset, count))
    }

    pub fn for_update(self) -> Self {
        self.clause(QueryClause::ForUpdate)
    }

    pub fn override_field(self, field: &str, expression: impl Into<Expression>) -> Self {
        self.clause(FieldOverride::new(field, expression))
    }

    pub fn from_override(self, from: FromOverride) -> Self {
        self.clause(from)
    }

    pub fn cache(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn select(self) -> OrmResult<Vec<T>> {
        self.repo.find_all_with(self.clauses, self.strategy)
    }

    pub fn select_keys(self) -> OrmResult<Vec<Key>> {
        self.repo.find_keys_with::<T>(self.clauses, self.strategy)
    }

    pub fn select_count(self) -> OrmResult<i64> {
        self.repo.select_count::<T>(self.clauses)
    }

    /// First matching record.
    pub fn load(self) -> OrmResult<Option<T>> {
        let record = T::record_type()?;
        let select = SelectClause::all_fields(&record, self.clauses)?;
        self.repo.ctx.invoke(&mut FindOne::<T>::new(select)?)
    }

    /// Deletes the matching rows. Only a single WHERE clause is accepted.
    pub fn delete(self) -> OrmResult<u64> {
        let mut clauses = self.clauses.into_iter();
        match (clauses.next(), clauses.next()) {
            (Some(QueryClause::Where(where_clause)), None) => self.repo.delete_all::<T>(where_clause),
            _ => Err(OrmError::InvalidArgument(
                "delete takes exactly one where clause".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_changes() {
        let (fields, values) = split(vec![("name", Value::from("Ann")), ("age", Value::from(40))]);
        assert_eq!(fields, vec!["name".to_string(), "age".to_string()]);
        assert_eq!(values, vec![Value::Text("Ann".into()), Value::Int(40)]);
    }

    #[test]
    fn test_row_count_is_computed() {
        let record = RowCount::record_type().unwrap();
        assert!(record.is_computed());
        let mut count = RowCount(0);
        count.set_field_value("count", Value::Int(12)).unwrap();
        assert_eq!(count.field_value("count"), Some(Value::Int(12)));
        assert!(count.set_field_value("total", Value::Int(1)).is_err());
    }
}
