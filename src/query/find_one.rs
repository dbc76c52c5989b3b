use super::Query;
use crate::connection::Connection;
use crate::context::PersistenceContext;
use crate::error::{OrmError, OrmResult};
use crate::marshaller::{Marshaller, PersistentRecord};
use relstore_sql::{build_select, Key, QueryClause, SelectClause};

/// Loads at most one record. A select that is nothing but a primary-key
/// match is answered from the record cache, and misses are cached too.
pub struct FindOne<T> {
    marshaller: Marshaller<T>,
    select: SelectClause,
    key: Option<Key>,
}

impl<T: PersistentRecord> FindOne<T> {
    pub fn new(select: SelectClause) -> OrmResult<Self> {
        let marshaller = Marshaller::<T>::new()?;
        if !select.record().same_type(marshaller.record_type()) {
            return Err(OrmError::InvalidArgument(format!(
                "select on {} can't load {}",
                select.record().name(),
                marshaller.record_type().name()
            )));
        }
        let key = if marshaller.record_type().is_computed() {
            None
        } else {
            select.key_only().cloned()
        };
        Ok(Self {
            marshaller,
            select: select.limited_to(1),
            key,
        })
    }

    pub fn by_key(key: Key) -> OrmResult<Self> {
        let record = T::record_type()?;
        key.validate_record_type(&record)?;
        Self::new(SelectClause::all_fields(&record, [QueryClause::from(key)])?)
    }
}

impl<T: PersistentRecord> Query for FindOne<T> {
    type Output = Option<T>;

    fn cached_result(&mut self, ctx: &PersistenceContext) -> OrmResult<Option<Option<T>>> {
        let Some(key) = &self.key else {
            return Ok(None);
        };
        let cached = ctx.cached_record::<T>(key);
        if cached.is_some() {
            tracing::debug!("Cache hit for {}", key);
            ctx.query_stats().cached_records(1);
        }
        Ok(cached)
    }

    fn invoke(&mut self, ctx: &PersistenceContext, conn: &dyn Connection) -> OrmResult<Option<T>> {
        let stmt = build_select(ctx.dialect(), &self.select)?;
        let marshaller = &self.marshaller;
        let fields = self.select.fields();
        let mut found = None;
        ctx.select(conn, &stmt, marshaller.table_name(), |cursor| {
            if found.is_none() {
                found = Some(marshaller.create_record(cursor, fields)?);
            }
            Ok(())
        })?;
        ctx.query_stats().uncached_records(usize::from(found.is_some()));
        if let Some(key) = &self.key {
            ctx.cache_record(key, found.as_ref());
        }
        Ok(found)
    }
}
