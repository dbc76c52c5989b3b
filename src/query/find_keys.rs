use super::{single_record_type, Query};
use crate::cache::{query_namespace, CacheCategory, CacheKeyValue, CachedValue};
use crate::connection::Connection;
use crate::context::PersistenceContext;
use crate::error::{OrmError, OrmResult};
use crate::marshaller::{Marshaller, PersistentRecord};
use relstore_sql::{build_select, Key, KeyProjection, SelectClause, Statement};

/// Primary keys of the records matching a clause list, in result order.
/// Shares the key list cache with [`WithCache`](super::WithCache).
pub struct FindKeys<T> {
    marshaller: Marshaller<T>,
    select: SelectClause,
    keyset_category: Option<CacheCategory>,
}

impl<T: PersistentRecord> FindKeys<T> {
    pub fn new(projection: KeyProjection, keyset_category: Option<CacheCategory>) -> OrmResult<Self> {
        let marshaller = Marshaller::<T>::new()?;
        if !projection.record().same_type(marshaller.record_type()) {
            return Err(OrmError::InvalidArgument(format!(
                "clauses for {} can't select keys of {}",
                projection.record().name(),
                marshaller.record_type().name()
            )));
        }
        let select = projection.key_select()?;
        let keyset_category = keyset_category.filter(|_| single_record_type(&select));
        Ok(Self {
            marshaller,
            select,
            keyset_category,
        })
    }

    fn statement(&self, ctx: &PersistenceContext) -> OrmResult<Statement> {
        Ok(build_select(ctx.dialect(), &self.select)?)
    }
}

impl<T: PersistentRecord> Query for FindKeys<T> {
    type Output = Vec<Key>;

    fn cached_result(&mut self, ctx: &PersistenceContext) -> OrmResult<Option<Vec<Key>>> {
        if self.keyset_category.is_none() {
            return Ok(None);
        }
        let stmt = self.statement(ctx)?;
        Ok(ctx
            .cache()
            .lookup(
                &query_namespace(self.marshaller.record_type()),
                &CacheKeyValue::Text(stmt.cache_text()),
            )
            .and_then(|v| v.get::<Vec<Key>>()))
    }

    fn invoke(&mut self, ctx: &PersistenceContext, conn: &dyn Connection) -> OrmResult<Vec<Key>> {
        let stmt = self.statement(ctx)?;
        let mut keys = Vec::new();
        ctx.select(conn, &stmt, self.marshaller.table_name(), |cursor| {
            keys.push(self.marshaller.key_from_row(cursor)?);
            Ok(())
        })?;
        if let Some(category) = self.keyset_category {
            ctx.cache().store(
                category,
                &query_namespace(self.marshaller.record_type()),
                CacheKeyValue::Text(stmt.cache_text()),
                CachedValue::of(keys.clone()),
            );
        }
        Ok(keys)
    }
}
