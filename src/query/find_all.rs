//! Collection reads.
//!
//! [`WithCache`] is the two-phase load: select only the primary keys
//! matching the clauses, serve what it can from the record cache, then fetch
//! the rest by key in batches and reassemble in the order of the first
//! pass. [`WithKeys`] runs the second phase for keys the caller already has.
//! [`Explicit`] is a plain single-pass select, used when the clauses can't
//! be answered by key columns alone.

use super::{single_record_type, Query};
use crate::cache::{query_namespace, CacheCategory, CacheKeyValue, CachedValue};
use crate::connection::Connection;
use crate::context::PersistenceContext;
use crate::error::{OrmError, OrmResult};
use crate::marshaller::{Marshaller, PersistentRecord};
use relstore_sql::{build_select, Key, KeyProjection, KeySet, QueryClause, SelectClause};
use std::collections::{HashMap, HashSet};

/// Second phase shared by the key-driven strategies.
struct Loader<T> {
    marshaller: Marshaller<T>,
}

impl<T: PersistentRecord> Loader<T> {
    fn new() -> OrmResult<Self> {
        Ok(Self {
            marshaller: Marshaller::new()?,
        })
    }

    /// Splits `keys` into cached records and the distinct keys still to be
    /// fetched. Cached misses are fetched again: the row may exist by now.
    fn load_from_cache(&self, ctx: &PersistenceContext, keys: &[Key]) -> (HashMap<Key, T>, Vec<Key>) {
        let mut found = HashMap::with_capacity(keys.len());
        let mut seen = HashSet::with_capacity(keys.len());
        let mut fetch = Vec::new();
        for key in keys {
            if !seen.insert(key) {
                continue;
            }
            match ctx.cached_record::<T>(key) {
                Some(Some(record)) => {
                    found.insert(key.clone(), record);
                }
                _ => fetch.push(key.clone()),
            }
        }
        (found, fetch)
    }

    /// Fetches `fetch` in batches of at most `max_in_keys`, caching each
    /// record. Returns the number of rows read.
    fn load_records(
        &self,
        ctx: &PersistenceContext,
        conn: &dyn Connection,
        fetch: Vec<Key>,
        found: &mut HashMap<Key, T>,
    ) -> OrmResult<usize> {
        let record = self.marshaller.record_type();
        let fields = self.marshaller.field_names();
        let mut rows = 0;
        for chunk in KeySet::explicit(record, fetch)?.chunks(ctx.max_in_keys()) {
            let select = SelectClause::new(record, fields.clone(), [QueryClause::from(chunk)])?;
            let stmt = build_select(ctx.dialect(), &select)?;
            rows += ctx.select(conn, &stmt, record.table(), |cursor| {
                let loaded = self.marshaller.create_record(cursor, &fields)?;
                let key = self.marshaller.row_key(&loaded)?;
                ctx.cache_record(&key, Some(&loaded));
                found.insert(key, loaded);
                Ok(())
            })?;
        }
        ctx.query_stats().uncached_records(rows);
        Ok(rows)
    }

    /// Records in `keys` order. Keys with no record are skipped, repeated
    /// keys repeat the record.
    fn resolve(&self, keys: &[Key], found: &HashMap<Key, T>) -> Vec<T> {
        keys.iter().filter_map(|key| found.get(key).cloned()).collect()
    }

    /// Second phase. `orig_query` is the first-pass statement; with keys
    /// supplied by the caller there is none, and missing rows are expected.
    fn load(
        &self,
        ctx: &PersistenceContext,
        conn: &dyn Connection,
        keys: &[Key],
        orig_query: Option<&str>,
    ) -> OrmResult<Vec<T>> {
        let (mut found, fetch) = self.load_from_cache(ctx, keys);
        ctx.query_stats().cached_records(found.len());
        if !fetch.is_empty() {
            let wanted = fetch.len();
            let got = self.load_records(ctx, conn, fetch, &mut found)?;
            if got > wanted || (orig_query.is_some() && got < wanted) {
                let dups = keys.len() - keys.iter().collect::<HashSet<_>>().len();
                tracing::warn!(
                    orig_query = orig_query.unwrap_or("<keys supplied>"),
                    wanted,
                    got,
                    dups,
                    "Row count mismatch in second pass"
                );
            }
        }
        Ok(self.resolve(keys, &found))
    }
}

/// Two-phase collection load, optionally caching the first-pass key list.
pub struct WithCache<T> {
    loader: Loader<T>,
    projection: KeyProjection,
    keyset_category: Option<CacheCategory>,
    /// Key list found in the cache by `cached_result` whose records were
    /// not all cached.
    pending_keys: Option<Vec<Key>>,
}

impl<T: PersistentRecord> WithCache<T> {
    /// `keyset_category` names where the first-pass key list is cached;
    /// `None` always runs the first pass.
    pub fn new(projection: KeyProjection, keyset_category: Option<CacheCategory>) -> OrmResult<Self> {
        let loader = Loader::new()?;
        if !projection.record().same_type(loader.marshaller.record_type()) {
            return Err(OrmError::InvalidArgument(format!(
                "clauses for {} can't load {}",
                projection.record().name(),
                loader.marshaller.record_type().name()
            )));
        }
        Ok(Self {
            loader,
            projection,
            keyset_category,
            pending_keys: None,
        })
    }

    fn cacheable_category(&self, select: &SelectClause) -> Option<CacheCategory> {
        self.keyset_category.filter(|_| single_record_type(select))
    }
}

impl<T: PersistentRecord> Query for WithCache<T> {
    type Output = Vec<T>;

    fn cached_result(&mut self, ctx: &PersistenceContext) -> OrmResult<Option<Vec<T>>> {
        let select = self.projection.key_select()?;
        if self.cacheable_category(&select).is_none() {
            return Ok(None);
        }
        let stmt = build_select(ctx.dialect(), &select)?;
        let namespace = query_namespace(self.projection.record());
        let Some(keys) = ctx
            .cache()
            .lookup(&namespace, &CacheKeyValue::Text(stmt.cache_text()))
            .and_then(|v| v.get::<Vec<Key>>())
        else {
            return Ok(None);
        };
        tracing::debug!("Cached key list for {}: {} keys", stmt.sql, keys.len());

        let (found, fetch) = self.loader.load_from_cache(ctx, &keys);
        if fetch.is_empty() {
            ctx.query_stats().cached_records(found.len());
            return Ok(Some(self.loader.resolve(&keys, &found)));
        }
        self.pending_keys = Some(keys);
        Ok(None)
    }

    fn invoke(&mut self, ctx: &PersistenceContext, conn: &dyn Connection) -> OrmResult<Vec<T>> {
        let select = self.projection.key_select()?;
        let stmt = build_select(ctx.dialect(), &select)?;

        let keys = match self.pending_keys.take() {
            Some(keys) => keys,
            None => {
                let record = self.projection.record();
                let mut keys = Vec::new();
                ctx.select(conn, &stmt, record.table(), |cursor| {
                    keys.push(self.loader.marshaller.key_from_row(cursor)?);
                    Ok(())
                })?;
                if let Some(category) = self.cacheable_category(&select) {
                    ctx.cache().store(
                        category,
                        &query_namespace(record),
                        CacheKeyValue::Text(stmt.cache_text()),
                        CachedValue::of(keys.clone()),
                    );
                }
                keys
            }
        };
        self.loader.load(ctx, conn, &keys, Some(&stmt.sql))
    }
}

/// Loads records for keys the caller supplies, in the order supplied.
/// Keys without a row are left out of the result.
pub struct WithKeys<T> {
    loader: Loader<T>,
    keys: Vec<Key>,
}

impl<T: PersistentRecord> WithKeys<T> {
    pub fn new(keys: Vec<Key>) -> OrmResult<Self> {
        let loader = Loader::new()?;
        for key in &keys {
            key.validate_record_type(loader.marshaller.record_type())?;
        }
        Ok(Self { loader, keys })
    }
}

impl<T: PersistentRecord> Query for WithKeys<T> {
    type Output = Vec<T>;

    fn cached_result(&mut self, ctx: &PersistenceContext) -> OrmResult<Option<Vec<T>>> {
        let (found, fetch) = self.loader.load_from_cache(ctx, &self.keys);
        if fetch.is_empty() {
            ctx.query_stats().cached_records(found.len());
            Ok(Some(self.loader.resolve(&self.keys, &found)))
        } else {
            Ok(None)
        }
    }

    fn invoke(&mut self, ctx: &PersistenceContext, conn: &dyn Connection) -> OrmResult<Vec<T>> {
        self.loader.load(ctx, conn, &self.keys, None)
    }
}

/// Single-pass select of every field. Nothing is read from or written to
/// the cache: overrides and joins can make rows differ from the stored
/// records.
pub struct Explicit<T> {
    marshaller: Marshaller<T>,
    select: SelectClause,
}

impl<T: PersistentRecord> Explicit<T> {
    pub fn new(select: SelectClause) -> OrmResult<Self> {
        let marshaller = Marshaller::<T>::new()?;
        if !select.record().same_type(marshaller.record_type()) {
            return Err(OrmError::InvalidArgument(format!(
                "select on {} can't load {}",
                select.record().name(),
                marshaller.record_type().name()
            )));
        }
        Ok(Self { marshaller, select })
    }
}

impl<T: PersistentRecord> Query for Explicit<T> {
    type Output = Vec<T>;

    fn invoke(&mut self, ctx: &PersistenceContext, conn: &dyn Connection) -> OrmResult<Vec<T>> {
        let stmt = build_select(ctx.dialect(), &self.select)?;
        let fields = self.select.fields();
        let mut records = Vec::new();
        ctx.select(conn, &stmt, self.marshaller.table_name(), |cursor| {
            records.push(self.marshaller.create_record(cursor, fields)?);
            Ok(())
        })?;
        ctx.query_stats().uncached_records(records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use relstore_sql::{ColumnType, FieldDef, Key, KeySet, RecordType, Value, MAX_KEYS};
    use std::sync::Arc;

    #[test]
    fn test_fetch_batches_respect_max_keys() {
        let record = Arc::new(
            RecordType::builder("Reading", "reading")
                .field(FieldDef::new("id", ColumnType::Long))
                .primary_key(["id"])
                .build()
                .unwrap(),
        );
        let keys: Vec<Key> = (0..(2 * MAX_KEYS + 1) as i64)
            .map(|i| Key::from_values(&record, vec![Value::Int(i)]).unwrap())
            .collect();
        let chunks = KeySet::explicit(&record, keys.clone()).unwrap().chunks(MAX_KEYS);
        let sizes: Vec<usize> = chunks.iter().map(KeySet::len).collect();
        assert_eq!(sizes, vec![MAX_KEYS, MAX_KEYS, 1]);

        let rejoined: Vec<Key> = chunks.iter().flat_map(|c| c.keys().unwrap()).collect();
        assert_eq!(rejoined, keys);
    }
}
