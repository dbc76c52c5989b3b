//! Shared state for executing queries and modifications.

use crate::cache::{
    query_namespace, CacheAdapter, CacheCategory, CacheKey, CachedValue, InMemoryCache, NoCache,
};
use crate::config::PersistenceConfig;
use crate::connection::{Connection, ConnectionProvider, RowCursor};
use crate::error::{OrmError, OrmResult};
use crate::modifier::Modifier;
use crate::query::{Query, QueryStats, QueryStatsSnapshot};
use relstore_sql::{Dialect, Key, Statement};
use std::any::Any;
use std::sync::Arc;

/// Ties a database, a dialect and a cache together. Cheap to share behind
/// an `Arc`; every operation acquires its own connection.
pub struct PersistenceContext {
    config: PersistenceConfig,
    dialect: Arc<dyn Dialect>,
    cache: Arc<dyn CacheAdapter>,
    provider: Arc<dyn ConnectionProvider>,
    stats: QueryStats,
}

impl PersistenceContext {
    /// Context with the cache described by `config`: an [`InMemoryCache`],
    /// or no caching at all when the cache is disabled.
    pub fn new(provider: Arc<dyn ConnectionProvider>, config: PersistenceConfig) -> OrmResult<Self> {
        let cache: Arc<dyn CacheAdapter> = if config.cache.enabled {
            Arc::new(InMemoryCache::new(config.cache.clone()))
        } else {
            Arc::new(NoCache)
        };
        Self::with_cache(provider, config, cache)
    }

    pub fn with_cache(
        provider: Arc<dyn ConnectionProvider>,
        config: PersistenceConfig,
        cache: Arc<dyn CacheAdapter>,
    ) -> OrmResult<Self> {
        config.validate()?;
        let dialect = config.dialect.dialect();
        tracing::debug!(
            "Persistence context using {} dialect, batches of {} keys",
            dialect.name(),
            config.max_in_keys
        );
        Ok(Self {
            config,
            dialect,
            cache,
            provider,
            stats: QueryStats::default(),
        })
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn cache(&self) -> &dyn CacheAdapter {
        self.cache.as_ref()
    }

    pub fn max_in_keys(&self) -> usize {
        self.config.max_in_keys
    }

    pub fn stats(&self) -> QueryStatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn query_stats(&self) -> &QueryStats {
        &self.stats
    }

    pub fn connection(&self) -> OrmResult<Box<dyn Connection + '_>> {
        self.provider.connection().map_err(OrmError::Connection)
    }

    /// Runs `query`, answering from the cache when it can.
    pub fn invoke<Q: Query>(&self, query: &mut Q) -> OrmResult<Q::Output> {
        if let Some(result) = query.cached_result(self)? {
            self.stats.cached_query();
            return Ok(result);
        }
        let conn = self.connection()?;
        let result = query.invoke(self, conn.as_ref())?;
        self.stats.uncached_query();
        Ok(result)
    }

    /// Runs `modifier`: stale entries are invalidated before the statement
    /// executes, and the result is cached only after it succeeds.
    pub fn invoke_modifier<M: Modifier + ?Sized>(&self, modifier: &mut M) -> OrmResult<u64> {
        let record = Arc::clone(modifier.record_type());
        if let Some(invalidator) = modifier.invalidator() {
            invalidator.validate_flush_type(&record)?;
            invalidator.invalidate(self.cache());
        }
        self.cache.clear(&query_namespace(&record), false);

        let conn = self.connection()?;
        let count = modifier.invoke(self, conn.as_ref())?;
        if let Some((key, value)) = modifier.cached_result() {
            self.cache
                .store(CacheCategory::Record, &key.cache_id(), key.cache_key(), value);
        }
        self.stats.modification();
        Ok(count)
    }

    /// A copy of the record cached under `key`. A cached miss is `Some(None)`.
    pub(crate) fn cached_record<T: Any + Clone>(&self, key: &Key) -> Option<Option<T>> {
        match self.cache.lookup(&key.cache_id(), &key.cache_key())? {
            CachedValue::Null => Some(None),
            value => match value.get::<T>() {
                Some(record) => Some(Some(record)),
                None => {
                    tracing::warn!("Cache entry for {} holds a value of another type", key);
                    None
                }
            },
        }
    }

    /// Caches a copy of `record` under `key`, or a miss for `None`.
    pub(crate) fn cache_record<T: Any + Clone + Send + Sync>(&self, key: &Key, record: Option<&T>) {
        let value = record.map_or(CachedValue::Null, |r| CachedValue::of(r.clone()));
        self.cache
            .store(CacheCategory::Record, &key.cache_id(), key.cache_key(), value);
    }

    /// Executes a select, calling `row` once per result row. Returns the row
    /// count.
    pub(crate) fn select<F>(&self, conn: &dyn Connection, stmt: &Statement, table: &str, mut row: F) -> OrmResult<usize>
    where
        F: FnMut(&dyn RowCursor) -> OrmResult<()>,
    {
        tracing::debug!("select on {}: {} {:?}", table, stmt.sql, stmt.params);
        let failed = |e| OrmError::execution("select", table, e);
        let mut prepared = conn.prepare(&stmt.sql).map_err(failed)?;
        for (i, value) in stmt.params.iter().enumerate() {
            prepared.bind(i + 1, value).map_err(failed)?;
        }
        let mut cursor = prepared.execute_query().map_err(failed)?;
        let mut rows = 0;
        while cursor.advance().map_err(failed)? {
            row(cursor.as_ref())?;
            rows += 1;
        }
        Ok(rows)
    }

    /// Executes a modifying statement, returning the affected row count.
    pub(crate) fn execute(
        &self,
        conn: &dyn Connection,
        stmt: &Statement,
        operation: &'static str,
        table: &str,
    ) -> OrmResult<u64> {
        tracing::debug!("{} on {}: {} {:?}", operation, table, stmt.sql, stmt.params);
        let failed = |e| OrmError::execution(operation, table, e);
        let mut prepared = conn.prepare(&stmt.sql).map_err(failed)?;
        for (i, value) in stmt.params.iter().enumerate() {
            prepared.bind(i + 1, value).map_err(failed)?;
        }
        prepared.execute_update().map_err(failed)
    }

    pub fn shutdown(&self) {
        self.cache.shutdown();
    }
}
