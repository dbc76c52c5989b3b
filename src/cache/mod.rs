//! Cache coordination.
//!
//! A [`CacheAdapter`] holds any number of namespaces, each identified by a
//! string. Records are cached under their table name, keyed by primary-key
//! values; key lists produced by queries live in `<table>Query`, keyed by the
//! rendered statement.
//!
//! Adapters never fail: a backend problem is logged by the adapter and shows
//! up as a miss, so a database operation is never aborted by the cache.

mod memory;

pub use memory::{CacheStats, InMemoryCache};

use crate::error::OrmResult;
use relstore_sql::{Key, KeySet, RecordType, SqlError, Value, WhereClause};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Lets adapters apply different eviction policies per kind of entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCategory {
    Record,
    ShortKeyset,
    LongKeyset,
    Result,
}

/// Outcome of a successful lookup. `Null` records a known miss so absent rows
/// don't cost a query every time.
#[derive(Clone)]
pub enum CachedValue {
    Present(Arc<dyn Any + Send + Sync>),
    Null,
}

impl CachedValue {
    pub fn of<T: Any + Send + Sync>(value: T) -> Self {
        CachedValue::Present(Arc::new(value))
    }

    /// A copy of the cached value, if present and of type `T`.
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        match self {
            CachedValue::Present(v) => v.downcast_ref::<T>().cloned(),
            CachedValue::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CachedValue::Null)
    }
}

impl fmt::Debug for CachedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CachedValue::Present(_) => write!(f, "Present(..)"),
            CachedValue::Null => write!(f, "Null"),
        }
    }
}

/// Key within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKeyValue {
    Values(Vec<Value>),
    Text(String),
}

impl fmt::Display for CacheKeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKeyValue::Values(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(", "))
            }
            CacheKeyValue::Text(text) => write!(f, "{}", text),
        }
    }
}

pub trait CacheAdapter: Send + Sync {
    fn lookup(&self, cache_id: &str, key: &CacheKeyValue) -> Option<CachedValue>;

    fn store(&self, category: CacheCategory, cache_id: &str, key: CacheKeyValue, value: CachedValue);

    fn remove(&self, cache_id: &str, key: &CacheKeyValue);

    fn enumerate(&self, cache_id: &str) -> Vec<CacheKeyValue>;

    /// Drops a whole namespace. `local_only` keeps a distributed adapter from
    /// broadcasting the clear to other nodes.
    fn clear(&self, cache_id: &str, local_only: bool);

    fn shutdown(&self);
}

/// Adapter that caches nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl CacheAdapter for NoCache {
    fn lookup(&self, _cache_id: &str, _key: &CacheKeyValue) -> Option<CachedValue> {
        None
    }

    fn store(&self, _category: CacheCategory, _cache_id: &str, _key: CacheKeyValue, _value: CachedValue) {}

    fn remove(&self, _cache_id: &str, _key: &CacheKeyValue) {}

    fn enumerate(&self, _cache_id: &str) -> Vec<CacheKeyValue> {
        Vec::new()
    }

    fn clear(&self, _cache_id: &str, _local_only: bool) {}

    fn shutdown(&self) {}
}

/// Something that addresses a single cache entry.
pub trait CacheKey {
    fn cache_id(&self) -> String;
    fn cache_key(&self) -> CacheKeyValue;
}

/// Removes whatever a pending modification is about to make stale.
pub trait CacheInvalidator {
    fn invalidate(&self, cache: &dyn CacheAdapter);

    /// Fails when this invalidator belongs to a different record type.
    fn validate_flush_type(&self, record: &RecordType) -> OrmResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SimpleCacheKey {
    cache_id: String,
    key: CacheKeyValue,
}

impl SimpleCacheKey {
    pub fn new(cache_id: impl Into<String>, key: CacheKeyValue) -> Self {
        Self {
            cache_id: cache_id.into(),
            key,
        }
    }
}

impl CacheKey for SimpleCacheKey {
    fn cache_id(&self) -> String {
        self.cache_id.clone()
    }

    fn cache_key(&self) -> CacheKeyValue {
        self.key.clone()
    }
}

/// Namespace holding the key lists of cached queries against `record`.
pub fn query_namespace(record: &RecordType) -> String {
    format!("{}Query", record.table())
}

impl CacheKey for Key {
    fn cache_id(&self) -> String {
        self.record_type().table().to_string()
    }

    fn cache_key(&self) -> CacheKeyValue {
        CacheKeyValue::Values(self.values().to_vec())
    }
}

impl CacheInvalidator for Key {
    fn invalidate(&self, cache: &dyn CacheAdapter) {
        cache.remove(&self.cache_id(), &self.cache_key());
    }

    fn validate_flush_type(&self, record: &RecordType) -> OrmResult<()> {
        Ok(self.validate_record_type(record)?)
    }
}

/// Explicit sets remove each member. Ranges remove one entry per ranged
/// value; a range that doesn't pin down whole keys clears the namespace.
impl CacheInvalidator for KeySet {
    fn invalidate(&self, cache: &dyn CacheAdapter) {
        match self.keys() {
            Ok(keys) => keys.iter().for_each(|key| key.invalidate(cache)),
            Err(e) => {
                let table = self.record_type().table();
                tracing::debug!("Clearing cache for {}: {} is not a key range ({})", table, self, e);
                cache.clear(table, false);
            }
        }
    }

    fn validate_flush_type(&self, record: &RecordType) -> OrmResult<()> {
        Ok(self.validate_record_type(record)?)
    }
}

/// Invalidation for a modification restricted by a WHERE clause. Key and
/// key set clauses remove their entries; arbitrary conditions can touch any
/// row, so they clear the record namespace.
pub struct WhereInvalidator<'a> {
    record: &'a RecordType,
    where_clause: &'a WhereClause,
}

impl<'a> WhereInvalidator<'a> {
    pub fn new(record: &'a RecordType, where_clause: &'a WhereClause) -> Self {
        Self { record, where_clause }
    }
}

impl CacheInvalidator for WhereInvalidator<'_> {
    fn invalidate(&self, cache: &dyn CacheAdapter) {
        match self.where_clause {
            WhereClause::Key(key) => key.invalidate(cache),
            WhereClause::KeySet(keys) => keys.invalidate(cache),
            WhereClause::Condition(_) => {
                tracing::debug!("Clearing cache for {} ahead of a conditional write", self.record.table());
                cache.clear(self.record.table(), false);
            }
        }
    }

    fn validate_flush_type(&self, record: &RecordType) -> OrmResult<()> {
        match self.where_clause {
            WhereClause::Key(key) => key.validate_flush_type(record),
            WhereClause::KeySet(keys) => keys.validate_flush_type(record),
            WhereClause::Condition(_) if self.record.same_type(record) => Ok(()),
            WhereClause::Condition(_) => Err(SqlError::TypeMismatch(format!(
                "condition for {} used against {}",
                self.record.name(),
                record.name()
            ))
            .into()),
        }
    }
}
