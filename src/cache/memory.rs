//! Process-local cache adapter.
//!
//! Each namespace is its own LRU, sized by the category of the first value
//! stored into it. Entries of categories with a TTL expire lazily on lookup.

use super::{CacheAdapter, CacheCategory, CacheKeyValue, CachedValue};
use crate::config::CacheConfig;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

struct Namespace {
    category: CacheCategory,
    entries: LruCache<CacheKeyValue, Entry>,
}

struct Entry {
    value: CachedValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

pub struct InMemoryCache {
    config: CacheConfig,
    namespaces: DashMap<String, Mutex<Namespace>>,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl InMemoryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            namespaces: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    fn new_namespace(&self, category: CacheCategory) -> Mutex<Namespace> {
        let capacity = self.config.category(category).capacity;
        Mutex::new(Namespace {
            category,
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            namespaces: self.namespaces.len(),
            entries: self.namespaces.iter().map(|ns| ns.lock().entries.len()).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

impl CacheAdapter for InMemoryCache {
    fn lookup(&self, cache_id: &str, key: &CacheKeyValue) -> Option<CachedValue> {
        let Some(ns) = self.namespaces.get(cache_id) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let mut ns = ns.lock();
        match ns.entries.get(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) if !entry.is_expired(Instant::now()) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }
        ns.entries.pop(key);
        self.expirations.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn store(&self, category: CacheCategory, cache_id: &str, key: CacheKeyValue, value: CachedValue) {
        let ns = self
            .namespaces
            .entry(cache_id.to_string())
            .or_insert_with(|| self.new_namespace(category));
        let mut ns = ns.lock();
        if ns.category != category {
            tracing::debug!(
                "Storing {:?} entry into {} which holds {:?} entries",
                category,
                cache_id,
                ns.category
            );
        }
        let expires_at = self
            .config
            .category(ns.category)
            .ttl()
            .map(|ttl| Instant::now() + ttl);
        if let Some((evicted, _)) = ns.entries.push(key.clone(), Entry { value, expires_at }) {
            if evicted != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    fn remove(&self, cache_id: &str, key: &CacheKeyValue) {
        if let Some(ns) = self.namespaces.get(cache_id) {
            ns.lock().entries.pop(key);
        }
    }

    fn enumerate(&self, cache_id: &str) -> Vec<CacheKeyValue> {
        self.namespaces
            .get(cache_id)
            .map(|ns| ns.lock().entries.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default()
    }

    fn clear(&self, cache_id: &str, _local_only: bool) {
        if self.namespaces.remove(cache_id).is_some() {
            tracing::debug!("Cleared cache namespace {}", cache_id);
        }
    }

    fn shutdown(&self) {
        let stats = self.stats();
        tracing::info!(
            "Shutting down cache: {} entries in {} namespaces, hit rate {:.1}%",
            stats.entries,
            stats.namespaces,
            stats.hit_rate()
        );
        self.namespaces.clear();
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub namespaces: usize,
    /// Entries currently held across all namespaces
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    /// Entries pushed out by capacity
    pub evictions: u64,
    /// Entries dropped on lookup after their TTL passed
    pub expirations: u64,
}

impl CacheStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}
