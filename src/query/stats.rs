use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for query execution, shared by every strategy of a context.
#[derive(Debug, Default)]
pub struct QueryStats {
    cached_queries: AtomicU64,
    uncached_queries: AtomicU64,
    cached_records: AtomicU64,
    uncached_records: AtomicU64,
    modifications: AtomicU64,
}

/// Point-in-time copy of [`QueryStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStatsSnapshot {
    /// Queries answered without touching the database
    pub cached_queries: u64,
    pub uncached_queries: u64,
    /// Records served from the record cache
    pub cached_records: u64,
    /// Records materialized from result rows
    pub uncached_records: u64,
    pub modifications: u64,
}

impl QueryStats {
    pub fn cached_query(&self) {
        self.cached_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uncached_query(&self) {
        self.uncached_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cached_records(&self, count: usize) {
        self.cached_records.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn uncached_records(&self, count: usize) {
        self.uncached_records.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn modification(&self) {
        self.modifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueryStatsSnapshot {
        QueryStatsSnapshot {
            cached_queries: self.cached_queries.load(Ordering::Relaxed),
            uncached_queries: self.uncached_queries.load(Ordering::Relaxed),
            cached_records: self.cached_records.load(Ordering::Relaxed),
            uncached_records: self.uncached_records.load(Ordering::Relaxed),
            modifications: self.modifications.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = QueryStats::default();
        stats.cached_query();
        stats.uncached_query();
        stats.uncached_query();
        stats.cached_records(3);
        stats.modification();

        let snap = stats.snapshot();
        assert_eq!(snap.cached_queries, 1);
        assert_eq!(snap.uncached_queries, 2);
        assert_eq!(snap.cached_records, 3);
        assert_eq!(snap.uncached_records, 0);
        assert_eq!(snap.modifications, 1);
    }
}
