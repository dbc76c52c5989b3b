//! Read strategies.
//!
//! Every read is a [`Query`] run through
//! [`PersistenceContext::invoke`](crate::PersistenceContext::invoke): the
//! query first gets a chance to answer from the cache alone, and only then
//! is a connection acquired.

mod find_all;
mod find_keys;
mod find_one;
mod stats;

pub use find_all::{Explicit, WithCache, WithKeys};
pub use find_keys::FindKeys;
pub use find_one::FindOne;
pub use stats::{QueryStats, QueryStatsSnapshot};

use crate::cache::CacheCategory;
use crate::connection::Connection;
use crate::context::PersistenceContext;
use crate::error::OrmResult;
use relstore_sql::{RecordTypeSet, SelectClause};

pub trait Query {
    type Output;

    /// The result, if it can be produced from the cache without a database
    /// round trip.
    fn cached_result(&mut self, _ctx: &PersistenceContext) -> OrmResult<Option<Self::Output>> {
        Ok(None)
    }

    fn invoke(&mut self, ctx: &PersistenceContext, conn: &dyn Connection) -> OrmResult<Self::Output>;
}

/// How a collection read uses the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// Two-phase with short-lived key list caching when the clauses allow
    /// it, otherwise a single pass.
    #[default]
    Best,
    /// Two-phase; records are cached but key lists are not.
    Records,
    ShortKeys,
    LongKeys,
    /// Single pass, no caching.
    None,
}

impl CacheStrategy {
    /// Category key lists are cached in, if any.
    pub fn keyset_category(&self) -> Option<CacheCategory> {
        match self {
            CacheStrategy::Best | CacheStrategy::ShortKeys => Some(CacheCategory::ShortKeyset),
            CacheStrategy::LongKeys => Some(CacheCategory::LongKeyset),
            CacheStrategy::Records | CacheStrategy::None => None,
        }
    }
}

/// A cached key list is only invalidated by writes to its own record type,
/// so selects touching other tables can't be cached.
pub(crate) fn single_record_type(select: &SelectClause) -> bool {
    let mut types = RecordTypeSet::new();
    select.collect_record_types(&mut types);
    types.len() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyset_categories() {
        assert_eq!(CacheStrategy::default(), CacheStrategy::Best);
        assert_eq!(CacheStrategy::Best.keyset_category(), Some(CacheCategory::ShortKeyset));
        assert_eq!(CacheStrategy::LongKeys.keyset_category(), Some(CacheCategory::LongKeyset));
        assert_eq!(CacheStrategy::Records.keyset_category(), None);
        assert_eq!(CacheStrategy::None.keyset_category(), None);
    }
}
