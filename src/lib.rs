//! relstore - Object-relational persistence with a coherent record cache.
//!
//! Records are mapped through [`PersistentRecord`], queries are described
//! with the clause model of `relstore_sql`, and a [`Repository`] executes
//! them against a [`ConnectionProvider`] while keeping a [`CacheAdapter`]
//! consistent with every write.

pub mod cache;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod marshaller;
pub mod modifier;
pub mod query;
pub mod repository;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use cache::{CacheAdapter, CacheCategory, CacheInvalidator, CacheKey, CacheKeyValue, CacheStats, CachedValue, InMemoryCache, NoCache};
pub use config::{CacheConfig, CategoryConfig, PersistenceConfig};
pub use connection::{column_value, Connection, ConnectionProvider, DatabaseError, DbResult, FromValue, PreparedStatement, RowCursor, RowReader, VecCursor};
pub use context::PersistenceContext;
pub use error::{OrmError, OrmResult};
pub use marshaller::{Marshaller, PersistentRecord};
pub use modifier::{Delete, Insert, Modifier, Store, Update, UpdateLiteral, UpdatePartial};
pub use query::{CacheStrategy, Explicit, FindKeys, FindOne, Query, QueryStatsSnapshot, WithCache, WithKeys};
pub use repository::{QueryBuilder, Repository};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteProvider;
