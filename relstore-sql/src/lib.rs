//! relstore-sql - Storage-independent query model and SQL builders.
//!
//! This crate holds everything needed to describe a query against mapped
//! record types and render it as SQL, without touching a database. The
//! `relstore` crate layers connections, caching and execution on top.
//!
//! # Main Components
//!
//! - **Record metadata**: [`RecordType`] describes a table, its fields and key
//! - **Expressions**: [`Expression`] is the condition/value tree, with local
//!   evaluation for in-memory checks
//! - **Clauses**: [`SelectClause`], [`InsertClause`], [`UpdateClause`] and
//!   friends compose expressions into statements
//! - **Keys**: [`Key`] and [`KeySet`] identify rows by primary key
//! - **Builders**: [`Dialect`] implementations render clauses into a
//!   [`Statement`] of SQL text plus bound parameters
//!
//! # Example
//!
//! ```rust
//! use relstore_sql::{
//!     build_select, ColumnType, Expression, FieldDef, PostgreSqlDialect, QueryClause, RecordType,
//!     SelectClause,
//! };
//! use std::sync::Arc;
//!
//! let person = Arc::new(
//!     RecordType::builder("Person", "person")
//!         .field(FieldDef::new("id", ColumnType::Integer))
//!         .field(FieldDef::new("name", ColumnType::String))
//!         .primary_key(["id"])
//!         .build()
//!         .unwrap(),
//! );
//!
//! let condition = Expression::column(&person, "name").equals("Alice");
//! let select = SelectClause::all_fields(&person, vec![QueryClause::from(condition)]).unwrap();
//! let stmt = build_select(&PostgreSqlDialect, &select).unwrap();
//! assert_eq!(
//!     stmt.sql,
//!     r#"select T1."id", T1."name" from "person" as T1 where (T1."name" = $1)"#
//! );
//! ```

pub mod builder;
pub mod clause;
pub mod error;
pub mod evaluate;
pub mod expression;
pub mod fulltext;
pub mod functions;
pub mod key;
pub mod record;
pub mod value;

// Re-export main types for convenience
pub use builder::{
    build_create_index, build_delete, build_drop_index, build_insert, build_select, build_update,
    BuildContext, Dialect, DialectKind, MySqlDialect, PostgreSqlDialect, SqliteDialect, Statement,
};
pub use clause::{
    CreateIndexClause, DeleteClause, DropIndexClause, FieldOverride, FromOverride, GroupBy,
    InsertClause, Join, JoinKind, KeyProjection, Limit, OrderBy, QueryClause, SelectClause,
    UpdateClause, WhereClause,
};
pub use error::{SqlError, SqlResult};
pub use evaluate::{Evaluation, FieldSource};
pub use expression::{ArithOp, ColumnExp, CompareOp, Expression, Order, MAX_KEYS};
pub use fulltext::{normalize, normalize_query};
pub use functions::{AggregateKind, DatePart, FullText, FullTextKind, Func, IntervalUnit};
pub use key::{Key, KeySet};
pub use record::{
    ColumnType, FieldDef, FullTextConfig, FullTextIndex, RecordRef, RecordType, RecordTypeBuilder,
    RecordTypeSet,
};
pub use value::Value;
