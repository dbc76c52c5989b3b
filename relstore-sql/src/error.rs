//! Error types for relstore-sql.
//!
//! Everything here is raised while building a clause tree or rendering it,
//! before any database I/O happens.

use thiserror::Error;

/// Clause construction and rendering error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SqlError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown field '{field}' in record type {record}")]
    UnknownField { record: String, field: String },

    #[error("Query can't contain multiple {0} clauses.")]
    DuplicateClause(&'static str),

    #[error("Operation not supported by {dialect}: {what}")]
    Unsupported { dialect: &'static str, what: String },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
}

/// Result type for clause construction and rendering
pub type SqlResult<T> = Result<T, SqlError>;

impl serde::Serialize for SqlError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
