use crate::connection::DatabaseError;
use relstore_sql::SqlError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrmError {
    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{operation} on '{table}' failed: {source}")]
    Execution {
        operation: &'static str,
        table: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Connection error: {0}")]
    Connection(DatabaseError),

    #[error("Marshalling error: {0}")]
    Marshal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

pub type OrmResult<T> = Result<T, OrmError>;

impl OrmError {
    pub(crate) fn execution(operation: &'static str, table: &str, source: DatabaseError) -> Self {
        OrmError::Execution {
            operation,
            table: table.to_string(),
            source,
        }
    }
}

impl serde::Serialize for OrmError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
