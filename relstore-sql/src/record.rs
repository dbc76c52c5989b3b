//! Record type metadata: the schema-level identity of a persistent record.

use crate::error::{SqlError, SqlResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Shared handle to an immutable record type.
pub type RecordRef = Arc<RecordType>;

/// Storage type of a field, used for DDL type mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    String,
    Date,
    Time,
    Timestamp,
    Blob,
}

/// One persistent field of a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub column: String,
    pub column_type: ColumnType,
    pub length: Option<u32>,
    pub nullable: bool,
    /// Computed fields have no column of their own; their value comes from
    /// a field override.
    pub computed: bool,
}

impl FieldDef {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column: name.to_string(),
            column_type,
            length: None,
            nullable: false,
            computed: false,
        }
    }

    pub fn column(mut self, column: &str) -> Self {
        self.column = column.to_string();
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }
}

/// Text search configuration of a full-text index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FullTextConfig {
    Simple,
    English,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FullTextIndex {
    pub name: String,
    pub fields: Vec<String>,
    pub config: FullTextConfig,
}

/// Table name, ordered fields, primary key and full-text indexes of a record.
#[derive(Debug)]
pub struct RecordType {
    name: String,
    table: String,
    fields: Vec<FieldDef>,
    primary_key: Vec<String>,
    identity: Option<String>,
    full_text: Vec<FullTextIndex>,
    computed: bool,
}

impl RecordType {
    pub fn builder(name: &str, table: &str) -> RecordTypeBuilder {
        RecordTypeBuilder {
            name: name.to_string(),
            table: table.to_string(),
            fields: Vec::new(),
            primary_key: Vec::new(),
            identity: None,
            full_text: Vec::new(),
            computed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn primary_key_fields(&self) -> &[String] {
        &self.primary_key
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// The auto-assigned key field, if the database generates this type's key.
    pub fn identity_field(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn full_text_index(&self, name: &str) -> Option<&FullTextIndex> {
        self.full_text.iter().find(|i| i.name == name)
    }

    /// Projection types select arbitrary expressions rather than columns.
    pub fn is_computed(&self) -> bool {
        self.computed
    }

    pub fn has_computed_fields(&self) -> bool {
        self.computed || self.fields.iter().any(|f| f.computed)
    }

    pub fn column_name(&self, field: &str) -> SqlResult<&str> {
        self.field(field)
            .map(|f| f.column.as_str())
            .ok_or_else(|| self.unknown_field(field))
    }

    pub(crate) fn unknown_field(&self, field: &str) -> SqlError {
        SqlError::UnknownField {
            record: self.name.clone(),
            field: field.to_string(),
        }
    }

    /// Two handles denote the same record type when name and table match.
    pub fn same_type(&self, other: &RecordType) -> bool {
        self.name == other.name && self.table == other.table
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

pub struct RecordTypeBuilder {
    name: String,
    table: String,
    fields: Vec<FieldDef>,
    primary_key: Vec<String>,
    identity: Option<String>,
    full_text: Vec<FullTextIndex>,
    computed: bool,
}

impl RecordTypeBuilder {
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn primary_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn identity(mut self, field: &str) -> Self {
        self.identity = Some(field.to_string());
        self
    }

    pub fn full_text(mut self, name: &str, fields: &[&str], config: FullTextConfig) -> Self {
        self.full_text.push(FullTextIndex {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            config,
        });
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn build(self) -> SqlResult<RecordType> {
        let record = RecordType {
            name: self.name,
            table: self.table,
            fields: self.fields,
            primary_key: self.primary_key,
            identity: self.identity,
            full_text: self.full_text,
            computed: self.computed,
        };

        for (i, field) in record.fields.iter().enumerate() {
            if record.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SqlError::InvalidArgument(format!(
                    "Field '{}' declared twice in {}",
                    field.name, record.name
                )));
            }
        }
        for key in &record.primary_key {
            if record.field(key).is_none() {
                return Err(record.unknown_field(key));
            }
        }
        if let Some(identity) = &record.identity {
            if !record.primary_key.iter().any(|k| k == identity) {
                return Err(SqlError::InvalidArgument(format!(
                    "Identity field '{}' is not part of the primary key of {}",
                    identity, record.name
                )));
            }
        }
        for index in &record.full_text {
            for field in &index.fields {
                if record.field(field).is_none() {
                    return Err(record.unknown_field(field));
                }
            }
        }
        Ok(record)
    }
}

/// Ordered, duplicate-free set of record types referenced by a clause tree.
#[derive(Debug, Default, Clone)]
pub struct RecordTypeSet {
    types: Vec<RecordRef>,
}

impl RecordTypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: &RecordRef) {
        if !self.contains(record) {
            self.types.push(Arc::clone(record));
        }
    }

    pub fn contains(&self, record: &RecordType) -> bool {
        self.types.iter().any(|t| t.same_type(record))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordRef> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> RecordType {
        RecordType::builder("Person", "person")
            .field(FieldDef::new("id", ColumnType::Integer))
            .field(FieldDef::new("name", ColumnType::String).length(64))
            .primary_key(["id"])
            .identity("id")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_keeps_declaration_order() {
        let record = person();
        assert_eq!(record.field_names(), vec!["id", "name"]);
        assert_eq!(record.primary_key_fields(), &["id".to_string()]);
        assert_eq!(record.identity_field(), Some("id"));
        assert!(!record.has_computed_fields());
    }

    #[test]
    fn test_unknown_primary_key_rejected() {
        let err = RecordType::builder("Person", "person")
            .field(FieldDef::new("id", ColumnType::Integer))
            .primary_key(["uid"])
            .build()
            .unwrap_err();
        assert!(matches!(err, SqlError::UnknownField { .. }));
    }

    #[test]
    fn test_identity_must_be_key() {
        let err = RecordType::builder("Person", "person")
            .field(FieldDef::new("id", ColumnType::Integer))
            .field(FieldDef::new("seq", ColumnType::Integer))
            .primary_key(["id"])
            .identity("seq")
            .build()
            .unwrap_err();
        assert!(matches!(err, SqlError::InvalidArgument(_)));
    }

    #[test]
    fn test_type_set_deduplicates() {
        let record = Arc::new(person());
        let mut set = RecordTypeSet::new();
        set.insert(&record);
        set.insert(&Arc::new(person()));
        assert_eq!(set.len(), 1);
    }
}
