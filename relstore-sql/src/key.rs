//! Primary-key identities: one row (`Key`) or many (`KeySet`).

use crate::error::{SqlError, SqlResult};
use crate::expression::{ColumnExp, Expression};
use crate::record::{RecordRef, RecordType};
use crate::value::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Canonical identity of one row: the primary-key values of a record type in
/// declared key-field order.
#[derive(Clone)]
pub struct Key {
    record: RecordRef,
    values: Arc<[Value]>,
}

impl Key {
    /// Builds a key from parallel field and value lists supplied in any order.
    pub fn new(record: &RecordRef, fields: &[&str], values: Vec<Value>) -> SqlResult<Key> {
        if fields.len() != values.len() {
            return Err(SqlError::InvalidArgument(format!(
                "Field and value lists must be the same length ({} fields, {} values)",
                fields.len(),
                values.len()
            )));
        }
        Key::from_pairs(record, fields.iter().copied().zip(values))
    }

    /// Builds a key from (field, value) pairs.
    pub fn from_pairs<I, S>(record: &RecordRef, pairs: I) -> SqlResult<Key>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let key_fields = record.primary_key_fields();
        if key_fields.is_empty() {
            return Err(SqlError::InvalidArgument(format!(
                "{} has no primary key",
                record.name()
            )));
        }
        let mut slots: Vec<Option<Value>> = vec![None; key_fields.len()];
        let mut extra = Vec::new();
        for (field, value) in pairs {
            let field = field.as_ref();
            match key_fields.iter().position(|k| k == field) {
                Some(idx) => slots[idx] = Some(value),
                None => extra.push(field.to_string()),
            }
        }
        if !extra.is_empty() {
            return Err(SqlError::InvalidArgument(format!(
                "Non-key columns given for {}: {}",
                record.name(),
                extra.join(", ")
            )));
        }

        let mut values = Vec::with_capacity(slots.len());
        for (field, slot) in key_fields.iter().zip(slots) {
            match slot {
                Some(Value::Null) => {
                    return Err(SqlError::InvalidArgument(format!(
                        "Null value for key field {}.{}",
                        record.name(),
                        field
                    )))
                }
                Some(value) => values.push(value),
                None => {
                    return Err(SqlError::InvalidArgument(format!(
                        "Missing value for key field {}.{}",
                        record.name(),
                        field
                    )))
                }
            }
        }
        Ok(Key {
            record: Arc::clone(record),
            values: values.into(),
        })
    }

    /// Builds a key from values already in declared key-field order, e.g. as
    /// read back from a keys-only select.
    pub fn from_values(record: &RecordRef, values: Vec<Value>) -> SqlResult<Key> {
        let expected = record.primary_key_fields().len();
        if expected == 0 || values.len() != expected {
            return Err(SqlError::InvalidArgument(format!(
                "{} expects {} key value(s), got {}",
                record.name(),
                expected,
                values.len()
            )));
        }
        if values.iter().any(Value::is_null) {
            return Err(SqlError::InvalidArgument(format!(
                "Null value in key for {}",
                record.name()
            )));
        }
        Ok(Key {
            record: Arc::clone(record),
            values: values.into(),
        })
    }

    pub fn record_type(&self) -> &RecordRef {
        &self.record
    }

    /// Values in declared key-field order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// AND of per-column equality tests.
    pub fn condition(&self) -> Expression {
        let mut tests: Vec<Expression> = self
            .record
            .primary_key_fields()
            .iter()
            .zip(self.values.iter())
            .map(|(field, value)| {
                ColumnExp::new(&self.record, field)
                    .exp()
                    .equals(Expression::Value(value.clone()))
            })
            .collect();
        if tests.len() == 1 {
            tests.remove(0)
        } else {
            Expression::And(tests)
        }
    }

    /// `field=value` pairs joined by `:`.
    pub fn short_string(&self) -> String {
        self.record
            .primary_key_fields()
            .iter()
            .zip(self.values.iter())
            .map(|(field, value)| format!("{}={}", field, value))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Fails when this key is asked to act on a different record type.
    pub fn validate_record_type(&self, record: &RecordType) -> SqlResult<()> {
        if self.record.same_type(record) {
            Ok(())
        } else {
            Err(SqlError::TypeMismatch(format!(
                "key for {} used against {}",
                self.record.name(),
                record.name()
            )))
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values && self.record.same_type(&other.record)
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.record.table().hash(state);
        self.values.hash(state);
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .record
            .primary_key_fields()
            .iter()
            .zip(self.values.iter())
            .map(|(field, value)| format!("{}={}", field, value))
            .collect();
        write!(f, "{}({})", self.record.name(), pairs.join(", "))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Many rows of one record type: an explicit key list, or a range made of
/// fixed columns plus one multi-valued column.
#[derive(Debug, Clone)]
pub enum KeySet {
    Explicit {
        record: RecordRef,
        keys: Vec<Key>,
    },
    Range {
        record: RecordRef,
        fixed: Vec<(String, Value)>,
        field: String,
        values: Vec<Value>,
    },
}

impl KeySet {
    pub fn explicit(record: &RecordRef, keys: Vec<Key>) -> SqlResult<KeySet> {
        if let Some(stray) = keys.iter().find(|k| !k.record.same_type(record)) {
            return Err(SqlError::TypeMismatch(format!(
                "key {} in key set for {}",
                stray,
                record.name()
            )));
        }
        Ok(KeySet::Explicit {
            record: Arc::clone(record),
            keys,
        })
    }

    pub fn range(
        record: &RecordRef,
        fixed: Vec<(String, Value)>,
        field: &str,
        values: Vec<Value>,
    ) -> SqlResult<KeySet> {
        for (name, _) in &fixed {
            record.column_name(name)?;
            if name == field {
                return Err(SqlError::InvalidArgument(format!(
                    "Ranged field '{}' also given a fixed value",
                    field
                )));
            }
        }
        record.column_name(field)?;
        Ok(KeySet::Range {
            record: Arc::clone(record),
            fixed,
            field: field.to_string(),
            values,
        })
    }

    pub fn record_type(&self) -> &RecordRef {
        match self {
            KeySet::Explicit { record, .. } | KeySet::Range { record, .. } => record,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            KeySet::Explicit { keys, .. } => keys.len(),
            KeySet::Range { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The member keys. A range whose pairs do not cover exactly the primary
    /// key yields an error.
    pub fn keys(&self) -> SqlResult<Vec<Key>> {
        match self {
            KeySet::Explicit { keys, .. } => Ok(keys.clone()),
            KeySet::Range { record, .. } => self
                .row_pairs()
                .into_iter()
                .map(|pairs| Key::from_pairs(record, pairs))
                .collect(),
        }
    }

    /// One (field, value) map per identified row.
    pub fn row_pairs(&self) -> Vec<Vec<(String, Value)>> {
        match self {
            KeySet::Explicit { record, keys } => keys
                .iter()
                .map(|key| {
                    record
                        .primary_key_fields()
                        .iter()
                        .cloned()
                        .zip(key.values().iter().cloned())
                        .collect()
                })
                .collect(),
            KeySet::Range {
                fixed, field, values, ..
            } => values
                .iter()
                .map(|value| {
                    let mut pairs = fixed.clone();
                    pairs.push((field.clone(), value.clone()));
                    pairs
                })
                .collect(),
        }
    }

    /// Splits into key sets of at most `max` members each.
    pub fn chunks(&self, max: usize) -> Vec<KeySet> {
        let max = max.max(1);
        match self {
            KeySet::Explicit { record, keys } => keys
                .chunks(max)
                .map(|chunk| KeySet::Explicit {
                    record: Arc::clone(record),
                    keys: chunk.to_vec(),
                })
                .collect(),
            KeySet::Range {
                record,
                fixed,
                field,
                values,
            } => values
                .chunks(max)
                .map(|chunk| KeySet::Range {
                    record: Arc::clone(record),
                    fixed: fixed.clone(),
                    field: field.clone(),
                    values: chunk.to_vec(),
                })
                .collect(),
        }
    }

    /// Single-column keys render as an IN list; composite keys as an OR of
    /// per-key conditions.
    pub fn condition(&self) -> Expression {
        match self {
            KeySet::Explicit { record, keys } => match record.primary_key_fields() {
                [single] => Expression::In {
                    target: Box::new(ColumnExp::new(record, single).exp()),
                    values: keys.iter().map(|k| k.values()[0].clone()).collect(),
                },
                _ => Expression::Or(keys.iter().map(Key::condition).collect()),
            },
            KeySet::Range {
                record,
                fixed,
                field,
                values,
            } => {
                let mut tests: Vec<Expression> = fixed
                    .iter()
                    .map(|(name, value)| {
                        ColumnExp::new(record, name)
                            .exp()
                            .equals(Expression::Value(value.clone()))
                    })
                    .collect();
                tests.push(Expression::In {
                    target: Box::new(ColumnExp::new(record, field).exp()),
                    values: values.clone(),
                });
                if tests.len() == 1 {
                    tests.remove(0)
                } else {
                    Expression::And(tests)
                }
            }
        }
    }

    pub fn validate_record_type(&self, record: &RecordType) -> SqlResult<()> {
        if self.record_type().same_type(record) {
            Ok(())
        } else {
            Err(SqlError::TypeMismatch(format!(
                "key set for {} used against {}",
                self.record_type().name(),
                record.name()
            )))
        }
    }
}

impl fmt::Display for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySet::Explicit { record, keys } => {
                let keys: Vec<String> = keys.iter().map(Key::short_string).collect();
                write!(f, "{}[{}]", record.name(), keys.join(", "))
            }
            KeySet::Range {
                record,
                fixed,
                field,
                values,
            } => {
                let fixed: Vec<String> = fixed.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "{}[{}; {} in ({})]",
                    record.name(),
                    fixed.join(":"),
                    field,
                    values.join(", ")
                )
            }
        }
    }
}
