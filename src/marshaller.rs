//! Mapping between Rust values and table rows.
//!
//! A type opts in by implementing [`PersistentRecord`]. Its [`RecordType`]
//! is described once, on first use, and kept in a process-wide registry.

use crate::connection::{column_value, Connection, RowCursor, RowReader};
use crate::error::{OrmError, OrmResult};
use parking_lot::RwLock;
use relstore_sql::{
    ColumnExp, Expression, FieldSource, InsertClause, Key, RecordRef, RecordType, SqlError, Value,
};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

/// A record type that can be loaded from and written to a table.
///
/// ```rust
/// use relstore::{OrmResult, PersistentRecord, RowReader};
/// use relstore_sql::{ColumnType, FieldDef, RecordType, Value};
///
/// #[derive(Clone)]
/// struct Tag {
///     id: i64,
///     label: String,
/// }
///
/// impl PersistentRecord for Tag {
///     fn describe() -> OrmResult<RecordType> {
///         Ok(RecordType::builder("Tag", "tag")
///             .field(FieldDef::new("id", ColumnType::Long))
///             .field(FieldDef::new("label", ColumnType::String))
///             .primary_key(["id"])
///             .identity("id")
///             .build()?)
///     }
///
///     fn from_row(row: &RowReader<'_>) -> OrmResult<Self> {
///         Ok(Tag { id: row.get("id")?, label: row.get("label")? })
///     }
///
///     fn field_value(&self, field: &str) -> Option<Value> {
///         match field {
///             "id" => Some(self.id.into()),
///             "label" => Some(self.label.clone().into()),
///             _ => None,
///         }
///     }
///
///     fn set_field_value(&mut self, field: &str, value: Value) -> OrmResult<()> {
///         match field {
///             "id" => self.id = relstore::FromValue::from_value(value)?,
///             "label" => self.label = relstore::FromValue::from_value(value)?,
///             _ => {}
///         }
///         Ok(())
///     }
/// }
///
/// assert_eq!(Tag::record_type().unwrap().table(), "tag");
/// ```
pub trait PersistentRecord: Clone + Send + Sync + 'static {
    /// Builds the mapping. Called at most a few times per process; use
    /// [`PersistentRecord::record_type`] to get the registered instance.
    fn describe() -> OrmResult<RecordType>;

    fn from_row(row: &RowReader<'_>) -> OrmResult<Self>;

    /// Current value of `field`, or `None` for unknown fields.
    fn field_value(&self, field: &str) -> Option<Value>;

    fn set_field_value(&mut self, field: &str, value: Value) -> OrmResult<()>;

    fn record_type() -> OrmResult<RecordRef> {
        registered::<Self>()
    }

    /// Column expression for `field`, checked against the mapping.
    fn column(field: &str) -> OrmResult<Expression> {
        let record = Self::record_type()?;
        record.column_name(field)?;
        Ok(Expression::column(&record, field))
    }
}

type Registry = RwLock<HashMap<TypeId, RecordRef>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn registered<T: PersistentRecord>() -> OrmResult<RecordRef> {
    let id = TypeId::of::<T>();
    if let Some(record) = registry().read().get(&id) {
        return Ok(Arc::clone(record));
    }
    let described = Arc::new(T::describe()?);
    let mut registry = registry().write();
    let record = registry.entry(id).or_insert_with(|| {
        tracing::debug!("Registered record type {} ({})", described.name(), described.table());
        described
    });
    Ok(Arc::clone(record))
}

/// Row and key conversions for one record type.
pub struct Marshaller<T> {
    record: RecordRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Marshaller<T> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
            _marker: PhantomData,
        }
    }
}

impl<T: PersistentRecord> Marshaller<T> {
    pub fn new() -> OrmResult<Self> {
        Ok(Self {
            record: T::record_type()?,
            _marker: PhantomData,
        })
    }

    pub fn record_type(&self) -> &RecordRef {
        &self.record
    }

    pub fn table_name(&self) -> &str {
        self.record.table()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.record.field_names()
    }

    pub fn primary_key_fields(&self) -> &[String] {
        self.record.primary_key_fields()
    }

    pub fn has_primary_key(&self) -> bool {
        self.record.has_primary_key()
    }

    /// Materializes the current row of a select whose columns are `fields`.
    pub fn create_record(&self, cursor: &dyn RowCursor, fields: &[String]) -> OrmResult<T> {
        T::from_row(&RowReader::new(cursor, fields))
    }

    /// Key of a record, or `None` when it has not been assigned one yet: a
    /// key field is null, or the identity field still holds zero.
    pub fn primary_key(&self, record: &T) -> Option<Key> {
        let identity = self.record.identity_field();
        let mut values = Vec::with_capacity(self.primary_key_fields().len());
        for field in self.primary_key_fields() {
            let value = record.field_value(field)?;
            if value.is_null() || (identity == Some(field.as_str()) && value.is_zero()) {
                return None;
            }
            values.push(value);
        }
        Key::from_values(&self.record, values).ok()
    }

    /// Like [`Marshaller::primary_key`], for operations that need one.
    pub fn row_key(&self, record: &T) -> OrmResult<Key> {
        self.primary_key(record).ok_or_else(|| {
            OrmError::InvalidArgument(format!("{} record has no primary key value", self.record.name()))
        })
    }

    /// Key read from a keys-only select, whose columns are the key fields in
    /// declared order. Values are converted by column type so the key equals
    /// the one [`Marshaller::row_key`] gives for the loaded record.
    pub fn key_from_row(&self, cursor: &dyn RowCursor) -> OrmResult<Key> {
        let values = self
            .primary_key_fields()
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let def = self
                    .record
                    .field(field)
                    .ok_or_else(|| SqlError::UnknownField {
                        record: self.record.name().to_string(),
                        field: field.clone(),
                    })?;
                let raw = cursor.get(i).map_err(|e| OrmError::Marshal(e.message))?;
                column_value(def.column_type, raw)
            })
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(Key::from_values(&self.record, values)?)
    }

    /// Field values written by an insert, computed fields excluded.
    pub fn insert_values(&self, record: &T) -> Vec<(String, Value)> {
        self.record
            .fields()
            .iter()
            .filter(|f| !f.computed)
            .map(|f| (f.name.clone(), record.field_value(&f.name).unwrap_or(Value::Null)))
            .collect()
    }

    pub fn insert_clause(&self, record: &T) -> OrmResult<InsertClause> {
        let identity: HashSet<String> = self.record.identity_field().map(str::to_string).into_iter().collect();
        Ok(InsertClause::new(&self.record, self.insert_values(record), identity)?)
    }

    /// Expressions assigning each of `fields` its current value in `record`.
    pub fn update_values(&self, record: &T, fields: &[String]) -> OrmResult<Vec<Expression>> {
        fields
            .iter()
            .map(|field| {
                self.record.column_name(field)?;
                Ok(Expression::Value(record.field_value(field).unwrap_or(Value::Null)))
            })
            .collect()
    }

    /// Non-key, non-computed fields: what a whole-record update writes.
    pub fn updatable_fields(&self) -> Vec<String> {
        self.record
            .fields()
            .iter()
            .filter(|f| !f.computed && !self.primary_key_fields().contains(&f.name))
            .map(|f| f.name.clone())
            .collect()
    }

    /// After an insert, copies a database-assigned identity into `record`.
    pub fn assign_primary_key(&self, conn: &dyn Connection, record: &mut T) -> OrmResult<()> {
        let Some(field) = self.record.identity_field() else {
            return Ok(());
        };
        if self.primary_key(record).is_some() {
            return Ok(());
        }
        let column = self.record.column_name(field)?;
        let id = conn
            .last_insert_id(self.table_name(), column)
            .map_err(|e| OrmError::execution("insert", self.table_name(), e))?;
        match id {
            Some(value) => record.set_field_value(field, value),
            None => Err(OrmError::Marshal(format!(
                "database assigned no {} for the new {} record",
                field,
                self.record.name()
            ))),
        }
    }

    /// Evaluates `condition` against an in-memory record.
    pub fn matches(&self, record: &T, condition: &Expression) -> bool {
        condition
            .evaluate(&RecordFields {
                record_type: &self.record,
                record,
            })
            .is_true()
    }
}

struct RecordFields<'a, T> {
    record_type: &'a RecordType,
    record: &'a T,
}

impl<T: PersistentRecord> FieldSource for RecordFields<'_, T> {
    fn field_value(&self, column: &ColumnExp) -> Option<Value> {
        if column.record().same_type(self.record_type) {
            self.record.field_value(column.field())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{DbResult, PreparedStatement, VecCursor};
    use relstore_sql::{ColumnType, FieldDef};

    #[derive(Clone, Debug, PartialEq)]
    struct Gadget {
        id: i64,
        label: String,
        weight: Option<f64>,
    }

    impl PersistentRecord for Gadget {
        fn describe() -> OrmResult<RecordType> {
            Ok(RecordType::builder("Gadget", "gadget")
                .field(FieldDef::new("id", ColumnType::Long))
                .field(FieldDef::new("label", ColumnType::String).length(40))
                .field(FieldDef::new("weight", ColumnType::Double).nullable())
                .primary_key(["id"])
                .identity("id")
                .build()?)
        }

        fn from_row(row: &RowReader<'_>) -> OrmResult<Self> {
            Ok(Gadget {
                id: row.get("id")?,
                label: row.get("label")?,
                weight: row.get("weight")?,
            })
        }

        fn field_value(&self, field: &str) -> Option<Value> {
            match field {
                "id" => Some(self.id.into()),
                "label" => Some(self.label.clone().into()),
                "weight" => Some(self.weight.into()),
                _ => None,
            }
        }

        fn set_field_value(&mut self, field: &str, value: Value) -> OrmResult<()> {
            use crate::connection::FromValue;
            match field {
                "id" => self.id = i64::from_value(value)?,
                "label" => self.label = String::from_value(value)?,
                "weight" => self.weight = Option::<f64>::from_value(value)?,
                other => return Err(OrmError::Marshal(format!("unknown field {}", other))),
            }
            Ok(())
        }
    }

    struct FixedId(i64);

    impl Connection for FixedId {
        fn prepare(&self, _sql: &str) -> DbResult<Box<dyn PreparedStatement + '_>> {
            Err(crate::connection::DatabaseError::new("not supported"))
        }

        fn last_insert_id(&self, _table: &str, _column: &str) -> DbResult<Option<Value>> {
            Ok(Some(Value::Int(self.0)))
        }
    }

    fn gadget(id: i64) -> Gadget {
        Gadget {
            id,
            label: "lamp".to_string(),
            weight: None,
        }
    }

    #[test]
    fn test_registry_returns_same_instance() {
        let a = Gadget::record_type().unwrap();
        let b = Gadget::record_type().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Gadget::column("label").is_ok());
        assert!(Gadget::column("colour").is_err());
    }

    #[test]
    fn test_zero_identity_has_no_key() {
        let m = Marshaller::<Gadget>::new().unwrap();
        assert!(m.primary_key(&gadget(0)).is_none());
        assert!(m.row_key(&gadget(0)).is_err());
        assert_eq!(m.primary_key(&gadget(4)).unwrap().values(), &[Value::Int(4)]);
    }

    #[test]
    fn test_create_record_from_cursor() {
        let m = Marshaller::<Gadget>::new().unwrap();
        let fields = m.field_names();
        let mut cursor = VecCursor::new(
            3,
            vec![vec![Value::Int(9), Value::Text("desk".into()), Value::Float(2.5)]],
        );
        cursor.advance().unwrap();
        let g = m.create_record(&cursor, &fields).unwrap();
        assert_eq!(
            g,
            Gadget {
                id: 9,
                label: "desk".to_string(),
                weight: Some(2.5)
            }
        );
        assert_eq!(m.key_from_row(&cursor).unwrap().values(), &[Value::Int(9)]);
    }

    #[test]
    fn test_insert_skips_unassigned_identity() {
        let m = Marshaller::<Gadget>::new().unwrap();
        let insert = m.insert_clause(&gadget(0)).unwrap();
        let written: Vec<&str> = insert.written_values().map(|(f, _)| f.as_str()).collect();
        assert_eq!(written, vec!["label", "weight"]);
        assert_eq!(m.updatable_fields(), vec!["label".to_string(), "weight".to_string()]);
    }

    #[test]
    fn test_assign_primary_key() {
        let m = Marshaller::<Gadget>::new().unwrap();
        let mut g = gadget(0);
        m.assign_primary_key(&FixedId(31), &mut g).unwrap();
        assert_eq!(g.id, 31);

        // an existing key is left alone
        m.assign_primary_key(&FixedId(99), &mut g).unwrap();
        assert_eq!(g.id, 31);
    }

    #[test]
    fn test_matches_in_memory() {
        let m = Marshaller::<Gadget>::new().unwrap();
        let record = m.record_type().clone();
        let lamp = gadget(1);
        assert!(m.matches(&lamp, &Expression::column(&record, "label").equals("lamp")));
        assert!(!m.matches(&lamp, &Expression::column(&record, "id").greater_than(5)));
        assert!(!m.matches(&lamp, &Expression::column(&record, "weight").greater_than(1.0)));
    }
}
