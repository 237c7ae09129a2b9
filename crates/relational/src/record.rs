//! Records and the `Entity` trait.
//!
//! A `Record` is an ordered column map, the unit every store reads and
//! writes. Typed entities implement [`Entity`] to project themselves to and
//! from records, which is how the facade stays generic without reflection.

use serde_json::Value as JsonValue;

use crate::schema::TableSchema;
use crate::value::{FromValue, Value};
use crate::{RelationalError, Result};

/// One persistable row, as an ordered list of named column values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets a column, replacing any previous value in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Gets a value by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Removes a column and returns its value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let idx = self.columns.iter().position(|(name, _)| name == column)?;
        Some(self.columns.remove(idx).1)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Takes a column out of the record, converted to `T`.
    ///
    /// `entity` only names the owner in error messages.
    ///
    /// # Errors
    ///
    /// `FieldNotFound` if the column is absent, `TypeMismatch` if its value
    /// does not convert to `T`.
    pub fn take<T: FromValue>(&mut self, entity: &str, column: &str) -> Result<T> {
        let value = self
            .remove(column)
            .ok_or_else(|| RelationalError::FieldNotFound {
                entity: entity.to_string(),
                field: column.to_string(),
            })?;
        let found = value.kind();
        T::from_value(value).map_err(|rejected| {
            // Put the value back so the record is left as it was.
            self.columns.push((column.to_string(), rejected));
            RelationalError::TypeMismatch {
                entity: entity.to_string(),
                field: column.to_string(),
                expected: T::KIND,
                found,
            }
        })
    }

    /// Gets all column names, in insertion order.
    pub fn columns(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Converts the record to a JSON object.
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .columns
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        JsonValue::Object(map)
    }

    /// Converts from a SQLx row.
    pub fn from_sqlx(row: &sqlx::postgres::PgRow) -> Result<Self> {
        Ok(Self {
            columns: crate::value::row_to_values(row)?,
        })
    }
}

impl From<Vec<(String, Value)>> for Record {
    fn from(columns: Vec<(String, Value)>) -> Self {
        let mut record = Record::new();
        for (name, value) in columns {
            record.set(name, value);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// A typed record stored in one table.
///
/// ```rust,ignore
/// struct User { id: i64, name: String }
///
/// impl Entity for User {
///     const TABLE: &'static str = "users";
///
///     fn to_record(&self) -> Record {
///         Record::new().with("id", self.id).with("name", self.name.clone())
///     }
///
///     fn from_record(mut record: Record) -> Result<Self> {
///         Ok(Self {
///             id: record.take("User", "id")?,
///             name: record.take("User", "name")?,
///         })
///     }
///
///     fn schema() -> TableSchema {
///         TableSchema::new(Self::TABLE)
///             .column(ColumnDef::identity("id"))
///             .column(ColumnDef::new("name", ColumnType::Text))
///     }
/// }
/// ```
pub trait Entity: Sized + Send + Sync {
    /// Table the entity is stored in.
    const TABLE: &'static str;

    /// Column holding the entity's identity.
    const ID_FIELD: &'static str = "id";

    /// Name used in error messages.
    fn entity_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Projects the entity to a record, identity column included.
    fn to_record(&self) -> Record;

    /// Rebuilds the entity from a stored record.
    fn from_record(record: Record) -> Result<Self>;

    /// Table definition used by `Database::register_entities`.
    fn schema() -> TableSchema;
}
