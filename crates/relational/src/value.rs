//! Value model shared by records, filters and stores.
//!
//! `Value` is the dynamic representation of one column. It maps 1:1 onto the
//! PostgreSQL types the crate knows how to bind and extract, and it is what
//! the memory store keeps in its tables.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Arguments, Column, Row as SqlxRow, TypeInfo};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

use crate::{RelationalError, Result};

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean (BOOLEAN)
    Bool(bool),
    /// Small integer (SMALLINT)
    SmallInt(i16),
    /// Integer (INTEGER)
    Int(i32),
    /// Big integer (BIGINT)
    BigInt(i64),
    /// Single-precision float (REAL)
    Float(f32),
    /// Double-precision float (DOUBLE PRECISION)
    Double(f64),
    /// Decimal/Numeric (NUMERIC, DECIMAL)
    Decimal(Decimal),
    /// Variable-length string (VARCHAR, TEXT)
    String(String),
    /// Binary data (BYTEA)
    Bytes(Vec<u8>),
    /// UUID (UUID)
    Uuid(Uuid),
    /// Date (DATE)
    Date(NaiveDate),
    /// Time (TIME)
    Time(NaiveTime),
    /// Timestamp without timezone (TIMESTAMP)
    Timestamp(NaiveDateTime),
    /// Timestamp with timezone (TIMESTAMPTZ)
    TimestampTz(DateTime<Utc>),
    /// JSON/JSONB (JSON, JSONB)
    Json(JsonValue),
}

/// The declared type of a value, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Decimal,
    String,
    Bytes,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Json,
}

impl ValueKind {
    /// Returns the PostgreSQL type name for this kind.
    pub fn pg_type_name(&self) -> &'static str {
        match self {
            ValueKind::Null => "NULL",
            ValueKind::Bool => "BOOLEAN",
            ValueKind::SmallInt => "SMALLINT",
            ValueKind::Int => "INTEGER",
            ValueKind::BigInt => "BIGINT",
            ValueKind::Float => "REAL",
            ValueKind::Double => "DOUBLE PRECISION",
            ValueKind::Decimal => "NUMERIC",
            ValueKind::String => "TEXT",
            ValueKind::Bytes => "BYTEA",
            ValueKind::Uuid => "UUID",
            ValueKind::Date => "DATE",
            ValueKind::Time => "TIME",
            ValueKind::Timestamp => "TIMESTAMP",
            ValueKind::TimestampTz => "TIMESTAMPTZ",
            ValueKind::Json => "JSONB",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pg_type_name())
    }
}

impl Value {
    /// Returns the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::SmallInt(_) => ValueKind::SmallInt,
            Value::Int(_) => ValueKind::Int,
            Value::BigInt(_) => ValueKind::BigInt,
            Value::Float(_) => ValueKind::Float,
            Value::Double(_) => ValueKind::Double,
            Value::Decimal(_) => ValueKind::Decimal,
            Value::String(_) => ValueKind::String,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::Date(_) => ValueKind::Date,
            Value::Time(_) => ValueKind::Time,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::TimestampTz(_) => ValueKind::TimestampTz,
            Value::Json(_) => ValueKind::Json,
        }
    }

    /// Returns the PostgreSQL type name for this value.
    pub fn pg_type_name(&self) -> &'static str {
        self.kind().pg_type_name()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::Decimal(v) => v.to_string().parse().ok(),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Compares two values the way SQL comparison operators would.
    ///
    /// Integers of different widths compare numerically, and integers compare
    /// with floats and decimals through `f64`. Returns `None` when the values
    /// are not comparable, including any comparison against NULL.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::TimestampTz(a), Value::TimestampTz(b)) => Some(a.cmp(b)),
            (Value::Json(a), Value::Json(b)) => (a == b).then_some(Ordering::Equal),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
            },
        }
    }

    /// Converts the value to JSON.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(v) => JsonValue::Bool(*v),
            Value::SmallInt(v) => JsonValue::from(*v),
            Value::Int(v) => JsonValue::from(*v),
            Value::BigInt(v) => JsonValue::from(*v),
            Value::Float(v) => JsonValue::from(*v),
            Value::Double(v) => JsonValue::from(*v),
            Value::Decimal(v) => JsonValue::String(v.to_string()),
            Value::String(v) => JsonValue::String(v.clone()),
            Value::Bytes(v) => JsonValue::Array(v.iter().map(|b| JsonValue::from(*b)).collect()),
            Value::Uuid(v) => JsonValue::String(v.to_string()),
            Value::Date(v) => JsonValue::String(v.to_string()),
            Value::Time(v) => JsonValue::String(v.to_string()),
            Value::Timestamp(v) => JsonValue::String(v.to_string()),
            Value::TimestampTz(v) => JsonValue::String(v.to_rfc3339()),
            Value::Json(v) => v.clone(),
        }
    }

    /// Bind this value to a sqlx argument list.
    ///
    /// # Errors
    ///
    /// Returns error if binding fails (e.g., type incompatibility).
    pub fn bind_to_arguments(&self, arguments: &mut PgArguments) -> Result<()> {
        let bound = match self {
            // Bound as a TEXT NULL, which only fits where text would. Builders
            // write NULL assignments literally and filters reject NULL comparisons.
            Value::Null => arguments.add(Option::<String>::None),
            Value::Bool(v) => arguments.add(*v),
            Value::SmallInt(v) => arguments.add(*v),
            Value::Int(v) => arguments.add(*v),
            Value::BigInt(v) => arguments.add(*v),
            Value::Float(v) => arguments.add(*v),
            Value::Double(v) => arguments.add(*v),
            Value::Decimal(v) => arguments.add(*v),
            Value::String(v) => arguments.add(v.clone()),
            Value::Bytes(v) => arguments.add(v.clone()),
            Value::Uuid(v) => arguments.add(*v),
            Value::Date(v) => arguments.add(*v),
            Value::Time(v) => arguments.add(*v),
            Value::Timestamp(v) => arguments.add(*v),
            Value::TimestampTz(v) => arguments.add(*v),
            Value::Json(v) => arguments.add(v.clone()),
        };
        bound.map_err(|e| {
            RelationalError::Query(format!("Failed to bind {}: {}", self.pg_type_name(), e))
        })
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    String => String,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    JsonValue => Json,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Conversion from a column value back into a Rust type.
///
/// Returns the value unchanged as `Err` when its kind does not fit, so the
/// caller can report what it actually found.
pub trait FromValue: Sized {
    /// Kind this type is stored as.
    const KIND: ValueKind;

    fn from_value(value: Value) -> std::result::Result<Self, Value>;
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                const KIND: ValueKind = ValueKind::$variant;

                fn from_value(value: Value) -> std::result::Result<Self, Value> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i16 => SmallInt,
    i32 => Int,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    String => String,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    JsonValue => Json,
}

// Narrower integer columns widen losslessly into i64.
impl FromValue for i64 {
    const KIND: ValueKind = ValueKind::BigInt;

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::BigInt(v) => Ok(v),
            Value::Int(v) => Ok(i64::from(v)),
            Value::SmallInt(v) => Ok(i64::from(v)),
            other => Err(other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const KIND: ValueKind = T::KIND;

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Extracts every column of a PostgreSQL row, in result-set order.
pub fn row_to_values(row: &PgRow) -> Result<Vec<(String, Value)>> {
    let mut columns = Vec::with_capacity(row.columns().len());

    for (idx, column) in row.columns().iter().enumerate() {
        let column_name = column.name().to_string();
        let type_name = column.type_info().name().to_string();

        let value = extract_column(row, idx, &type_name).map_err(|e| {
            RelationalError::Query(format!(
                "Failed to extract {} from column '{}': {}",
                type_name, column_name, e
            ))
        })?;

        columns.push((column_name, value));
    }

    Ok(columns)
}

fn extract_column(row: &PgRow, idx: usize, type_name: &str) -> std::result::Result<Value, sqlx::Error> {
    fn get<'r, T>(row: &'r PgRow, idx: usize) -> std::result::Result<Value, sqlx::Error>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres> + Into<Value>,
    {
        Ok(row.try_get::<Option<T>, _>(idx)?.map_or(Value::Null, Into::into))
    }

    match type_name {
        "BOOL" | "BOOLEAN" => get::<bool>(row, idx),
        "INT2" | "SMALLINT" => get::<i16>(row, idx),
        "INT4" | "INTEGER" | "INT" => get::<i32>(row, idx),
        "INT8" | "BIGINT" => get::<i64>(row, idx),
        "FLOAT4" | "REAL" => get::<f32>(row, idx),
        "FLOAT8" | "DOUBLE PRECISION" => get::<f64>(row, idx),
        "NUMERIC" | "DECIMAL" => get::<Decimal>(row, idx),
        "VARCHAR" | "TEXT" | "CHAR" | "BPCHAR" | "NAME" => get::<String>(row, idx),
        "BYTEA" => get::<Vec<u8>>(row, idx),
        "UUID" => get::<Uuid>(row, idx),
        "DATE" => get::<NaiveDate>(row, idx),
        "TIME" => get::<NaiveTime>(row, idx),
        "TIMESTAMP" => get::<NaiveDateTime>(row, idx),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, idx),
        "JSON" | "JSONB" => get::<JsonValue>(row, idx),
        // Unknown types fall back to their text representation
        _ => get::<String>(row, idx),
    }
}
