//! Table definitions and the DDL used by entity registration.
//!
//! Registration is add-only: a missing table is created, and columns missing
//! from an existing table are added. Nothing is ever dropped or altered in
//! place.

use serde::{Deserialize, Serialize};

use crate::query::{quote_identifier, validate_identifier};
use crate::value::ValueKind;
use crate::Result;

/// PostgreSQL column data type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// SMALLINT
    SmallInt,
    /// INTEGER
    Integer,
    /// BIGINT
    BigInt,
    /// REAL
    Real,
    /// DOUBLE PRECISION
    DoublePrecision,
    /// NUMERIC(precision, scale)
    Numeric(Option<i32>, Option<i32>),
    /// VARCHAR(length)
    Varchar(Option<i32>),
    /// TEXT
    Text,
    /// BOOLEAN
    Boolean,
    /// BYTEA
    Bytea,
    /// UUID
    Uuid,
    /// DATE
    Date,
    /// TIME
    Time,
    /// TIMESTAMP
    Timestamp,
    /// TIMESTAMPTZ
    TimestampTz,
    /// JSON
    Json,
    /// JSONB
    Jsonb,
}

impl ColumnType {
    /// Returns the DDL spelling of the type.
    pub fn to_sql(&self) -> String {
        match self {
            ColumnType::SmallInt => "SMALLINT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Real => "REAL".to_string(),
            ColumnType::DoublePrecision => "DOUBLE PRECISION".to_string(),
            ColumnType::Numeric(Some(p), Some(s)) => format!("NUMERIC({}, {})", p, s),
            ColumnType::Numeric(Some(p), None) => format!("NUMERIC({})", p),
            ColumnType::Numeric(None, _) => "NUMERIC".to_string(),
            ColumnType::Varchar(Some(len)) => format!("VARCHAR({})", len),
            ColumnType::Varchar(None) => "VARCHAR".to_string(),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Bytea => "BYTEA".to_string(),
            ColumnType::Uuid => "UUID".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::TimestampTz => "TIMESTAMPTZ".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Jsonb => "JSONB".to_string(),
        }
    }

    /// Value kind a column of this type holds.
    pub fn value_kind(&self) -> ValueKind {
        match self {
            ColumnType::SmallInt => ValueKind::SmallInt,
            ColumnType::Integer => ValueKind::Int,
            ColumnType::BigInt => ValueKind::BigInt,
            ColumnType::Real => ValueKind::Float,
            ColumnType::DoublePrecision => ValueKind::Double,
            ColumnType::Numeric(..) => ValueKind::Decimal,
            ColumnType::Varchar(_) | ColumnType::Text => ValueKind::String,
            ColumnType::Boolean => ValueKind::Bool,
            ColumnType::Bytea => ValueKind::Bytes,
            ColumnType::Uuid => ValueKind::Uuid,
            ColumnType::Date => ValueKind::Date,
            ColumnType::Time => ValueKind::Time,
            ColumnType::Timestamp => ValueKind::Timestamp,
            ColumnType::TimestampTz => ValueKind::TimestampTz,
            ColumnType::Json | ColumnType::Jsonb => ValueKind::Json,
        }
    }
}

/// Represents a column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Data type
    pub data_type: ColumnType,
    /// Is nullable
    pub nullable: bool,
    /// Default value expression
    pub default: Option<String>,
    /// Is primary key
    pub is_primary_key: bool,
    /// Is unique
    pub is_unique: bool,
    /// Values are generated by the database
    pub is_identity: bool,
}

impl ColumnDef {
    /// A nullable column with no constraints.
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
            is_primary_key: false,
            is_unique: false,
            is_identity: false,
        }
    }

    /// A database-generated BIGINT primary key.
    pub fn identity(name: impl Into<String>) -> Self {
        Self {
            nullable: false,
            is_primary_key: true,
            is_identity: true,
            ..Self::new(name, ColumnType::BigInt)
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    /// Sets the DEFAULT expression, emitted verbatim.
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Column definition as it appears in CREATE TABLE / ADD COLUMN.
    pub fn to_sql(&self) -> Result<String> {
        validate_identifier(&self.name)?;

        let mut sql = format!("{} {}", quote_identifier(&self.name), self.data_type.to_sql());
        if self.is_identity {
            sql.push_str(" GENERATED BY DEFAULT AS IDENTITY");
        }
        if self.is_primary_key {
            sql.push_str(" PRIMARY KEY");
        } else {
            if !self.nullable {
                sql.push_str(" NOT NULL");
            }
            if self.is_unique {
                sql.push_str(" UNIQUE");
            }
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        Ok(sql)
    }
}

/// Represents a table definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub table_name: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
        }
    }

    /// Builder-style column append.
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Gets a column by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Statements that bring the database up to this schema.
    ///
    /// The first statement creates the table if it does not exist; one
    /// `ADD COLUMN IF NOT EXISTS` follows per non-key column so that tables
    /// created by an older schema gain the new columns.
    pub fn migration_sql(&self) -> Result<Vec<String>> {
        validate_identifier(&self.table_name)?;
        let table = quote_identifier(&self.table_name);

        let column_sql = self
            .columns
            .iter()
            .map(ColumnDef::to_sql)
            .collect::<Result<Vec<_>>>()?;

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            table,
            column_sql.join(", ")
        )];
        statements.extend(
            self.columns
                .iter()
                .zip(&column_sql)
                .filter(|(col, _)| !col.is_primary_key)
                .map(|(_, sql)| format!("ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}", table, sql)),
        );
        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableSchema {
        TableSchema::new("users")
            .column(ColumnDef::identity("id"))
            .column(ColumnDef::new("name", ColumnType::Text).not_null())
            .column(ColumnDef::new("email", ColumnType::Varchar(Some(255))).unique())
            .column(ColumnDef::new("active", ColumnType::Boolean).default_expr("true"))
    }

    #[test]
    fn test_column_type_to_sql() {
        assert_eq!(ColumnType::Numeric(Some(10), Some(2)).to_sql(), "NUMERIC(10, 2)");
        assert_eq!(ColumnType::Numeric(None, None).to_sql(), "NUMERIC");
        assert_eq!(ColumnType::Varchar(None).to_sql(), "VARCHAR");
        assert_eq!(ColumnType::DoublePrecision.to_sql(), "DOUBLE PRECISION");
        assert_eq!(ColumnType::Integer.value_kind(), ValueKind::Int);
    }

    #[test]
    fn test_identity_column() {
        assert_eq!(
            ColumnDef::identity("id").to_sql().unwrap(),
            "\"id\" BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"
        );
    }

    #[test]
    fn test_migration_sql() {
        let statements = users().migration_sql().unwrap();
        assert_eq!(
            statements[0],
            "CREATE TABLE IF NOT EXISTS \"users\" (\"id\" BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY, \
             \"name\" TEXT NOT NULL, \"email\" VARCHAR(255) UNIQUE, \"active\" BOOLEAN DEFAULT true)"
        );
        assert_eq!(statements.len(), 4);
        assert_eq!(
            statements[1],
            "ALTER TABLE \"users\" ADD COLUMN IF NOT EXISTS \"name\" TEXT NOT NULL"
        );
    }

    #[test]
    fn test_migration_rejects_bad_identifiers() {
        assert!(TableSchema::new("drop").migration_sql().is_err());
        let schema = TableSchema::new("users").column(ColumnDef::new("bad name", ColumnType::Text));
        assert!(schema.migration_sql().is_err());
    }

    #[test]
    fn test_schema_serializes() {
        let json = serde_json::to_value(users()).unwrap();
        assert_eq!(json["table_name"], "users");
        assert_eq!(json["columns"][0]["is_identity"], true);
    }
}
