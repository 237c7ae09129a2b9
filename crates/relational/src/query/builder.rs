//! QueryBuilder: renders parameterized SQL for one table.

use super::filter::Filter;
use super::helpers::{quote_identifier, validate_identifier};
use super::types::{Condition, Operator};
use crate::record::Record;
use crate::value::Value;
use crate::{RelationalError, Result};

/// SQL text plus its positional parameters.
pub type Statement = (String, Vec<Value>);

/// Builds the statements a record store issues against one table.
///
/// Every statement uses `$n` placeholders; values never appear in the SQL
/// text.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
}

impl QueryBuilder {
    /// Creates a new query builder for a table.
    ///
    /// # Errors
    ///
    /// Returns error if table name is invalid.
    pub fn new(table: &str) -> Result<Self> {
        validate_identifier(table)?;
        Ok(Self {
            table: table.to_string(),
        })
    }

    /// Get the table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Builds an INSERT returning the stored row.
    ///
    /// An empty record inserts `DEFAULT VALUES`.
    pub fn build_insert(&self, record: &Record) -> Result<Statement> {
        if record.is_empty() {
            return Ok((
                format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quote_identifier(&self.table)),
                Vec::new(),
            ));
        }

        for (col, _) in record.iter() {
            validate_identifier(col)?;
        }

        let mut params: Vec<Value> = Vec::with_capacity(record.len());
        let columns: Vec<String> = record.iter().map(|(col, _)| quote_identifier(col)).collect();
        let placeholders: Vec<String> = record
            .iter()
            .map(|(_, val)| assignment(val, &mut params))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            quote_identifier(&self.table),
            columns.join(", "),
            placeholders.join(", ")
        );

        Ok((sql, params))
    }

    /// Builds a full-row UPDATE of the row whose `id_field` equals `id`.
    ///
    /// The identity column itself is never assigned.
    pub fn build_update(&self, id_field: &str, id: i64, record: &Record) -> Result<Statement> {
        validate_identifier(id_field)?;

        let values: Vec<(&str, &Value)> = record.iter().filter(|(col, _)| *col != id_field).collect();
        if values.is_empty() {
            return Err(RelationalError::Query("Cannot update with no values".to_string()));
        }

        let mut params: Vec<Value> = Vec::with_capacity(values.len() + 1);
        let mut set_parts: Vec<String> = Vec::with_capacity(values.len());
        for (col, val) in values {
            validate_identifier(col)?;
            let rhs = assignment(val, &mut params);
            set_parts.push(format!("{} = {}", quote_identifier(col), rhs));
        }

        params.push(Value::BigInt(id));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ${} RETURNING *",
            quote_identifier(&self.table),
            set_parts.join(", "),
            quote_identifier(id_field),
            params.len()
        );

        Ok((sql, params))
    }

    /// Builds a DELETE of the row whose `id_field` equals `id`.
    pub fn build_delete(&self, id_field: &str, id: i64) -> Result<Statement> {
        validate_identifier(id_field)?;
        Ok((
            format!(
                "DELETE FROM {} WHERE {} = $1",
                quote_identifier(&self.table),
                quote_identifier(id_field)
            ),
            vec![Value::BigInt(id)],
        ))
    }

    /// Builds a SELECT of the first row whose `id_field` equals `id`.
    pub fn build_first(&self, id_field: &str, id: i64) -> Result<Statement> {
        validate_identifier(id_field)?;
        Ok((
            format!(
                "SELECT * FROM {} WHERE {} = $1 LIMIT 1",
                quote_identifier(&self.table),
                quote_identifier(id_field)
            ),
            vec![Value::BigInt(id)],
        ))
    }

    /// Builds a SELECT for every row matching `filter`.
    pub fn build_select(&self, filter: &Filter) -> Statement {
        let mut sql = format!("SELECT * FROM {}", quote_identifier(&self.table));
        let mut params: Vec<Value> = Vec::new();

        if !filter.conditions.is_empty() {
            let where_parts: Vec<String> = filter
                .conditions
                .iter()
                .map(|cond| build_where_condition(cond, &mut params))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&where_parts.join(" AND "));
        }

        if !filter.order_by_clauses.is_empty() {
            let order_parts: Vec<String> = filter
                .order_by_clauses
                .iter()
                .map(|(field, dir)| format!("{} {}", quote_identifier(field), dir.to_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_parts.join(", "));
        }

        if let Some(limit) = filter.limit_value {
            params.push(Value::BigInt(i64::try_from(limit).unwrap_or(i64::MAX)));
            sql.push_str(&format!(" LIMIT ${}", params.len()));
        }

        if let Some(offset) = filter.offset_value {
            params.push(Value::BigInt(i64::try_from(offset).unwrap_or(i64::MAX)));
            sql.push_str(&format!(" OFFSET ${}", params.len()));
        }

        (sql, params)
    }
}

/// Placeholder for an assigned value. NULL is written literally so the
/// column type decides, instead of the type of a bound parameter.
fn assignment(value: &Value, params: &mut Vec<Value>) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }
    params.push(value.clone());
    format!("${}", params.len())
}

fn build_where_condition(cond: &Condition, params: &mut Vec<Value>) -> String {
    let quoted_field = quote_identifier(&cond.field);
    match cond.operator {
        Operator::IsNull | Operator::IsNotNull => {
            format!("{} {}", quoted_field, cond.operator.to_sql())
        }
        Operator::In | Operator::NotIn => {
            let placeholders: Vec<String> = cond
                .values
                .iter()
                .map(|value| {
                    params.push(value.clone());
                    format!("${}", params.len())
                })
                .collect();
            format!("{} {} ({})", quoted_field, cond.operator.to_sql(), placeholders.join(", "))
        }
        _ => {
            params.push(cond.values.first().cloned().unwrap_or(Value::Null));
            format!("{} {} ${}", quoted_field, cond.operator.to_sql(), params.len())
        }
    }
}
