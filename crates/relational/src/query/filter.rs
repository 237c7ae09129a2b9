//! Filter: the criteria half of a SELECT.

use std::cmp::Ordering;

use super::helpers::{like_match, validate_identifier};
use super::types::{Condition, Operator, OrderDirection};
use crate::record::{Entity, Record};
use crate::value::Value;
use crate::{RelationalError, Result};

/// Selection criteria for `Database::filter`.
///
/// Conditions are combined with AND. Every field name is validated when the
/// condition is added, so a built filter is always safe to render as SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub(crate) conditions: Vec<Condition>,
    pub(crate) order_by_clauses: Vec<(String, OrderDirection)>,
    pub(crate) limit_value: Option<u64>,
    pub(crate) offset_value: Option<u64>,
}

impl Filter {
    /// An empty filter, matching every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter matching rows equal to every non-NULL column of `example`.
    pub fn matching(example: &Record) -> Result<Self> {
        example
            .iter()
            .filter(|(_, value)| !value.is_null())
            .try_fold(Self::new(), |filter, (column, value)| {
                filter.eq(column, value.clone())
            })
    }

    /// Filter matching rows equal to the set fields of an entity.
    ///
    /// An unset identity and NULL columns are left out, so an unsaved
    /// entity works as a query template.
    pub fn example<E: Entity>(entity: &E) -> Result<Self> {
        let mut record = entity.to_record();
        if matches!(record.get(E::ID_FIELD), Some(Value::BigInt(0))) {
            record.remove(E::ID_FIELD);
        }
        Self::matching(&record)
    }

    /// Adds a WHERE condition taking a single value.
    ///
    /// For IS NULL and IS NOT NULL the value is ignored. IN lists go through
    /// [`Filter::where_in`]. Comparing against NULL is rejected, since it
    /// never matches; use [`Filter::where_null`].
    pub fn where_clause(
        mut self,
        field: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<Self> {
        validate_identifier(field)?;

        let values = match operator.arity() {
            Some(0) => Vec::new(),
            Some(_) => {
                let value = value.into();
                if value.is_null() {
                    return Err(RelationalError::Query(format!(
                        "Cannot compare '{}' with NULL using {}, use where_null or where_not_null",
                        field,
                        operator.to_sql()
                    )));
                }
                vec![value]
            }
            None => {
                return Err(RelationalError::Query(format!(
                    "Operator {} takes a list of values, use where_in",
                    operator.to_sql()
                )))
            }
        };

        self.conditions.push(Condition {
            field: field.to_string(),
            operator,
            values,
        });
        Ok(self)
    }

    /// Adds an equality condition.
    pub fn eq(self, field: &str, value: impl Into<Value>) -> Result<Self> {
        self.where_clause(field, Operator::Eq, value)
    }

    /// Adds a WHERE condition for IN.
    pub fn where_in(self, field: &str, values: Vec<Value>) -> Result<Self> {
        self.push_list(field, Operator::In, values)
    }

    /// Adds a WHERE condition for NOT IN.
    pub fn where_not_in(self, field: &str, values: Vec<Value>) -> Result<Self> {
        self.push_list(field, Operator::NotIn, values)
    }

    /// Adds a WHERE condition for IS NULL.
    pub fn where_null(self, field: &str) -> Result<Self> {
        self.where_clause(field, Operator::IsNull, Value::Null)
    }

    /// Adds a WHERE condition for IS NOT NULL.
    pub fn where_not_null(self, field: &str) -> Result<Self> {
        self.where_clause(field, Operator::IsNotNull, Value::Null)
    }

    fn push_list(mut self, field: &str, operator: Operator, values: Vec<Value>) -> Result<Self> {
        validate_identifier(field)?;
        if values.is_empty() {
            return Err(RelationalError::Query(format!(
                "{} list for '{}' cannot be empty",
                operator.to_sql(),
                field
            )));
        }
        self.conditions.push(Condition {
            field: field.to_string(),
            operator,
            values,
        });
        Ok(self)
    }

    /// Adds ORDER BY.
    pub fn order_by(mut self, field: &str, direction: OrderDirection) -> Result<Self> {
        validate_identifier(field)?;
        self.order_by_clauses.push((field.to_string(), direction));
        Ok(self)
    }

    /// Sets LIMIT.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit_value = Some(limit);
        self
    }

    /// Sets OFFSET.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset_value = Some(offset);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn order_by_clauses(&self) -> &[(String, OrderDirection)] {
        &self.order_by_clauses
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit_value
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset_value
    }

    /// True when the filter has no conditions, ordering or paging.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
            && self.order_by_clauses.is_empty()
            && self.limit_value.is_none()
            && self.offset_value.is_none()
    }

    /// Evaluates the WHERE part against a record, with SQL NULL semantics.
    ///
    /// A missing column reads as NULL.
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|cond| {
            let value = record.get(&cond.field).unwrap_or(&Value::Null);
            condition_holds(cond, value)
        })
    }

    /// Applies ORDER BY, OFFSET and LIMIT to rows that already matched.
    pub fn paginate(&self, mut rows: Vec<Record>) -> Vec<Record> {
        if !self.order_by_clauses.is_empty() {
            rows.sort_by(|a, b| {
                self.order_by_clauses
                    .iter()
                    .map(|(field, direction)| {
                        let ord = order_values(
                            a.get(field).unwrap_or(&Value::Null),
                            b.get(field).unwrap_or(&Value::Null),
                        );
                        match direction {
                            OrderDirection::Asc => ord,
                            OrderDirection::Desc => ord.reverse(),
                        }
                    })
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let offset = self.offset_value.map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
        let limit = self.limit_value.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
        rows.into_iter().skip(offset).take(limit).collect()
    }
}

fn condition_holds(cond: &Condition, value: &Value) -> bool {
    let equals = |other: &Value| value.compare(other) == Some(Ordering::Equal);
    let first = cond.values.first().unwrap_or(&Value::Null);

    match cond.operator {
        Operator::IsNull => value.is_null(),
        Operator::IsNotNull => !value.is_null(),
        Operator::Eq => equals(first),
        Operator::Ne => matches!(value.compare(first), Some(ord) if ord != Ordering::Equal),
        Operator::Gt => value.compare(first) == Some(Ordering::Greater),
        Operator::Gte => matches!(value.compare(first), Some(Ordering::Greater | Ordering::Equal)),
        Operator::Lt => value.compare(first) == Some(Ordering::Less),
        Operator::Lte => matches!(value.compare(first), Some(Ordering::Less | Ordering::Equal)),
        Operator::In => cond.values.iter().any(equals),
        Operator::NotIn => !value.is_null() && !cond.values.iter().any(equals),
        Operator::Like | Operator::ILike => match (value, first) {
            (Value::String(text), Value::String(pattern)) => {
                like_match(text, pattern, cond.operator == Operator::ILike)
            }
            _ => false,
        },
    }
}

/// PostgreSQL ordering: NULL sorts after every value in ascending order.
fn order_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}
