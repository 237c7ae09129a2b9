//! Query condition types and enums.

use crate::value::Value;

/// Comparison operators a `Filter` condition can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Like,
    /// Case-insensitive LIKE
    ILike,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// Returns the SQL operator string.
    pub fn to_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Like => "LIKE",
            Operator::ILike => "ILIKE",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }

    /// Number of values the operator takes, `None` meaning one or more.
    pub(crate) fn arity(&self) -> Option<usize> {
        match self {
            Operator::IsNull | Operator::IsNotNull => Some(0),
            Operator::In | Operator::NotIn => None,
            _ => Some(1),
        }
    }
}

/// Sort order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    /// Returns the SQL order direction string.
    pub fn to_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// One `field <operator> values` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    /// Empty for IS NULL / IS NOT NULL, one entry or more for IN lists
    pub values: Vec<Value>,
}
