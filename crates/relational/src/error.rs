//! Error types for relational

use thiserror::Error;

use crate::value::ValueKind;

/// Result type alias for relational operations
pub type Result<T> = std::result::Result<T, RelationalError>;

/// Classification of errors raised by a record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Unique or exclusion constraint violation (SQLSTATE 23505, 23P01)
    Conflict,
    /// Foreign key violation (SQLSTATE 23503)
    ForeignKey,
    /// Not-null or check constraint violation (SQLSTATE 23502, 23514)
    Constraint,
    /// Deadlock detected (SQLSTATE 40P01) - retryable
    Deadlock,
    /// Pool or statement timeout - retryable
    Timeout,
    /// Serialization failure or admin shutdown - retryable
    Transient,
    /// Anything else the store reported
    Other,
}

/// Unified error type for all relational operations
#[derive(Error, Debug, Clone)]
pub enum RelationalError {
    #[error("relational database: configuration error: {0}")]
    Config(String),

    #[error("relational database: connection failed: {0}")]
    Connection(String),

    #[error(r#"the "{entity}" entity has no "{field}" field"#)]
    FieldNotFound { entity: String, field: String },

    #[error(r#"the "{entity}" entity {field} field is not of type {expected} (found {found})"#)]
    TypeMismatch {
        entity: String,
        field: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error(r#"relational database: it is not possible to insert a model "{entity}" with the pre-filled ID field ({id})"#)]
    IdentityAlreadySet { entity: String, id: i64 },

    #[error(r#"relational database: it is not possible to update a model "{entity}" with the blank ID field"#)]
    IdentityBlank { entity: String },

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("relational database: {message}")]
    Store { kind: StoreErrorKind, message: String },

    #[error("relational database: invalid query: {0}")]
    Query(String),

    #[error("relational database: failed to register entities: {}", .failures.join("; "))]
    SchemaRegistration { failures: Vec<String> },
}

impl RelationalError {
    /// Wraps a store message with no finer classification.
    pub fn store(message: impl Into<String>) -> Self {
        RelationalError::Store {
            kind: StoreErrorKind::Other,
            message: message.into(),
        }
    }

    /// Returns true if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelationalError::Store {
                kind: StoreErrorKind::Deadlock | StoreErrorKind::Timeout | StoreErrorKind::Transient,
                ..
            }
        )
    }

    /// Returns true if the store found no matching row.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RelationalError::RecordNotFound(_))
    }

    /// Returns true if this is a constraint violation error
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            RelationalError::Store {
                kind: StoreErrorKind::Conflict | StoreErrorKind::ForeignKey | StoreErrorKind::Constraint,
                ..
            }
        )
    }
}

impl From<serde_json::Error> for RelationalError {
    fn from(err: serde_json::Error) -> Self {
        RelationalError::Query(format!("JSON error: {}", err))
    }
}

impl From<sqlx::Error> for RelationalError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error;
        let classified = |kind: StoreErrorKind, err: &Error| RelationalError::Store {
            kind,
            message: err.to_string(),
        };
        match &err {
            Error::Configuration(_) => RelationalError::Connection(err.to_string()),
            Error::Database(db_err) => {
                // See: https://www.postgresql.org/docs/current/errcodes-appendix.html
                if let Some(code) = db_err.code() {
                    let code_str: &str = &code;
                    match code_str {
                        "23505" | "23P01" => return classified(StoreErrorKind::Conflict, &err),
                        "23503" => return classified(StoreErrorKind::ForeignKey, &err),
                        "23502" | "23514" => return classified(StoreErrorKind::Constraint, &err),
                        "40P01" => return classified(StoreErrorKind::Deadlock, &err),
                        "57014" => return classified(StoreErrorKind::Timeout, &err),
                        "57P01" | "57P02" | "57P03" => {
                            return classified(StoreErrorKind::Transient, &err)
                        }
                        code if code.starts_with("40") => {
                            return classified(StoreErrorKind::Transient, &err)
                        }
                        code if code.starts_with("08") => {
                            return RelationalError::Connection(err.to_string())
                        }
                        _ => {}
                    }
                }
                classified(StoreErrorKind::Other, &err)
            }
            Error::Io(_) | Error::Tls(_) | Error::Protocol(_) => {
                RelationalError::Connection(err.to_string())
            }
            Error::RowNotFound => RelationalError::RecordNotFound("no rows returned".to_string()),
            Error::PoolTimedOut => RelationalError::Store {
                kind: StoreErrorKind::Timeout,
                message: "connection pool timed out".to_string(),
            },
            Error::PoolClosed => RelationalError::Connection("connection pool closed".to_string()),
            _ => classified(StoreErrorKind::Other, &err),
        }
    }
}
