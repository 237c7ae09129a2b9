//! Identity guard for create/update discrimination.
//!
//! A record whose identity column is zero (or NULL) has never been persisted
//! and may only be inserted. A record with a non-zero identity corresponds to
//! a stored row and may only be updated. The store alone assigns identities.

use std::fmt;

use crate::record::{Entity, Record};
use crate::value::{Value, ValueKind};
use crate::{RelationalError, Result};

/// The declared type every identity column must have.
pub const IDENTITY_KIND: ValueKind = ValueKind::BigInt;

/// Runtime value of an identity column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Identity(i64);

impl Identity {
    /// The identity of a record that has not been persisted yet.
    pub const UNSET: Identity = Identity(0);

    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_set(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Checks a record's identity column before it reaches a store.
#[derive(Debug, Clone, Copy)]
pub struct IdentityGuard<'a> {
    entity: &'a str,
    field: &'a str,
    /// Kind the column is declared with, when a schema is known.
    declared: Option<ValueKind>,
}

impl<'a> IdentityGuard<'a> {
    /// Guard for `field` of the entity named `entity` (used in errors).
    ///
    /// Without a declared kind only the value is checked, so NULL reads as
    /// unset.
    pub fn new(entity: &'a str, field: &'a str) -> Self {
        Self {
            entity,
            field,
            declared: None,
        }
    }

    /// Checks the column's declared kind as well as its value.
    pub fn declared(mut self, kind: ValueKind) -> Self {
        self.declared = Some(kind);
        self
    }

    /// Guard configured from an entity's name, `ID_FIELD` and the kind its
    /// schema declares for that column.
    pub fn of<E: Entity>() -> IdentityGuard<'static> {
        IdentityGuard {
            entity: E::entity_name(),
            field: E::ID_FIELD,
            declared: E::schema()
                .get_column(E::ID_FIELD)
                .map(|col| col.data_type.value_kind()),
        }
    }

    pub fn field(&self) -> &str {
        self.field
    }

    fn mismatch(&self, found: ValueKind) -> RelationalError {
        RelationalError::TypeMismatch {
            entity: self.entity.to_string(),
            field: self.field.to_string(),
            expected: IDENTITY_KIND,
            found,
        }
    }

    /// Reads the identity from `record`.
    ///
    /// # Errors
    ///
    /// `FieldNotFound` if the identity column is absent. `TypeMismatch` if
    /// the column is declared with another type, whatever its value, or if
    /// its value is neither a BIGINT nor NULL.
    pub fn inspect(&self, record: &Record) -> Result<Identity> {
        let value = record
            .get(self.field)
            .ok_or_else(|| RelationalError::FieldNotFound {
                entity: self.entity.to_string(),
                field: self.field.to_string(),
            })?;

        if let Some(kind) = self.declared.filter(|kind| *kind != IDENTITY_KIND) {
            return Err(self.mismatch(kind));
        }

        match value {
            Value::BigInt(id) => Ok(Identity(*id)),
            // Option::<i64>::None projects to NULL: not persisted yet.
            Value::Null => Ok(Identity::UNSET),
            other => Err(self.mismatch(other.kind())),
        }
    }

    /// Permits an insert only when the record carries no identity.
    pub fn authorize_insert(&self, record: &Record) -> Result<()> {
        let identity = self.inspect(record)?;
        if identity.is_set() {
            return Err(RelationalError::IdentityAlreadySet {
                entity: self.entity.to_string(),
                id: identity.value(),
            });
        }
        Ok(())
    }

    /// Permits an update only when the record carries an identity, and
    /// returns it.
    pub fn authorize_update(&self, record: &Record) -> Result<Identity> {
        let identity = self.inspect(record)?;
        if !identity.is_set() {
            return Err(RelationalError::IdentityBlank {
                entity: self.entity.to_string(),
            });
        }
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> IdentityGuard<'static> {
        IdentityGuard::new("User", "id")
    }

    #[test]
    fn test_inspect_returns_value() {
        let record = Record::new().with("id", 42i64).with("name", "a");
        assert_eq!(guard().inspect(&record).unwrap(), Identity::new(42));
    }

    #[test]
    fn test_inspect_null_is_unset() {
        let record = Record::new().with("id", Value::Null);
        assert_eq!(guard().inspect(&record).unwrap(), Identity::UNSET);
    }

    #[test]
    fn test_inspect_missing_field() {
        let record = Record::new().with("name", "a");
        let err = guard().inspect(&record).unwrap_err();
        assert!(matches!(err, RelationalError::FieldNotFound { .. }));
    }

    #[test]
    fn test_inspect_type_mismatch_regardless_of_value() {
        for value in [Value::Int(0), Value::Int(7), Value::from("7"), Value::SmallInt(1)] {
            let record = Record::new().with("id", value.clone());
            match guard().inspect(&record).unwrap_err() {
                RelationalError::TypeMismatch { expected, found, .. } => {
                    assert_eq!(expected, ValueKind::BigInt);
                    assert_eq!(found, value.kind());
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn test_authorize_insert() {
        assert!(guard().authorize_insert(&Record::new().with("id", 0i64)).is_ok());

        for id in [1i64, 5, -3, i64::MAX] {
            let err = guard()
                .authorize_insert(&Record::new().with("id", id))
                .unwrap_err();
            assert!(matches!(err, RelationalError::IdentityAlreadySet { id: got, .. } if got == id));
        }
    }

    #[test]
    fn test_authorize_update() {
        for id in [1i64, 5, -3, i64::MIN] {
            let identity = guard()
                .authorize_update(&Record::new().with("id", id))
                .unwrap();
            assert_eq!(identity.value(), id);
        }

        let err = guard()
            .authorize_update(&Record::new().with("id", 0i64))
            .unwrap_err();
        assert!(matches!(err, RelationalError::IdentityBlank { .. }));
    }

    #[test]
    fn test_declared_kind_checked_before_value() {
        let guard = guard().declared(ValueKind::String);
        for value in [Value::Null, Value::BigInt(0), Value::from("7")] {
            match guard.inspect(&Record::new().with("id", value)).unwrap_err() {
                RelationalError::TypeMismatch { expected, found, .. } => {
                    assert_eq!(expected, ValueKind::BigInt);
                    assert_eq!(found, ValueKind::String);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
        assert!(guard
            .authorize_insert(&Record::new().with("id", Value::Null))
            .is_err());

        let bigint = self::guard().declared(ValueKind::BigInt);
        assert_eq!(
            bigint.inspect(&Record::new().with("id", Value::Null)).unwrap(),
            Identity::UNSET
        );
    }

    #[test]
    fn test_custom_identity_field() {
        let guard = IdentityGuard::new("Account", "account_id");
        let record = Record::new().with("account_id", 9i64);
        assert_eq!(guard.authorize_update(&record).unwrap().value(), 9);
        assert!(matches!(
            IdentityGuard::new("Account", "account_id")
                .inspect(&Record::new().with("id", 9i64))
                .unwrap_err(),
            RelationalError::FieldNotFound { .. }
        ));
    }
}
