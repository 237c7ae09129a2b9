//! Transaction options and the PostgreSQL transaction handle.

use std::fmt;

use sqlx::postgres::{PgConnection, PgPool};
use sqlx::Postgres;
use tracing::debug;

use crate::Result;

/// Transaction isolation levels, as PostgreSQL spells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    /// PostgreSQL default
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        })
    }
}

/// Options applied when `Database::transaction_with` begins a transaction.
///
/// The memory store honors `read_only` and ignores the rest.
///
/// ```rust,ignore
/// let options = TransactionOptions::new()
///     .read_only()
///     .isolation(IsolationLevel::RepeatableRead);
///
/// let report = db.transaction_with(options, |tx| async move {
///     tx.select_all::<Order>().await
/// }).await?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
    /// Takes effect only for SERIALIZABLE READ ONLY.
    pub deferrable: bool,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = level;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn deferrable(mut self) -> Self {
        self.deferrable = true;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// The `SET TRANSACTION` statement issued right after `BEGIN`.
    pub fn set_transaction_sql(&self) -> String {
        let mode = if self.read_only { "READ ONLY" } else { "READ WRITE" };
        let mut sql = format!("SET TRANSACTION ISOLATION LEVEL {}, {}", self.isolation, mode);
        if self.isolation == IsolationLevel::Serializable && self.read_only {
            sql.push_str(if self.deferrable { ", DEFERRABLE" } else { ", NOT DEFERRABLE" });
        }
        sql
    }
}

/// An open PostgreSQL transaction.
///
/// Dropped without `commit`, sqlx rolls it back.
pub struct PgTransaction {
    inner: sqlx::Transaction<'static, Postgres>,
}

impl fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgTransaction").finish_non_exhaustive()
    }
}

impl PgTransaction {
    /// Begins a transaction on `pool` with `options` applied.
    pub async fn begin(pool: &PgPool, options: TransactionOptions) -> Result<Self> {
        let mut inner = pool.begin().await?;
        sqlx::query(&options.set_transaction_sql())
            .execute(&mut *inner)
            .await?;

        debug!(
            isolation = %options.isolation,
            read_only = options.read_only,
            "Transaction started"
        );
        Ok(Self { inner })
    }

    /// The connection the transaction runs on.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.inner
    }

    pub async fn commit(self) -> Result<()> {
        self.inner.commit().await?;
        debug!("Transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.inner.rollback().await?;
        debug!("Transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = TransactionOptions::default();
        assert_eq!(options.isolation, IsolationLevel::ReadCommitted);
        assert!(!options.is_read_only());
        assert_eq!(
            options.set_transaction_sql(),
            "SET TRANSACTION ISOLATION LEVEL READ COMMITTED, READ WRITE"
        );
    }

    #[test]
    fn test_set_transaction_sql() {
        let cases = [
            (
                TransactionOptions::new().isolation(IsolationLevel::RepeatableRead).read_only(),
                "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY",
            ),
            (
                TransactionOptions::new().isolation(IsolationLevel::Serializable).read_only(),
                "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ ONLY, NOT DEFERRABLE",
            ),
            (
                TransactionOptions::new()
                    .isolation(IsolationLevel::Serializable)
                    .read_only()
                    .deferrable(),
                "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ ONLY, DEFERRABLE",
            ),
            // Deferrable needs READ ONLY.
            (
                TransactionOptions::new().isolation(IsolationLevel::Serializable).deferrable(),
                "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ WRITE",
            ),
            (
                TransactionOptions::new().isolation(IsolationLevel::ReadUncommitted),
                "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED, READ WRITE",
            ),
        ];
        for (options, expected) in cases {
            assert_eq!(options.set_transaction_sql(), expected);
        }
    }
}
