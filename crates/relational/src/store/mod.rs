//! Record stores: the engines that physically read and write rows.
//!
//! The facade never talks to a database directly. It hands records to a
//! [`RecordStore`], which owns SQL generation (or its in-process
//! equivalent), identity assignment and transactions.

use std::sync::Arc;

use async_trait::async_trait;

use crate::query::Filter;
use crate::record::Record;
use crate::schema::TableSchema;
use crate::transaction::TransactionOptions;
use crate::Result;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Row-level persistence operations.
///
/// Rows are addressed by `table` and by the BIGINT identity column
/// `id_field`. Implementations are shared across tasks.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists a new row and returns it as stored, identity assigned.
    ///
    /// `record` never contains the identity column.
    async fn insert(&self, table: &str, id_field: &str, record: &Record) -> Result<Record>;

    /// Overwrites every column of the row whose identity is `id`.
    ///
    /// # Errors
    ///
    /// `RecordNotFound` when no row has that identity.
    async fn save(&self, table: &str, id_field: &str, id: i64, record: &Record) -> Result<Record>;

    /// Deletes the row whose identity is `id`, returning the number of rows
    /// removed.
    async fn delete(&self, table: &str, id_field: &str, id: i64) -> Result<u64>;

    /// Reads the row whose identity is `id`.
    ///
    /// # Errors
    ///
    /// `RecordNotFound` when no row has that identity.
    async fn first(&self, table: &str, id_field: &str, id: i64) -> Result<Record>;

    /// Reads every row matching `filter`.
    async fn find(&self, table: &str, filter: &Filter) -> Result<Vec<Record>>;

    /// Starts a transaction. Everything done through the returned handle
    /// happens inside it.
    async fn begin(&self, options: TransactionOptions) -> Result<Arc<dyn StoreTransaction>>;

    /// Creates the table, or adds the columns it is missing.
    async fn migrate(&self, schema: &TableSchema) -> Result<()>;
}

/// A store scoped to one open transaction.
///
/// Once `commit` or `rollback` has run, every further call fails with a
/// store error. Beginning a transaction on a transaction is rejected.
#[async_trait]
pub trait StoreTransaction: RecordStore {
    /// This transaction as a plain store handle.
    fn as_store(self: Arc<Self>) -> Arc<dyn RecordStore>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;
}
