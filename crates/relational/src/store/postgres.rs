//! PostgreSQL record store.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::{RecordStore, StoreTransaction};
use crate::connection::Connection;
use crate::query::{Filter, QueryBuilder, Statement};
use crate::record::Record;
use crate::schema::TableSchema;
use crate::transaction::{PgTransaction, TransactionOptions};
use crate::value::Value;
use crate::{RelationalError, Result};

/// Record store backed by a PostgreSQL pool.
///
/// `PgStore::new` runs every statement on the pool. The handle returned by
/// `begin` runs every statement on one transaction until it is committed
/// or rolled back.
pub struct PgStore {
    connection: Connection,
    tx: Option<Mutex<Option<PgTransaction>>>,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("connection", &self.connection)
            .field("in_transaction", &self.tx.is_some())
            .finish()
    }
}

impl PgStore {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            tx: None,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn pool(&self) -> &PgPool {
        self.connection.pool()
    }

    async fn fetch_optional(&self, (sql, params): &Statement) -> Result<Option<PgRow>> {
        debug!(sql = %sql, params = params.len(), "fetch_optional");
        let query = sqlx::query_with(sql, arguments(params)?);
        let row = match &self.tx {
            None => query.fetch_optional(self.pool()).await?,
            Some(slot) => {
                let mut guard = slot.lock().await;
                let tx = guard.as_mut().ok_or_else(finished)?;
                query.fetch_optional(tx.conn()).await?
            }
        };
        Ok(row)
    }

    async fn fetch_all(&self, (sql, params): &Statement) -> Result<Vec<PgRow>> {
        debug!(sql = %sql, params = params.len(), "fetch_all");
        let query = sqlx::query_with(sql, arguments(params)?);
        let rows = match &self.tx {
            None => query.fetch_all(self.pool()).await?,
            Some(slot) => {
                let mut guard = slot.lock().await;
                let tx = guard.as_mut().ok_or_else(finished)?;
                query.fetch_all(tx.conn()).await?
            }
        };
        Ok(rows)
    }

    async fn execute(&self, (sql, params): &Statement) -> Result<u64> {
        debug!(sql = %sql, params = params.len(), "execute");
        let query = sqlx::query_with(sql, arguments(params)?);
        let result = match &self.tx {
            None => query.execute(self.pool()).await?,
            Some(slot) => {
                let mut guard = slot.lock().await;
                let tx = guard.as_mut().ok_or_else(finished)?;
                query.execute(tx.conn()).await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn finish(&self, commit: bool) -> Result<()> {
        let slot = self
            .tx
            .as_ref()
            .ok_or_else(|| RelationalError::store("no transaction in progress"))?;
        let tx = slot.lock().await.take().ok_or_else(finished)?;
        if commit {
            tx.commit().await
        } else {
            tx.rollback().await
        }
    }
}

#[async_trait]
impl RecordStore for PgStore {
    #[instrument(skip(self, record), fields(table = %table))]
    async fn insert(&self, table: &str, id_field: &str, record: &Record) -> Result<Record> {
        let stmt = QueryBuilder::new(table)?.build_insert(record)?;
        let row = self
            .fetch_optional(&stmt)
            .await?
            .ok_or_else(|| RelationalError::store(format!("insert into {} returned no row", table)))?;
        let stored = Record::from_sqlx(&row)?;
        debug!(id = ?stored.get(id_field), "Inserted row");
        Ok(stored)
    }

    #[instrument(skip(self, record), fields(table = %table, id = %id))]
    async fn save(&self, table: &str, id_field: &str, id: i64, record: &Record) -> Result<Record> {
        // Nothing to assign: saving reduces to an existence check.
        if record.iter().all(|(col, _)| col == id_field) {
            return self.first(table, id_field, id).await;
        }

        let stmt = QueryBuilder::new(table)?.build_update(id_field, id, record)?;
        match self.fetch_optional(&stmt).await? {
            Some(row) => Record::from_sqlx(&row),
            None => Err(not_found(table, id_field, id)),
        }
    }

    #[instrument(skip(self), fields(table = %table, id = %id))]
    async fn delete(&self, table: &str, id_field: &str, id: i64) -> Result<u64> {
        let stmt = QueryBuilder::new(table)?.build_delete(id_field, id)?;
        let affected = self.execute(&stmt).await?;
        debug!(affected, "Delete complete");
        Ok(affected)
    }

    async fn first(&self, table: &str, id_field: &str, id: i64) -> Result<Record> {
        let stmt = QueryBuilder::new(table)?.build_first(id_field, id)?;
        match self.fetch_optional(&stmt).await? {
            Some(row) => Record::from_sqlx(&row),
            None => Err(not_found(table, id_field, id)),
        }
    }

    async fn find(&self, table: &str, filter: &Filter) -> Result<Vec<Record>> {
        let stmt = QueryBuilder::new(table)?.build_select(filter);
        self.fetch_all(&stmt)
            .await?
            .iter()
            .map(Record::from_sqlx)
            .collect()
    }

    async fn begin(&self, options: TransactionOptions) -> Result<Arc<dyn StoreTransaction>> {
        if self.tx.is_some() {
            return Err(RelationalError::store("nested transactions are not supported"));
        }
        let tx = PgTransaction::begin(self.pool(), options).await?;
        Ok(Arc::new(PgStore {
            connection: self.connection.clone(),
            tx: Some(Mutex::new(Some(tx))),
        }))
    }

    #[instrument(skip(self, schema), fields(table = %schema.table_name))]
    async fn migrate(&self, schema: &TableSchema) -> Result<()> {
        for sql in schema.migration_sql()? {
            self.execute(&(sql, Vec::new())).await?;
        }
        info!("Table registered");
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for PgStore {
    fn as_store(self: Arc<Self>) -> Arc<dyn RecordStore> {
        self
    }

    async fn commit(&self) -> Result<()> {
        self.finish(true).await
    }

    async fn rollback(&self) -> Result<()> {
        self.finish(false).await
    }
}

fn arguments(params: &[Value]) -> Result<PgArguments> {
    let mut args = PgArguments::default();
    for param in params {
        param.bind_to_arguments(&mut args)?;
    }
    Ok(args)
}

fn finished() -> RelationalError {
    RelationalError::store("transaction already finished")
}

fn not_found(table: &str, id_field: &str, id: i64) -> RelationalError {
    RelationalError::RecordNotFound(format!("{} with {} = {}", table, id_field, id))
}
