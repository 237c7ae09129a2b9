//! The query facade: identity-guarded CRUD over one named connection.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::{ConnectionConfig, DatabaseType};
use crate::connection::Connection;
use crate::identity::IdentityGuard;
use crate::query::Filter;
use crate::record::Entity;
use crate::schema::TableSchema;
use crate::store::{MemoryStore, PgStore, RecordStore};
use crate::transaction::TransactionOptions;
use crate::{RelationalError, Result};

/// A named connection and the store it is bound to.
///
/// Cloning is cheap and clones share the store. Inside
/// [`Database::transaction`] the closure receives a `Database` bound to the
/// transaction instead of the pool.
#[derive(Clone)]
pub struct Database {
    name: String,
    store: Arc<dyn RecordStore>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Database {
    /// Opens the connection `name` configured under `TMD_DATABASE_<name>_*`.
    ///
    /// # Errors
    ///
    /// `Config` for missing or invalid settings, `Connection` when the
    /// database cannot be reached.
    pub async fn connect(name: &str) -> Result<Self> {
        let config = ConnectionConfig::from_env(name)?;
        Self::connect_with(&config).await
    }

    /// Opens a connection from an already resolved configuration.
    #[instrument(skip(config), fields(connection = %config.name, database_type = %config.database_type))]
    pub async fn connect_with(config: &ConnectionConfig) -> Result<Self> {
        let store: Arc<dyn RecordStore> = match config.database_type {
            DatabaseType::Postgres => Arc::new(PgStore::new(Connection::open(config).await?)),
        };
        info!("Database connected");
        Ok(Self::with_store(config.name.clone(), store))
    }

    /// Binds `name` to an existing store.
    pub fn with_store(name: impl Into<String>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    /// A database backed by a fresh [`MemoryStore`].
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::with_store(name, Arc::new(MemoryStore::new()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Inserts a new entity and writes the stored row back into it,
    /// including the identity the store assigned.
    ///
    /// # Errors
    ///
    /// `IdentityAlreadySet` when the entity already carries an identity.
    #[instrument(skip(self, entity), fields(connection = %self.name, entity_type = E::entity_name()))]
    pub async fn create<E: Entity>(&self, entity: &mut E) -> Result<()> {
        let mut record = entity.to_record();
        IdentityGuard::of::<E>().authorize_insert(&record)?;
        record.remove(E::ID_FIELD);

        let stored = self.store.insert(E::TABLE, E::ID_FIELD, &record).await?;
        *entity = E::from_record(stored)?;
        debug!("Created");
        Ok(())
    }

    /// Saves every column of an already persisted entity.
    ///
    /// # Errors
    ///
    /// `IdentityBlank` when the entity has no identity, `RecordNotFound`
    /// when no row has its identity.
    #[instrument(skip(self, entity), fields(connection = %self.name, entity_type = E::entity_name()))]
    pub async fn update<E: Entity>(&self, entity: &E) -> Result<()> {
        let record = entity.to_record();
        let id = IdentityGuard::of::<E>().authorize_update(&record)?;

        self.store.save(E::TABLE, E::ID_FIELD, id.value(), &record).await?;
        debug!(id = id.value(), "Updated");
        Ok(())
    }

    /// Deletes the entity with identity `id`. Returns whether a row was
    /// removed.
    #[instrument(skip(self), fields(connection = %self.name, entity_type = E::entity_name()))]
    pub async fn delete_by_id<E: Entity>(&self, id: i64) -> Result<bool> {
        let removed = self.store.delete(E::TABLE, E::ID_FIELD, id).await?;
        Ok(removed > 0)
    }

    /// Loads the entity with identity `id`, `None` if there is none.
    pub async fn select_by_id<E: Entity>(&self, id: i64) -> Result<Option<E>> {
        match self.store.first(E::TABLE, E::ID_FIELD, id).await {
            Ok(record) => E::from_record(record).map(Some),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Loads every entity of type `E`.
    pub async fn select_all<E: Entity>(&self) -> Result<Vec<E>> {
        self.filter(&Filter::new()).await
    }

    /// Loads the entities matching `filter`. No match is an empty vector.
    pub async fn filter<E: Entity>(&self, filter: &Filter) -> Result<Vec<E>> {
        let records = match self.store.find(E::TABLE, filter).await {
            Ok(records) => records,
            Err(err) if err.is_not_found() => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        records.into_iter().map(E::from_record).collect()
    }

    /// Runs `f` in a transaction with default options.
    ///
    /// ```rust,ignore
    /// db.transaction(|tx| async move {
    ///     tx.create(&mut order).await?;
    ///     tx.update(&stock).await?;
    ///     Ok(order)
    /// })
    /// .await?;
    /// ```
    pub async fn transaction<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Database) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.transaction_with(TransactionOptions::default(), f).await
    }

    /// Runs `f` with a `Database` scoped to a new transaction.
    ///
    /// Commits when `f` returns `Ok`. When `f` returns `Err` the transaction
    /// is rolled back and that error is returned.
    #[instrument(skip(self, f), fields(connection = %self.name))]
    pub async fn transaction_with<F, Fut, T>(&self, options: TransactionOptions, f: F) -> Result<T>
    where
        F: FnOnce(Database) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let tx = self.store.begin(options).await?;
        let scoped = Database {
            name: self.name.clone(),
            store: Arc::clone(&tx).as_store(),
        };

        match f(scoped).await {
            Ok(value) => {
                tx.commit().await?;
                debug!("Transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                debug!(error = %err, "Transaction rolled back");
                Err(err)
            }
        }
    }

    /// Creates or extends the table of every schema.
    ///
    /// Every schema is attempted; failures are reported together.
    #[instrument(skip(self, schemas), fields(connection = %self.name, count = schemas.len()))]
    pub async fn register_entities(&self, schemas: &[TableSchema]) -> Result<()> {
        let mut failures = Vec::new();
        for schema in schemas {
            if let Err(err) = self.store.migrate(schema).await {
                warn!(table = %schema.table_name, error = %err, "Entity registration failed");
                failures.push(format!("{}: {}", schema.table_name, err));
            }
        }

        if failures.is_empty() {
            info!("Entities registered");
            Ok(())
        } else {
            Err(RelationalError::SchemaRegistration { failures })
        }
    }

    /// Registers the table of a single entity type.
    pub async fn register<E: Entity>(&self) -> Result<()> {
        self.register_entities(&[E::schema()]).await
    }
}
