//! Environment-configured relational persistence with identity-guarded CRUD.
//!
//! A [`Database`] is a named connection (`TMD_DATABASE_<NAME>_*` environment
//! keys) bound to a [`RecordStore`]. It exposes create, update, delete,
//! select and filter helpers over any type implementing [`Entity`], plus
//! closure-scoped transactions and table registration.
//!
//! # Architecture
//!
//! ```text
//!          Database (facade)
//!              |
//!       IdentityGuard  ---  Entity <-> Record
//!              |
//!         RecordStore
//!        /           \
//!   PgStore        MemoryStore
//!      |
//!  QueryBuilder -> SQLx (PostgreSQL driver)
//! ```
//!
//! # Identity protocol
//!
//! Every entity has a BIGINT identity column (`id` unless
//! [`Entity::ID_FIELD`] says otherwise). Zero means "not persisted yet":
//! such an entity can be created but not updated. A non-zero identity can
//! be updated but not created again. The store assigns identities; callers
//! never pick one.
//!
//! # Usage
//!
//! ```rust,ignore
//! use relational::{Database, Entity, Filter};
//!
//! let db = Database::connect("MAIN").await?;
//! db.register::<User>().await?;
//!
//! let mut user = User { id: 0, name: "alice".into() };
//! db.create(&mut user).await?;          // user.id is now assigned
//!
//! user.name = "alicia".into();
//! db.update(&user).await?;
//!
//! let found: Option<User> = db.select_by_id(user.id).await?;
//! let named: Vec<User> = db.filter(&Filter::new().eq("name", "alicia")?).await?;
//!
//! db.transaction(|tx| async move {
//!     tx.delete_by_id::<User>(user.id).await?;
//!     Ok(())
//! })
//! .await?;
//! ```

pub mod config;
pub mod connection;
pub mod database;
pub mod error;
pub mod identity;
pub mod query;
pub mod record;
pub mod schema;
pub mod store;
pub mod transaction;
pub mod value;

pub use config::{ConnectionConfig, DatabaseType, ENV_PREFIX};
pub use connection::{Connection, PoolConfig, RetryConfig};
pub use database::Database;
pub use error::{RelationalError, Result, StoreErrorKind};
pub use identity::{Identity, IdentityGuard};
pub use query::{Filter, Operator, OrderDirection, QueryBuilder};
pub use record::{Entity, Record};
pub use schema::{ColumnDef, ColumnType, TableSchema};
pub use store::{MemoryStore, PgStore, RecordStore, StoreTransaction};
pub use transaction::{IsolationLevel, TransactionOptions};
pub use value::{FromValue, Value, ValueKind};
