//! In-process record store.
//!
//! Behaves like a database for the operations the facade needs: tables must
//! be registered through `migrate` first, unknown columns are rejected,
//! identities come from a per-table sequence, and transactions are isolated
//! until commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{RecordStore, StoreTransaction};
use crate::query::Filter;
use crate::record::Record;
use crate::schema::TableSchema;
use crate::transaction::TransactionOptions;
use crate::value::{Value, ValueKind};
use crate::{RelationalError, Result};

#[derive(Debug, Clone)]
struct Table {
    schema: TableSchema,
    next_id: i64,
    rows: BTreeMap<i64, Record>,
}

impl Table {
    fn check_columns(&self, record: &Record) -> Result<()> {
        match record.columns().into_iter().find(|col| self.schema.get_column(col).is_none()) {
            Some(col) => Err(RelationalError::store(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                col, self.schema.table_name
            ))),
            None => Ok(()),
        }
    }

    /// Lays `record` out in schema order, NULL for absent columns.
    fn complete(&self, record: &Record) -> Record {
        self.schema
            .columns
            .iter()
            .fold(Record::new(), |row, col| {
                let value = record.get(&col.name).cloned().unwrap_or(Value::Null);
                row.with(col.name.clone(), value)
            })
    }

    /// Rejects values the declared column type would not accept.
    fn check_kinds(&self, row: &Record) -> Result<()> {
        for (name, value) in row.iter() {
            let Some(col) = self.schema.get_column(name) else {
                continue;
            };
            let declared = col.data_type.value_kind();
            if !assignable(value.kind(), declared) {
                return Err(RelationalError::store(format!(
                    "column \"{}\" is of type {} but expression is of type {}",
                    name,
                    declared,
                    value.kind()
                )));
            }
        }
        Ok(())
    }

    /// Next free identity from the sequence.
    fn next_identity(&mut self) -> Result<i64> {
        let mut id = self.next_id;
        while self.rows.contains_key(&id) {
            id = id.checked_add(1).ok_or_else(|| {
                RelationalError::store(format!(
                    "nextval: reached maximum value of sequence \"{}_id_seq\"",
                    self.schema.table_name
                ))
            })?;
        }
        Ok(id)
    }

    fn check_not_null(&self, row: &Record, id_field: &str) -> Result<()> {
        let violated = self.schema.columns.iter().find(|col| {
            !col.nullable && col.name != id_field && row.get(&col.name).map_or(true, Value::is_null)
        });
        match violated {
            Some(col) => Err(RelationalError::Store {
                kind: crate::StoreErrorKind::Constraint,
                message: format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    col.name, self.schema.table_name
                ),
            }),
            None => Ok(()),
        }
    }
}

/// Whether a value of kind `found` can be stored in a `declared` column.
/// Integers widen, and integers and REAL go into the wider numeric types.
fn assignable(found: ValueKind, declared: ValueKind) -> bool {
    use ValueKind::*;
    found == declared
        || matches!(
            (found, declared),
            (Null, _)
                | (SmallInt, Int | BigInt)
                | (Int, BigInt)
                | (SmallInt | Int | BigInt, Float | Double | Decimal)
                | (Float, Double)
        )
}

type Tables = HashMap<String, Table>;

/// Record store holding its tables in memory.
///
/// Clones share the same tables. A transaction works on a private copy of
/// the tables taken at `begin`; `commit` publishes that copy wholesale, so
/// a transaction racing with other writers wins over their changes.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<Tables>>,
    scope: Option<Arc<Scope>>,
}

struct Scope {
    staged: Mutex<Option<Tables>>,
    read_only: bool,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("tables", &self.shared.lock().len())
            .field("in_transaction", &self.scope.is_some())
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the registered tables, sorted.
    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Runs `f` on the tables this handle sees.
    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        match &self.scope {
            None => f(&mut *self.shared.lock()),
            Some(scope) => {
                let mut staged = scope.staged.lock();
                let tables = staged
                    .as_mut()
                    .ok_or_else(|| RelationalError::store("transaction already finished"))?;
                f(tables)
            }
        }
    }

    fn check_writable(&self, statement: &str) -> Result<()> {
        match &self.scope {
            Some(scope) if scope.read_only => Err(RelationalError::store(format!(
                "cannot execute {} in a read-only transaction",
                statement
            ))),
            _ => Ok(()),
        }
    }

    fn finish(&self, commit: bool) -> Result<()> {
        let scope = self
            .scope
            .as_ref()
            .ok_or_else(|| RelationalError::store("no transaction in progress"))?;
        let staged = scope
            .staged
            .lock()
            .take()
            .ok_or_else(|| RelationalError::store("transaction already finished"))?;
        if commit && !scope.read_only {
            *self.shared.lock() = staged;
        }
        debug!(commit, "Finished memory transaction");
        Ok(())
    }
}

fn table_mut<'a>(tables: &'a mut Tables, name: &str) -> Result<&'a mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| RelationalError::store(format!("relation \"{}\" does not exist", name)))
}

fn not_found(table: &str, id_field: &str, id: i64) -> RelationalError {
    RelationalError::RecordNotFound(format!("{} with {} = {}", table, id_field, id))
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, table: &str, id_field: &str, record: &Record) -> Result<Record> {
        self.check_writable("INSERT")?;
        self.with_tables(|tables| {
            let table = table_mut(tables, table)?;
            table.check_columns(record)?;

            let mut row = table.complete(record);
            let id = match record.get(id_field) {
                Some(Value::BigInt(id)) if *id != 0 => {
                    if table.rows.contains_key(id) {
                        return Err(RelationalError::Store {
                            kind: crate::StoreErrorKind::Conflict,
                            message: format!(
                                "duplicate key value violates unique constraint \"{}_pkey\"",
                                table.schema.table_name
                            ),
                        });
                    }
                    *id
                }
                _ => table.next_identity()?,
            };
            row.set(id_field, id);
            table.check_kinds(&row)?;
            table.check_not_null(&row, id_field)?;

            table.next_id = table.next_id.max(id.saturating_add(1));
            table.rows.insert(id, row.clone());
            Ok(row)
        })
    }

    async fn save(&self, table: &str, id_field: &str, id: i64, record: &Record) -> Result<Record> {
        self.check_writable("UPDATE")?;
        self.with_tables(|tables| {
            let table_name = table;
            let table = table_mut(tables, table_name)?;
            table.check_columns(record)?;
            if !table.rows.contains_key(&id) {
                return Err(not_found(table_name, id_field, id));
            }

            let mut row = table.complete(record);
            row.set(id_field, id);
            table.check_kinds(&row)?;
            table.check_not_null(&row, id_field)?;
            table.rows.insert(id, row.clone());
            Ok(row)
        })
    }

    async fn delete(&self, table: &str, _id_field: &str, id: i64) -> Result<u64> {
        self.check_writable("DELETE")?;
        self.with_tables(|tables| {
            let table = table_mut(tables, table)?;
            Ok(u64::from(table.rows.remove(&id).is_some()))
        })
    }

    async fn first(&self, table: &str, id_field: &str, id: i64) -> Result<Record> {
        self.with_tables(|tables| {
            let rows = &table_mut(tables, table)?.rows;
            rows.get(&id).cloned().ok_or_else(|| not_found(table, id_field, id))
        })
    }

    async fn find(&self, table: &str, filter: &Filter) -> Result<Vec<Record>> {
        self.with_tables(|tables| {
            let table = table_mut(tables, table)?;
            for cond in filter.conditions() {
                if table.schema.get_column(&cond.field).is_none() {
                    return Err(RelationalError::store(format!(
                        "column \"{}\" does not exist",
                        cond.field
                    )));
                }
            }
            let matched = table
                .rows
                .values()
                .filter(|row| filter.matches(row))
                .cloned()
                .collect();
            Ok(filter.paginate(matched))
        })
    }

    async fn begin(&self, options: TransactionOptions) -> Result<Arc<dyn StoreTransaction>> {
        if self.scope.is_some() {
            return Err(RelationalError::store("nested transactions are not supported"));
        }
        let snapshot = self.shared.lock().clone();
        debug!(read_only = options.is_read_only(), "Started memory transaction");
        Ok(Arc::new(MemoryStore {
            shared: Arc::clone(&self.shared),
            scope: Some(Arc::new(Scope {
                staged: Mutex::new(Some(snapshot)),
                read_only: options.is_read_only(),
            })),
        }))
    }

    async fn migrate(&self, schema: &TableSchema) -> Result<()> {
        self.check_writable("CREATE TABLE")?;
        // Render the DDL to apply the same identifier rules as PostgreSQL.
        schema.migration_sql()?;
        self.with_tables(|tables| {
            match tables.get_mut(&schema.table_name) {
                Some(table) => {
                    for column in &schema.columns {
                        if table.schema.get_column(&column.name).is_none() {
                            table.schema.columns.push(column.clone());
                            for row in table.rows.values_mut() {
                                row.set(column.name.clone(), Value::Null);
                            }
                        }
                    }
                }
                None => {
                    tables.insert(
                        schema.table_name.clone(),
                        Table {
                            schema: schema.clone(),
                            next_id: 1,
                            rows: BTreeMap::new(),
                        },
                    );
                }
            }
            debug!(table = %schema.table_name, "Table registered");
            Ok(())
        })
    }
}

#[async_trait]
impl StoreTransaction for MemoryStore {
    fn as_store(self: Arc<Self>) -> Arc<dyn RecordStore> {
        self
    }

    async fn commit(&self) -> Result<()> {
        self.finish(true)
    }

    async fn rollback(&self) -> Result<()> {
        self.finish(false)
    }
}
