//! Integration tests for the Database facade.
//!
//! Run against the in-process MemoryStore, so no database is required.
//!
//! Run with: cargo test -p relational --test test_facade

use std::sync::Arc;

use async_trait::async_trait;
use relational::{
    ColumnDef, ColumnType, Database, Entity, Filter, MemoryStore, Operator, OrderDirection, Record,
    RecordStore, RelationalError, Result, StoreTransaction, TableSchema, TransactionOptions,
    ValueKind,
};

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: i64,
    name: String,
    email: Option<String>,
}

impl User {
    fn new(name: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            email: None,
        }
    }
}

impl Entity for User {
    const TABLE: &'static str = "users";

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("name", self.name.clone())
            .with("email", self.email.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            id: record.take("User", "id")?,
            name: record.take("User", "name")?,
            email: record.take("User", "email")?,
        })
    }

    fn schema() -> TableSchema {
        TableSchema::new(Self::TABLE)
            .column(ColumnDef::identity("id"))
            .column(ColumnDef::new("name", ColumnType::Text).not_null())
            .column(ColumnDef::new("email", ColumnType::Text))
    }
}

/// Identity stored under a non-default column.
#[derive(Debug, Clone, PartialEq)]
struct Account {
    account_id: i64,
    owner: String,
}

impl Entity for Account {
    const TABLE: &'static str = "accounts";
    const ID_FIELD: &'static str = "account_id";

    fn to_record(&self) -> Record {
        Record::new()
            .with("account_id", self.account_id)
            .with("owner", self.owner.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            account_id: record.take("Account", "account_id")?,
            owner: record.take("Account", "owner")?,
        })
    }

    fn schema() -> TableSchema {
        TableSchema::new(Self::TABLE)
            .column(ColumnDef::identity("account_id"))
            .column(ColumnDef::new("owner", ColumnType::Text))
    }
}

/// Identity declared with the wrong type.
#[derive(Debug, Clone)]
struct Tag {
    id: String,
    label: String,
}

impl Entity for Tag {
    const TABLE: &'static str = "tags";

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id.clone())
            .with("label", self.label.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            id: record.take("Tag", "id")?,
            label: record.take("Tag", "label")?,
        })
    }

    fn schema() -> TableSchema {
        TableSchema::new(Self::TABLE)
            .column(ColumnDef::new("id", ColumnType::Text))
            .column(ColumnDef::new("label", ColumnType::Text))
    }
}

/// Optional identity declared as TEXT.
#[derive(Debug, Clone)]
struct Label {
    id: Option<String>,
    text: String,
}

impl Entity for Label {
    const TABLE: &'static str = "labels";

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id.clone())
            .with("text", self.text.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            id: record.take("Label", "id")?,
            text: record.take("Label", "text")?,
        })
    }

    fn schema() -> TableSchema {
        TableSchema::new(Self::TABLE)
            .column(ColumnDef::new("id", ColumnType::Text))
            .column(ColumnDef::new("text", ColumnType::Text))
    }
}

/// Projects no identity column at all.
#[derive(Debug, Clone)]
struct Note {
    body: String,
}

impl Entity for Note {
    const TABLE: &'static str = "notes";

    fn to_record(&self) -> Record {
        Record::new().with("body", self.body.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            body: record.take("Note", "body")?,
        })
    }

    fn schema() -> TableSchema {
        TableSchema::new(Self::TABLE).column(ColumnDef::new("body", ColumnType::Text))
    }
}

async fn setup() -> Database {
    let db = Database::in_memory("TEST");
    db.register_entities(&[User::schema(), Account::schema()])
        .await
        .unwrap();
    db
}

// =============================================================================
// Create / Update
// =============================================================================

#[tokio::test]
async fn test_create_assigns_identity() {
    let db = setup().await;

    let mut alice = User::new("a");
    db.create(&mut alice).await.unwrap();
    assert_ne!(alice.id, 0);

    let mut bob = User::new("b");
    db.create(&mut bob).await.unwrap();
    assert_ne!(bob.id, alice.id);

    let found: Option<User> = db.select_by_id(alice.id).await.unwrap();
    assert_eq!(found, Some(alice));
}

#[tokio::test]
async fn test_create_with_identity_is_rejected() {
    let db = setup().await;

    let mut user = User {
        id: 5,
        ..User::new("a")
    };
    let err = db.create(&mut user).await.unwrap_err();
    assert!(matches!(err, RelationalError::IdentityAlreadySet { id: 5, .. }));
    assert!(err.to_string().contains("\"User\""));

    // Nothing reached the store.
    assert!(db.select_all::<User>().await.unwrap().is_empty());
    assert_eq!(user.id, 5);
}

#[tokio::test]
async fn test_update_without_identity_is_rejected() {
    let db = setup().await;

    let err = db.update(&User::new("a")).await.unwrap_err();
    assert!(matches!(err, RelationalError::IdentityBlank { .. }));
}

#[tokio::test]
async fn test_update_persists_all_columns() {
    let db = setup().await;

    let mut user = User::new("a");
    db.create(&mut user).await.unwrap();

    user.name = "alice".to_string();
    user.email = Some("alice@example.com".to_string());
    db.update(&user).await.unwrap();

    let found = db.select_by_id::<User>(user.id).await.unwrap().unwrap();
    assert_eq!(found, user);
}

#[tokio::test]
async fn test_update_missing_row_is_not_found() {
    let db = setup().await;

    let ghost = User {
        id: 42,
        ..User::new("ghost")
    };
    let err = db.update(&ghost).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_identity_type_mismatch() {
    let db = setup().await;

    for id in ["0", "7"] {
        let mut tag = Tag {
            id: id.to_string(),
            label: "x".to_string(),
        };
        match db.create(&mut tag).await.unwrap_err() {
            RelationalError::TypeMismatch {
                entity,
                field,
                expected,
                found,
            } => {
                assert_eq!(entity, "Tag");
                assert_eq!(field, "id");
                assert_eq!(expected, ValueKind::BigInt);
                assert_eq!(found, ValueKind::String);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            db.update(&tag).await.unwrap_err(),
            RelationalError::TypeMismatch { .. }
        ));
    }
}

#[tokio::test]
async fn test_null_identity_checked_against_declared_type() {
    let db = setup().await;
    db.register::<Label>().await.unwrap();

    let mut label = Label {
        id: None,
        text: "x".to_string(),
    };
    assert!(matches!(
        db.create(&mut label).await.unwrap_err(),
        RelationalError::TypeMismatch {
            expected: ValueKind::BigInt,
            found: ValueKind::String,
            ..
        }
    ));
    assert!(matches!(
        db.update(&label).await.unwrap_err(),
        RelationalError::TypeMismatch { .. }
    ));

    // Rejected before any row was written.
    assert!(db.select_all::<Label>().await.unwrap().is_empty());
    assert!(label.id.is_none());
}

#[tokio::test]
async fn test_missing_identity_field() {
    let db = setup().await;

    let mut note = Note {
        body: "hello".to_string(),
    };
    let err = db.create(&mut note).await.unwrap_err();
    assert!(matches!(
        err,
        RelationalError::FieldNotFound { ref entity, ref field } if entity == "Note" && field == "id"
    ));
}

#[tokio::test]
async fn test_custom_identity_field() {
    let db = setup().await;

    let mut account = Account {
        account_id: 0,
        owner: "a".to_string(),
    };
    db.create(&mut account).await.unwrap();
    assert_ne!(account.account_id, 0);

    account.owner = "b".to_string();
    db.update(&account).await.unwrap();

    let found: Account = db.select_by_id(account.account_id).await.unwrap().unwrap();
    assert_eq!(found.owner, "b");
}

// =============================================================================
// Delete / Select
// =============================================================================

#[tokio::test]
async fn test_delete_by_id() {
    let db = setup().await;

    let mut user = User::new("a");
    db.create(&mut user).await.unwrap();

    assert!(db.delete_by_id::<User>(user.id).await.unwrap());
    assert!(!db.delete_by_id::<User>(user.id).await.unwrap());
    assert_eq!(db.select_by_id::<User>(user.id).await.unwrap(), None);
}

#[tokio::test]
async fn test_select_by_id_uses_requested_id() {
    let db = setup().await;

    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        let mut user = User::new(name);
        db.create(&mut user).await.unwrap();
        ids.push(user.id);
    }

    let second = db.select_by_id::<User>(ids[1]).await.unwrap().unwrap();
    assert_eq!(second.name, "b");
    assert_eq!(db.select_by_id::<User>(9999).await.unwrap(), None);
}

#[tokio::test]
async fn test_select_all_empty_is_ok() {
    let db = setup().await;
    assert!(db.select_all::<User>().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_filter() {
    let db = setup().await;

    for (name, email) in [("carol", None), ("alice", Some("a@x")), ("bob", Some("b@x"))] {
        let mut user = User {
            email: email.map(str::to_string),
            ..User::new(name)
        };
        db.create(&mut user).await.unwrap();
    }

    let with_email: Vec<User> = db
        .filter(
            &Filter::new()
                .where_not_null("email")
                .unwrap()
                .order_by("name", OrderDirection::Desc)
                .unwrap(),
        )
        .await
        .unwrap();
    let names: Vec<&str> = with_email.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["bob", "alice"]);

    let page: Vec<User> = db
        .filter(
            &Filter::new()
                .order_by("name", OrderDirection::Asc)
                .unwrap()
                .offset(1)
                .limit(1),
        )
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].name, "bob");

    let none: Vec<User> = db
        .filter(&Filter::new().where_clause("name", Operator::Like, "z%").unwrap())
        .await
        .unwrap();
    assert!(none.is_empty());

    let example = Record::new().with("name", "alice");
    let matched: Vec<User> = db.filter(&Filter::matching(&example).unwrap()).await.unwrap();
    assert_eq!(matched.len(), 1);
}

#[tokio::test]
async fn test_filter_by_unsaved_example() {
    let db = setup().await;

    for name in ["alice", "bob"] {
        db.create(&mut User::new(name)).await.unwrap();
    }

    let filter = Filter::example(&User::new("alice")).unwrap();
    assert_eq!(filter.conditions().len(), 1);

    let matched: Vec<User> = db.filter(&filter).await.unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].name, "alice");
    assert_ne!(matched[0].id, 0);

    // A saved example pins the identity too.
    let saved = Filter::example(&matched[0]).unwrap();
    assert_eq!(db.filter::<User>(&saved).await.unwrap(), matched);
}

#[tokio::test]
async fn test_unregistered_entity_surfaces_store_error() {
    let db = Database::in_memory("TEST");

    let err = db.select_all::<User>().await.unwrap_err();
    assert!(matches!(err, RelationalError::Store { .. }));
    assert!(err.to_string().starts_with("relational database: "));
}

// =============================================================================
// Transactions
// =============================================================================

#[tokio::test]
async fn test_transaction_commits_all_writes() {
    let db = setup().await;

    let ids = db
        .transaction(|tx| async move {
            let mut a = User::new("a");
            let mut b = User::new("b");
            tx.create(&mut a).await?;
            tx.create(&mut b).await?;

            // Visible inside the transaction before commit.
            assert_eq!(tx.select_all::<User>().await?.len(), 2);
            Ok(vec![a.id, b.id])
        })
        .await
        .unwrap();

    assert_eq!(ids.len(), 2);
    assert_eq!(db.select_all::<User>().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_transaction_rolls_back_on_error() {
    let db = setup().await;

    let mut existing = User::new("keep");
    db.create(&mut existing).await.unwrap();
    let existing_id = existing.id;

    let err = db
        .transaction(|tx| async move {
            let mut a = User::new("a");
            tx.create(&mut a).await?;
            tx.delete_by_id::<User>(existing_id).await?;
            // Fails the guard and aborts everything above.
            tx.update(&User::new("blank")).await?;
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, RelationalError::IdentityBlank { .. }));
    let users = db.select_all::<User>().await.unwrap();
    assert_eq!(users, vec![existing]);
}

#[tokio::test]
async fn test_scoped_database_is_unusable_after_transaction() {
    let db = setup().await;

    let mut leaked = None;
    db.transaction(|tx| {
        leaked = Some(tx.clone());
        async move {
            assert_eq!(tx.name(), "TEST");
            Ok(())
        }
    })
    .await
    .unwrap();

    let err = leaked.unwrap().select_all::<User>().await.unwrap_err();
    assert!(err.to_string().contains("transaction already finished"));
}

#[tokio::test]
async fn test_nested_transaction_is_rejected() {
    let db = setup().await;

    let err = db
        .transaction(|tx| async move { tx.transaction(|_| async { Ok(()) }).await })
        .await
        .unwrap_err();
    assert!(matches!(err, RelationalError::Store { .. }));
}

#[tokio::test]
async fn test_read_only_transaction() {
    let db = setup().await;

    let err = db
        .transaction_with(TransactionOptions::new().read_only(), |tx| async move {
            tx.create(&mut User::new("a")).await
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("read-only"));
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_entities_reports_every_failure() {
    let store = MemoryStore::new();
    let db = Database::with_store("TEST", Arc::new(store.clone()));

    let err = db
        .register_entities(&[
            TableSchema::new("select"),
            User::schema(),
            TableSchema::new("bad table"),
        ])
        .await
        .unwrap_err();

    match err {
        RelationalError::SchemaRegistration { failures } => {
            assert_eq!(failures.len(), 2);
            assert!(failures[0].starts_with("select: "));
            assert!(failures[1].starts_with("bad table: "));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // The valid schema was still applied.
    assert_eq!(store.tables(), vec!["users".to_string()]);
}

#[tokio::test]
async fn test_register_is_idempotent() {
    let db = setup().await;
    db.register::<User>().await.unwrap();
    db.register::<User>().await.unwrap();
}

// =============================================================================
// Not-found downgrade
// =============================================================================

/// Store whose reads fail with a fixed error.
struct FailingReads {
    not_found: bool,
}

impl FailingReads {
    fn error(&self) -> RelationalError {
        if self.not_found {
            RelationalError::RecordNotFound("no rows returned".to_string())
        } else {
            RelationalError::store("connection reset by peer")
        }
    }
}

#[async_trait]
impl RecordStore for FailingReads {
    async fn insert(&self, _: &str, _: &str, record: &Record) -> Result<Record> {
        Ok(record.clone())
    }

    async fn save(&self, _: &str, _: &str, _: i64, _: &Record) -> Result<Record> {
        Err(self.error())
    }

    async fn delete(&self, _: &str, _: &str, _: i64) -> Result<u64> {
        Ok(0)
    }

    async fn first(&self, _: &str, _: &str, _: i64) -> Result<Record> {
        Err(self.error())
    }

    async fn find(&self, _: &str, _: &Filter) -> Result<Vec<Record>> {
        Err(self.error())
    }

    async fn begin(&self, _: TransactionOptions) -> Result<Arc<dyn StoreTransaction>> {
        Err(RelationalError::store("transactions unsupported"))
    }

    async fn migrate(&self, _: &TableSchema) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_read_paths_downgrade_record_not_found() {
    let db = Database::with_store("STUB", Arc::new(FailingReads { not_found: true }));

    assert!(db.select_all::<User>().await.unwrap().is_empty());
    assert!(db.filter::<User>(&Filter::new()).await.unwrap().is_empty());
    assert_eq!(db.select_by_id::<User>(1).await.unwrap(), None);

    // The write path keeps it.
    let err = db
        .update(&User {
            id: 1,
            ..User::new("a")
        })
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_read_paths_surface_other_errors() {
    let db = Database::with_store("STUB", Arc::new(FailingReads { not_found: false }));

    assert!(db.select_all::<User>().await.is_err());
    assert!(db.select_by_id::<User>(1).await.is_err());
}

#[tokio::test]
async fn test_begin_failure_skips_closure() {
    let db = Database::with_store("STUB", Arc::new(FailingReads { not_found: true }));

    let mut ran = false;
    let result = db
        .transaction(|_| {
            ran = true;
            async { Ok(()) }
        })
        .await;
    assert!(result.is_err());
    assert!(!ran);
}
