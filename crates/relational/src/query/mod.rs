//! Filters and SQL statement building.
//!
//! # Examples
//!
//! ## Filter
//!
//! ```ignore
//! use relational::{Filter, Operator, OrderDirection};
//!
//! let filter = Filter::new()
//!     .where_clause("age", Operator::Gte, 18i64)?
//!     .eq("active", true)?
//!     .order_by("name", OrderDirection::Asc)?
//!     .limit(10)
//!     .offset(20);
//!
//! let (sql, params) = QueryBuilder::new("users")?.build_select(&filter);
//! // "SELECT * FROM "users" WHERE "age" >= $1 AND "active" = $2 ORDER BY "name" ASC LIMIT $3 OFFSET $4"
//! ```
//!
//! ## INSERT
//!
//! ```ignore
//! let record = Record::new().with("name", "Alice").with("age", 30i64);
//! let (sql, params) = QueryBuilder::new("users")?.build_insert(&record)?;
//! // "INSERT INTO "users" ("name", "age") VALUES ($1, $2) RETURNING *"
//! ```

mod builder;
mod filter;
mod helpers;
mod types;


pub use builder::{QueryBuilder, Statement};
pub use filter::Filter;
pub use helpers::{like_match, quote_identifier, validate_identifier, validate_identifier_part};
pub use types::{Condition, Operator, OrderDirection};
