//! # couchorm
//!
//! A lightweight N1QL query layer for Couchbase.
//!
//! ## Features
//!
//! - **Values are never interpolated**: every literal is bound as a named placeholder
//! - **Identifier quoting**: bucket and column names in backticks, with bucket prefixes
//! - **Condition trees**: hash, AND/OR/NOT, BETWEEN, IN, LIKE and comparison operators
//! - **Couchbase clauses**: `USE KEYS`, `USE INDEX`, `JOIN ... ON KEYS`, `NEST`, `UNNEST`
//! - **Write statements**: INSERT with generated document keys, UPSERT, UPDATE, DELETE
//! - **Index DDL**: primary and secondary index create/drop and deferred builds
//! - **Pluggable execution**: bring any SDK through the [`Executor`] trait
//!
//! ## Query Builder (qb)
//!
//! ```ignore
//! use couchorm::{Condition, qb};
//!
//! // SELECT
//! let users = qb::select("name, email")
//!     .from("{{%users}} u")
//!     .where_(Condition::hash([("status", "active")]))
//!     .order_by("created_at DESC")
//!     .limit(10)
//!     .fetch_all::<User, _>(&conn)
//!     .await?;
//!
//! // INSERT
//! let key = conn.insert("{{%users}}", &json!({"name": "alice"})).await?;
//!
//! // UPDATE
//! conn.update("{{%users}}", [("status", "inactive")], &Condition::eq("id", user_id))
//!     .await?;
//!
//! // DELETE
//! conn.delete("{{%users}}", &Condition::eq("id", user_id)).await?;
//! ```

pub mod command;
pub mod connection;
pub mod error;
pub mod ident;
pub mod monitor;
pub mod qb;

pub use command::{Command, Executor, Row};
pub use connection::{Connection, ConnectionConfig};
pub use error::{OrmError, OrmResult};
pub use ident::{Quoter, quote_identifier, quote_value};
pub use monitor::{QueryContext, QueryResult, QueryType};

pub use qb::{
    BuiltInsert, BuiltQuery, ColumnRef, Condition, Expression, IndexOptions, LikeEscape, Operand,
    Operator, Params, Query, QueryBuilder,
};

pub use serde_json::Value;
