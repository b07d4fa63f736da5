//! N1QL query builder (QB) for couchorm.
//!
//! Queries are plain data ([`Query`], [`Condition`]) until a [`QueryBuilder`]
//! renders them. Rendering quotes identifiers, compiles conditions and binds
//! every literal value as a named placeholder (`$qp0`, `$qp1`, ...).
//!
//! # Features
//!
//! - **Condition trees**: hash, AND/OR/NOT, BETWEEN, IN, LIKE and comparisons
//! - **No value interpolation**: literals always travel in [`Params`]
//! - **Couchbase clauses**: `USE KEYS`, `USE INDEX`, `JOIN/NEST ... ON KEYS`, `UNNEST`
//! - **Write statements**: INSERT with generated keys, UPSERT, UPDATE, DELETE and index DDL
//!
//! # Usage
//!
//! ```ignore
//! use couchorm::qb::{self, Condition, QueryBuilder};
//!
//! let query = qb::select("name, email")
//!     .from("users u")
//!     .where_(Condition::eq("status", "active"))
//!     .and_where(Condition::gt("age", 18))
//!     .order_by("created_at DESC")
//!     .limit(20);
//!
//! let built = QueryBuilder::default().build(&query)?;
//! // SELECT `name`, `email` FROM `users` `u` WHERE (`status` = $qp0) AND (`age` > $qp1) ...
//!
//! let update = QueryBuilder::default().update(
//!     "users",
//!     [("status", "inactive")],
//!     &Condition::eq("id", 7),
//! )?;
//! ```

mod builder;
mod compile;
mod condition;
mod expr;
mod index;
mod param;
mod query;
mod statement;

pub use builder::{BuiltQuery, QueryBuilder};
pub use condition::{Condition, Operator};
pub use expr::{Expression, LikeEscape, Operand};
pub use index::IndexOptions;
pub use param::{PARAM_PREFIX, PLACEHOLDER_SIGIL, Params};
pub use query::{
    ColumnRef, FromItem, IndexUsing, Join, JoinOn, JoinType, Limit, OrderItem, Query, SelectItem,
    SetOperand, SetOperation, SetOperator, SortDirection, Source, UseIndex, UseKeys,
};
pub use statement::{BuiltInsert, KEY_FIELD, KeyGenerator, UuidKeyGenerator};

/// Start a query with the given projection.
///
/// # Example
/// ```ignore
/// let q = couchorm::qb::select("id, name").from("users");
/// ```
pub fn select(columns: &str) -> Query {
    Query::new().select(columns)
}

/// Start a query reading from the given bucket(s).
///
/// Accepts `"users"`, `"users u"` or `"users AS u, orders o"`.
///
/// # Example
/// ```ignore
/// let q = couchorm::qb::from("users u").where_(Condition::eq("u.id", 1));
/// ```
pub fn from(buckets: &str) -> Query {
    Query::new().from(buckets)
}

#[cfg(test)]
mod tests;
