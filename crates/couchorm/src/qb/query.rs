//! Read query specification.
//!
//! [`Query`] only records what to select; [`QueryBuilder`](super::QueryBuilder)
//! turns it into statement text and bindings.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::command::{Executor, Row};
use crate::connection::Connection;
use crate::error::OrmResult;

use super::condition::Condition;
use super::expr::{Expression, Operand};
use super::param::Params;

/// One entry of the projection list.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    /// Column name or function-call text; `"a AS b"` is split at build time.
    Column { name: String, alias: Option<String> },
    Expr { expr: Expression, alias: Option<String> },
    Query { query: Box<Query>, alias: String },
}

/// A bucket name (or path) or a subquery.
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    Bucket(String),
    Query(Box<Query>),
}

/// One entry of FROM, or the right-hand side of a join.
#[derive(Clone, Debug, PartialEq)]
pub struct FromItem {
    pub source: Source,
    pub alias: Option<String>,
}

impl FromItem {
    pub fn bucket(name: impl Into<String>) -> Self {
        Self {
            source: Source::Bucket(name.into()),
            alias: None,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            source: Source::Bucket(name.into()),
            alias: Some(alias.into()),
        }
    }

    pub fn query(query: Query, alias: impl Into<String>) -> Self {
        Self {
            source: Source::Query(Box::new(query)),
            alias: Some(alias.into()),
        }
    }
}

/// `USE [PRIMARY] KEYS ...`
#[derive(Clone, Debug, PartialEq)]
pub struct UseKeys {
    pub primary: bool,
    /// A key, a list of keys, or an expression.
    pub keys: Operand,
}

/// Index access method for `USE INDEX`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexUsing {
    Gsi,
    View,
}

impl IndexUsing {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexUsing::Gsi => "GSI",
            IndexUsing::View => "VIEW",
        }
    }
}

/// `USE INDEX (name [USING GSI|VIEW])`
#[derive(Clone, Debug, PartialEq)]
pub struct UseIndex {
    pub index: String,
    pub using: Option<IndexUsing>,
}

/// Join keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinType {
    Join,
    InnerJoin,
    LeftJoin,
    LeftOuterJoin,
    Nest,
    InnerNest,
    LeftNest,
    LeftOuterNest,
    Unnest,
    InnerUnnest,
    LeftUnnest,
    LeftOuterUnnest,
}

impl JoinType {
    /// Parse a join keyword case-insensitively.
    pub fn parse(keyword: &str) -> Option<Self> {
        let normalized = keyword
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        let join_type = match normalized.as_str() {
            "JOIN" => JoinType::Join,
            "INNER JOIN" => JoinType::InnerJoin,
            "LEFT JOIN" => JoinType::LeftJoin,
            "LEFT OUTER JOIN" => JoinType::LeftOuterJoin,
            "NEST" => JoinType::Nest,
            "INNER NEST" => JoinType::InnerNest,
            "LEFT NEST" => JoinType::LeftNest,
            "LEFT OUTER NEST" => JoinType::LeftOuterNest,
            "UNNEST" => JoinType::Unnest,
            "INNER UNNEST" => JoinType::InnerUnnest,
            "LEFT UNNEST" => JoinType::LeftUnnest,
            "LEFT OUTER UNNEST" => JoinType::LeftOuterUnnest,
            _ => return None,
        };
        Some(join_type)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Join => "JOIN",
            JoinType::InnerJoin => "INNER JOIN",
            JoinType::LeftJoin => "LEFT JOIN",
            JoinType::LeftOuterJoin => "LEFT OUTER JOIN",
            JoinType::Nest => "NEST",
            JoinType::InnerNest => "INNER NEST",
            JoinType::LeftNest => "LEFT NEST",
            JoinType::LeftOuterNest => "LEFT OUTER NEST",
            JoinType::Unnest => "UNNEST",
            JoinType::InnerUnnest => "INNER UNNEST",
            JoinType::LeftUnnest => "LEFT UNNEST",
            JoinType::LeftOuterUnnest => "LEFT OUTER UNNEST",
        }
    }
}

/// Join predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum JoinOn {
    /// `ON KEYS <expr>` (key-based lookup join)
    Keys(Condition),
    /// `ON <condition>` (ANSI join)
    Condition(Condition),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub source: FromItem,
    pub on: Option<JoinOn>,
}

/// Column name or raw expression, used by GROUP BY, RETURNING and index keys.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnRef {
    Name(String),
    Expr(Expression),
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::Name(name.to_string())
    }
}

impl From<String> for ColumnRef {
    fn from(name: String) -> Self {
        ColumnRef::Name(name)
    }
}

impl From<Expression> for ColumnRef {
    fn from(expr: Expression) -> Self {
        ColumnRef::Expr(expr)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderItem {
    Column(String, SortDirection),
    Expr(Expression),
}

/// LIMIT / OFFSET value.
#[derive(Clone, Debug, PartialEq)]
pub enum Limit {
    Count(i64),
    Expr(Expression),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

impl SetOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetOperator::Union => "UNION",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::Except => "EXCEPT",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SetOperand {
    Query(Box<Query>),
    Raw(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SetOperation {
    pub operator: SetOperator,
    pub all: bool,
    pub operand: SetOperand,
}

/// A read query specification.
///
/// ```ignore
/// use couchorm::qb::{self, Condition};
///
/// let query = qb::from("users u")
///     .select("u.name, u.email")
///     .and_where(Condition::eq("u.status", "active"))
///     .order_by("u.name")
///     .limit(10);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub(crate) select: Vec<SelectItem>,
    pub(crate) select_option: Option<String>,
    pub(crate) distinct: bool,
    pub(crate) from: Vec<FromItem>,
    pub(crate) use_keys: Option<UseKeys>,
    pub(crate) use_index: Option<UseIndex>,
    pub(crate) joins: Vec<Join>,
    pub(crate) condition: Option<Condition>,
    pub(crate) group_by: Vec<ColumnRef>,
    pub(crate) having: Option<Condition>,
    pub(crate) order_by: Vec<OrderItem>,
    pub(crate) limit: Option<Limit>,
    pub(crate) offset: Option<Limit>,
    pub(crate) set_operations: Vec<SetOperation>,
    pub(crate) params: Params,
    pub(crate) build_error: Option<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== SELECT ====================

    /// Set the projection from comma-separated text (`"a, b AS c, COUNT(*) AS n"`).
    pub fn select(mut self, columns: &str) -> Self {
        self.select = split_top_level(columns)
            .into_iter()
            .map(|name| SelectItem::Column { name, alias: None })
            .collect();
        self
    }

    /// Set the projection from a list of columns.
    pub fn select_cols(mut self, columns: &[&str]) -> Self {
        self.select = columns
            .iter()
            .map(|c| SelectItem::Column {
                name: c.to_string(),
                alias: None,
            })
            .collect();
        self
    }

    /// Append a column (or comma-separated columns).
    pub fn add_select(mut self, columns: &str) -> Self {
        self.select.extend(
            split_top_level(columns)
                .into_iter()
                .map(|name| SelectItem::Column { name, alias: None }),
        );
        self
    }

    /// Append `column AS alias`.
    pub fn select_as(mut self, column: &str, alias: &str) -> Self {
        self.select.push(SelectItem::Column {
            name: column.to_string(),
            alias: Some(alias.to_string()),
        });
        self
    }

    /// Append a raw expression, optionally aliased.
    pub fn select_expr(mut self, expr: Expression, alias: Option<&str>) -> Self {
        self.select.push(SelectItem::Expr {
            expr,
            alias: alias.map(str::to_string),
        });
        self
    }

    /// Append `(subquery) AS alias`.
    pub fn select_query(mut self, query: Query, alias: &str) -> Self {
        self.select.push(SelectItem::Query {
            query: Box::new(query),
            alias: alias.to_string(),
        });
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Projection modifier placed after SELECT, e.g. `RAW`.
    pub fn select_option(mut self, option: &str) -> Self {
        self.select_option = Some(option.to_string());
        self
    }

    // ==================== FROM ====================

    /// Set the source from comma-separated text (`"users u, orders AS o"`).
    pub fn from(mut self, buckets: &str) -> Self {
        self.from = split_top_level(buckets)
            .into_iter()
            .map(FromItem::bucket)
            .collect();
        self
    }

    /// Append an aliased bucket.
    pub fn from_as(mut self, bucket: &str, alias: &str) -> Self {
        self.from.push(FromItem::aliased(bucket, alias));
        self
    }

    /// Append `(subquery) alias`.
    pub fn from_query(mut self, query: Query, alias: &str) -> Self {
        self.from.push(FromItem::query(query, alias));
        self
    }

    // ==================== Hints ====================

    /// `USE KEYS ...` with a key, list of keys, or expression.
    pub fn use_keys(mut self, keys: impl Into<Operand>) -> Self {
        self.use_keys = Some(UseKeys {
            primary: false,
            keys: keys.into(),
        });
        self
    }

    /// `USE PRIMARY KEYS ...`
    pub fn use_primary_keys(mut self, keys: impl Into<Operand>) -> Self {
        self.use_keys = Some(UseKeys {
            primary: true,
            keys: keys.into(),
        });
        self
    }

    pub fn use_index(mut self, index: &str) -> Self {
        self.use_index = Some(UseIndex {
            index: index.to_string(),
            using: None,
        });
        self
    }

    pub fn use_index_using(mut self, index: &str, using: IndexUsing) -> Self {
        self.use_index = Some(UseIndex {
            index: index.to_string(),
            using: Some(using),
        });
        self
    }

    // ==================== JOIN ====================

    /// Add a join by keyword (`"LEFT JOIN"`, `"NEST"`, ...) with an optional
    /// `ON KEYS` condition.
    ///
    /// An unknown keyword makes [`QueryBuilder::build`](super::QueryBuilder::build) fail.
    pub fn join(mut self, join_type: &str, bucket: &str, on_keys: Option<Condition>) -> Self {
        match JoinType::parse(join_type) {
            Some(join_type) => self.joins.push(Join {
                join_type,
                source: FromItem::bucket(bucket),
                on: on_keys.map(JoinOn::Keys),
            }),
            None => {
                if self.build_error.is_none() {
                    self.build_error = Some(format!("unrecognized join type '{join_type}'"));
                }
            }
        }
        self
    }

    /// Add a fully specified join.
    pub fn add_join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// `INNER JOIN bucket ON KEYS <keys>`
    pub fn inner_join(self, bucket: &str, on_keys: impl Into<Condition>) -> Self {
        self.keys_join(JoinType::InnerJoin, bucket, on_keys.into())
    }

    /// `LEFT JOIN bucket ON KEYS <keys>`
    pub fn left_join(self, bucket: &str, on_keys: impl Into<Condition>) -> Self {
        self.keys_join(JoinType::LeftJoin, bucket, on_keys.into())
    }

    /// `NEST bucket ON KEYS <keys>`
    pub fn nest(self, bucket: &str, on_keys: impl Into<Condition>) -> Self {
        self.keys_join(JoinType::Nest, bucket, on_keys.into())
    }

    /// `LEFT NEST bucket ON KEYS <keys>`
    pub fn left_nest(self, bucket: &str, on_keys: impl Into<Condition>) -> Self {
        self.keys_join(JoinType::LeftNest, bucket, on_keys.into())
    }

    /// `UNNEST path alias`
    pub fn unnest(mut self, path: &str) -> Self {
        self.joins.push(Join {
            join_type: JoinType::Unnest,
            source: FromItem::bucket(path),
            on: None,
        });
        self
    }

    /// `LEFT UNNEST path alias`
    pub fn left_unnest(mut self, path: &str) -> Self {
        self.joins.push(Join {
            join_type: JoinType::LeftUnnest,
            source: FromItem::bucket(path),
            on: None,
        });
        self
    }

    /// ANSI join: `<join_type> bucket ON <condition>`.
    pub fn join_on(mut self, join_type: JoinType, bucket: &str, on: impl Into<Condition>) -> Self {
        self.joins.push(Join {
            join_type,
            source: FromItem::bucket(bucket),
            on: Some(JoinOn::Condition(on.into())),
        });
        self
    }

    fn keys_join(mut self, join_type: JoinType, bucket: &str, on_keys: Condition) -> Self {
        self.joins.push(Join {
            join_type,
            source: FromItem::bucket(bucket),
            on: Some(JoinOn::Keys(on_keys)),
        });
        self
    }

    // ==================== WHERE ====================

    /// Replace the WHERE condition.
    pub fn where_(mut self, condition: impl Into<Condition>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// `(existing) AND (condition)`
    pub fn and_where(mut self, condition: impl Into<Condition>) -> Self {
        self.condition = Some(combine(
            self.condition.take(),
            condition.into(),
            |c| Condition::and(c),
        ));
        self
    }

    /// `(existing) OR (condition)`
    pub fn or_where(mut self, condition: impl Into<Condition>) -> Self {
        self.condition = Some(combine(
            self.condition.take(),
            condition.into(),
            |c| Condition::or(c),
        ));
        self
    }

    // ==================== GROUP BY / HAVING ====================

    /// Set GROUP BY from comma-separated text.
    pub fn group_by(mut self, columns: &str) -> Self {
        self.group_by = split_top_level(columns)
            .into_iter()
            .map(ColumnRef::Name)
            .collect();
        self
    }

    pub fn add_group_by(mut self, column: impl Into<ColumnRef>) -> Self {
        self.group_by.push(column.into());
        self
    }

    pub fn having(mut self, condition: impl Into<Condition>) -> Self {
        self.having = Some(condition.into());
        self
    }

    pub fn and_having(mut self, condition: impl Into<Condition>) -> Self {
        self.having = Some(combine(self.having.take(), condition.into(), |c| Condition::and(c)));
        self
    }

    pub fn or_having(mut self, condition: impl Into<Condition>) -> Self {
        self.having = Some(combine(self.having.take(), condition.into(), |c| Condition::or(c)));
        self
    }

    // ==================== ORDER BY ====================

    /// Set ORDER BY from text such as `"created DESC, name"`.
    pub fn order_by(mut self, clause: &str) -> Self {
        self.order_by = split_top_level(clause)
            .into_iter()
            .map(|item| parse_order_item(&item))
            .collect();
        self
    }

    pub fn order_by_asc(mut self, column: &str) -> Self {
        self.order_by
            .push(OrderItem::Column(column.to_string(), SortDirection::Asc));
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by
            .push(OrderItem::Column(column.to_string(), SortDirection::Desc));
        self
    }

    pub fn order_by_expr(mut self, expr: Expression) -> Self {
        self.order_by.push(OrderItem::Expr(expr));
        self
    }

    // ==================== Pagination ====================

    /// Set LIMIT. Negative values mean no limit.
    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(Limit::Count(n));
        self
    }

    pub fn limit_expr(mut self, expr: Expression) -> Self {
        self.limit = Some(Limit::Expr(expr));
        self
    }

    /// Set OFFSET. Zero and negative values are not rendered.
    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(Limit::Count(n));
        self
    }

    pub fn offset_expr(mut self, expr: Expression) -> Self {
        self.offset = Some(Limit::Expr(expr));
        self
    }

    /// Pagination helper.
    ///
    /// `page` is 1-based (clamped to >= 1).
    /// `per_page` is clamped to >= 1.
    pub fn paginate(mut self, page: i64, per_page: i64) -> Self {
        let p = page.max(1);
        let size = per_page.max(1);
        self.limit = Some(Limit::Count(size));
        self.offset = Some(Limit::Count((p - 1).saturating_mul(size)));
        self
    }

    // ==================== Set operations ====================

    pub fn union(self, query: Query) -> Self {
        self.set_operation(SetOperator::Union, false, SetOperand::Query(Box::new(query)))
    }

    pub fn union_all(self, query: Query) -> Self {
        self.set_operation(SetOperator::Union, true, SetOperand::Query(Box::new(query)))
    }

    pub fn intersect(self, query: Query) -> Self {
        self.set_operation(SetOperator::Intersect, false, SetOperand::Query(Box::new(query)))
    }

    pub fn intersect_all(self, query: Query) -> Self {
        self.set_operation(SetOperator::Intersect, true, SetOperand::Query(Box::new(query)))
    }

    pub fn except(self, query: Query) -> Self {
        self.set_operation(SetOperator::Except, false, SetOperand::Query(Box::new(query)))
    }

    pub fn except_all(self, query: Query) -> Self {
        self.set_operation(SetOperator::Except, true, SetOperand::Query(Box::new(query)))
    }

    /// Append a set operation with literal statement text.
    pub fn set_operation_raw(self, operator: SetOperator, all: bool, sql: &str) -> Self {
        self.set_operation(operator, all, SetOperand::Raw(sql.to_string()))
    }

    fn set_operation(mut self, operator: SetOperator, all: bool, operand: SetOperand) -> Self {
        self.set_operations.push(SetOperation {
            operator,
            all,
            operand,
        });
        self
    }

    // ==================== Params ====================

    /// Add an explicit named parameter (`$` prefix optional).
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name, value);
        self
    }

    /// Add several named parameters; later values replace earlier ones.
    pub fn add_params(mut self, params: &Params) -> Self {
        for (name, value) in params.iter() {
            self.params.insert(name, value.clone());
        }
        self
    }

    /// The WHERE condition, if any.
    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// A query counting the rows this query returns, ignoring ordering and paging.
    ///
    /// DISTINCT, GROUP BY and set operations change the row count, so such
    /// queries are counted from a subquery.
    pub fn to_count_query(&self) -> Query {
        let mut count = self.clone();
        count.order_by.clear();
        count.limit = None;
        count.offset = None;

        let select = vec![SelectItem::Expr {
            expr: Expression::new("COUNT(*)"),
            alias: Some("count".to_string()),
        }];
        if count.distinct || !count.group_by.is_empty() || !count.set_operations.is_empty() {
            return Query {
                select,
                from: vec![FromItem::query(count, "q")],
                ..Query::default()
            };
        }

        count.select = select;
        count.select_option = None;
        count
    }

    // ==================== Execution ====================

    /// Fetch all rows.
    pub async fn all<E: Executor>(&self, conn: &Connection<E>) -> OrmResult<Vec<Row>> {
        let built = conn.query_builder().build(self)?;
        conn.command(built).query_all().await
    }

    /// Fetch the first row, if any.
    pub async fn one<E: Executor>(&self, conn: &Connection<E>) -> OrmResult<Option<Row>> {
        let built = conn.query_builder().build(self)?;
        conn.command(built).query_one().await
    }

    /// First column of the first row.
    pub async fn scalar<E: Executor>(&self, conn: &Connection<E>) -> OrmResult<Option<Value>> {
        let built = conn.query_builder().build(self)?;
        conn.command(built).query_scalar().await
    }

    /// First column of every row.
    pub async fn column<E: Executor>(&self, conn: &Connection<E>) -> OrmResult<Vec<Value>> {
        let built = conn.query_builder().build(self)?;
        conn.command(built).query_column().await
    }

    /// Fetch all rows deserialized into `T`.
    pub async fn fetch_all<T, E>(&self, conn: &Connection<E>) -> OrmResult<Vec<T>>
    where
        T: DeserializeOwned,
        E: Executor,
    {
        let built = conn.query_builder().build(self)?;
        conn.command(built).fetch_all_as().await
    }

    /// Number of matching documents.
    pub async fn count<E: Executor>(&self, conn: &Connection<E>) -> OrmResult<u64> {
        let built = conn.query_builder().build(&self.to_count_query())?;
        conn.command(built).query_count().await
    }
}

fn combine(
    existing: Option<Condition>,
    next: Condition,
    join: fn(Vec<Condition>) -> Condition,
) -> Condition {
    match existing {
        Some(existing) => join(vec![existing, next]),
        None => next,
    }
}

fn parse_order_item(item: &str) -> OrderItem {
    if let Some((column, direction)) = item.rsplit_once(char::is_whitespace) {
        let column = column.trim_end();
        if direction.eq_ignore_ascii_case("DESC") {
            return OrderItem::Column(column.to_string(), SortDirection::Desc);
        }
        if direction.eq_ignore_ascii_case("ASC") {
            return OrderItem::Column(column.to_string(), SortDirection::Asc);
        }
    }
    OrderItem::Column(item.to_string(), SortDirection::Asc)
}

/// Split at commas outside parentheses, brackets, braces and quotes.
pub(crate) fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();

    for ch in text.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
                current.push(ch);
            }
            None => match ch {
                '"' | '\'' | '`' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    current.push(ch);
                }
                ')' | ']' | '}' => {
                    depth -= 1;
                    current.push(ch);
                }
                ',' if depth == 0 => {
                    let part = current.trim();
                    if !part.is_empty() {
                        parts.push(part.to_string());
                    }
                    current.clear();
                }
                _ => current.push(ch),
            },
        }
    }

    let part = current.trim();
    if !part.is_empty() {
        parts.push(part.to_string());
    }
    parts
}
