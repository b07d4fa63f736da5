//! Statement execution.
//!
//! [`Executor`] is the seam to the cluster: it receives statement text with
//! `$name` placeholders plus the named bindings, and returns JSON rows or a
//! mutation count. [`Command`] pairs a statement with its bindings and offers
//! the fetch modes on top of an executor.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::ident::quote_value;
use crate::monitor::{QueryContext, QueryResult, truncate_sql_bytes};
use crate::qb::{PLACEHOLDER_SIGIL, Params};

/// A result row: field name to JSON value, in projection order.
pub type Row = serde_json::Map<String, Value>;

/// Runs N1QL statements.
///
/// Implementations surface failures as [`OrmError::Execution`].
pub trait Executor: Send + Sync {
    /// Run a statement and return its rows.
    fn query(
        &self,
        sql: &str,
        params: &Params,
    ) -> impl Future<Output = OrmResult<Vec<Row>>> + Send;

    /// Run a statement and return the number of mutated documents.
    fn execute(&self, sql: &str, params: &Params) -> impl Future<Output = OrmResult<u64>> + Send;
}

impl<E: Executor> Executor for Arc<E> {
    fn query(
        &self,
        sql: &str,
        params: &Params,
    ) -> impl Future<Output = OrmResult<Vec<Row>>> + Send {
        (**self).query(sql, params)
    }

    fn execute(&self, sql: &str, params: &Params) -> impl Future<Output = OrmResult<u64>> + Send {
        (**self).execute(sql, params)
    }
}

/// A statement bound to a connection.
#[derive(Debug)]
pub struct Command<'a, E: Executor> {
    conn: &'a Connection<E>,
    sql: String,
    params: Params,
}

impl<'a, E: Executor> Command<'a, E> {
    pub(crate) fn new(conn: &'a Connection<E>, sql: String, params: Params) -> Self {
        Self { conn, sql, params }
    }

    /// Bind a value to `name` (with or without the `$` sigil).
    pub fn bind_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn bind_values<K: AsRef<str>, V: Into<Value>>(
        mut self,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.params.extend(values);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The statement with bound values substituted for their placeholders.
    ///
    /// For logging only. Placeholders inside quoted text or without a binding
    /// are left as they are.
    pub fn raw_sql(&self) -> String {
        if self.params.is_empty() {
            return self.sql.clone();
        }

        let sql = self.sql.as_str();
        let mut out = String::with_capacity(sql.len());
        let mut chars = sql.char_indices().peekable();
        let mut quote: Option<char> = None;

        while let Some((i, ch)) = chars.next() {
            if let Some(q) = quote {
                out.push(ch);
                if ch == '\\' && q != '`' {
                    if let Some((_, escaped)) = chars.next() {
                        out.push(escaped);
                    }
                } else if ch == q {
                    quote = None;
                }
                continue;
            }

            match ch {
                '"' | '\'' | '`' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                PLACEHOLDER_SIGIL => {
                    let start = i + ch.len_utf8();
                    let mut end = start;
                    while let Some(&(j, c)) = chars.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            end = j + c.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let name = &sql[start..end];
                    match self.params.get(name) {
                        Some(value) if !name.is_empty() => out.push_str(&value_literal(value)),
                        _ => {
                            out.push(ch);
                            out.push_str(name);
                        }
                    }
                }
                _ => out.push(ch),
            }
        }
        out
    }

    // ==================== Fetch modes ====================

    /// All result rows.
    pub async fn query_all(&self) -> OrmResult<Vec<Row>> {
        self.fetch_rows().await
    }

    /// The first row, or `None` for an empty result.
    pub async fn query_one(&self) -> OrmResult<Option<Row>> {
        Ok(self.fetch_rows().await?.into_iter().next())
    }

    /// The first field of the first row.
    pub async fn query_scalar(&self) -> OrmResult<Option<Value>> {
        Ok(self
            .query_one()
            .await?
            .and_then(|row| row.into_iter().next().map(|(_, value)| value)))
    }

    /// The first field of every row.
    pub async fn query_column(&self) -> OrmResult<Vec<Value>> {
        Ok(self
            .fetch_rows()
            .await?
            .into_iter()
            .filter_map(|row| row.into_iter().next().map(|(_, value)| value))
            .collect())
    }

    /// The scalar result read as a count. An empty result counts as 0.
    pub async fn query_count(&self) -> OrmResult<u64> {
        match self.query_scalar().await? {
            None | Some(Value::Null) => Ok(0),
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
                OrmError::Serialization(format!("count is not a non-negative integer: {n}"))
            }),
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| OrmError::Serialization(format!("count is not an integer: {s:?}"))),
            Some(other) => Err(OrmError::Serialization(format!(
                "count is not an integer: {other}"
            ))),
        }
    }

    /// All rows deserialized into `T`.
    pub async fn fetch_all_as<T: DeserializeOwned>(&self) -> OrmResult<Vec<T>> {
        self.fetch_rows()
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(Value::Object(row)).map_err(OrmError::from))
            .collect()
    }

    /// The first row deserialized into `T`.
    ///
    /// Returns [`OrmError::NotFound`] for an empty result.
    pub async fn fetch_one_as<T: DeserializeOwned>(&self) -> OrmResult<T> {
        match self.fetch_opt_as().await? {
            Some(value) => Ok(value),
            None => Err(OrmError::not_found("Expected 1 row, got 0")),
        }
    }

    /// The first row deserialized into `T`, if any.
    pub async fn fetch_opt_as<T: DeserializeOwned>(&self) -> OrmResult<Option<T>> {
        match self.query_one().await? {
            Some(row) => Ok(Some(serde_json::from_value(Value::Object(row))?)),
            None => Ok(None),
        }
    }

    /// Run a mutation and return the number of affected documents.
    ///
    /// An empty statement is not sent and affects nothing.
    pub async fn execute(&self) -> OrmResult<u64> {
        if self.sql.trim().is_empty() {
            return Ok(0);
        }
        let ctx = QueryContext::new(&self.sql, self.params.len());
        let start = Instant::now();
        let result = self.conn.executor().execute(&self.sql, &self.params).await;
        let outcome = match &result {
            Ok(n) => QueryResult::Affected(*n),
            Err(e) => QueryResult::error(e.to_string()),
        };
        self.log(&ctx, start.elapsed(), &outcome);
        result
    }

    async fn fetch_rows(&self) -> OrmResult<Vec<Row>> {
        let ctx = QueryContext::new(&self.sql, self.params.len());
        let start = Instant::now();
        let result = self.conn.executor().query(&self.sql, &self.params).await;
        let outcome = match &result {
            Ok(rows) => QueryResult::Rows(rows.len()),
            Err(e) => QueryResult::error(e.to_string()),
        };
        self.log(&ctx, start.elapsed(), &outcome);
        result
    }

    fn log(&self, ctx: &QueryContext, elapsed: Duration, outcome: &QueryResult) {
        let config = self.conn.config();
        if !config.enable_logging {
            return;
        }
        let raw = if ctx.param_count == 0 {
            ctx.sql.clone()
        } else {
            self.raw_sql()
        };
        let sql = truncate_sql_bytes(&raw, config.max_logged_sql_length);
        let mutation = ctx.query_type.is_mutation();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        match outcome {
            QueryResult::Error(error) => tracing::error!(
                target: "couchorm.n1ql",
                query_type = %ctx.query_type,
                mutation,
                param_count = ctx.param_count,
                elapsed_ms,
                error = %error,
                sql = %sql,
                "statement failed"
            ),
            _ => tracing::debug!(
                target: "couchorm.n1ql",
                query_type = %ctx.query_type,
                mutation,
                param_count = ctx.param_count,
                elapsed_ms,
                result = %outcome,
                sql = %sql,
                "statement executed"
            ),
        }
    }
}

/// Render a bound value as N1QL literal text.
fn value_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_value(s),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
