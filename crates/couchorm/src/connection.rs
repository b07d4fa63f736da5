//! Connection configuration and the connection facade.
//!
//! A [`Connection`] owns an [`Executor`] and a lazily created
//! [`QueryBuilder`] configured from [`ConnectionConfig`]. Write helpers build
//! a statement and run it in one call:
//!
//! ```ignore
//! use couchorm::{Condition, Connection, ConnectionConfig};
//!
//! let config = ConnectionConfig::from_toml_str(r#"
//!     dsn = "couchbase://db.local"
//!     bucket_prefix = "dev_"
//! "#)?;
//! let conn = Connection::new(config, executor);
//!
//! let key = conn.insert("{{%users}}", &json!({"name": "alice"})).await?;
//! let n = conn.update("{{%users}}", [("active", false)], &Condition::eq("name", "bob")).await?;
//! ```

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::command::{Command, Executor};
use crate::error::{OrmError, OrmResult};
use crate::ident::Quoter;
use crate::qb::{BuiltQuery, ColumnRef, Condition, IndexOptions, Operand, QueryBuilder};

/// Accepted DSN schemes.
const DSN_SCHEMES: [&str; 2] = ["couchbase://", "couchbases://"];

/// Default cap on logged statement text, in bytes.
pub const DEFAULT_MAX_LOGGED_SQL_LENGTH: usize = 2048;

/// Connection settings.
///
/// Every field is optional in TOML; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Cluster address, e.g. `couchbase://localhost`.
    pub dsn: String,
    /// Replaces `%` in `{{%name}}` bucket tokens.
    pub bucket_prefix: String,
    /// Bucket used when none is given; derived from the DSN host when unset.
    pub default_bucket: Option<String>,
    /// Log executed statements under the `couchorm.n1ql` target.
    pub enable_logging: bool,
    /// Appends `ESCAPE 'c'` to compiled LIKE predicates.
    pub like_escape_character: Option<char>,
    /// Logged statement text is cut to this many bytes.
    pub max_logged_sql_length: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            dsn: "couchbase://localhost".to_string(),
            bucket_prefix: String::new(),
            default_bucket: None,
            enable_logging: true,
            like_escape_character: None,
            max_logged_sql_length: DEFAULT_MAX_LOGGED_SQL_LENGTH,
        }
    }
}

impl ConnectionConfig {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> OrmResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn bucket_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.bucket_prefix = prefix.into();
        self
    }

    pub fn default_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.default_bucket = Some(bucket.into());
        self
    }

    pub fn enable_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    pub fn like_escape_character(mut self, escape: char) -> Self {
        self.like_escape_character = Some(escape);
        self
    }

    pub fn max_logged_sql_length(mut self, max: usize) -> Self {
        self.max_logged_sql_length = max;
        self
    }

    /// Check the DSN scheme and host.
    pub fn validate(&self) -> OrmResult<()> {
        if self.dsn.trim().is_empty() {
            return Err(OrmError::Config("dsn cannot be empty".to_string()));
        }
        if self.dsn_host().is_none() {
            return Err(OrmError::Config(format!(
                "dsn must look like couchbase://host[:port], got {:?}",
                self.dsn
            )));
        }
        Ok(())
    }

    /// The explicit default bucket, else the DSN host.
    pub fn default_database_name(&self) -> OrmResult<String> {
        if let Some(bucket) = &self.default_bucket {
            return Ok(bucket.clone());
        }
        self.dsn_host().map(str::to_string).ok_or_else(|| {
            OrmError::Config("unable to determine default database name from dsn".to_string())
        })
    }

    fn dsn_host(&self) -> Option<&str> {
        let rest = DSN_SCHEMES
            .iter()
            .find_map(|scheme| self.dsn.strip_prefix(scheme))?;
        let host = rest.split([':', '/', ',', '?']).next().unwrap_or_default();
        (!host.is_empty()).then_some(host)
    }
}

/// A cluster connection: configuration, executor and query builder.
pub struct Connection<E: Executor> {
    config: ConnectionConfig,
    executor: E,
    builder: OnceLock<QueryBuilder>,
}

impl<E: Executor> fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E: Executor> Connection<E> {
    pub fn new(config: ConnectionConfig, executor: E) -> Self {
        Self {
            config,
            executor,
            builder: OnceLock::new(),
        }
    }

    /// Use `builder` instead of one derived from the configuration.
    pub fn with_query_builder(mut self, builder: QueryBuilder) -> Self {
        self.builder = OnceLock::from(builder);
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// The query builder for this connection, created on first use.
    pub fn query_builder(&self) -> &QueryBuilder {
        self.builder.get_or_init(|| {
            let builder = QueryBuilder::new(Quoter::with_prefix(self.config.bucket_prefix.clone()));
            match self.config.like_escape_character {
                Some(escape) => builder.with_like_escape_character(escape),
                None => builder,
            }
        })
    }

    pub fn quoter(&self) -> &Quoter {
        self.query_builder().quoter()
    }

    pub fn quote_bucket_name(&self, name: &str) -> String {
        self.quoter().quote_bucket_name(name)
    }

    pub fn quote_column_name(&self, name: &str) -> String {
        self.quoter().quote_column_name(name)
    }

    pub fn quote_sql(&self, sql: &str) -> String {
        self.quoter().quote_sql(sql)
    }

    /// A command from raw N1QL text; `{{bucket}}` and `[[column]]` tokens are quoted.
    pub fn create_command(&self, sql: &str) -> Command<'_, E> {
        Command::new(self, self.quote_sql(sql), Default::default())
    }

    /// A command for a built statement.
    pub fn command(&self, built: BuiltQuery) -> Command<'_, E> {
        let (sql, params) = built.into_parts();
        Command::new(self, sql, params)
    }

    // ==================== Writes ====================

    /// Insert one document and return its generated key.
    pub async fn insert<T: Serialize + ?Sized>(&self, bucket: &str, data: &T) -> OrmResult<String> {
        let built = self.query_builder().insert(bucket, data)?;
        self.command(built.query).execute().await?;
        built
            .keys
            .into_iter()
            .next()
            .ok_or_else(|| OrmError::Other("INSERT produced no document key".to_string()))
    }

    /// Insert many documents; the keys are in input order.
    pub async fn batch_insert<T: Serialize>(
        &self,
        bucket: &str,
        rows: &[T],
    ) -> OrmResult<Vec<String>> {
        let built = self.query_builder().batch_insert(bucket, rows)?;
        self.command(built.query).execute().await?;
        Ok(built.keys)
    }

    pub async fn update<K, V, I>(
        &self,
        bucket: &str,
        columns: I,
        condition: &Condition,
    ) -> OrmResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Operand>,
    {
        let built = self.query_builder().update(bucket, columns, condition)?;
        self.command(built).execute().await
    }

    pub async fn upsert<T: Serialize + ?Sized>(
        &self,
        bucket: &str,
        key: &str,
        data: &T,
    ) -> OrmResult<u64> {
        let built = self.query_builder().upsert(bucket, key, data)?;
        self.command(built).execute().await
    }

    pub async fn delete(&self, bucket: &str, condition: &Condition) -> OrmResult<u64> {
        let built = self.query_builder().delete(bucket, condition)?;
        self.command(built).execute().await
    }

    /// Number of documents in `bucket` matching `condition`.
    pub async fn count(&self, bucket: &str, condition: &Condition) -> OrmResult<u64> {
        let built = self.query_builder().count(bucket, condition)?;
        self.command(built).query_count().await
    }

    // ==================== Index DDL ====================

    pub async fn create_primary_index(
        &self,
        bucket: &str,
        name: Option<&str>,
        options: &IndexOptions,
    ) -> OrmResult<u64> {
        let built = self.query_builder().create_primary_index(bucket, name, options)?;
        self.command(built).execute().await
    }

    pub async fn drop_primary_index(&self, bucket: &str) -> OrmResult<u64> {
        let built = self.query_builder().drop_primary_index(bucket)?;
        self.command(built).execute().await
    }

    pub async fn create_index(
        &self,
        bucket: &str,
        name: &str,
        columns: &[ColumnRef],
        condition: Option<&Condition>,
        options: &IndexOptions,
    ) -> OrmResult<u64> {
        let built = self
            .query_builder()
            .create_index(bucket, name, columns, condition, options)?;
        self.command(built).execute().await
    }

    pub async fn drop_index(&self, bucket: &str, name: &str) -> OrmResult<u64> {
        let built = self.query_builder().drop_index(bucket, name)?;
        self.command(built).execute().await
    }

    /// Build deferred indexes.
    pub async fn build_index(&self, bucket: &str, names: &[&str]) -> OrmResult<u64> {
        let built = self.query_builder().build_index(bucket, names)?;
        self.command(built).execute().await
    }
}
