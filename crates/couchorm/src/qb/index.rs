//! Index DDL statements.

use serde::Serialize;

use crate::error::{OrmError, OrmResult};

use super::builder::{BuiltQuery, QueryBuilder, join_clauses};
use super::condition::Condition;
use super::param::Params;
use super::query::{ColumnRef, IndexUsing};

/// Options rendered as the `WITH {...}` document of CREATE INDEX.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IndexOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defer_build: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_replica: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
}

impl IndexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the index definition without building it.
    pub fn defer_build(mut self, defer: bool) -> Self {
        self.defer_build = Some(defer);
        self
    }

    pub fn num_replica(mut self, replicas: u32) -> Self {
        self.num_replica = Some(replicas);
        self
    }

    pub fn nodes(mut self, nodes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.defer_build.is_none() && self.num_replica.is_none() && self.nodes.is_empty()
    }

    fn to_with_clause(&self) -> OrmResult<String> {
        if self.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("WITH {}", serde_json::to_string(self)?))
    }
}

impl QueryBuilder {
    /// `CREATE PRIMARY INDEX [name] ON b [WITH {...}]`
    pub fn create_primary_index(
        &self,
        bucket: &str,
        name: Option<&str>,
        options: &IndexOptions,
    ) -> OrmResult<BuiltQuery> {
        let bucket = self.write_target(bucket)?;
        let name = name
            .map(|n| self.quoter.quote_column_name(n))
            .unwrap_or_default();
        let sql = join_clauses([
            "CREATE PRIMARY INDEX".to_string(),
            name,
            format!("ON {bucket}"),
            options.to_with_clause()?,
        ]);
        Ok(BuiltQuery::new(sql, Params::new()))
    }

    /// `DROP PRIMARY INDEX ON b`
    pub fn drop_primary_index(&self, bucket: &str) -> OrmResult<BuiltQuery> {
        let bucket = self.write_target(bucket)?;
        Ok(BuiltQuery::new(
            format!("DROP PRIMARY INDEX ON {bucket}"),
            Params::new(),
        ))
    }

    /// `CREATE INDEX name ON b (cols) [WHERE ...] [WITH {...}]`
    ///
    /// Columns containing `(` are passed through unquoted.
    pub fn create_index(
        &self,
        bucket: &str,
        name: &str,
        columns: &[ColumnRef],
        condition: Option<&Condition>,
        options: &IndexOptions,
    ) -> OrmResult<BuiltQuery> {
        let bucket = self.write_target(bucket)?;
        if name.trim().is_empty() {
            return Err(OrmError::validation("CREATE INDEX requires an index name"));
        }
        if columns.is_empty() {
            return Err(OrmError::validation("CREATE INDEX requires at least one column"));
        }

        let mut params = Params::new();
        let columns = self.build_columns(columns, &mut params)?;
        let where_sql = self.build_where(condition, &mut params)?;
        let sql = join_clauses([
            format!(
                "CREATE INDEX {} ON {bucket} ({columns})",
                self.quoter.quote_column_name(name)
            ),
            where_sql,
            options.to_with_clause()?,
        ]);
        Ok(BuiltQuery::new(sql, params))
    }

    /// `DROP INDEX b.name`
    pub fn drop_index(&self, bucket: &str, name: &str) -> OrmResult<BuiltQuery> {
        let bucket = self.write_target(bucket)?;
        Ok(BuiltQuery::new(
            format!("DROP INDEX {bucket}.{}", self.quoter.quote_column_name(name)),
            Params::new(),
        ))
    }

    /// `BUILD INDEX ON b(i1, i2) USING GSI` for deferred indexes.
    pub fn build_index(&self, bucket: &str, names: &[&str]) -> OrmResult<BuiltQuery> {
        let bucket = self.write_target(bucket)?;
        if names.is_empty() {
            return Err(OrmError::validation("BUILD INDEX requires at least one index name"));
        }
        let names = names
            .iter()
            .map(|n| self.quoter.quote_column_name(n))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(BuiltQuery::new(
            format!("BUILD INDEX ON {bucket}({names}) USING {}", IndexUsing::Gsi.as_str()),
            Params::new(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qb::expr::Expression;

    fn qb() -> QueryBuilder {
        QueryBuilder::default()
    }

    #[test]
    fn test_create_primary_index() {
        assert_eq!(
            qb().create_primary_index("users", None, &IndexOptions::new()).unwrap().sql,
            "CREATE PRIMARY INDEX ON `users`"
        );
        assert_eq!(
            qb()
                .create_primary_index("users", Some("pk"), &IndexOptions::new().defer_build(true))
                .unwrap()
                .sql,
            r#"CREATE PRIMARY INDEX `pk` ON `users` WITH {"defer_build":true}"#
        );
    }

    #[test]
    fn test_drop_primary_index() {
        assert_eq!(
            qb().drop_primary_index("users").unwrap().sql,
            "DROP PRIMARY INDEX ON `users`"
        );
    }

    #[test]
    fn test_create_index() {
        let built = qb()
            .create_index(
                "users",
                "idx_email",
                &[ColumnRef::from("email"), ColumnRef::from("LOWER(name)")],
                Some(&Condition::eq("type", "user")),
                &IndexOptions::new().num_replica(1).nodes(["n1:8091"]),
            )
            .unwrap();
        assert_eq!(
            built.sql,
            r#"CREATE INDEX `idx_email` ON `users` (`email`, LOWER(name)) WHERE `type` = $qp0 WITH {"num_replica":1,"nodes":["n1:8091"]}"#
        );
        assert_eq!(built.params.len(), 1);
    }

    #[test]
    fn test_create_index_expression_key() {
        let built = qb()
            .create_index(
                "orders",
                "idx_items",
                &[ColumnRef::from(Expression::new("DISTINCT ARRAY i.sku FOR i IN items END"))],
                None,
                &IndexOptions::new(),
            )
            .unwrap();
        assert_eq!(
            built.sql,
            "CREATE INDEX `idx_items` ON `orders` (DISTINCT ARRAY i.sku FOR i IN items END)"
        );
    }

    #[test]
    fn test_create_index_requires_columns() {
        assert!(
            qb()
                .create_index("users", "i", &[], None, &IndexOptions::new())
                .is_err()
        );
    }

    #[test]
    fn test_drop_and_build_index() {
        assert_eq!(
            qb().drop_index("users", "idx_email").unwrap().sql,
            "DROP INDEX `users`.`idx_email`"
        );
        assert_eq!(
            qb().build_index("users", &["a", "b"]).unwrap().sql,
            "BUILD INDEX ON `users`(`a`, `b`) USING GSI"
        );
    }
}
