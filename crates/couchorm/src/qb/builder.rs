//! Statement assembly for [`Query`] specifications.

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::error::{OrmError, OrmResult};
use crate::ident::Quoter;

use super::condition::Condition;
use super::expr::{LikeEscape, Operand};
use super::param::Params;
use super::query::{
    ColumnRef, FromItem, Join, JoinOn, Limit, OrderItem, Query, SelectItem, SetOperand,
    SetOperation, SortDirection, Source, UseIndex, UseKeys,
};
use super::statement::{KeyGenerator, UuidKeyGenerator};

/// Clause separator.
pub(crate) const SEPARATOR: &str = " ";

fn column_alias_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*?)(?i:\s+as\s+|\s+)([\w\-_.]+)$").expect("invalid built-in alias regex")
    })
}

fn bucket_alias_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*?)(?i:\s+as|)\s+([^ ]+)$").expect("invalid built-in alias regex")
    })
}

/// Statement text plus its parameter bindings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Params,
}

impl BuiltQuery {
    pub fn new(sql: impl Into<String>, params: Params) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Whether there is nothing to execute.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn into_parts(self) -> (String, Params) {
        (self.sql, self.params)
    }
}

/// Compiles query specifications, conditions and write statements into N1QL.
///
/// The builder holds only read-only configuration and can be shared between
/// threads; every call works on its own [`Params`].
#[derive(Clone)]
pub struct QueryBuilder {
    pub(crate) quoter: Quoter,
    pub(crate) like_escape: LikeEscape,
    pub(crate) like_escape_character: Option<char>,
    pub(crate) key_generator: Arc<dyn KeyGenerator>,
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("quoter", &self.quoter)
            .field("like_escape", &self.like_escape)
            .field("like_escape_character", &self.like_escape_character)
            .finish_non_exhaustive()
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(Quoter::default())
    }
}

impl QueryBuilder {
    pub fn new(quoter: Quoter) -> Self {
        Self {
            quoter,
            like_escape: LikeEscape::default(),
            like_escape_character: None,
            key_generator: Arc::new(UuidKeyGenerator),
        }
    }

    /// Replace the default LIKE escape table.
    pub fn with_like_escape(mut self, escape: LikeEscape) -> Self {
        self.like_escape = escape;
        self
    }

    /// Append `ESCAPE 'c'` to every LIKE predicate.
    pub fn with_like_escape_character(mut self, escape: char) -> Self {
        self.like_escape_character = Some(escape);
        self
    }

    /// Replace the document key generator used by INSERT statements.
    pub fn with_key_generator(mut self, generator: impl KeyGenerator + 'static) -> Self {
        self.key_generator = Arc::new(generator);
        self
    }

    pub fn quoter(&self) -> &Quoter {
        &self.quoter
    }

    // ==================== Entry points ====================

    /// Build a query into statement text and bindings.
    pub fn build(&self, query: &Query) -> OrmResult<BuiltQuery> {
        self.build_with_params(query, Params::new())
    }

    /// Build a query on top of existing bindings.
    pub fn build_with_params(&self, query: &Query, mut params: Params) -> OrmResult<BuiltQuery> {
        let sql = self.build_into(query, &mut params)?;
        Ok(BuiltQuery { sql, params })
    }

    /// Build a query, appending its bindings to `params`. Used for subqueries.
    pub(crate) fn build_into(&self, query: &Query, params: &mut Params) -> OrmResult<String> {
        if let Some(err) = &query.build_error {
            return Err(OrmError::invalid_query(err.clone()));
        }
        params.merge(&query.params)?;

        let clauses = [
            self.build_select(query, params)?,
            self.build_from(&query.from, params)?,
            self.build_use_keys(query.use_keys.as_ref(), params)?,
            self.build_use_index(query.use_index.as_ref()),
            self.build_join(&query.joins, params)?,
            self.build_where(query.condition.as_ref(), params)?,
            self.build_group_by(&query.group_by, params)?,
            self.build_having(query.having.as_ref(), params)?,
            self.build_order_by(&query.order_by, params)?,
            self.build_limit_offset(query.limit.as_ref(), query.offset.as_ref(), params)?,
        ];
        let sql = join_clauses(clauses);

        let union = self.build_union(&query.set_operations, params)?;
        if union.is_empty() {
            Ok(sql)
        } else {
            Ok(format!("({sql}){SEPARATOR}{union}"))
        }
    }

    // ==================== Clause assemblers ====================

    /// `SELECT [DISTINCT] [option] columns`
    pub fn build_select(&self, query: &Query, params: &mut Params) -> OrmResult<String> {
        let mut select = String::from(if query.distinct {
            "SELECT DISTINCT"
        } else {
            "SELECT"
        });
        if let Some(option) = &query.select_option {
            select.push(' ');
            select.push_str(option);
        }

        if query.select.is_empty() {
            select.push_str(" *");
            return Ok(select);
        }

        let mut columns = Vec::with_capacity(query.select.len());
        for item in &query.select {
            let column = match item {
                SelectItem::Column {
                    name,
                    alias: Some(alias),
                } => format!(
                    "{} AS {}",
                    self.column_sql(name),
                    self.quoter.quote_column_name(alias)
                ),
                SelectItem::Column { name, alias: None } => self.projection_sql(name),
                SelectItem::Expr { expr, alias } => {
                    let sql = expr.splice(params)?;
                    match alias {
                        Some(alias) => {
                            format!("{sql} AS {}", self.quoter.quote_column_name(alias))
                        }
                        None => sql,
                    }
                }
                SelectItem::Query { query, alias } => format!(
                    "({}) AS {}",
                    self.build_into(query, params)?,
                    self.quoter.quote_column_name(alias)
                ),
            };
            columns.push(column);
        }

        Ok(format!("{select} {}", columns.join(", ")))
    }

    /// `FROM source[, source...]`
    pub fn build_from(&self, from: &[FromItem], params: &mut Params) -> OrmResult<String> {
        if from.is_empty() {
            return Ok(String::new());
        }
        let sources = from
            .iter()
            .map(|item| self.source_sql(item, params))
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(format!("FROM {}", sources.join(", ")))
    }

    /// `USE [PRIMARY] KEYS keys`; the keys are bound as one parameter.
    pub fn build_use_keys(
        &self,
        use_keys: Option<&UseKeys>,
        params: &mut Params,
    ) -> OrmResult<String> {
        let Some(use_keys) = use_keys else {
            return Ok(String::new());
        };
        let keys = match &use_keys.keys {
            Operand::Expr(expr) => expr.splice(params)?,
            other => match other.to_value() {
                Some(value) => params.bind(value),
                None => {
                    return Err(OrmError::invalid_query(format!(
                        "USE KEYS expects a key, a list of keys or an expression, got {}",
                        other.kind()
                    )));
                }
            },
        };
        let primary = if use_keys.primary { "PRIMARY " } else { "" };
        Ok(format!("USE {primary}KEYS {keys}"))
    }

    /// `USE INDEX (name [USING GSI|VIEW])`
    pub fn build_use_index(&self, use_index: Option<&UseIndex>) -> String {
        let Some(use_index) = use_index else {
            return String::new();
        };
        let index = self.quoter.quote_column_name(&use_index.index);
        match use_index.using {
            Some(using) => format!("USE INDEX ({index} USING {})", using.as_str()),
            None => format!("USE INDEX ({index})"),
        }
    }

    /// Join clauses in order, each optionally followed by `ON KEYS` / `ON`.
    pub fn build_join(&self, joins: &[Join], params: &mut Params) -> OrmResult<String> {
        let mut clauses = Vec::with_capacity(joins.len());
        for join in joins {
            let mut clause = format!(
                "{} {}",
                join.join_type.as_str(),
                self.source_sql(&join.source, params)?
            );
            match &join.on {
                Some(JoinOn::Keys(condition)) => {
                    let keys = self.build_condition(condition, params)?;
                    if !keys.is_empty() {
                        clause.push_str(" ON KEYS ");
                        clause.push_str(&keys);
                    }
                }
                Some(JoinOn::Condition(condition)) => {
                    let on = self.build_condition(condition, params)?;
                    if !on.is_empty() {
                        clause.push_str(" ON ");
                        clause.push_str(&on);
                    }
                }
                None => {}
            }
            clauses.push(clause);
        }
        Ok(clauses.join(SEPARATOR))
    }

    /// `WHERE condition`, or empty when the condition compiles to nothing.
    pub fn build_where(
        &self,
        condition: Option<&Condition>,
        params: &mut Params,
    ) -> OrmResult<String> {
        self.prefixed_condition("WHERE", condition, params)
    }

    pub fn build_group_by(&self, columns: &[ColumnRef], params: &mut Params) -> OrmResult<String> {
        if columns.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("GROUP BY {}", self.build_columns(columns, params)?))
    }

    pub fn build_having(
        &self,
        condition: Option<&Condition>,
        params: &mut Params,
    ) -> OrmResult<String> {
        self.prefixed_condition("HAVING", condition, params)
    }

    pub fn build_order_by(&self, order_by: &[OrderItem], params: &mut Params) -> OrmResult<String> {
        if order_by.is_empty() {
            return Ok(String::new());
        }
        let items = order_by
            .iter()
            .map(|item| match item {
                OrderItem::Expr(expr) => expr.splice(params),
                OrderItem::Column(column, SortDirection::Desc) => {
                    Ok(format!("{} DESC", self.column_sql(column)))
                }
                OrderItem::Column(column, SortDirection::Asc) => Ok(self.column_sql(column)),
            })
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(format!("ORDER BY {}", items.join(", ")))
    }

    /// `LIMIT n OFFSET m`; a negative limit and a non-positive offset are omitted.
    pub fn build_limit_offset(
        &self,
        limit: Option<&Limit>,
        offset: Option<&Limit>,
        params: &mut Params,
    ) -> OrmResult<String> {
        let mut parts = Vec::with_capacity(2);
        match limit {
            Some(Limit::Count(n)) if *n >= 0 => parts.push(format!("LIMIT {n}")),
            Some(Limit::Expr(expr)) => parts.push(format!("LIMIT {}", expr.splice(params)?)),
            _ => {}
        }
        match offset {
            Some(Limit::Count(n)) if *n > 0 => parts.push(format!("OFFSET {n}")),
            Some(Limit::Expr(expr)) => parts.push(format!("OFFSET {}", expr.splice(params)?)),
            _ => {}
        }
        Ok(parts.join(SEPARATOR))
    }

    /// `UNION [ALL] ( ... ) INTERSECT ( ... )`
    pub fn build_union(
        &self,
        operations: &[SetOperation],
        params: &mut Params,
    ) -> OrmResult<String> {
        let mut parts = Vec::with_capacity(operations.len());
        for operation in operations {
            let sql = match &operation.operand {
                SetOperand::Query(query) => self.build_into(query, params)?,
                SetOperand::Raw(sql) => sql.clone(),
            };
            let all = if operation.all { " ALL" } else { "" };
            parts.push(format!("{}{all} ( {sql} )", operation.operator.as_str()));
        }
        Ok(parts.join(SEPARATOR))
    }

    /// `RETURNING a, b` (empty for no columns).
    pub fn build_returning(&self, columns: &[ColumnRef], params: &mut Params) -> OrmResult<String> {
        if columns.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("RETURNING {}", self.build_columns(columns, params)?))
    }

    /// Comma-separated column list; names without `(` are quoted.
    pub fn build_columns(&self, columns: &[ColumnRef], params: &mut Params) -> OrmResult<String> {
        let columns = columns
            .iter()
            .map(|column| match column {
                ColumnRef::Name(name) => Ok(self.column_sql(name)),
                ColumnRef::Expr(expr) => expr.splice(params),
            })
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(columns.join(", "))
    }

    // ==================== Helpers ====================

    fn prefixed_condition(
        &self,
        keyword: &str,
        condition: Option<&Condition>,
        params: &mut Params,
    ) -> OrmResult<String> {
        let Some(condition) = condition else {
            return Ok(String::new());
        };
        let sql = self.build_condition(condition, params)?;
        if sql.is_empty() {
            Ok(sql)
        } else {
            Ok(format!("{keyword} {sql}"))
        }
    }

    /// Quote a column unless it looks like a function call.
    pub(crate) fn column_sql(&self, column: &str) -> String {
        if column.contains('(') {
            column.to_string()
        } else {
            self.quoter.quote_column_name(column)
        }
    }

    fn bucket_sql(&self, bucket: &str) -> String {
        if bucket.contains('(') {
            bucket.to_string()
        } else {
            self.quoter.quote_bucket_name(bucket)
        }
    }

    /// Projection entry without an explicit alias: `a AS b` and `a b` are split.
    fn projection_sql(&self, name: &str) -> String {
        if name.contains('(') {
            return name.to_string();
        }
        match column_alias_regex().captures(name) {
            Some(caps) => format!(
                "{} AS {}",
                self.quoter.quote_column_name(&caps[1]),
                self.quoter.quote_column_name(&caps[2])
            ),
            None => self.quoter.quote_column_name(name),
        }
    }

    fn source_sql(&self, item: &FromItem, params: &mut Params) -> OrmResult<String> {
        match (&item.source, &item.alias) {
            (Source::Query(query), alias) => {
                let sql = self.build_into(query, params)?;
                Ok(match alias {
                    Some(alias) => format!("({sql}) {}", self.quoter.quote_bucket_name(alias)),
                    None => format!("({sql})"),
                })
            }
            (Source::Bucket(bucket), Some(alias)) => Ok(format!(
                "{} {}",
                self.bucket_sql(bucket),
                self.quoter.quote_bucket_name(alias)
            )),
            (Source::Bucket(bucket), None) => {
                if bucket.contains('(') {
                    return Ok(bucket.clone());
                }
                Ok(match bucket_alias_regex().captures(bucket) {
                    Some(caps) => format!(
                        "{} {}",
                        self.quoter.quote_bucket_name(&caps[1]),
                        self.quoter.quote_bucket_name(&caps[2])
                    ),
                    None => self.quoter.quote_bucket_name(bucket),
                })
            }
        }
    }
}

/// Join non-empty clauses with the separator.
pub(crate) fn join_clauses<I, S>(clauses: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sql = String::new();
    for clause in clauses {
        let clause = clause.as_ref();
        if clause.is_empty() {
            continue;
        }
        if !sql.is_empty() {
            sql.push_str(SEPARATOR);
        }
        sql.push_str(clause);
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qb::expr::Expression;
    use crate::qb::query::{IndexUsing, JoinType, SetOperator};
    use serde_json::json;

    fn qb() -> QueryBuilder {
        QueryBuilder::default()
    }

    #[test]
    fn test_select_star() {
        let built = qb().build(&Query::new().from("users")).unwrap();
        assert_eq!(built.sql, "SELECT * FROM `users`");
        assert!(built.params.is_empty());
    }

    #[test]
    fn test_select_alias_split() {
        let query = Query::new()
            .select("id, name AS n, email e, COUNT(*) AS total")
            .from("users");
        assert_eq!(
            qb().build(&query).unwrap().sql,
            "SELECT `id`, `name` AS `n`, `email` AS `e`, COUNT(*) AS total FROM `users`"
        );
    }

    #[test]
    fn test_select_explicit_alias_wins() {
        let query = Query::new()
            .select_as("a b", "c")
            .select_as("LOWER(name)", "lname")
            .from("t");
        assert_eq!(
            qb().build(&query).unwrap().sql,
            "SELECT `a b` AS `c`, LOWER(name) AS `lname` FROM `t`"
        );
    }

    #[test]
    fn test_select_distinct_and_option() {
        let query = Query::new().select("name").distinct(true).select_option("RAW").from("t");
        assert_eq!(qb().build(&query).unwrap().sql, "SELECT DISTINCT RAW `name` FROM `t`");
    }

    #[test]
    fn test_select_subquery() {
        let sub = Query::new()
            .select_expr(Expression::new("COUNT(*)"), None)
            .from("orders")
            .where_(Condition::hash([("status", "open")]));
        let query = Query::new()
            .select("id")
            .select_query(sub, "open_orders")
            .from("users")
            .where_(Condition::hash([("active", true)]));
        let built = qb().build(&query).unwrap();
        assert_eq!(
            built.sql,
            "SELECT `id`, (SELECT COUNT(*) FROM `orders` WHERE `status`=$qp0) AS `open_orders` \
             FROM `users` WHERE `active`=$qp1"
        );
        assert_eq!(built.params.to_json(), json!({"qp0": "open", "qp1": true}));
    }

    #[test]
    fn test_from_aliases() {
        let query = Query::new().from("users u, orders AS o");
        assert_eq!(qb().build(&query).unwrap().sql, "SELECT * FROM `users` `u`, `orders` `o`");
    }

    #[test]
    fn test_from_subquery() {
        let sub = Query::new().from("users").where_(Condition::eq("age", 30));
        let query = Query::new().from_query(sub, "adults");
        let built = qb().build(&query).unwrap();
        assert_eq!(
            built.sql,
            "SELECT * FROM (SELECT * FROM `users` WHERE `age` = $qp0) `adults`"
        );
        assert_eq!(built.params.get("qp0"), Some(&json!(30)));
    }

    #[test]
    fn test_bucket_prefix() {
        let qb = QueryBuilder::new(Quoter::with_prefix("app_"));
        let built = qb.build(&Query::new().from("{{%users}}")).unwrap();
        assert_eq!(built.sql, "SELECT * FROM `app_users`");
    }

    #[test]
    fn test_use_keys() {
        let query = Query::new().from("users").use_keys(["u1", "u2"]);
        let built = qb().build(&query).unwrap();
        assert_eq!(built.sql, "SELECT * FROM `users` USE KEYS $qp0");
        assert_eq!(built.params.get("qp0"), Some(&json!(["u1", "u2"])));

        let query = Query::new()
            .from("users")
            .use_primary_keys(Expression::new(r#"["a", "b"]"#));
        assert_eq!(
            qb().build(&query).unwrap().sql,
            r#"SELECT * FROM `users` USE PRIMARY KEYS ["a", "b"]"#
        );
    }

    #[test]
    fn test_use_index() {
        let query = Query::new().from("users").use_index_using("idx_email", IndexUsing::Gsi);
        assert_eq!(
            qb().build(&query).unwrap().sql,
            "SELECT * FROM `users` USE INDEX (`idx_email` USING GSI)"
        );
        let query = Query::new().from("users").use_index("idx_email");
        assert_eq!(
            qb().build(&query).unwrap().sql,
            "SELECT * FROM `users` USE INDEX (`idx_email`)"
        );
    }

    #[test]
    fn test_joins() {
        let query = Query::new()
            .from("orders o")
            .inner_join("users u", Condition::raw("o.user_id"))
            .left_nest("items i", Condition::raw("o.item_ids"))
            .unnest("o.tags t");
        assert_eq!(
            qb().build(&query).unwrap().sql,
            "SELECT * FROM `orders` `o` INNER JOIN `users` `u` ON KEYS o.user_id \
             LEFT NEST `items` `i` ON KEYS o.item_ids UNNEST `o`.`tags` `t`"
        );
    }

    #[test]
    fn test_ansi_join() {
        let query = Query::new()
            .from("orders o")
            .join_on(JoinType::LeftJoin, "users u", Condition::raw("META(u).id = o.user_id"));
        assert_eq!(
            qb().build(&query).unwrap().sql,
            "SELECT * FROM `orders` `o` LEFT JOIN `users` `u` ON META(u).id = o.user_id"
        );
    }

    #[test]
    fn test_unknown_join_fails_build() {
        let query = Query::new().from("a").join("CROSS JOIN", "b", None);
        let err = qb().build(&query).unwrap_err();
        assert!(err.is_construction_error());
    }

    #[test]
    fn test_group_by_having_order_by() {
        let query = Query::new()
            .select("city, COUNT(*) AS n")
            .from("users")
            .group_by("city")
            .having(Condition::gt("COUNT(*)", 10))
            .order_by("n DESC, city");
        let built = qb().build(&query).unwrap();
        assert_eq!(
            built.sql,
            "SELECT `city`, COUNT(*) AS n FROM `users` GROUP BY `city` HAVING COUNT(*) > $qp0 \
             ORDER BY `n` DESC, `city`"
        );
    }

    #[test]
    fn test_order_by_expression() {
        let query = Query::new()
            .from("users")
            .order_by_expr(Expression::new("ARRAY_LENGTH(tags) DESC"));
        assert_eq!(
            qb().build(&query).unwrap().sql,
            "SELECT * FROM `users` ORDER BY ARRAY_LENGTH(tags) DESC"
        );
    }

    #[test]
    fn test_limit_offset() {
        let sql = |q: Query| qb().build(&q.from("t")).unwrap().sql;
        assert_eq!(sql(Query::new().limit(10).offset(20)), "SELECT * FROM `t` LIMIT 10 OFFSET 20");
        assert_eq!(sql(Query::new().limit(10).offset(0)), "SELECT * FROM `t` LIMIT 10");
        assert_eq!(sql(Query::new().limit(-1).offset(5)), "SELECT * FROM `t` OFFSET 5");
        assert_eq!(sql(Query::new().limit(0)), "SELECT * FROM `t` LIMIT 0");
        assert_eq!(
            sql(Query::new().limit_expr(Expression::new("$n").bind("n", 3))),
            "SELECT * FROM `t` LIMIT $n"
        );
    }

    #[test]
    fn test_union() {
        let query = Query::new().from("x").union(Query::new().from("y"));
        assert_eq!(
            qb().build(&query).unwrap().sql,
            "(SELECT * FROM `x`) UNION ( SELECT * FROM `y` )"
        );
    }

    #[test]
    fn test_set_operations_chain() {
        let query = Query::new()
            .from("x")
            .union_all(Query::new().from("y"))
            .except(Query::new().from("z"))
            .set_operation_raw(SetOperator::Intersect, false, "SELECT 1");
        assert_eq!(
            qb().build(&query).unwrap().sql,
            "(SELECT * FROM `x`) UNION ALL ( SELECT * FROM `y` ) EXCEPT ( SELECT * FROM `z` ) \
             INTERSECT ( SELECT 1 )"
        );
    }

    #[test]
    fn test_query_params_are_merged_first() {
        let query = Query::new()
            .from("t")
            .where_(Condition::raw("a = $a"))
            .and_where(Condition::eq("b", 2))
            .bind("a", 1);
        let built = qb().build(&query).unwrap();
        assert_eq!(built.sql, "SELECT * FROM `t` WHERE (a = $a) AND (`b` = $qp1)");
        assert_eq!(built.params.to_json(), json!({"a": 1, "qp1": 2}));
    }

    #[test]
    fn test_returning() {
        let mut params = Params::new();
        let sql = qb().build_returning(
            &[ColumnRef::from("name"), ColumnRef::from(Expression::new("META().id AS `_id`"))],
            &mut params,
        )
        .unwrap();
        assert_eq!(sql, "RETURNING `name`, META().id AS `_id`");
    }

    #[test]
    fn test_join_clauses_skips_empty() {
        assert_eq!(join_clauses(["SELECT *", "", "FROM `t`", ""]), "SELECT * FROM `t`");
    }
}
