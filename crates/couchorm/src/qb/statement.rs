//! Write statements: INSERT, UPSERT, UPDATE, DELETE and COUNT.

use serde::Serialize;
use serde_json::Value;

use crate::error::{OrmError, OrmResult};
use crate::ident::quote_value;

use super::builder::{BuiltQuery, QueryBuilder, join_clauses};
use super::condition::Condition;
use super::expr::{Expression, Operand};
use super::param::Params;
use super::query::ColumnRef;

/// Field name the generated document key is returned under.
pub const KEY_FIELD: &str = "_id";

/// Produces document keys for INSERT statements.
pub trait KeyGenerator: Send + Sync {
    fn generate_key(&self) -> String;
}

/// Random UUID v4 keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidKeyGenerator;

impl KeyGenerator for UuidKeyGenerator {
    fn generate_key(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// An INSERT statement and the document keys it creates, in row order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuiltInsert {
    pub query: BuiltQuery,
    pub keys: Vec<String>,
}

impl QueryBuilder {
    /// `INSERT INTO b (KEY, VALUE) VALUES ("<key>", {...}) RETURNING META().id AS `_id``
    pub fn insert<T: Serialize + ?Sized>(&self, bucket: &str, data: &T) -> OrmResult<BuiltInsert> {
        let bucket = self.write_target(bucket)?;
        let (key, values) = self.insert_values(data)?;
        let sql = join_clauses([
            format!("INSERT INTO {bucket} (KEY, VALUE)"),
            values,
            self.returning_key()?,
        ]);
        Ok(BuiltInsert {
            query: BuiltQuery::new(sql, Params::new()),
            keys: vec![key],
        })
    }

    /// Multi-row INSERT. Returns one key per row, aligned with `rows`.
    ///
    /// An empty slice produces an empty statement and no keys.
    pub fn batch_insert<T: Serialize>(&self, bucket: &str, rows: &[T]) -> OrmResult<BuiltInsert> {
        let bucket = self.write_target(bucket)?;
        if rows.is_empty() {
            return Ok(BuiltInsert::default());
        }

        let mut keys = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let (key, row_values) = self.insert_values(row)?;
            keys.push(key);
            values.push(row_values);
        }

        let sql = join_clauses([
            format!("INSERT INTO {bucket} (KEY, VALUE)"),
            values.join(", "),
            self.returning_key()?,
        ]);
        Ok(BuiltInsert {
            query: BuiltQuery::new(sql, Params::new()),
            keys,
        })
    }

    /// `UPDATE b SET a=$qp0, b=NOW_MILLIS() [WHERE ...]`
    pub fn update<K, V, I>(
        &self,
        bucket: &str,
        columns: I,
        condition: &Condition,
    ) -> OrmResult<BuiltQuery>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Operand>,
    {
        let bucket = self.write_target(bucket)?;
        let mut params = Params::new();
        let mut assignments = Vec::new();
        for (column, value) in columns {
            let column = self.quoter.quote_column_name(column.as_ref());
            let value: Operand = value.into();
            let value = match value {
                Operand::Expr(expr) => expr.splice(&mut params)?,
                v if v.is_null() => "NULL".to_string(),
                Operand::Query(query) => format!("({})", self.build_into(&query, &mut params)?),
                other => match other.to_value() {
                    Some(value) => params.bind(value),
                    None => {
                        return Err(OrmError::invalid_condition(format!(
                            "cannot assign a {} to {column}",
                            other.kind()
                        )));
                    }
                },
            };
            assignments.push(format!("{column}={value}"));
        }
        if assignments.is_empty() {
            return Err(OrmError::validation("UPDATE requires at least one column"));
        }

        let where_sql = self.build_where(Some(condition), &mut params)?;
        let sql = join_clauses([
            format!("UPDATE {bucket} SET {}", assignments.join(", ")),
            where_sql,
        ]);
        Ok(BuiltQuery::new(sql, params))
    }

    /// `UPSERT INTO b (KEY, VALUE) VALUES ("<key>", {...})`
    pub fn upsert<T: Serialize + ?Sized>(
        &self,
        bucket: &str,
        key: &str,
        data: &T,
    ) -> OrmResult<BuiltQuery> {
        let bucket = self.write_target(bucket)?;
        let document = encode_document(data)?;
        let sql = format!(
            "UPSERT INTO {bucket} (KEY, VALUE) VALUES ({}, {document})",
            quote_value(key)
        );
        Ok(BuiltQuery::new(sql, Params::new()))
    }

    /// `DELETE FROM b [WHERE ...]`
    pub fn delete(&self, bucket: &str, condition: &Condition) -> OrmResult<BuiltQuery> {
        let bucket = self.write_target(bucket)?;
        let mut params = Params::new();
        let where_sql = self.build_where(Some(condition), &mut params)?;
        let sql = join_clauses([format!("DELETE FROM {bucket}"), where_sql]);
        Ok(BuiltQuery::new(sql, params))
    }

    /// `SELECT COUNT(*) FROM b [WHERE ...]`
    pub fn count(&self, bucket: &str, condition: &Condition) -> OrmResult<BuiltQuery> {
        let bucket = self.write_target(bucket)?;
        let mut params = Params::new();
        let where_sql = self.build_where(Some(condition), &mut params)?;
        let sql = join_clauses([format!("SELECT COUNT(*) FROM {bucket}"), where_sql]);
        Ok(BuiltQuery::new(sql, params))
    }

    // ==================== Helpers ====================

    /// Resolve the single bucket a write statement targets.
    pub(crate) fn write_target(&self, bucket: &str) -> OrmResult<String> {
        let bucket = bucket.trim();
        if bucket.is_empty() {
            return Err(OrmError::validation("statement requires a target bucket"));
        }
        if bucket.contains(',') {
            return Err(OrmError::validation(format!(
                "statement requires exactly one target bucket, got '{bucket}'"
            )));
        }
        Ok(self.quoter.quote_bucket_name(bucket))
    }

    fn insert_values<T: Serialize + ?Sized>(&self, data: &T) -> OrmResult<(String, String)> {
        let document = encode_document(data)?;
        let key = self.key_generator.generate_key();
        let values = format!("VALUES ({}, {document})", quote_value(&key));
        Ok((key, values))
    }

    fn returning_key(&self) -> OrmResult<String> {
        let mut params = Params::new();
        self.build_returning(
            &[ColumnRef::Expr(Expression::new(format!(
                "META().id AS {}",
                self.quoter.quote_column_name(KEY_FIELD)
            )))],
            &mut params,
        )
    }
}

/// Encode a record as a JSON object literal.
pub(crate) fn encode_document<T: Serialize + ?Sized>(data: &T) -> OrmResult<String> {
    match serde_json::to_value(data)? {
        document @ Value::Object(_) => Ok(document.to_string()),
        other => Err(OrmError::validation(format!(
            "document must serialize to an object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct SequenceKeys(AtomicUsize);

    impl KeyGenerator for SequenceKeys {
        fn generate_key(&self) -> String {
            format!("k{}", self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn qb() -> QueryBuilder {
        QueryBuilder::default().with_key_generator(SequenceKeys::default())
    }

    #[test]
    fn test_insert() {
        let built = qb().insert("users", &json!({"name": "alice"})).unwrap();
        assert_eq!(
            built.query.sql,
            r#"INSERT INTO `users` (KEY, VALUE) VALUES ("k0", {"name":"alice"}) RETURNING META().id AS `_id`"#
        );
        assert_eq!(built.keys, vec!["k0"]);
        assert!(built.query.params.is_empty());
    }

    #[test]
    fn test_insert_uuid_keys_are_unique() {
        let qb = QueryBuilder::default();
        let a = qb.insert("users", &json!({})).unwrap();
        let b = qb.insert("users", &json!({})).unwrap();
        assert_ne!(a.keys, b.keys);
        assert!(uuid::Uuid::parse_str(&a.keys[0]).is_ok());
    }

    #[test]
    fn test_insert_rejects_non_object() {
        let err = qb().insert("users", &json!([1, 2])).unwrap_err();
        assert!(matches!(err, OrmError::Validation(_)));
    }

    #[test]
    fn test_batch_insert_keys_align_with_rows() {
        let rows = vec![json!({"a": 1}), json!({"a": 2}), json!({"a": 3})];
        let built = qb().batch_insert("t", &rows).unwrap();
        assert_eq!(built.keys, vec!["k0", "k1", "k2"]);
        assert_eq!(
            built.query.sql,
            r#"INSERT INTO `t` (KEY, VALUE) VALUES ("k0", {"a":1}), VALUES ("k1", {"a":2}), VALUES ("k2", {"a":3}) RETURNING META().id AS `_id`"#
        );
    }

    #[test]
    fn test_batch_insert_empty() {
        let rows: Vec<serde_json::Value> = vec![];
        let built = qb().batch_insert("t", &rows).unwrap();
        assert!(built.query.is_empty());
        assert!(built.keys.is_empty());
    }

    #[test]
    fn test_update() {
        let built = qb()
            .update(
                "users",
                [
                    ("status", Operand::from("inactive")),
                    ("updated", Operand::from(Expression::new("NOW_MILLIS()"))),
                    ("note", Operand::Null),
                ],
                &Condition::hash([("id", 7)]),
            )
            .unwrap();
        assert_eq!(
            built.sql,
            "UPDATE `users` SET `status`=$qp0, `updated`=NOW_MILLIS(), `note`=NULL WHERE `id`=$qp1"
        );
        assert_eq!(built.params.to_json(), json!({"qp0": "inactive", "qp1": 7}));
    }

    #[test]
    fn test_update_without_condition() {
        let built = qb()
            .update("users", [("a", 1)], &Condition::Hash(vec![]))
            .unwrap();
        assert_eq!(built.sql, "UPDATE `users` SET `a`=$qp0");
    }

    #[test]
    fn test_update_requires_columns() {
        let none: Vec<(&str, i32)> = vec![];
        let err = qb()
            .update("users", none, &Condition::Hash(vec![]))
            .unwrap_err();
        assert!(err.is_construction_error());
    }

    #[test]
    fn test_upsert() {
        let built = qb().upsert("users", "u::1", &json!({"n": 1})).unwrap();
        assert_eq!(built.sql, r#"UPSERT INTO `users` (KEY, VALUE) VALUES ("u::1", {"n":1})"#);
    }

    #[test]
    fn test_delete_and_count() {
        let condition = Condition::lt("age", 18);
        assert_eq!(
            qb().delete("users", &condition).unwrap().sql,
            "DELETE FROM `users` WHERE `age` < $qp0"
        );
        let built = qb().count("users", &condition).unwrap();
        assert_eq!(built.sql, "SELECT COUNT(*) FROM `users` WHERE `age` < $qp0");
        assert_eq!(built.params.to_json(), json!({"qp0": 18}));
        assert_eq!(
            qb().delete("users", &Condition::and(vec![])).unwrap().sql,
            "DELETE FROM `users`"
        );
    }

    #[test]
    fn test_write_target_validation() {
        assert!(qb().delete("", &Condition::Hash(vec![])).is_err());
        assert!(qb().delete("a, b", &Condition::Hash(vec![])).is_err());
    }

    #[test]
    fn test_prefixed_bucket() {
        let qb = QueryBuilder::new(crate::ident::Quoter::with_prefix("app_"));
        assert_eq!(
            qb.delete("{{%users}}", &Condition::Hash(vec![])).unwrap().sql,
            "DELETE FROM `app_users`"
        );
    }
}
