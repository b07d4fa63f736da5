//! Executing statements through a recording executor.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use couchorm::qb::{self, IndexOptions, KeyGenerator};
use couchorm::{
    Condition, Connection, ConnectionConfig, Executor, OrmError, OrmResult, Params, QueryBuilder,
    Quoter, Row, Value,
};
use serde::Deserialize;
use serde_json::json;

/// Records every statement and answers with canned rows.
#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<(String, Value)>>,
    rows: Vec<Row>,
    affected: u64,
    fail: bool,
}

impl RecordingExecutor {
    fn with_rows(rows: Vec<Value>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            ..Self::default()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn record(&self, sql: &str, params: &Params) -> OrmResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_json()));
        if self.fail {
            return Err(OrmError::execution("bucket not found"));
        }
        Ok(())
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Executor for RecordingExecutor {
    async fn query(&self, sql: &str, params: &Params) -> OrmResult<Vec<Row>> {
        self.record(sql, params)?;
        Ok(self.rows.clone())
    }

    async fn execute(&self, sql: &str, params: &Params) -> OrmResult<u64> {
        self.record(sql, params)?;
        Ok(self.affected)
    }
}

struct SequenceKeys(AtomicUsize);

impl KeyGenerator for SequenceKeys {
    fn generate_key(&self) -> String {
        format!("key{}", self.0.fetch_add(1, Ordering::SeqCst))
    }
}

fn connect(executor: RecordingExecutor) -> Connection<RecordingExecutor> {
    let config = ConnectionConfig::new("couchbase://localhost").bucket_prefix("test_");
    Connection::new(config, executor)
}

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    name: String,
    age: u32,
}

#[tokio::test]
async fn query_helpers_send_built_statement() {
    let conn = connect(RecordingExecutor::with_rows(vec![
        json!({"name": "alice", "age": 31}),
        json!({"name": "bob", "age": 27}),
    ]));

    let query = qb::select("name, age")
        .from("{{%users}}")
        .where_(Condition::gt("age", 18));

    let rows = query.all(&conn).await.unwrap();
    assert_eq!(rows.len(), 2);

    let users: Vec<User> = query.fetch_all(&conn).await.unwrap();
    assert_eq!(
        users[0],
        User {
            name: "alice".to_string(),
            age: 31
        }
    );

    assert_eq!(query.scalar(&conn).await.unwrap(), Some(json!("alice")));
    assert_eq!(
        query.column(&conn).await.unwrap(),
        vec![json!("alice"), json!("bob")]
    );

    let calls = conn.executor().calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(
        calls[0].0,
        "SELECT `name`, `age` FROM `test_users` WHERE `age` > $qp0"
    );
    assert_eq!(calls[0].1, json!({"qp0": 18}));
}

#[tokio::test]
async fn one_returns_none_for_empty_result() {
    let conn = connect(RecordingExecutor::default());
    let row = qb::from("t").one(&conn).await.unwrap();
    assert!(row.is_none());

    let err = conn
        .create_command("SELECT * FROM {{t}}")
        .fetch_one_as::<User>()
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(conn.executor().calls()[1].0, "SELECT * FROM `t`");
}

#[tokio::test]
async fn count_reads_scalar() {
    let conn = connect(RecordingExecutor::with_rows(vec![json!({"count": 42})]));
    let n = qb::select("name")
        .from("users")
        .where_(Condition::eq("active", true))
        .limit(5)
        .count(&conn)
        .await
        .unwrap();
    assert_eq!(n, 42);
    assert_eq!(
        conn.executor().calls()[0].0,
        "SELECT COUNT(*) AS `count` FROM `users` WHERE `active` = $qp0"
    );

    let conn = connect(RecordingExecutor::with_rows(vec![json!({"$1": 7})]));
    assert_eq!(conn.count("users", &Condition::hash([("a", 1)])).await.unwrap(), 7);
    assert_eq!(
        conn.executor().calls()[0].0,
        "SELECT COUNT(*) FROM `users` WHERE `a`=$qp0"
    );
}

#[tokio::test]
async fn insert_returns_generated_keys() {
    let conn = connect(RecordingExecutor::default()).with_query_builder(
        QueryBuilder::new(Quoter::with_prefix("test_"))
            .with_key_generator(SequenceKeys(AtomicUsize::new(0))),
    );

    let key = conn
        .insert("{{%users}}", &json!({"name": "alice"}))
        .await
        .unwrap();
    assert_eq!(key, "key0");

    let keys = conn
        .batch_insert("{{%users}}", &[json!({"n": 1}), json!({"n": 2})])
        .await
        .unwrap();
    assert_eq!(keys, vec!["key1", "key2"]);

    let calls = conn.executor().calls();
    assert_eq!(
        calls[0].0,
        r#"INSERT INTO `test_users` (KEY, VALUE) VALUES ("key0", {"name":"alice"}) RETURNING META().id AS `_id`"#
    );
    assert!(calls[1].0.contains(r#"VALUES ("key1", {"n":1}), VALUES ("key2", {"n":2})"#));
}

#[tokio::test]
async fn default_keys_are_uuids() {
    let conn = connect(RecordingExecutor::default());
    let key = conn.insert("users", &json!({"a": 1})).await.unwrap();
    assert_eq!(key.len(), 36);
    assert!(conn.executor().calls()[0].0.contains(&format!("\"{key}\"")));
}

#[tokio::test]
async fn empty_batch_insert_is_not_sent() {
    let conn = connect(RecordingExecutor::default());
    let rows: Vec<Value> = Vec::new();
    let keys = conn.batch_insert("users", &rows).await.unwrap();
    assert!(keys.is_empty());
    assert!(conn.executor().calls().is_empty());
}

#[tokio::test]
async fn mutations_return_affected_count() {
    let conn = connect(RecordingExecutor {
        affected: 3,
        ..RecordingExecutor::default()
    });

    let n = conn
        .update("users", [("active", false)], &Condition::lt("age", 18))
        .await
        .unwrap();
    assert_eq!(n, 3);
    assert_eq!(conn.upsert("users", "u1", &json!({"a": 1})).await.unwrap(), 3);
    assert_eq!(conn.delete("users", &Condition::is_null("email")).await.unwrap(), 3);

    let calls = conn.executor().calls();
    assert_eq!(calls[0].0, "UPDATE `users` SET `active`=$qp0 WHERE `age` < $qp1");
    assert_eq!(calls[0].1, json!({"qp0": false, "qp1": 18}));
    assert_eq!(
        calls[1].0,
        r#"UPSERT INTO `users` (KEY, VALUE) VALUES ("u1", {"a":1})"#
    );
    assert_eq!(calls[2].0, "DELETE FROM `users` WHERE `email` IS NULL");
}

#[tokio::test]
async fn index_ddl_is_executed() {
    let conn = connect(RecordingExecutor::default());
    let options = IndexOptions::new().defer_build(true);

    conn.create_primary_index("{{%users}}", None, &options)
        .await
        .unwrap();
    conn.create_index("{{%users}}", "idx_age", &["age".into()], None, &options)
        .await
        .unwrap();
    conn.build_index("{{%users}}", &["#primary", "idx_age"])
        .await
        .unwrap();
    conn.drop_index("{{%users}}", "idx_age").await.unwrap();
    conn.drop_primary_index("{{%users}}").await.unwrap();

    let sql: Vec<String> = conn.executor().calls().into_iter().map(|c| c.0).collect();
    assert_eq!(
        sql,
        vec![
            r#"CREATE PRIMARY INDEX ON `test_users` WITH {"defer_build":true}"#,
            r#"CREATE INDEX `idx_age` ON `test_users` (`age`) WITH {"defer_build":true}"#,
            "BUILD INDEX ON `test_users`(`#primary`, `idx_age`) USING GSI",
            "DROP INDEX `test_users`.`idx_age`",
            "DROP PRIMARY INDEX ON `test_users`",
        ]
    );
}

#[tokio::test]
async fn construction_errors_never_reach_executor() {
    let conn = connect(RecordingExecutor::default());

    let err = conn.delete("", &Condition::eq("a", 1)).await.unwrap_err();
    assert!(err.is_construction_error());

    let err = qb::from("t")
        .join("SIDEWAYS JOIN", "u", None)
        .all(&conn)
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidQuery(_)));

    let columns: [(&str, i32); 0] = [];
    let err = conn
        .update("users", columns, &Condition::eq("a", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));

    assert!(conn.executor().calls().is_empty());
}

#[tokio::test]
async fn executor_failures_propagate() {
    let conn = connect(RecordingExecutor::failing());
    let err = qb::from("missing").all(&conn).await.unwrap_err();
    assert!(err.is_execution_error());

    let err = conn.delete("missing", &Condition::eq("a", 1)).await.unwrap_err();
    assert!(err.is_execution_error());
}

#[tokio::test]
async fn empty_command_executes_as_noop() {
    let conn = connect(RecordingExecutor {
        affected: 9,
        ..RecordingExecutor::default()
    });
    assert_eq!(conn.create_command("   ").execute().await.unwrap(), 0);
    assert!(conn.executor().calls().is_empty());
}

#[tokio::test]
async fn raw_command_binds_values() {
    let conn = connect(RecordingExecutor::default());
    let cmd = conn
        .create_command("SELECT [[name]] FROM {{%users}} WHERE age > $min")
        .bind_value("$min", 21);
    assert_eq!(cmd.sql(), "SELECT `name` FROM `test_users` WHERE age > $min");
    assert_eq!(cmd.raw_sql(), "SELECT `name` FROM `test_users` WHERE age > 21");

    cmd.query_all().await.unwrap();
    assert_eq!(conn.executor().calls()[0].1, json!({"min": 21}));
}
