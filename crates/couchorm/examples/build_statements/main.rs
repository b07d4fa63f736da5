//! Example demonstrating couchorm's query builder and statement builders.
//!
//! Run with:
//!   cargo run --example build_statements -p couchorm
//!
//! Statements are printed instead of being sent to a cluster: the connection
//! below uses an executor that only echoes what it receives.

use couchorm::qb::{self, IndexOptions, JoinType};
use couchorm::{
    Condition, Connection, ConnectionConfig, Executor, Expression, OrmResult, Params,
    QueryBuilder, Row,
};
use serde_json::json;

struct EchoExecutor;

impl Executor for EchoExecutor {
    async fn query(&self, sql: &str, params: &Params) -> OrmResult<Vec<Row>> {
        println!("  query:   {sql}");
        println!("  params:  {}", params.to_json());
        Ok(Vec::new())
    }

    async fn execute(&self, sql: &str, params: &Params) -> OrmResult<u64> {
        println!("  execute: {sql}");
        println!("  params:  {}", params.to_json());
        Ok(1)
    }
}

fn print_select(builder: &QueryBuilder) -> OrmResult<()> {
    println!("\n=== SELECT ===");

    let recent_orders = qb::select("COUNT(*)")
        .from("{{%orders}} o")
        .where_(Condition::raw("o.user_id = META(u).id"))
        .and_where(Condition::gte("o.created_at", "2024-01-01"));

    let query = qb::select("u.name, u.email AS mail")
        .select_query(recent_orders, "recent_orders")
        .from("{{%users}} u")
        .use_index_using("idx_users_status", qb::IndexUsing::Gsi)
        .left_nest("{{%profiles}} p", Condition::literal("u.profile_id"))
        .where_(Condition::hash([("u.status", json!("active"))]))
        .and_where(Condition::in_list("u.role", vec!["admin", "editor"]))
        .and_where(Condition::like("u.name", "50%"))
        .and_where(Condition::not(Condition::between("u.age", 0, 17)))
        .order_by("u.created_at DESC, u.name")
        .paginate(2, 20);

    let built = builder.build(&query)?;
    println!("{}", built.sql);
    println!("{}", built.params.to_json());

    let union = qb::from("{{%users}}")
        .where_(Condition::eq("type", "admin"))
        .union_all(qb::from("{{%archive}}").where_(Condition::eq("type", "admin")));
    println!("{}", builder.build(&union)?.sql);

    let ansi = qb::select("a.id, b.total")
        .from("accounts a")
        .join_on(JoinType::InnerJoin, "billing b", Expression::new("b.account = META(a).id"))
        .use_keys(vec!["acct::1", "acct::2"]);
    println!("{}", builder.build(&ansi)?.sql);

    Ok(())
}

fn print_writes(builder: &QueryBuilder) -> OrmResult<()> {
    println!("\n=== WRITES ===");

    let insert = builder.insert("users", &json!({"name": "alice", "age": 31}))?;
    println!("{}  -> key {}", insert.query.sql, insert.keys[0]);

    let batch = builder.batch_insert(
        "users",
        &[json!({"name": "bob"}), json!({"name": "carol"})],
    )?;
    println!("{}  -> keys {:?}", batch.query.sql, batch.keys);

    let update = builder.update(
        "users",
        [
            ("status", qb::Operand::from("inactive")),
            ("updated_at", Expression::new("NOW_MILLIS()").into()),
        ],
        &Condition::lt("last_login", 1_600_000_000),
    )?;
    println!("{}  {}", update.sql, update.params.to_json());

    println!("{}", builder.upsert("users", "user::42", &json!({"name": "dave"}))?.sql);
    println!("{}", builder.delete("users", &Condition::is_null("email"))?.sql);
    println!("{}", builder.count("users", &Condition::eq("status", "active"))?.sql);

    Ok(())
}

fn print_indexes(builder: &QueryBuilder) -> OrmResult<()> {
    println!("\n=== INDEX DDL ===");

    let deferred = IndexOptions::new().defer_build(true);
    println!("{}", builder.create_primary_index("users", None, &deferred)?.sql);
    println!(
        "{}",
        builder
            .create_index(
                "users",
                "idx_users_status",
                &["status".into(), "LOWER(name)".into()],
                Some(&Condition::is_not_null("status")),
                &deferred,
            )?
            .sql
    );
    println!("{}", builder.build_index("users", &["#primary", "idx_users_status"])?.sql);
    println!("{}", builder.drop_index("users", "idx_users_status")?.sql);
    println!("{}", builder.drop_primary_index("users")?.sql);

    Ok(())
}

#[tokio::main]
async fn main() -> OrmResult<()> {
    let builder = QueryBuilder::default();
    print_select(&builder)?;
    print_writes(&builder)?;
    print_indexes(&builder)?;

    println!("\n=== CONNECTION ===");
    let config = ConnectionConfig::from_toml_str(
        r#"
        dsn = "couchbase://localhost"
        bucket_prefix = "demo_"
        enable_logging = false
        "#,
    )?;
    let conn = Connection::new(config, EchoExecutor);

    let key = conn.insert("{{%users}}", &json!({"name": "erin"})).await?;
    println!("  inserted key {key}");

    let rows = qb::from("{{%users}}")
        .where_(Condition::eq("name", "erin"))
        .all(&conn)
        .await?;
    println!("  {} rows", rows.len());

    let raw = conn
        .create_command("SELECT [[name]] FROM {{%users}} WHERE age > $min")
        .bind_value("min", 21);
    println!("  raw: {}", raw.raw_sql());

    Ok(())
}
