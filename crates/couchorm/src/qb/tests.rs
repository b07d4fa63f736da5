//! Integration tests for the qb module.

use serde_json::json;

use crate::ident::Quoter;
use crate::qb::{self, Condition, Expression, LikeEscape, Params, Query, QueryBuilder};

fn qb() -> QueryBuilder {
    QueryBuilder::default()
}

#[test]
fn test_select_basic() {
    let query = qb::select("var_1")
        .from("t")
        .where_(Condition::hash([("var_1", 1)]));
    let built = qb().build(&query).unwrap();
    assert_eq!(built.sql, "SELECT `var_1` FROM `t` WHERE `var_1`=$qp0");
    assert_eq!(built.params.to_json(), json!({"qp0": 1}));
}

#[test]
fn test_select_with_conditions() {
    let query = qb::from("users u")
        .select("u.name, u.email")
        .where_(Condition::eq("u.status", "active"))
        .and_where(Condition::gt("u.age", 18))
        .order_by("u.created_at DESC")
        .limit(10);

    let built = qb().build(&query).unwrap();
    assert_eq!(
        built.sql,
        "SELECT `u`.`name`, `u`.`email` FROM `users` `u` \
         WHERE (`u`.`status` = $qp0) AND (`u`.`age` > $qp1) \
         ORDER BY `u`.`created_at` DESC LIMIT 10"
    );
    assert_eq!(built.params.to_json(), json!({"qp0": "active", "qp1": 18}));
}

#[test]
fn test_or_where_groups() {
    let query = qb::from("t")
        .where_(Condition::eq("a", 1))
        .or_where(Condition::is_null("b"));
    assert_eq!(
        qb().build(&query).unwrap().sql,
        "SELECT * FROM `t` WHERE (`a` = $qp0) OR (`b` IS NULL)"
    );
}

#[test]
fn test_union_wraps_primary_statement() {
    let query = qb::from("x").union(qb::from("y").where_(Condition::eq("k", 2)));
    let built = qb().build(&query).unwrap();
    assert_eq!(
        built.sql,
        "(SELECT * FROM `x`) UNION ( SELECT * FROM `y` WHERE `k` = $qp0 )"
    );
    assert_eq!(built.params.len(), 1);
}

#[test]
fn test_placeholders_unique_across_clauses() {
    let sub = qb::select("id")
        .from("orders")
        .where_(Condition::eq("total", 100));
    let query = qb::from("users")
        .use_keys(vec!["u1", "u2"])
        .where_(Condition::in_list("id", sub))
        .and_where(Condition::between("age", 18, 65))
        .having(Condition::gt("n", 3))
        .group_by("city");

    let built = qb().build(&query).unwrap();
    assert_eq!(
        built.sql,
        "SELECT * FROM `users` USE KEYS $qp0 \
         WHERE (`id` IN (SELECT `id` FROM `orders` WHERE `total` = $qp1)) \
         AND (`age` BETWEEN $qp2 AND $qp3) GROUP BY `city` HAVING `n` > $qp4"
    );
    assert_eq!(
        built.params.to_json(),
        json!({"qp0": ["u1", "u2"], "qp1": 100, "qp2": 18, "qp3": 65, "qp4": 3})
    );
}

#[test]
fn test_counter_continues_existing_bindings() {
    let existing: Params = [("qp0", json!("taken")), ("limit", json!(5))]
        .into_iter()
        .collect();
    let built = qb()
        .build_with_params(&qb::from("t").where_(Condition::eq("a", 1)), existing)
        .unwrap();
    assert_eq!(built.sql, "SELECT * FROM `t` WHERE `a` = $qp2");
    assert_eq!(built.params.len(), 3);
}

#[test]
fn test_expression_bindings_survive() {
    let query = qb::from("events")
        .where_(Expression::new("ts > $since").bind("since", 1_700_000_000i64))
        .and_where(Condition::eq("kind", "click"));
    let built = qb().build(&query).unwrap();
    assert_eq!(
        built.sql,
        "SELECT * FROM `events` WHERE (ts > $since) AND (`kind` = $qp1)"
    );
    assert_eq!(
        built.params.to_json(),
        json!({"since": 1_700_000_000i64, "qp1": "click"})
    );
}

#[test]
fn test_like_uses_builder_escape_table() {
    let builder = QueryBuilder::new(Quoter::default()).with_like_escape(LikeEscape::none());
    let built = builder
        .build(&qb::from("posts").where_(Condition::like("title", "50%")))
        .unwrap();
    assert_eq!(built.sql, "SELECT * FROM `posts` WHERE `title` LIKE $qp0");
    assert_eq!(built.params.to_json(), json!({"qp0": "50%"}));

    let built = qb()
        .build(&qb::from("posts").where_(Condition::like("title", "50%")))
        .unwrap();
    assert_eq!(built.params.to_json(), json!({"qp0": "%50\\%%"}));
}

#[test]
fn test_prefixed_buckets_through_statements() {
    let builder = QueryBuilder::new(Quoter::with_prefix("dev_"));
    let query =
        qb::from("{{%users}} u").inner_join("{{%orders}} o", Condition::literal("u.order_ids"));
    assert_eq!(
        builder.build(&query).unwrap().sql,
        "SELECT * FROM `dev_users` `u` INNER JOIN `dev_orders` `o` ON KEYS u.order_ids"
    );

    let built = builder
        .delete("{{%users}}", &Condition::eq("id", 1))
        .unwrap();
    assert_eq!(built.sql, "DELETE FROM `dev_users` WHERE `id` = $qp0");
}

#[test]
fn test_count_query_drops_paging() {
    let query: Query = qb::select("name")
        .from("users")
        .where_(Condition::eq("active", true))
        .order_by("name")
        .limit(10)
        .offset(20);
    let built = qb().build(&query.to_count_query()).unwrap();
    assert_eq!(
        built.sql,
        "SELECT COUNT(*) AS `count` FROM `users` WHERE `active` = $qp0"
    );
}

#[test]
fn test_count_query_wraps_set_operations() {
    let query = qb::from("x")
        .where_(Condition::eq("a", 1))
        .union(qb::from("y").where_(Condition::eq("b", 2)))
        .limit(5);
    let built = qb().build(&query.to_count_query()).unwrap();
    assert_eq!(
        built.sql,
        "SELECT COUNT(*) AS `count` FROM ((SELECT * FROM `x` WHERE `a` = $qp0) \
         UNION ( SELECT * FROM `y` WHERE `b` = $qp1 )) `q`"
    );
    assert_eq!(built.params.to_json(), json!({"qp0": 1, "qp1": 2}));
}

#[test]
fn test_count_query_wraps_grouping() {
    let query = qb::select("city, COUNT(*) AS n")
        .from("users")
        .group_by("city")
        .order_by("n DESC");
    assert_eq!(
        qb().build(&query.to_count_query()).unwrap().sql,
        "SELECT COUNT(*) AS `count` FROM (SELECT `city`, COUNT(*) AS n FROM `users` \
         GROUP BY `city`) `q`"
    );

    let distinct = qb::select("city").from("users").distinct(true);
    assert_eq!(
        qb().build(&distinct.to_count_query()).unwrap().sql,
        "SELECT COUNT(*) AS `count` FROM (SELECT DISTINCT `city` FROM `users`) `q`"
    );
}

#[test]
fn test_invalid_condition_aborts_build() {
    let query = qb::from("t").where_(Condition::op("between", vec!["a".into(), 1.into()]));
    let err = qb().build(&query).unwrap_err();
    assert!(err.is_construction_error());
}
