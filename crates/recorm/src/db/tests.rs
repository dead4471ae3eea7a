use super::*;
use crate::monitor::StatsMonitor;
use crate::testing::{ScriptedExecutor, scripted};
use serde_json::json;
use std::sync::Arc;

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

#[test]
fn test_query_option_parse() {
    assert_eq!(QueryOption::parse("distinct").unwrap(), QueryOption::Distinct);
    assert_eq!(QueryOption::parse("for  update").unwrap(), QueryOption::ForUpdate);
    assert_eq!(QueryOption::parse("LOCK IN SHARE MODE").unwrap(), QueryOption::ForShare);
    assert_eq!(QueryOption::parse("nest join").unwrap(), QueryOption::NestJoin);
    assert!(QueryOption::parse("SQL_CALC_FOUND_ROWS").is_err());
}

#[test]
fn test_table_ref_parse() {
    let t = TableRef::parse("ecs_", "users as u");
    assert_eq!(t.name, "ecs_users");
    assert_eq!(t.alias.as_deref(), Some("u"));
    assert_eq!(t.from_clause(), "ecs_users u");
    assert_eq!(t.row_ref(), "u");

    let t = TableRef::parse("", "goods");
    assert_eq!(t.from_clause(), "goods");
    assert_eq!(t.row_ref(), "goods");
}

#[test]
fn test_condition_shapes() {
    let c = Condition::new(Logic::And, "id", Operator::Eq, json!([1, 2])).unwrap();
    assert_eq!(c.op, Operator::In);
    assert!(Condition::new(Logic::And, "price", Operator::Between, json!([1])).is_err());
    assert!(Condition::new(Logic::And, "id", Operator::In, json!(1)).is_err());
    assert!(Condition::new(Logic::And, "name", Operator::Like, json!(["a"])).is_err());
}

#[tokio::test]
async fn test_where_rendering() {
    let (exec, session) = scripted();
    let mut db = session.db();
    db.where_cond("status", json!(1), "=", Logic::And)
        .where_cond("id", json!([1, 2, 3]), "in", Logic::And)
        .where_cond("price", json!([10, 20]), "between", Logic::Or)
        .where_cond("deleted_at", Value::Null, "=", Logic::And);
    db.get("goods", None, None).await.unwrap();

    let (sql, params) = exec.last();
    assert_eq!(
        sql,
        "SELECT * FROM goods WHERE status = $1 AND id IN ($2, $3, $4) OR price BETWEEN $5 AND $6 AND deleted_at IS NULL"
    );
    assert_eq!(params, vec![json!(1), json!(1), json!(2), json!(3), json!(10), json!(20)]);
}

#[tokio::test]
async fn test_empty_in_list_matches_nothing() {
    let (exec, session) = scripted();
    let mut db = session.db();
    db.where_cond("id", json!([]), "IN", Logic::And);
    db.get("goods", None, None).await.unwrap();
    assert_eq!(exec.last().0, "SELECT * FROM goods WHERE id IN (NULL)");
}

#[tokio::test]
async fn test_nest_join_projection() {
    let (exec, session) = scripted();
    let mut db = session.db();
    db.set_query_option(QueryOption::NestJoin)
        .join("profiles p", "u.profile_id = p.id", "LEFT");
    db.get("users u", Some(Limit::Range { offset: 20, count: 10 }), None)
        .await
        .unwrap();

    assert_eq!(
        exec.last().0,
        "SELECT u.*, to_json(p) AS \"p\" FROM users u LEFT JOIN profiles p ON u.profile_id = p.id LIMIT 10 OFFSET 20"
    );
}

#[tokio::test]
async fn test_prefix_applies_to_every_table() {
    let exec = ScriptedExecutor::new();
    let session = exec.session().prefix("ecs_").build();
    let mut db = session.db();
    db.set_query_option(QueryOption::NestJoin)
        .join("profiles", "ecs_users.profile_id = ecs_profiles.id", "");
    db.get("users", Some(Limit::Count(1)), None).await.unwrap();

    assert_eq!(
        exec.last().0,
        "SELECT ecs_users.*, to_json(ecs_profiles) AS \"profiles\" FROM ecs_users JOIN ecs_profiles ON ecs_users.profile_id = ecs_profiles.id LIMIT 1"
    );
}

#[tokio::test]
async fn test_plain_join_without_nesting() {
    let (exec, session) = scripted();
    let mut db = session.db();
    db.join("orders o", "o.user_id = u.id", "inner")
        .group_by("u.id")
        .order_by("u.id", "asc", None);
    db.get("users u", None, Some("u.id, count(o.id) AS orders"))
        .await
        .unwrap();

    assert_eq!(
        exec.last().0,
        "SELECT u.id, count(o.id) AS orders FROM users u INNER JOIN orders o ON o.user_id = u.id GROUP BY u.id ORDER BY u.id ASC"
    );
}

#[tokio::test]
async fn test_custom_order() {
    let (exec, session) = scripted();
    let mut db = session.db();
    db.order_by("id", "asc", Some(vec![json!(3), json!(1)]))
        .order_by("name", "", None);
    db.get("goods", Some(Limit::Count(5)), Some("id, name")).await.unwrap();

    let (sql, params) = exec.last();
    assert_eq!(
        sql,
        "SELECT id, name FROM goods ORDER BY CASE id WHEN $1 THEN 0 WHEN $2 THEN 1 ELSE 2 END ASC, name DESC LIMIT 5"
    );
    assert_eq!(params, vec![json!(3), json!(1)]);
}

#[tokio::test]
async fn test_distinct_and_row_lock() {
    let (exec, session) = scripted();
    let mut db = session.db();
    db.set_query_option(QueryOption::Distinct)
        .set_query_option(QueryOption::ForUpdate);
    db.get("goods", None, Some("name")).await.unwrap();
    assert_eq!(exec.last().0, "SELECT DISTINCT name FROM goods FOR UPDATE");
}

#[tokio::test]
async fn test_builder_errors_surface_at_terminal_call() {
    let (exec, session) = scripted();
    let mut db = session.db();

    db.where_cond("a", json!(1), "<=>", Logic::And);
    let err = db.get("t", None, None).await.unwrap_err();
    assert!(matches!(err, OrmError::InvalidQuery(msg) if msg.contains("<=>")));

    db.join("x", "x.id = t.x_id", "SIDEWAYS");
    assert!(db.get("t", None, None).await.is_err());

    db.order_by("id", "UP", None);
    assert!(db.get("t", None, None).await.is_err());

    // Nothing reached the executor, and the failed state is gone.
    assert!(exec.statements().is_empty());
    db.get("t", None, None).await.unwrap();
    assert_eq!(exec.last().0, "SELECT * FROM t");
}

#[tokio::test]
async fn test_state_drained_after_execution() {
    let (exec, session) = scripted();
    let mut db = session.db();
    db.where_cond("id", json!(1), "=", Logic::And)
        .order_by("id", "DESC", None);
    db.get("t", None, None).await.unwrap();
    assert!(!db.has_conditions());

    db.get("t", None, None).await.unwrap();
    assert_eq!(exec.last().0, "SELECT * FROM t");
    assert_eq!(db.last_query(), Some("SELECT * FROM t"));
}

#[tokio::test]
async fn test_update_and_delete_require_where() {
    let (exec, session) = scripted();
    let mut db = session.db();

    let err = db.update("users", &row(json!({"name": "x"}))).await.unwrap_err();
    assert!(matches!(err, OrmError::UnsafeWrite("update")));
    let err = db.delete("users").await.unwrap_err();
    assert!(matches!(err, OrmError::UnsafeWrite("delete")));
    assert!(exec.statements().is_empty());
}

#[tokio::test]
async fn test_update_rendering() {
    let (exec, session) = scripted();
    exec.push_affected(2);
    let mut db = session.db();
    db.where_cond("status", json!(0), "=", Logic::And);
    let affected = db
        .update("users", &row(json!({"name": "x", "age": 3})))
        .await
        .unwrap();

    assert_eq!(affected, 2);
    assert_eq!(db.count(), 2);
    let (sql, params) = exec.last();
    assert_eq!(sql, "UPDATE users SET name = $1, age = $2 WHERE status = $3");
    assert_eq!(params, vec![json!("x"), json!(3), json!(0)]);
}

#[tokio::test]
async fn test_update_with_empty_payload() {
    let (_exec, session) = scripted();
    let mut db = session.db();
    db.where_cond("id", json!(1), "=", Logic::And);
    let err = db.update("users", &Row::new()).await.unwrap_err();
    assert!(matches!(err, OrmError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_delete_rendering() {
    let (exec, session) = scripted();
    let mut db = session.db();
    db.where_cond("id", json!(9), "=", Logic::And);
    assert_eq!(db.delete("users").await.unwrap(), 1);
    assert_eq!(exec.last().0, "DELETE FROM users WHERE id = $1");
}

#[tokio::test]
async fn test_insert_returning_primary_key() {
    let (exec, session) = scripted();
    exec.push_rows(vec![json!({"id": 7})]);
    let mut db = session.db();

    let id = db
        .insert("users", &row(json!({"name": "ann", "age": 3})), Some("id"))
        .await
        .unwrap();
    assert_eq!(id, Some(json!(7)));
    assert_eq!(db.last_insert_id(), Some(&json!(7)));

    let (sql, params) = exec.last();
    assert_eq!(sql, "INSERT INTO users (name, age) VALUES ($1, $2) RETURNING id");
    assert_eq!(params, vec![json!("ann"), json!(3)]);
}

#[tokio::test]
async fn test_insert_default_values() {
    let (exec, session) = scripted();
    let mut db = session.db();
    let id = db.insert("logs", &Row::new(), None).await.unwrap();
    assert_eq!(id, None);
    assert_eq!(exec.last().0, "INSERT INTO logs DEFAULT VALUES");
    assert_eq!(db.count(), 1);
}

#[tokio::test]
async fn test_insert_rejects_odd_column_names() {
    let (exec, session) = scripted();
    let mut db = session.db();
    let err = db
        .insert("users", &row(json!({"name) VALUES (1); --": 1})), None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidQuery(_)));
    assert!(exec.statements().is_empty());
}

#[tokio::test]
async fn test_paginate_totals() {
    let exec = ScriptedExecutor::new();
    let session = exec.session().page_limit(20).build();
    exec.push_rows(vec![json!({"total": 45})]);
    exec.push_rows(vec![json!({"id": 21}), json!({"id": 22})]);

    let mut db = session.db();
    db.where_cond("status", json!(1), "=", Logic::And)
        .order_by("id", "DESC", None);
    let rows = db.paginate("goods", 2, None).await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(db.total_count(), 45);
    assert_eq!(db.total_pages(), 3);
    assert_eq!(session.context().total_pages(), 3);
    assert_eq!(
        exec.statements(),
        vec![
            "SELECT count(*) AS total FROM (SELECT * FROM goods WHERE status = $1) AS paged".to_string(),
            "SELECT * FROM goods WHERE status = $1 ORDER BY id DESC LIMIT 20 OFFSET 20".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_paginate_page_zero_reads_first_page() {
    let (exec, session) = scripted();
    exec.push_rows(vec![json!({"total": 0})]);
    let mut db = session.db();
    let rows = db.paginate("goods", 0, None).await.unwrap();

    assert!(rows.is_empty());
    assert_eq!(db.total_pages(), 0);
    assert_eq!(exec.last().0, "SELECT * FROM goods LIMIT 20 OFFSET 0");
}

#[tokio::test]
async fn test_get_value_projection() {
    let (exec, session) = scripted();
    exec.push_rows(vec![json!({"retval": 4})]);
    let mut db = session.db();
    db.where_cond("status", json!(1), "=", Logic::And);
    let value = db.get_value("goods", "count(*)").await.unwrap();

    assert_eq!(value, Some(json!(4)));
    assert_eq!(
        exec.last().0,
        "SELECT count(*) AS retval FROM goods WHERE status = $1 LIMIT 1"
    );
}

#[tokio::test]
async fn test_lock_table() {
    let exec = ScriptedExecutor::new();
    let session = exec.session().prefix("ecs_").build();
    let mut db = session.db();
    db.lock_table("goods", LockMode::Write).await.unwrap();
    assert_eq!(exec.last().0, "LOCK TABLE ecs_goods IN ACCESS EXCLUSIVE MODE");
    db.lock_table("goods", LockMode::Read).await.unwrap();
    assert_eq!(exec.last().0, "LOCK TABLE ecs_goods IN SHARE MODE");
}

#[tokio::test]
async fn test_statements_reach_the_monitor() {
    let exec = ScriptedExecutor::new();
    let stats = Arc::new(StatsMonitor::new());
    let session = exec.session().monitor_arc(stats.clone()).build();
    let mut db = session.db();

    db.get("goods", None, None).await.unwrap();
    db.insert("goods", &row(json!({"name": "pen"})), None).await.unwrap();

    let stats = stats.stats();
    assert_eq!(stats.total_queries, 2);
    assert_eq!(stats.select_count, 1);
    assert_eq!(stats.insert_count, 1);
    assert_eq!(stats.per_table.get("goods"), Some(&2));
}
