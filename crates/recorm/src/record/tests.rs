use super::*;
use crate::testing::scripted;
use serde_json::json;

fn user_def() -> ModelDef {
    ModelDef::new("User")
        .table("users")
        .hidden(["password"])
        .relation("profile", Relation::has_one("Profile").key("profile_id"))
}

fn user() -> Record {
    let (_exec, session) = scripted();
    Record::new(session, Arc::new(user_def()))
}

#[test]
fn test_hidden_attributes_are_masked() {
    let mut u = user();
    u.set("name", "ann").set("password", "secret");
    assert!(u.attr_value("password").is_none());
    assert!(!u.has("password"));

    // Raw assignment bypasses the check but reads stay masked.
    u.data("password", "secret");
    assert!(u.attr_value("password").is_none());
    assert_eq!(u.get_data().get("password"), Some(&json!("secret")));

    let visible = u.to_array();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible.get("name"), Some(&json!("ann")));
    assert_eq!(u.to_json(), r#"{"name":"ann"}"#);
}

#[test]
fn test_has_and_unset() {
    let mut u = user();
    u.set("name", "ann").set("nickname", Value::Null);
    assert!(u.has("name"));
    assert!(!u.has("nickname"));
    assert!(!u.has("missing"));

    u.unset("name");
    assert!(u.attr_value("name").is_none());
    assert!(!u.has("name"));
}

#[test]
fn test_is_update_flips_new_flag() {
    let mut u = user();
    assert!(u.is_new());
    u.is_update(true);
    assert!(!u.is_new());
    u.is_update(false);
    assert!(u.is_new());
}

#[test]
fn test_empty_primary_keys() {
    let mut u = user();
    assert!(u.pk().is_none());
    for empty in [json!(0), json!("0"), json!(""), Value::Null] {
        u.set("id", empty);
        assert!(u.pk().is_none());
    }
    u.set("id", 5);
    assert_eq!(u.pk(), Some(&json!(5)));
}

#[test]
fn test_empty_values() {
    assert!(is_empty_value(&json!(false)));
    assert!(is_empty_value(&json!([])));
    assert!(is_empty_value(&json!({})));
    assert!(is_empty_value(&json!(0.0)));
    assert!(!is_empty_value(&json!("a")));
    assert!(!is_empty_value(&json!(-1)));
}

#[test]
fn test_nested_records_flatten() {
    let (_exec, session) = scripted();
    let mut profile = Record::new(session.clone(), Arc::new(ModelDef::new("Profile")));
    profile.set("id", 3).set("bio", "hi");

    let mut u = Record::new(session, Arc::new(user_def()));
    u.set("name", "ann").set_record("profile", profile);

    assert_eq!(
        Value::Object(u.to_array()),
        json!({"name": "ann", "profile": {"id": 3, "bio": "hi"}})
    );
    assert!(u.attr_value("profile").is_none());
    assert!(matches!(u.attr("profile"), Some(Attr::One(Some(_)))));
}

#[test]
fn test_field_specs() {
    let mut u = user();
    u.field(" id, name ,, email");
    assert_eq!(u.fields.as_deref(), Some("id, name, email"));

    u.field("count(id) AS n");
    assert_eq!(u.fields.as_deref(), Some("count(id) AS n"));

    u.fields_aliased([("u.name", "username"), ("u.id", "")]);
    assert_eq!(u.fields.as_deref(), Some("u.name username, u.id"));
}

#[test]
fn test_page_window() {
    let mut u = user();
    u.page(3, 20);
    assert_eq!(u.limit, Some(Limit::Range { offset: 40, count: 20 }));
    u.page(0, 0);
    assert_eq!(u.limit, Some(Limit::Range { offset: 0, count: 10 }));
}

#[test]
fn test_with_records_intent() {
    let mut u = user();
    u.with("profile");
    assert!(u.with.contains_key("profile"));
    assert_eq!(u.with["profile"].alias.as_deref(), Some("profile"));
    assert_eq!(u.alias.as_deref(), Some("users"));

    u.with("nope");
    assert_eq!(u.unknown_relation.as_deref(), Some("nope"));

    u.reset();
    assert!(u.with.is_empty());
    assert!(u.unknown_relation.is_none());
    assert!(u.alias.is_none());
}

#[tokio::test]
async fn test_order_defaults_to_descending() {
    let (exec, session) = scripted();
    let mut u = Record::new(session, Arc::new(user_def()));
    assert!(u.order("name").get().await.unwrap().is_none());
    assert_eq!(exec.last().0, "SELECT * FROM users ORDER BY name DESC");

    u.order("name asc").order_by("", "asc").group_by("");
    u.get().await.unwrap();
    assert_eq!(exec.last().0, "SELECT * FROM users ORDER BY name ASC");
}

#[tokio::test]
async fn test_bad_time_expression_fails_the_read() {
    let (exec, session) = scripted();
    let mut u = Record::new(session, Arc::new(user_def()));
    let err = u.where_time("created_at", "fortnight").get().await.unwrap_err();
    assert!(matches!(err, OrmError::InvalidQuery(msg) if msg.contains("fortnight")));
    assert!(exec.statements().is_empty());
}

#[tokio::test]
async fn test_where_all_and_raw_conditions() {
    let (exec, session) = scripted();
    let mut u = Record::new(session, Arc::new(user_def()));
    u.where_all([("status", json!(1), "="), ("age", json!(18), ">=")])
        .or_where_raw("vip IS TRUE")
        .limit(2);
    u.get().await.unwrap();

    let (sql, params) = exec.last();
    assert_eq!(
        sql,
        "SELECT * FROM users WHERE status = $1 AND age >= $2 OR vip IS TRUE LIMIT 2"
    );
    assert_eq!(params, vec![json!(1), json!(18)]);
}

#[tokio::test]
async fn test_lazy_loads_follow_the_owner_return_type() {
    let exec = crate::testing::ScriptedExecutor::new();
    let mut registry = crate::registry::Registry::new();
    registry.register(ModelDef::new("Order").table("orders"));
    let session = exec.session().registry(registry).build();

    let owner = ModelDef::new("User")
        .table("users")
        .relation("orders", Relation::has_many("Order", "user_id"));
    let rel = owner.relations["orders"].clone();
    let mut bag = IndexMap::new();
    bag.insert("id".to_string(), Attr::Value(json!(1)));

    exec.push_rows(vec![json!({"id": 5, "user_id": 1})]);
    let loaded = relation::load(&session, &owner, &bag, "orders", &rel, ReturnType::Array)
        .await
        .unwrap();
    assert!(matches!(
        loaded,
        Attr::Value(Value::Array(ref rows)) if rows == &vec![json!({"id": 5, "user_id": 1})]
    ));

    exec.push_rows(vec![json!({"id": 5, "user_id": 1})]);
    let loaded = relation::load(&session, &owner, &bag, "orders", &rel, ReturnType::Object)
        .await
        .unwrap();
    assert!(matches!(loaded, Attr::Many(Some(ref list)) if list.len() == 1));
    assert_eq!(exec.last().0, "SELECT * FROM orders WHERE user_id = $1");
}
