#![allow(dead_code)]

use async_trait::async_trait;
use recorm::{
    Executor, FieldDef, FieldType, ModelDef, OrmError, OrmResult, Registry, Relation, Row, Session,
    SessionBuilder,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Script {
    rows: VecDeque<Vec<Row>>,
    affected: VecDeque<u64>,
    failures: VecDeque<OrmError>,
    log: Vec<(String, Vec<Value>)>,
}

/// Executor that replays queued results and records every statement.
///
/// A query with nothing queued returns no rows; a statement with nothing
/// queued affects one row. A queued failure is returned by the next query or
/// statement instead of its result.
#[derive(Default)]
pub struct MockExecutor {
    script: Mutex<Script>,
}

impl MockExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_rows(&self, rows: Vec<Value>) {
        let rows = rows.into_iter().map(row).collect();
        self.script.lock().unwrap().rows.push_back(rows);
    }

    pub fn push_affected(&self, n: u64) {
        self.script.lock().unwrap().affected.push_back(n);
    }

    /// Make the next query or statement fail with a server error.
    pub fn push_failure(&self, code: &str, message: &str) {
        self.script
            .lock()
            .unwrap()
            .failures
            .push_back(OrmError::execution(code, message));
    }

    pub fn statements(&self) -> Vec<String> {
        self.script
            .lock()
            .unwrap()
            .log
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub fn params(&self, index: usize) -> Vec<Value> {
        self.script.lock().unwrap().log[index].1.clone()
    }

    pub fn last(&self) -> (String, Vec<Value>) {
        self.script.lock().unwrap().log.last().cloned().unwrap()
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        let mut script = self.script.lock().unwrap();
        script.log.push((sql.to_string(), params.to_vec()));
        if let Some(err) = script.failures.pop_front() {
            return Err(err);
        }
        Ok(script.rows.pop_front().unwrap_or_default())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let mut script = self.script.lock().unwrap();
        script.log.push((sql.to_string(), params.to_vec()));
        if let Some(err) = script.failures.pop_front() {
            return Err(err);
        }
        Ok(script.affected.pop_front().unwrap_or(1))
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        self.script
            .lock()
            .unwrap()
            .log
            .push((sql.to_string(), Vec::new()));
        Ok(())
    }
}

pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register(
            ModelDef::new("User")
                .table("users")
                .field("name", FieldDef::required(FieldType::Text))
                .field("age", FieldDef::new(FieldType::Int))
                .field(
                    "email",
                    FieldDef::new(FieldType::Pattern(r"/^[^@\s]+@[^@\s]+$/i".to_string())),
                )
                .field("settings", FieldDef::new(FieldType::Text))
                .field("tags", FieldDef::new(FieldType::Text))
                .field("profile_id", FieldDef::new(FieldType::Int))
                .field("created_at", FieldDef::new(FieldType::Int))
                .field("updated_at", FieldDef::new(FieldType::Int))
                .json_fields(["settings"])
                .array_fields(["tags"])
                .hidden(["password"])
                .timestamps(Some("created_at"), Some("updated_at"))
                .relation("profile", Relation::has_one("Profile").key("profile_id"))
                .relation("orders", Relation::has_many("Order", "user_id")),
        )
        .register(ModelDef::new("Profile").table("profiles"))
        .register(
            ModelDef::new("Order")
                .table("orders")
                .field("amount", FieldDef::new(FieldType::Double)),
        )
        .register(
            ModelDef::new("Tag")
                .table("tags")
                .field("label", FieldDef::required(FieldType::Text)),
        );
    registry
}

pub fn builder(exec: &Arc<MockExecutor>) -> SessionBuilder {
    SessionBuilder::new(exec.clone()).registry(registry())
}

pub fn session() -> (Arc<MockExecutor>, Session) {
    let exec = MockExecutor::new();
    let session = builder(&exec).build();
    (exec, session)
}
