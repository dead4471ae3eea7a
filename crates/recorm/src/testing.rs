//! Scripted executor used by unit tests.

use crate::client::Executor;
use crate::error::OrmResult;
use crate::row::Row;
use crate::session::{Session, SessionBuilder};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Script {
    rows: VecDeque<Vec<Row>>,
    affected: VecDeque<u64>,
    log: Vec<(String, Vec<Value>)>,
}

/// Replays queued results and records every statement it receives.
///
/// Queries without a queued result return no rows; statements without a
/// queued count affect one row.
#[derive(Default)]
pub(crate) struct ScriptedExecutor {
    script: Mutex<Script>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the result of the next query. Each item must be a JSON object.
    pub(crate) fn push_rows(&self, rows: Vec<Value>) {
        let rows = rows
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => map,
                other => panic!("scripted row must be an object, got {other}"),
            })
            .collect();
        self.script.lock().unwrap().rows.push_back(rows);
    }

    pub(crate) fn push_affected(&self, n: u64) {
        self.script.lock().unwrap().affected.push_back(n);
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.script.lock().unwrap().log.iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub(crate) fn last(&self) -> (String, Vec<Value>) {
        self.script.lock().unwrap().log.last().cloned().unwrap_or_default()
    }

    pub(crate) fn session(self: &Arc<Self>) -> SessionBuilder {
        SessionBuilder::new(self.clone())
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        let mut script = self.script.lock().unwrap();
        script.log.push((sql.to_string(), params.to_vec()));
        Ok(script.rows.pop_front().unwrap_or_default())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let mut script = self.script.lock().unwrap();
        script.log.push((sql.to_string(), params.to_vec()));
        Ok(script.affected.pop_front().unwrap_or(1))
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        self.script.lock().unwrap().log.push((sql.to_string(), Vec::new()));
        Ok(())
    }
}

/// A session over a fresh scripted executor.
pub(crate) fn scripted() -> (Arc<ScriptedExecutor>, Session) {
    let exec = ScriptedExecutor::new();
    let session = exec.session().build();
    (exec, session)
}
