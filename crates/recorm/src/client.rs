//! Executor trait: the statement-execution primitives the query collaborator needs.

use crate::error::{OrmError, OrmResult};
use crate::row::{Row, decode_row};
use async_trait::async_trait;
use bytes::BytesMut;
use serde_json::Value;
use std::error::Error as StdError;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

/// A connection (or transaction) able to run SQL with `$n` placeholders.
///
/// Parameters are dynamic JSON values; each is converted to the wire type the
/// server inferred for its placeholder (see [`Param`]). Rows come back as
/// ordered name → value maps.
///
/// The trait is object safe so a [`crate::Session`] can hold any backend behind
/// an `Arc<dyn Executor>`.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute a query and return all rows.
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>>;

    /// Execute a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64>;

    /// Execute one or more statements without parameters (`BEGIN`, `COMMIT`, ...).
    async fn batch_execute(&self, sql: &str) -> OrmResult<()>;
}

/// Adapter binding a JSON value to a Postgres parameter.
#[derive(Debug)]
pub struct Param<'a>(pub &'a Value);

type BoxError = Box<dyn StdError + Sync + Send>;

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot bind {value} as {ty}").into()
}

fn number_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn number_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "t" => Some(true),
            "0" | "false" | "no" | "f" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

impl ToSql for Param<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        let value = self.0;
        if value.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::BOOL => as_bool(value)
                .ok_or_else(|| mismatch(value, ty))?
                .to_sql(ty, out),
            Type::INT2 => {
                let n = number_as_i64(value).ok_or_else(|| mismatch(value, ty))?;
                i16::try_from(n)?.to_sql(ty, out)
            }
            Type::INT4 => {
                let n = number_as_i64(value).ok_or_else(|| mismatch(value, ty))?;
                i32::try_from(n)?.to_sql(ty, out)
            }
            Type::INT8 => number_as_i64(value)
                .ok_or_else(|| mismatch(value, ty))?
                .to_sql(ty, out),
            Type::FLOAT4 => {
                let f = number_as_f64(value).ok_or_else(|| mismatch(value, ty))?;
                (f as f32).to_sql(ty, out)
            }
            Type::FLOAT8 => number_as_f64(value)
                .ok_or_else(|| mismatch(value, ty))?
                .to_sql(ty, out),
            Type::JSON | Type::JSONB => value.to_sql(ty, out),
            Type::TIMESTAMP => {
                let ts = crate::row::parse_timestamp(value).ok_or_else(|| mismatch(value, ty))?;
                ts.naive_utc().to_sql(ty, out)
            }
            Type::TIMESTAMPTZ => {
                let ts = crate::row::parse_timestamp(value).ok_or_else(|| mismatch(value, ty))?;
                ts.to_sql(ty, out)
            }
            Type::DATE => {
                let text = as_text(value);
                let date = chrono::NaiveDate::parse_from_str(&text, "%Y-%m-%d")?;
                date.to_sql(ty, out)
            }
            Type::UUID => uuid::Uuid::parse_str(&as_text(value))?.to_sql(ty, out),
            _ => as_text(value).to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn bind(params: &[Value]) -> Vec<Param<'_>> {
    params.iter().map(Param).collect()
}

fn refs<'a>(params: &'a [Param<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl Executor for tokio_postgres::Client {
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        let bound = bind(params);
        let rows = tokio_postgres::Client::query(self, sql, &refs(&bound))
            .await
            .map_err(OrmError::from_db_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let bound = bind(params);
        tokio_postgres::Client::execute(self, sql, &refs(&bound))
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        tokio_postgres::Client::batch_execute(self, sql)
            .await
            .map_err(OrmError::from_db_error)
    }
}

#[async_trait]
impl Executor for tokio_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        let bound = bind(params);
        let rows = tokio_postgres::Transaction::query(self, sql, &refs(&bound))
            .await
            .map_err(OrmError::from_db_error)?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let bound = bind(params);
        tokio_postgres::Transaction::execute(self, sql, &refs(&bound))
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        tokio_postgres::Transaction::batch_execute(self, sql)
            .await
            .map_err(OrmError::from_db_error)
    }
}

#[cfg(feature = "pool")]
#[async_trait]
impl Executor for deadpool_postgres::Client {
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        // Delegate to the deref target (ClientWrapper -> tokio_postgres::Client).
        let client: &tokio_postgres::Client = self;
        Executor::query(client, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let client: &tokio_postgres::Client = self;
        Executor::execute(client, sql, params).await
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        let client: &tokio_postgres::Client = self;
        Executor::batch_execute(client, sql).await
    }
}
