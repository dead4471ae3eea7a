//! Dynamic row representation and decoding from Postgres rows.

use crate::error::{OrmError, OrmResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Number, Value};
use tokio_postgres::types::Type;

/// A fetched row: column name → value, in select-list order.
pub type Row = Map<String, Value>;

/// Decode a driver row into a [`Row`].
///
/// Columns of unknown type are read as text when the server can send them
/// that way, otherwise they decode to `null`.
pub fn decode_row(row: &tokio_postgres::Row) -> OrmResult<Row> {
    let mut out = Map::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let value = decode_column(row, idx, column.type_())
            .map_err(|e| OrmError::decode(name, e.to_string()))?;
        out.insert(name.to_string(), value);
    }
    Ok(out)
}

fn decode_column(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: &Type,
) -> Result<Value, tokio_postgres::Error> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(Value::from),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(Value::from),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::from),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(Value::from),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .and_then(|f| Number::from_f64(f64::from(f)))
            .map(Value::Number),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)?
            .and_then(Number::from_f64)
            .map(Value::Number),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx)?,
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|ts| Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string())),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|ts| Value::String(ts.to_rfc3339())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map(|u| Value::String(u.to_string())),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => row
            .try_get::<_, Option<Vec<Option<String>>>>(idx)?
            .map(|items| Value::Array(items.into_iter().map(Value::from).collect())),
        Type::INT4_ARRAY => row
            .try_get::<_, Option<Vec<Option<i32>>>>(idx)?
            .map(|items| Value::Array(items.into_iter().map(Value::from).collect())),
        Type::INT8_ARRAY => row
            .try_get::<_, Option<Vec<Option<i64>>>>(idx)?
            .map(|items| Value::Array(items.into_iter().map(Value::from).collect())),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(text) => text.map(Value::String),
            // Binary-only types without a text mapping.
            Err(_) => None,
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Interpret a JSON value as a point in time.
///
/// Accepts integer epoch seconds, RFC 3339 strings and `YYYY-MM-DD[ HH:MM:SS]`.
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|s| DateTime::from_timestamp(s, 0)),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(secs) = s.parse::<i64>() {
                return DateTime::from_timestamp(secs, 0);
            }
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            if let Ok(ts) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(ts.and_utc());
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|ts| ts.and_utc())
        }
        _ => None,
    }
}

/// Render a scalar the way string-typed columns store it.
///
/// `null` becomes the empty string, booleans become `1`/empty (the loose
/// string form used by validation and delimited-list columns).
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
