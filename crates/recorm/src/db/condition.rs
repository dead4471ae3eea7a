//! WHERE condition primitives.
//!
//! Conditions are recorded as `(logic, column, operator, value)` tuples and
//! rendered in order; the logic of the first condition is dropped.

use super::sql::Sql;
use crate::error::{OrmError, OrmResult};
use serde_json::Value;

/// Boolean connective joining a condition to the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Logic {
    #[default]
    And,
    Or,
}

impl Logic {
    pub fn as_sql(self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }
}

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    Ilike,
    NotIlike,
    In,
    NotIn,
    Between,
    NotBetween,
    /// Half-open range `[start, end)`.
    Within,
    Is,
    IsNot,
    Regexp,
}

impl Operator {
    /// Parse an operator the way callers write it (`"="`, `"not in"`, `"BETWEEN"`, ...).
    pub fn parse(op: &str) -> OrmResult<Self> {
        let normalized = op.split_whitespace().collect::<Vec<_>>().join(" ");
        let parsed = match normalized.to_ascii_lowercase().as_str() {
            "=" | "==" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            "like" => Operator::Like,
            "not like" => Operator::NotLike,
            "ilike" => Operator::Ilike,
            "not ilike" => Operator::NotIlike,
            "in" => Operator::In,
            "not in" => Operator::NotIn,
            "between" => Operator::Between,
            "not between" => Operator::NotBetween,
            "within" => Operator::Within,
            "is" => Operator::Is,
            "is not" => Operator::IsNot,
            "regexp" | "~" => Operator::Regexp,
            _ => return Err(OrmError::invalid_query(format!("unsupported operator '{op}'"))),
        };
        Ok(parsed)
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::Ilike => "ILIKE",
            Operator::NotIlike => "NOT ILIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
            Operator::Within => "WITHIN",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
            Operator::Regexp => "~",
        }
    }
}

/// One recorded WHERE condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub logic: Logic,
    pub column: String,
    pub op: Operator,
    /// `None` means the column text is a complete raw expression.
    pub value: Option<Value>,
}

impl Condition {
    /// A structured comparison; validates operator/value shape.
    pub fn new(logic: Logic, column: &str, op: Operator, value: Value) -> OrmResult<Self> {
        let op = match (op, &value) {
            (Operator::Between | Operator::NotBetween | Operator::Within, Value::Array(items))
                if items.len() == 2 =>
            {
                op
            }
            (Operator::Between | Operator::NotBetween | Operator::Within, _) => {
                return Err(OrmError::invalid_query(format!(
                    "{} on '{column}' needs exactly two values",
                    op.as_sql()
                )));
            }
            (Operator::In | Operator::NotIn, Value::Array(_)) => op,
            (Operator::In | Operator::NotIn, _) => {
                return Err(OrmError::invalid_query(format!(
                    "{} on '{column}' needs a list of values",
                    op.as_sql()
                )));
            }
            // A list compared for equality is a membership test.
            (Operator::Eq, Value::Array(_)) => Operator::In,
            (Operator::Ne, Value::Array(_)) => Operator::NotIn,
            (_, Value::Array(_)) => {
                return Err(OrmError::invalid_query(format!(
                    "operator {} on '{column}' cannot take a list",
                    op.as_sql()
                )));
            }
            _ => op,
        };

        Ok(Self {
            logic,
            column: column.to_string(),
            op,
            value: Some(value),
        })
    }

    /// A raw SQL expression (no bound value).
    ///
    /// Be careful with SQL injection when using raw conditions.
    pub fn raw(logic: Logic, expr: &str) -> Self {
        Self {
            logic,
            column: expr.to_string(),
            op: Operator::Eq,
            value: None,
        }
    }

    /// Append this condition (without its logic keyword) to `sql`.
    pub fn append_to(&self, sql: &mut Sql) {
        let Some(value) = &self.value else {
            sql.push(&self.column);
            return;
        };

        if self.op == Operator::Within {
            sql.push("(");
        }
        sql.push(&self.column);
        match (self.op, value) {
            (Operator::In | Operator::NotIn, Value::Array(items)) => {
                sql.push(" ").push(self.op.as_sql()).push(" (");
                sql.push_bind_list(items.iter().cloned());
                sql.push(")");
            }
            (Operator::Between | Operator::NotBetween, Value::Array(items)) => {
                sql.push(" ").push(self.op.as_sql()).push(" ");
                sql.push_bind(items[0].clone());
                sql.push(" AND ");
                sql.push_bind(items[1].clone());
            }
            (Operator::Within, Value::Array(items)) => {
                sql.push(" >= ").push_bind(items[0].clone());
                sql.push(" AND ").push(&self.column).push(" < ");
                sql.push_bind(items[1].clone());
                sql.push(")");
            }
            (Operator::Eq | Operator::Is, Value::Null) => {
                sql.push(" IS NULL");
            }
            (Operator::Ne | Operator::IsNot, Value::Null) => {
                sql.push(" IS NOT NULL");
            }
            (op, value) => {
                sql.push(" ").push(op.as_sql()).push(" ");
                sql.push_bind(value.clone());
            }
        }
    }
}

/// Render a condition list as ` WHERE ...`; empty lists render nothing.
pub fn append_where(sql: &mut Sql, conditions: &[Condition]) {
    for (i, cond) in conditions.iter().enumerate() {
        if i == 0 {
            sql.push(" WHERE ");
        } else {
            sql.push(" ").push(cond.logic.as_sql()).push(" ");
        }
        cond.append_to(sql);
    }
}
