//! The query collaborator records talk to.
//!
//! [`Db`] accumulates builder state (conditions, joins, grouping, ordering,
//! query options) and turns it into exactly one statement per terminal call:
//! `get`, `get_one`, `get_value`, `paginate`, `insert`, `update`, `delete`.
//! The builder state is drained by every terminal call, whether it succeeds
//! or not. Counters describing the last statement (`count`, `total_pages`,
//! `last_query`, ...) stay readable until the next one runs.
//!
//! Table arguments are unprefixed names, optionally followed by an alias
//! (`"users u"`); the session's table prefix is applied here.
//!
//! ```ignore
//! let mut db = session.db();
//! let rows = db
//!     .where_cond("status", json!(1), "=", Logic::And)
//!     .order_by("id", "DESC", None)
//!     .get("users", Some(Limit::Count(10)), None)
//!     .await?;
//! ```

mod condition;
mod sql;

#[cfg(test)]
mod tests;

pub use condition::{Condition, Logic, Operator};
pub use sql::Sql;

use crate::error::{OrmError, OrmResult};
use crate::monitor::{QueryContext, QueryResult};
use crate::row::Row;
use crate::session::Session;
use serde_json::Value;
use std::fmt;
use std::time::Instant;

/// Row limit of a fetch: a plain count or an offset/count window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Count(u64),
    Range { offset: u64, count: u64 },
}

impl From<u64> for Limit {
    fn from(count: u64) -> Self {
        Limit::Count(count)
    }
}

impl From<(u64, u64)> for Limit {
    /// `(offset, count)`
    fn from((offset, count): (u64, u64)) -> Self {
        Limit::Range { offset, count }
    }
}

/// Statement modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOption {
    /// `SELECT DISTINCT`
    Distinct,
    /// Row locking: `... FOR UPDATE`
    ForUpdate,
    /// Shared row locking: `... FOR SHARE`
    ForShare,
    /// Nest joined tables' columns under their alias (or table name).
    NestJoin,
}

impl QueryOption {
    /// Parse the textual option names callers pass through.
    pub fn parse(option: &str) -> OrmResult<Self> {
        let normalized = option.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "DISTINCT" => Ok(QueryOption::Distinct),
            "FOR UPDATE" => Ok(QueryOption::ForUpdate),
            "FOR SHARE" | "LOCK IN SHARE MODE" => Ok(QueryOption::ForShare),
            "NESTJOIN" | "NEST JOIN" => Ok(QueryOption::NestJoin),
            _ => Err(OrmError::invalid_query(format!(
                "unsupported query option '{option}'"
            ))),
        }
    }
}

/// Table lock strength for [`Db::lock_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Readers allowed, writers blocked.
    Read,
    /// Exclusive access.
    Write,
}

impl LockMode {
    fn as_sql(self) -> &'static str {
        match self {
            LockMode::Read => "SHARE",
            LockMode::Write => "ACCESS EXCLUSIVE",
        }
    }
}

#[derive(Debug, Clone)]
struct Join {
    kind: &'static str,
    /// Prefixed table name, with alias when given.
    from: String,
    /// Key joined columns are nested under.
    label: String,
    /// Expression naming the joined row (alias or prefixed table).
    row_ref: String,
    condition: String,
}

#[derive(Debug, Clone)]
struct OrderBy {
    field: String,
    direction: &'static str,
    custom: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default)]
struct QueryState {
    wheres: Vec<Condition>,
    joins: Vec<Join>,
    group_by: Vec<String>,
    order_by: Vec<OrderBy>,
    distinct: bool,
    lock: Option<&'static str>,
    nest_join: bool,
    build_error: Option<String>,
}

/// A resolved `"table [alias]"` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TableRef {
    name: String,
    alias: Option<String>,
}

impl TableRef {
    fn parse(prefix: &str, table: &str) -> Self {
        let mut parts = table.split_whitespace();
        let name = format!("{prefix}{}", parts.next().unwrap_or_default());
        let alias = parts
            .filter(|p| !p.eq_ignore_ascii_case("as"))
            .next_back()
            .map(str::to_string);
        Self { name, alias }
    }

    fn from_clause(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} {}", self.name, alias),
            None => self.name.clone(),
        }
    }

    fn row_ref(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

fn is_plain_ident(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn check_columns(data: &Row) -> OrmResult<()> {
    match data.keys().find(|k| !is_plain_ident(k)) {
        Some(bad) => Err(OrmError::invalid_query(format!("invalid column name '{bad}'"))),
        None => Ok(()),
    }
}

/// Builder state plus execution bookkeeping for one record (or ad hoc use).
#[derive(Clone)]
pub struct Db {
    session: Session,
    state: QueryState,
    count: usize,
    total_count: usize,
    total_pages: usize,
    last_query: Option<String>,
    last_params: Vec<Value>,
    last_insert_id: Option<Value>,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("state", &self.state)
            .field("count", &self.count)
            .field("last_query", &self.last_query)
            .finish_non_exhaustive()
    }
}

impl Db {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            state: QueryState::default(),
            count: 0,
            total_count: 0,
            total_pages: 0,
            last_query: None,
            last_params: Vec::new(),
            last_insert_id: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Table prefix applied to every table name.
    pub fn prefix(&self) -> &str {
        self.session.prefix()
    }

    // ==================== builder state ====================

    /// Add a comparison condition. `op` is parsed case-insensitively; an
    /// unknown operator is reported by the next terminal call.
    pub fn where_cond(&mut self, column: &str, value: Value, op: &str, logic: Logic) -> &mut Self {
        let built = Operator::parse(op).and_then(|op| Condition::new(logic, column, op, value));
        match built {
            Ok(cond) => self.state.wheres.push(cond),
            Err(e) => self.fail(e),
        }
        self
    }

    /// Add a raw SQL condition.
    ///
    /// Be careful with SQL injection when using raw conditions.
    pub fn where_raw(&mut self, expr: &str, logic: Logic) -> &mut Self {
        self.state.wheres.push(Condition::raw(logic, expr));
        self
    }

    /// Whether any WHERE condition is pending.
    pub fn has_conditions(&self) -> bool {
        !self.state.wheres.is_empty()
    }

    /// Add a join. `table` may carry an alias (`"profiles p"`); `join_type`
    /// is one of `LEFT`, `RIGHT`, `INNER`, `OUTER`, `LEFT OUTER`,
    /// `RIGHT OUTER`, `NATURAL` or empty for a plain `JOIN`.
    pub fn join(&mut self, table: &str, condition: &str, join_type: &str) -> &mut Self {
        let normalized = join_type.split_whitespace().collect::<Vec<_>>().join(" ");
        let kind = match normalized.to_ascii_uppercase().as_str() {
            "" => "JOIN",
            "LEFT" => "LEFT JOIN",
            "RIGHT" => "RIGHT JOIN",
            "INNER" => "INNER JOIN",
            "OUTER" => "FULL OUTER JOIN",
            "LEFT OUTER" => "LEFT OUTER JOIN",
            "RIGHT OUTER" => "RIGHT OUTER JOIN",
            "NATURAL" => "NATURAL JOIN",
            _ => {
                self.fail(OrmError::invalid_query(format!(
                    "wrong join type '{join_type}'"
                )));
                return self;
            }
        };

        let table_ref = TableRef::parse(self.prefix(), table);
        let unprefixed = table.split_whitespace().next().unwrap_or_default().to_string();
        self.state.joins.push(Join {
            kind,
            from: table_ref.from_clause(),
            label: table_ref.alias.clone().unwrap_or(unprefixed),
            row_ref: table_ref.row_ref().to_string(),
            condition: condition.to_string(),
        });
        self
    }

    pub fn group_by(&mut self, field: &str) -> &mut Self {
        self.state.group_by.push(field.to_string());
        self
    }

    /// Add an ORDER BY term. With `custom` values the rows are ordered by the
    /// position of `field`'s value in that list.
    pub fn order_by(&mut self, field: &str, direction: &str, custom: Option<Vec<Value>>) -> &mut Self {
        let direction = match direction.trim().to_ascii_uppercase().as_str() {
            "ASC" => "ASC",
            "DESC" | "" => "DESC",
            _ => {
                self.fail(OrmError::invalid_query(format!(
                    "wrong order direction '{direction}'"
                )));
                return self;
            }
        };
        self.state.order_by.push(OrderBy {
            field: field.to_string(),
            direction,
            custom,
        });
        self
    }

    pub fn set_query_option(&mut self, option: QueryOption) -> &mut Self {
        match option {
            QueryOption::Distinct => self.state.distinct = true,
            QueryOption::ForUpdate => self.state.lock = Some("FOR UPDATE"),
            QueryOption::ForShare => self.state.lock = Some("FOR SHARE"),
            QueryOption::NestJoin => self.state.nest_join = true,
        }
        self
    }

    /// Record a builder error; the next terminal call returns it.
    pub fn fail(&mut self, err: OrmError) {
        if self.state.build_error.is_none() {
            self.state.build_error = Some(match err {
                OrmError::InvalidQuery(msg) => msg,
                other => other.to_string(),
            });
        }
    }

    /// Drop all pending builder state without executing anything.
    pub fn reset(&mut self) {
        self.state = QueryState::default();
    }

    fn take_state(&mut self) -> OrmResult<QueryState> {
        let mut state = std::mem::take(&mut self.state);
        match state.build_error.take() {
            Some(msg) => Err(OrmError::InvalidQuery(msg)),
            None => Ok(state),
        }
    }

    // ==================== bookkeeping ====================

    /// Rows returned (reads) or affected (writes) by the last statement.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Total matching rows computed by the last `paginate`.
    pub fn total_count(&self) -> usize {
        self.total_count
    }

    /// Total pages computed by the last `paginate`.
    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// SQL text of the last executed statement.
    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    /// Parameters bound to the last executed statement.
    pub fn last_params(&self) -> &[Value] {
        &self.last_params
    }

    /// Primary key generated by the last `insert`.
    pub fn last_insert_id(&self) -> Option<&Value> {
        self.last_insert_id.as_ref()
    }

    // ==================== rendering ====================

    fn render_select(
        &self,
        state: &QueryState,
        table: &TableRef,
        projection: Option<&str>,
        limit: Option<Limit>,
        nest: bool,
    ) -> Sql {
        let mut q = Sql::new("SELECT ");
        if state.distinct {
            q.push("DISTINCT ");
        }

        let projection = projection.map(str::trim).filter(|p| !p.is_empty());
        let nest = nest && state.nest_join && !state.joins.is_empty();
        match projection {
            Some(p) => q.push(p),
            None if nest => q.push(&format!("{}.*", table.row_ref())),
            None => q.push("*"),
        };
        if nest {
            for join in &state.joins {
                q.push(&format!(", to_json({}) AS \"{}\"", join.row_ref, join.label));
            }
        }

        q.push(" FROM ").push(&table.from_clause());
        for join in &state.joins {
            q.push(" ").push(join.kind).push(" ").push(&join.from);
            if join.kind != "NATURAL JOIN" && !join.condition.trim().is_empty() {
                q.push(" ON ").push(&join.condition);
            }
        }
        condition::append_where(&mut q, &state.wheres);
        if !state.group_by.is_empty() {
            q.push(" GROUP BY ").push(&state.group_by.join(", "));
        }
        Self::append_order(&mut q, state);

        match limit {
            Some(Limit::Count(n)) => {
                q.push(&format!(" LIMIT {n}"));
            }
            Some(Limit::Range { offset, count }) => {
                q.push(&format!(" LIMIT {count} OFFSET {offset}"));
            }
            None => {}
        }
        if let Some(lock) = state.lock {
            q.push(" ").push(lock);
        }
        q
    }

    fn append_order(q: &mut Sql, state: &QueryState) {
        for (i, order) in state.order_by.iter().enumerate() {
            q.push(if i == 0 { " ORDER BY " } else { ", " });
            match &order.custom {
                Some(values) if !values.is_empty() => {
                    q.push("CASE ").push(&order.field);
                    for (pos, value) in values.iter().enumerate() {
                        q.push(" WHEN ").push_bind(value.clone());
                        q.push(&format!(" THEN {pos}"));
                    }
                    q.push(&format!(" ELSE {} END {}", values.len(), order.direction));
                }
                _ => {
                    q.push(&order.field).push(" ").push(order.direction);
                }
            }
        }
    }

    fn render_count(&self, state: &QueryState, table: &TableRef, projection: Option<&str>) -> Sql {
        let inner = QueryState {
            order_by: Vec::new(),
            lock: None,
            nest_join: false,
            ..state.clone()
        };
        let mut q = Sql::new("SELECT count(*) AS total FROM (");
        q.push_sql(self.render_select(&inner, table, projection, None, false));
        q.push(") AS paged");
        q
    }

    // ==================== execution ====================

    async fn run_query(&mut self, sql: Sql, table: &str) -> OrmResult<Vec<Row>> {
        let (text, params) = sql.into_parts();
        let ctx = QueryContext::new(&text, params.len()).with_table(table);
        let monitor = self.session.monitor();
        monitor.on_query_start(&ctx);

        let started = Instant::now();
        let result = self.session.executor().query(&text, &params).await;
        let elapsed = started.elapsed();
        match &result {
            Ok(rows) => monitor.on_query_complete(&ctx, elapsed, &QueryResult::Rows(rows.len())),
            Err(e) => monitor.on_query_complete(&ctx, elapsed, &QueryResult::error(e.to_string())),
        }

        self.last_query = Some(text);
        self.last_params = params;
        result
    }

    async fn run_execute(&mut self, sql: Sql, table: &str) -> OrmResult<u64> {
        let (text, params) = sql.into_parts();
        let ctx = QueryContext::new(&text, params.len()).with_table(table);
        let monitor = self.session.monitor();
        monitor.on_query_start(&ctx);

        let started = Instant::now();
        let result = self.session.executor().execute(&text, &params).await;
        let elapsed = started.elapsed();
        match &result {
            Ok(n) => monitor.on_query_complete(&ctx, elapsed, &QueryResult::Affected(*n)),
            Err(e) => monitor.on_query_complete(&ctx, elapsed, &QueryResult::error(e.to_string())),
        }

        self.last_query = Some(text);
        self.last_params = params;
        result
    }

    /// Fetch rows. `fields` is a raw projection (defaults to `*`).
    pub async fn get(
        &mut self,
        table: &str,
        limit: Option<Limit>,
        fields: Option<&str>,
    ) -> OrmResult<Vec<Row>> {
        let state = self.take_state()?;
        let table_ref = TableRef::parse(self.prefix(), table);
        let q = self.render_select(&state, &table_ref, fields, limit, true);

        self.count = 0;
        let rows = self.run_query(q, &table_ref.name).await?;
        self.count = rows.len();
        Ok(rows)
    }

    /// Fetch the first matching row, if any.
    pub async fn get_one(&mut self, table: &str, fields: Option<&str>) -> OrmResult<Option<Row>> {
        let rows = self.get(table, Some(Limit::Count(1)), fields).await?;
        Ok(rows.into_iter().next())
    }

    /// Evaluate a single expression (`count(*)`, `sum(price)`, ...) over the
    /// filtered rows and return the first value.
    pub async fn get_value(&mut self, table: &str, expr: &str) -> OrmResult<Option<Value>> {
        let state = self.take_state()?;
        let table_ref = TableRef::parse(self.prefix(), table);
        let projection = format!("{expr} AS retval");
        let q = self.render_select(&state, &table_ref, Some(&projection), Some(Limit::Count(1)), false);

        self.count = 0;
        let rows = self.run_query(q, &table_ref.name).await?;
        self.count = rows.len();
        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove("retval")))
    }

    /// Fetch one page of rows and compute the page count.
    ///
    /// Pages are 1-based; values below 1 are treated as page 1. The page size
    /// comes from the session's [`crate::OrmContext`].
    pub async fn paginate(
        &mut self,
        table: &str,
        page: u64,
        fields: Option<&str>,
    ) -> OrmResult<Vec<Row>> {
        let state = self.take_state()?;
        let table_ref = TableRef::parse(self.prefix(), table);
        let page_limit = self.session.context().page_limit() as u64;
        let offset = page_limit * (page.max(1) - 1);

        let count_q = self.render_count(&state, &table_ref, fields);
        let page_q = self.render_select(
            &state,
            &table_ref,
            fields,
            Some(Limit::Range {
                offset,
                count: page_limit,
            }),
            true,
        );

        self.count = 0;
        let totals = self.run_query(count_q, &table_ref.name).await?;
        let total = totals
            .first()
            .and_then(|row| row.get("total"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        self.total_count = total;
        self.total_pages = total.div_ceil(page_limit as usize);
        self.session.context().record_total_pages(self.total_pages);

        let rows = self.run_query(page_q, &table_ref.name).await?;
        self.count = rows.len();
        Ok(rows)
    }

    /// Insert one row. With `returning`, the named column of the inserted row
    /// is read back and returned (the generated primary key).
    pub async fn insert(
        &mut self,
        table: &str,
        data: &Row,
        returning: Option<&str>,
    ) -> OrmResult<Option<Value>> {
        self.take_state()?;
        check_columns(data)?;
        let table_ref = TableRef::parse(self.prefix(), table);

        let mut q = Sql::new(format!("INSERT INTO {}", table_ref.name));
        if data.is_empty() {
            q.push(" DEFAULT VALUES");
        } else {
            let columns: Vec<&str> = data.keys().map(String::as_str).collect();
            q.push(" (").push(&columns.join(", ")).push(") VALUES (");
            q.push_bind_list(data.values().cloned());
            q.push(")");
        }

        self.count = 0;
        self.last_insert_id = None;
        match returning.filter(|pk| is_plain_ident(pk)) {
            Some(pk) => {
                q.push(" RETURNING ").push(pk);
                let rows = self.run_query(q, &table_ref.name).await?;
                self.count = rows.len();
                self.last_insert_id = rows.into_iter().next().and_then(|mut row| row.remove(pk));
            }
            None => {
                self.count = self.run_execute(q, &table_ref.name).await? as usize;
            }
        }
        Ok(self.last_insert_id.clone())
    }

    /// Update the filtered rows with `data`. Refuses to run without a filter.
    pub async fn update(&mut self, table: &str, data: &Row) -> OrmResult<u64> {
        let state = self.take_state()?;
        check_columns(data)?;
        if data.is_empty() {
            return Err(OrmError::invalid_query("UPDATE requires at least one column"));
        }
        if state.wheres.is_empty() {
            return Err(OrmError::UnsafeWrite("update"));
        }
        let table_ref = TableRef::parse(self.prefix(), table);

        let mut q = Sql::new(format!("UPDATE {} SET ", table_ref.from_clause()));
        for (i, (column, value)) in data.iter().enumerate() {
            if i > 0 {
                q.push(", ");
            }
            q.push(column).push(" = ").push_bind(value.clone());
        }
        condition::append_where(&mut q, &state.wheres);

        self.count = 0;
        let affected = self.run_execute(q, &table_ref.name).await?;
        self.count = affected as usize;
        Ok(affected)
    }

    /// Delete the filtered rows. Refuses to run without a filter.
    pub async fn delete(&mut self, table: &str) -> OrmResult<u64> {
        let state = self.take_state()?;
        if state.wheres.is_empty() {
            return Err(OrmError::UnsafeWrite("delete"));
        }
        let table_ref = TableRef::parse(self.prefix(), table);

        let mut q = Sql::new(format!("DELETE FROM {}", table_ref.from_clause()));
        condition::append_where(&mut q, &state.wheres);

        self.count = 0;
        let affected = self.run_execute(q, &table_ref.name).await?;
        self.count = affected as usize;
        Ok(affected)
    }

    /// Lock a whole table until the surrounding transaction ends.
    pub async fn lock_table(&mut self, table: &str, mode: LockMode) -> OrmResult<()> {
        let table_ref = TableRef::parse(self.prefix(), table);
        let q = Sql::new(format!(
            "LOCK TABLE {} IN {} MODE",
            table_ref.name,
            mode.as_sql()
        ));
        self.run_execute(q, &table_ref.name).await?;
        Ok(())
    }
}
