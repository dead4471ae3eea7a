//! Active records: one row of one table plus the query chain that loads it.
//!
//! A [`Record`] is both an entity (an ordered attribute bag with a
//! new/persisted flag) and a query builder over its table. Builder calls only
//! record intent; the next terminal call (`get`, `get_one`, `count`,
//! `insert`, `update`, `delete`, ...) turns it into one statement and drains
//! it, whatever the outcome.
//!
//! ```ignore
//! let mut users = session.model("User")?;
//! if let Some(Fetched::Records(list)) = users
//!     .where_("status", 1)
//!     .with("profile")
//!     .order("id desc")
//!     .limit(10)
//!     .get()
//!     .await?
//! {
//!     for user in list {
//!         println!("{user}");
//!     }
//! }
//!
//! let mut user = session.model("User")?;
//! user.set("name", "ann");
//! if !user.save(None).await? {
//!     eprintln!("{}", user.errors());
//! }
//! ```

mod fetch;
mod relation;
mod write;

#[cfg(test)]
mod tests;

use crate::db::{Db, Limit, LockMode, Logic, QueryOption};
use crate::error::{OrmError, OrmResult};
use crate::model::{ModelDef, Relation};
use crate::row::Row;
use crate::session::Session;
use crate::time_range::{self, TimeExpr};
use crate::validate::ValidationErrors;
use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// How query results materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnType {
    /// Typed [`Record`]s.
    #[default]
    Object,
    /// Plain [`Row`] mappings.
    Array,
    /// One JSON string.
    Json,
}

/// One entry of the attribute bag.
#[derive(Debug, Clone)]
pub enum Attr {
    Value(Value),
    /// A loaded hasOne relation (or a nested record set by the caller).
    One(Option<Box<Record>>),
    /// A loaded hasMany relation.
    Many(Option<Vec<Record>>),
}

impl Attr {
    /// Flatten to plain JSON, nested records included.
    pub fn to_value(&self) -> Value {
        match self {
            Attr::Value(v) => v.clone(),
            Attr::One(Some(record)) => Value::Object(record.to_array()),
            Attr::Many(Some(records)) => {
                Value::Array(records.iter().map(|r| Value::Object(r.to_array())).collect())
            }
            Attr::One(None) | Attr::Many(None) => Value::Null,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Attr::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// A resolved relation.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl Related {
    fn from_attr(attr: &Attr) -> Self {
        match attr {
            Attr::Many(list) => Related::Many(list.clone().unwrap_or_default()),
            Attr::One(one) => Related::One(one.as_deref().cloned()),
            Attr::Value(_) => Related::One(None),
        }
    }

    pub fn one(self) -> Option<Record> {
        match self {
            Related::One(one) => one,
            Related::Many(_) => None,
        }
    }

    pub fn many(self) -> Vec<Record> {
        match self {
            Related::Many(list) => list,
            Related::One(one) => one.into_iter().collect(),
        }
    }
}

/// Result of a multi-row read.
#[derive(Debug, Clone)]
pub enum Fetched {
    Records(Vec<Record>),
    Rows(Vec<Row>),
    Json(String),
}

impl Fetched {
    /// Number of rows (0 for the JSON form).
    pub fn len(&self) -> usize {
        match self {
            Fetched::Records(list) => list.len(),
            Fetched::Rows(rows) => rows.len(),
            Fetched::Json(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_records(self) -> Option<Vec<Record>> {
        match self {
            Fetched::Records(list) => Some(list),
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            Fetched::Rows(rows) => Some(rows),
            Fetched::Records(list) => Some(list.iter().map(Record::to_array).collect()),
            Fetched::Json(_) => None,
        }
    }

    pub fn into_json(self) -> Option<String> {
        match self {
            Fetched::Json(text) => Some(text),
            _ => None,
        }
    }
}

/// Result of a single-row read.
#[derive(Debug, Clone)]
pub enum FetchedOne {
    Record(Box<Record>),
    Row(Row),
    Json(String),
}

impl FetchedOne {
    pub fn into_record(self) -> Option<Record> {
        match self {
            FetchedOne::Record(record) => Some(*record),
            _ => None,
        }
    }

    pub fn into_row(self) -> Option<Row> {
        match self {
            FetchedOne::Row(row) => Some(row),
            FetchedOne::Record(record) => Some(record.to_array()),
            FetchedOne::Json(_) => None,
        }
    }

    pub fn into_json(self) -> Option<String> {
        match self {
            FetchedOne::Json(text) => Some(text),
            _ => None,
        }
    }
}

/// An active record over one table.
#[derive(Clone)]
pub struct Record {
    session: Session,
    def: Arc<ModelDef>,
    db: Db,
    data: IndexMap<String, Attr>,
    is_new: bool,
    errors: ValidationErrors,
    return_type: ReturnType,

    // Builder transient state, drained by every terminal call.
    fields: Option<String>,
    limit: Option<Limit>,
    alias: Option<String>,
    with: IndexMap<String, Relation>,
    unknown_relation: Option<String>,
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.def.name)
            .field("table", &self.def.table)
            .field("is_new", &self.is_new)
            .field("data", &self.data)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl Record {
    /// An empty, new record.
    pub fn new(session: Session, def: Arc<ModelDef>) -> Self {
        let db = session.db();
        Self {
            session,
            def,
            db,
            data: IndexMap::new(),
            is_new: true,
            errors: ValidationErrors::new(),
            return_type: ReturnType::Object,
            fields: None,
            limit: None,
            alias: None,
            with: IndexMap::new(),
            unknown_relation: None,
        }
    }

    /// A persisted record hydrated from a fetched row.
    pub(crate) fn hydrate(session: Session, def: Arc<ModelDef>, data: IndexMap<String, Attr>) -> Self {
        let mut record = Self::new(session, def);
        record.data = data;
        record.is_new = false;
        record
    }

    pub fn definition(&self) -> &ModelDef {
        &self.def
    }

    pub fn table(&self) -> &str {
        &self.def.table
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The query collaborator: counters of the last statement
    /// (`count`, `total_count`, `total_pages`, `last_query`, `last_insert_id`).
    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Mark the record as persisted (`true`) or new (`false`).
    pub fn is_update(&mut self, update: bool) -> &mut Self {
        self.is_new = !update;
        self
    }

    /// Violations from the last write attempt.
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn return_type(&self) -> ReturnType {
        self.return_type
    }

    // ==================== attribute store ====================

    /// Set an attribute. Hidden names are ignored.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        if !self.def.is_hidden(name) {
            self.data.insert(name.to_string(), Attr::Value(value.into()));
        }
        self
    }

    /// Store a nested record. An unsaved one is persisted first on the next
    /// write and replaced by its primary key in the payload.
    pub fn set_record(&mut self, name: &str, record: Record) -> &mut Self {
        if !self.def.is_hidden(name) {
            self.data.insert(name.to_string(), Attr::One(Some(Box::new(record))));
        }
        self
    }

    /// A plain attribute value. Never queries; hidden names read as `None`.
    pub fn attr_value(&self, name: &str) -> Option<&Value> {
        if self.def.is_hidden(name) {
            return None;
        }
        self.data.get(name).and_then(Attr::as_value)
    }

    /// Any bag entry, loaded relations included.
    pub fn attr(&self, name: &str) -> Option<&Attr> {
        if self.def.is_hidden(name) {
            return None;
        }
        self.data.get(name)
    }

    /// Whether the attribute is present and not null.
    pub fn has(&self, name: &str) -> bool {
        match self.attr(name) {
            Some(Attr::Value(v)) => !v.is_null(),
            Some(Attr::One(one)) => one.is_some(),
            Some(Attr::Many(many)) => many.is_some(),
            None => false,
        }
    }

    /// Remove an attribute from the bag.
    pub fn unset(&mut self, name: &str) -> &mut Self {
        self.data.shift_remove(name);
        self
    }

    /// Set an attribute without the hidden-name check.
    pub fn data(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.data.insert(name.to_string(), Attr::Value(value.into()));
        self
    }

    /// Merge a mapping into the bag (no hidden-name check).
    pub fn merge(&mut self, values: Row) -> &mut Self {
        for (name, value) in values {
            self.data.insert(name, Attr::Value(value));
        }
        self
    }

    /// The whole bag as a plain mapping.
    pub fn get_data(&self) -> Row {
        self.data
            .iter()
            .map(|(k, attr)| (k.clone(), attr.to_value()))
            .collect()
    }

    /// The primary key value, when present and non-empty.
    pub fn pk(&self) -> Option<&Value> {
        self.data
            .get(&self.def.primary_key)
            .and_then(Attr::as_value)
            .filter(|v| !is_empty_value(v))
    }

    /// Lazily resolve a declared relation, memoizing the result in the bag.
    ///
    /// hasOne relations fetch the target by the id stored under the
    /// relation's key; hasMany relations fetch every target row whose foreign
    /// key equals this record's primary key.
    pub async fn relation(&mut self, name: &str) -> OrmResult<Related> {
        if let Some(attr @ (Attr::One(_) | Attr::Many(_))) = self.data.get(name) {
            return Ok(Related::from_attr(attr));
        }
        let rel = self
            .def
            .relations
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::Relation(name.to_string()))?;

        let loaded =
            relation::load(&self.session, &self.def, &self.data, name, &rel, ReturnType::Object).await?;
        let related = Related::from_attr(&loaded);
        self.data.insert(name.to_string(), loaded);
        Ok(related)
    }

    // ==================== serialization ====================

    /// The bag as a plain mapping with nested records flattened. Hidden
    /// names are left out.
    pub fn to_array(&self) -> Row {
        self.data
            .iter()
            .filter(|(k, _)| !self.def.is_hidden(k))
            .map(|(k, attr)| (k.clone(), attr.to_value()))
            .collect()
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.to_array()).to_string()
    }

    // ==================== builder: conditions ====================

    /// `column = value`, AND-ed.
    pub fn where_(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.where_cond(column, value, "=", Logic::And)
    }

    pub fn where_op(&mut self, column: &str, value: impl Into<Value>, op: &str) -> &mut Self {
        self.where_cond(column, value, op, Logic::And)
    }

    pub fn where_cond(&mut self, column: &str, value: impl Into<Value>, op: &str, logic: Logic) -> &mut Self {
        self.db.where_cond(column, value.into(), op, logic);
        self
    }

    pub fn or_where(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.where_cond(column, value, "=", Logic::Or)
    }

    pub fn or_where_op(&mut self, column: &str, value: impl Into<Value>, op: &str) -> &mut Self {
        self.where_cond(column, value, op, Logic::Or)
    }

    /// A raw SQL condition, AND-ed.
    pub fn where_raw(&mut self, expr: &str) -> &mut Self {
        self.db.where_raw(expr, Logic::And);
        self
    }

    pub fn or_where_raw(&mut self, expr: &str) -> &mut Self {
        self.db.where_raw(expr, Logic::Or);
        self
    }

    /// Several `(column, value, operator)` conditions, AND-ed.
    pub fn where_all<'a, I>(&mut self, conditions: I) -> &mut Self
    where
        I: IntoIterator<Item = (&'a str, Value, &'a str)>,
    {
        for (column, value, op) in conditions {
            self.where_cond(column, value, op, Logic::And);
        }
        self
    }

    /// Filter a timestamp column by a named range (`today`, `last month`,
    /// `w`, ...) or, for anything else, `>=` a point in time.
    pub fn where_time(&mut self, field: &str, op: &str) -> &mut Self {
        self.time_filter(field, op, None, Logic::And)
    }

    /// Filter a timestamp column with an explicit operator.
    pub fn where_time_range(&mut self, field: &str, op: &str, range: impl Into<TimeExpr>) -> &mut Self {
        self.time_filter(field, op, Some(range.into()), Logic::And)
    }

    pub fn or_where_time(&mut self, field: &str, op: &str) -> &mut Self {
        self.time_filter(field, op, None, Logic::Or)
    }

    pub fn or_where_time_range(&mut self, field: &str, op: &str, range: impl Into<TimeExpr>) -> &mut Self {
        self.time_filter(field, op, Some(range.into()), Logic::Or)
    }

    fn time_filter(&mut self, field: &str, op: &str, range: Option<TimeExpr>, logic: Logic) -> &mut Self {
        match time_range::resolve(op, range.as_ref()) {
            Ok(filter) => {
                self.db.where_cond(field, filter.value, &filter.op, logic);
            }
            Err(e) => self.db.fail(e),
        }
        self
    }

    // ==================== builder: shape ====================

    /// Join another table (`"profiles p"`); see [`Db::join`].
    pub fn join(&mut self, table: &str, condition: &str, join_type: &str) -> &mut Self {
        if !table.trim().is_empty() {
            self.db.join(table, condition, join_type);
        }
        self
    }

    pub fn group_by(&mut self, field: &str) -> &mut Self {
        if !field.trim().is_empty() {
            self.db.group_by(field);
        }
        self
    }

    pub fn order_by(&mut self, field: &str, direction: &str) -> &mut Self {
        if !field.trim().is_empty() {
            self.db.order_by(field, direction, None);
        }
        self
    }

    /// `"field"` or `"field dir"`; the direction defaults to `DESC`.
    pub fn order(&mut self, expr: &str) -> &mut Self {
        let mut parts = expr.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(field), Some(direction)) => self.order_by(field, direction),
            (Some(field), None) => self.order_by(field, "DESC"),
            _ => self,
        }
    }

    /// Order by the position of `field`'s value in `values`.
    pub fn order_custom(&mut self, field: &str, direction: &str, values: Vec<Value>) -> &mut Self {
        self.db.order_by(field, direction, Some(values));
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.db.set_query_option(QueryOption::Distinct);
        self
    }

    /// Lock selected rows (`FOR UPDATE`).
    pub fn lock(&mut self) -> &mut Self {
        self.db.set_query_option(QueryOption::ForUpdate);
        self
    }

    pub fn set_query_option(&mut self, option: QueryOption) -> &mut Self {
        self.db.set_query_option(option);
        self
    }

    /// Lock a whole table for the rest of the transaction.
    pub async fn lock_table(&mut self, table: &str, mode: LockMode) -> OrmResult<()> {
        self.db.lock_table(table, mode).await
    }

    /// Alias the record's table in the next statement.
    pub fn alias(&mut self, alias: &str) -> &mut Self {
        self.alias = Some(alias.to_string()).filter(|a| !a.is_empty());
        self
    }

    /// Projection for the next read: a comma-separated column list, or a raw
    /// expression when it contains `<`, quotes or parentheses.
    pub fn field(&mut self, spec: &str) -> &mut Self {
        if spec.contains(['<', '\'', '"', '(']) {
            self.fields = Some(spec.to_string());
        } else {
            let columns: Vec<&str> = spec.split(',').map(str::trim).filter(|c| !c.is_empty()).collect();
            self.fields = Some(columns.join(", ")).filter(|f| !f.is_empty());
        }
        self
    }

    /// Projection of `(column, alias)` pairs; an empty alias keeps the name.
    pub fn fields_aliased<'a, I>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let columns: Vec<String> = columns
            .into_iter()
            .map(|(column, alias)| {
                if alias.is_empty() {
                    column.to_string()
                } else {
                    format!("{column} {alias}")
                }
            })
            .collect();
        self.fields = Some(columns.join(", ")).filter(|f| !f.is_empty());
        self
    }

    pub fn limit(&mut self, count: u64) -> &mut Self {
        self.limit = Some(Limit::Count(count));
        self
    }

    pub fn limit_offset(&mut self, offset: u64, count: u64) -> &mut Self {
        self.limit = Some(Limit::Range { offset, count });
        self
    }

    /// Limit to one page of `rows` rows (page < 1 reads as 1, rows < 1 as 10).
    pub fn page(&mut self, page: u64, rows: u64) -> &mut Self {
        let page = page.max(1);
        let rows = if rows < 1 { 10 } else { rows };
        self.limit_offset((page - 1) * rows, rows)
    }

    /// Eager load a declared relation in the next read. hasOne relations are
    /// joined; hasMany relations are fetched after the rows.
    pub fn with(&mut self, name: &str) -> &mut Self {
        self.with_alias(name, name)
    }

    /// Like [`Record::with`], joining the related table under `alias`.
    pub fn with_alias(&mut self, name: &str, alias: &str) -> &mut Self {
        match self.def.relations.get(name) {
            Some(rel) => {
                let mut rel = rel.clone();
                rel.alias = Some(alias.to_string()).filter(|a| !a.is_empty());
                self.with.insert(name.to_string(), rel);
            }
            None => {
                self.unknown_relation.get_or_insert_with(|| name.to_string());
            }
        }
        if self.alias.is_none() && !self.def.table.is_empty() {
            self.alias = Some(self.def.table.clone());
        }
        self
    }

    pub fn array_builder(&mut self) -> &mut Self {
        self.return_type = ReturnType::Array;
        self
    }

    pub fn json_builder(&mut self) -> &mut Self {
        self.return_type = ReturnType::Json;
        self
    }

    pub fn object_builder(&mut self) -> &mut Self {
        self.return_type = ReturnType::Object;
        self
    }

    /// SQL text of the last executed statement.
    pub fn last_sql(&self) -> Option<&str> {
        self.db.last_query()
    }

    // ==================== transactions ====================

    pub async fn start_transaction(&self) -> OrmResult<()> {
        self.session.start_transaction().await
    }

    pub async fn commit(&self) -> OrmResult<()> {
        self.session.commit().await
    }

    pub async fn rollback(&self) -> OrmResult<()> {
        self.session.rollback().await
    }

    /// `"table"` or `"table alias"` for the next statement (unprefixed).
    fn take_table_spec(&mut self) -> String {
        match self.alias.take() {
            Some(alias) => format!("{} {}", self.def.table, alias),
            None => self.def.table.clone(),
        }
    }

    /// Drop every piece of builder state, here and in the collaborator.
    pub fn reset(&mut self) -> &mut Self {
        self.fields = None;
        self.limit = None;
        self.alias = None;
        self.with.clear();
        self.unknown_relation = None;
        self.db.reset();
        self
    }
}

/// Empty the way a missing primary key is empty: null, `""`, `0`, `false`.
pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty() || s == "0",
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_array().serialize(serializer)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}
