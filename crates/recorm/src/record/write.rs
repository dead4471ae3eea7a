//! Write operations: insert, update, delete, save.

use super::{Attr, Record, is_empty_value};
use crate::db::Logic;
use crate::error::OrmResult;
use crate::model::ModelDef;
use crate::row::{Row, scalar_to_string};
use crate::validate::{ValidationErrors, validate};
use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;

/// Encode list/object values of JSON and delimited-list fields for storage.
fn encode_field(def: &ModelDef, name: &str, value: Value) -> Value {
    if !matches!(value, Value::Array(_) | Value::Object(_)) {
        return value;
    }
    if def.is_json_field(name) {
        return Value::String(value.to_string());
    }
    match value {
        Value::Array(items) if def.is_array_field(name) => Value::String(
            items
                .iter()
                .map(scalar_to_string)
                .collect::<Vec<_>>()
                .join("|"),
        ),
        other => other,
    }
}

impl Record {
    fn save_boxed(&mut self) -> BoxFuture<'_, OrmResult<bool>> {
        self.save(None).boxed()
    }

    /// Set `column` to the current epoch seconds unless it already has a value.
    fn stamp(&mut self, column: Option<String>, now: i64) {
        let Some(column) = column else {
            return;
        };
        let present = matches!(self.data.get(&column), Some(Attr::Value(v)) if !v.is_null());
        if !present {
            self.data.insert(column, Attr::Value(Value::from(now)));
        }
    }

    /// Build the write payload from the bag.
    ///
    /// Runs the pre-save hook, persists unsaved nested records (collecting
    /// their validation errors), substitutes nested records by their primary
    /// key, keeps only declared fields (and a non-empty primary key) when any
    /// are declared and encodes JSON and list fields. Loaded relations are
    /// never written.
    async fn prepare_data(&mut self) -> OrmResult<Row> {
        self.errors = ValidationErrors::new();
        if self.data.is_empty() {
            return Ok(Row::new());
        }
        if let Some(hook) = self.def.pre_save {
            hook(self);
        }

        let def = self.def.clone();
        let mut payload = Row::new();
        for (key, attr) in self.data.iter_mut() {
            let value = match attr {
                Attr::Value(v) => v.clone(),
                Attr::One(Some(nested)) => {
                    if nested.is_new && !nested.save_boxed().await? {
                        self.errors.extend(nested.errors.clone());
                        continue;
                    }
                    if def.relations.contains_key(key) {
                        continue;
                    }
                    match nested.pk() {
                        Some(pk) => pk.clone(),
                        None => continue,
                    }
                }
                Attr::One(None) | Attr::Many(_) => continue,
            };

            let is_pk = *key == def.primary_key;
            if is_pk && is_empty_value(&value) {
                continue;
            }
            if !is_pk && !def.db_fields.is_empty() && !def.db_fields.contains_key(key) {
                continue;
            }
            payload.insert(key.clone(), encode_field(&def, key, value));
        }
        Ok(payload)
    }

    /// Validate the payload into `errors`; `false` means the write must not run.
    fn check(&mut self, payload: &Row) -> bool {
        let found = validate(&self.def, payload);
        self.errors.extend(found);
        if self.errors.is_empty() {
            return true;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: "recorm.record",
            table = %self.def.table,
            errors = %self.errors,
            "validation failed"
        );
        self.reset();
        false
    }

    /// Insert the record.
    ///
    /// `data` is merged into the bag first. Returns `Ok(false)` without
    /// touching the database when validation fails (see [`Record::errors`]).
    /// A present primary key is always sent; the key the database returns is
    /// stored back into the bag and the record stops being new.
    pub async fn insert(&mut self, data: Option<Row>) -> OrmResult<bool> {
        self.reset();
        if let Some(data) = data {
            self.merge(data);
        }
        let now = Utc::now().timestamp();
        self.stamp(self.def.timestamps.create.clone(), now);
        self.stamp(self.def.timestamps.update.clone(), now);

        let payload = match self.prepare_data().await {
            Ok(payload) => payload,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };
        if !self.check(&payload) {
            return Ok(false);
        }

        let def = self.def.clone();
        let id = self
            .db
            .insert(&def.table, &payload, Some(def.primary_key.as_str()))
            .await?;
        if let Some(id) = id.filter(|id| !id.is_null()) {
            self.data.insert(def.primary_key.clone(), Attr::Value(id));
        }
        self.is_new = false;

        #[cfg(feature = "tracing")]
        tracing::debug!(target: "recorm.record", table = %def.table, pk = ?self.pk(), "inserted");
        Ok(true)
    }

    /// [`Record::insert`] with data.
    pub async fn create(&mut self, data: Row) -> OrmResult<bool> {
        self.insert(Some(data)).await
    }

    /// Insert and return the primary key (or the collaborator's last insert
    /// id). `None` when validation failed.
    pub async fn insert_get_id(&mut self, data: Row) -> OrmResult<Option<Value>> {
        if !self.insert(Some(data)).await? {
            return Ok(None);
        }
        Ok(self
            .pk()
            .cloned()
            .or_else(|| self.db.last_insert_id().cloned()))
    }

    /// Update the record.
    ///
    /// `data` goes through [`Record::set`] (hidden names are ignored). With a
    /// primary key present only that row is updated; otherwise the pending
    /// conditions select the rows.
    pub async fn update(&mut self, data: Option<Row>) -> OrmResult<bool> {
        self.update_where(data, Vec::<(&str, Value, &str)>::new()).await
    }

    /// [`Record::update`] with extra `(column, value, operator)` conditions.
    pub async fn update_where<'a, I>(&mut self, data: Option<Row>, conditions: I) -> OrmResult<bool>
    where
        I: IntoIterator<Item = (&'a str, Value, &'a str)>,
    {
        self.fields = None;
        self.limit = None;
        self.with.clear();
        self.unknown_relation = None;
        let conditions: Vec<_> = conditions.into_iter().collect();

        if let Some(data) = data {
            for (name, value) in data {
                self.set(&name, value);
            }
        }
        self.stamp(self.def.timestamps.update.clone(), Utc::now().timestamp());

        let mut payload = match self.prepare_data().await {
            Ok(payload) => payload,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };
        if !self.check(&payload) {
            return Ok(false);
        }

        for (column, value, op) in conditions {
            self.where_cond(column, value, op, Logic::And);
        }
        let def = self.def.clone();
        if let Some(pk) = self.pk().cloned() {
            payload.remove(&def.primary_key);
            self.db.where_cond(&def.primary_key, pk, "=", Logic::And);
        }
        let table = self.take_table_spec();
        self.db.update(&table, &payload).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(target: "recorm.record", table = %def.table, affected = self.db.count(), "updated");
        Ok(true)
    }

    /// Delete the record (by primary key) or, for a record without one, the
    /// rows selected by the pending conditions. Returns the affected count.
    pub async fn delete(&mut self) -> OrmResult<u64> {
        self.fields = None;
        self.limit = None;
        self.alias = None;
        self.with.clear();
        self.unknown_relation = None;

        let def = self.def.clone();
        if let Some(pk) = self.pk().cloned() {
            self.db.where_cond(&def.primary_key, pk, "=", Logic::And);
        }
        let affected = self.db.delete(&def.table).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(target: "recorm.record", table = %def.table, affected, "deleted");
        Ok(affected)
    }

    /// Insert a new record or update a persisted one.
    pub async fn save(&mut self, data: Option<Row>) -> OrmResult<bool> {
        if self.is_new {
            self.insert(data).await
        } else {
            self.update(data).await
        }
    }
}
