//! Read operations.

use super::relation::{apply_joins, decode_fields, fold};
use super::{Attr, Fetched, FetchedOne, Record, ReturnType};
use crate::db::{Limit, Logic};
use crate::error::{OrmError, OrmResult};
use crate::model::Relation;
use crate::row::Row;
use indexmap::IndexMap;
use serde_json::Value;

/// Builder state taken for one read.
struct ReadPlan {
    table: String,
    fields: Option<String>,
    limit: Option<Limit>,
    with: IndexMap<String, Relation>,
}

fn number_of(value: Option<Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

impl Record {
    /// Drain the builder state and turn pending hasOne loads into joins.
    fn take_read_plan(&mut self) -> OrmResult<ReadPlan> {
        let fields = self.fields.take();
        let limit = self.limit.take();
        let with = std::mem::take(&mut self.with);
        let alias = self.alias.clone();
        let table = self.take_table_spec();

        if let Some(name) = self.unknown_relation.take() {
            self.db.reset();
            return Err(OrmError::Relation(name));
        }
        if let Err(e) = apply_joins(&mut self.db, &self.session, &self.def, alias.as_deref(), &with) {
            self.db.reset();
            return Err(e);
        }

        Ok(ReadPlan {
            table,
            fields,
            limit,
            with,
        })
    }

    async fn fold_rows(&self, rows: Vec<Row>, with: &IndexMap<String, Relation>) -> OrmResult<Vec<IndexMap<String, Attr>>> {
        let mut bags = Vec::with_capacity(rows.len());
        for mut row in rows {
            decode_fields(&self.def, &mut row);
            bags.push(fold(&self.session, &self.def, row, with, self.return_type).await?);
        }
        Ok(bags)
    }

    fn flatten(bag: IndexMap<String, Attr>) -> Row {
        bag.into_iter().map(|(k, attr)| (k, attr.to_value())).collect()
    }

    async fn materialize(&self, rows: Vec<Row>, with: &IndexMap<String, Relation>) -> OrmResult<Option<Fetched>> {
        if rows.is_empty() {
            return Ok(None);
        }
        let bags = self.fold_rows(rows, with).await?;
        let fetched = match self.return_type {
            ReturnType::Object => Fetched::Records(
                bags.into_iter()
                    .map(|bag| self.hydrate_sibling(bag))
                    .collect(),
            ),
            ReturnType::Array => Fetched::Rows(bags.into_iter().map(Self::flatten).collect()),
            ReturnType::Json => {
                let rows: Vec<Value> = bags
                    .into_iter()
                    .map(|bag| Value::Object(Self::flatten(bag)))
                    .collect();
                Fetched::Json(serde_json::to_string(&rows)?)
            }
        };
        Ok(Some(fetched))
    }

    fn hydrate_sibling(&self, bag: IndexMap<String, Attr>) -> Record {
        let mut item = Record::hydrate(self.session.clone(), self.def.clone(), bag);
        item.return_type = self.return_type;
        item
    }

    // ==================== terminal reads ====================

    /// Fetch every matching row using the pending limit and projection.
    /// Returns `None` when nothing matches.
    pub async fn get(&mut self) -> OrmResult<Option<Fetched>> {
        self.select(None, None).await
    }

    /// Fetch matching rows; `limit` and `fields` override the pending ones.
    pub async fn select(&mut self, limit: Option<Limit>, fields: Option<&str>) -> OrmResult<Option<Fetched>> {
        let plan = self.take_read_plan()?;
        let limit = limit.or(plan.limit);
        let fields = fields.map(str::to_string).or(plan.fields);

        let rows = self.db.get(&plan.table, limit, fields.as_deref()).await?;
        self.materialize(rows, &plan.with).await
    }

    /// Fetch the first matching row. Returns `None` when nothing matches.
    pub async fn get_one(&mut self) -> OrmResult<Option<FetchedOne>> {
        self.find(None).await
    }

    /// [`Record::get_one`] with an explicit projection.
    pub async fn find(&mut self, fields: Option<&str>) -> OrmResult<Option<FetchedOne>> {
        let plan = self.take_read_plan()?;
        let fields = fields.map(str::to_string).or(plan.fields);

        let Some(row) = self.db.get_one(&plan.table, fields.as_deref()).await? else {
            return Ok(None);
        };
        let mut bags = self.fold_rows(vec![row], &plan.with).await?;
        let Some(bag) = bags.pop() else {
            return Ok(None);
        };

        let one = match self.return_type {
            ReturnType::Object => FetchedOne::Record(Box::new(self.hydrate_sibling(bag))),
            ReturnType::Array => FetchedOne::Row(Self::flatten(bag)),
            ReturnType::Json => FetchedOne::Json(Value::Object(Self::flatten(bag)).to_string()),
        };
        Ok(Some(one))
    }

    /// Fetch one row by primary key.
    pub async fn by_id(&mut self, id: impl Into<Value>) -> OrmResult<Option<FetchedOne>> {
        let column = match &self.alias {
            Some(alias) => format!("{alias}.{}", self.def.primary_key),
            None => format!("{}{}.{}", self.session.prefix(), self.def.table, self.def.primary_key),
        };
        self.where_cond(&column, id, "=", Logic::And);
        self.get_one().await
    }

    /// One page of matching rows; the page size comes from the session
    /// context. The page count is readable afterwards through
    /// `db().total_pages()` and the context.
    pub async fn paginate(&mut self, page: u64) -> OrmResult<Option<Fetched>> {
        self.paginate_fields(page, None).await
    }

    pub async fn paginate_fields(&mut self, page: u64, fields: Option<&str>) -> OrmResult<Option<Fetched>> {
        let plan = self.take_read_plan()?;
        let fields = fields.map(str::to_string).or(plan.fields);

        let rows = self.db.paginate(&plan.table, page, fields.as_deref()).await?;
        self.materialize(rows, &plan.with).await
    }

    async fn aggregate(&mut self, expr: String) -> OrmResult<Option<Value>> {
        let plan = self.take_read_plan()?;
        self.db.get_value(&plan.table, &expr).await
    }

    /// `count(*)` of the matching rows.
    pub async fn count(&mut self) -> OrmResult<u64> {
        self.count_field("*").await
    }

    /// `count(field)` of the matching rows; 0 when the query yields nothing.
    pub async fn count_field(&mut self, field: &str) -> OrmResult<u64> {
        let value = self.aggregate(format!("count({field})")).await?;
        Ok(number_of(value) as u64)
    }

    /// `sum(field)` of the matching rows; 0 when the query yields nothing.
    pub async fn sum(&mut self, field: &str) -> OrmResult<f64> {
        let value = self.aggregate(format!("sum({field})")).await?;
        Ok(number_of(value))
    }

    /// Single-column extraction.
    ///
    /// With `limit == Some(1)` the result is the first value (or `None`);
    /// otherwise it is a JSON array with one value per fetched row.
    pub async fn get_value(&mut self, field: &str, limit: Option<u64>) -> OrmResult<Option<Value>> {
        let mut plan = self.take_read_plan()?;
        let column = match field.trim() {
            "" => plan.fields.take(),
            f => Some(f.to_string()),
        };
        let Some(column) = column else {
            self.db.reset();
            return Err(OrmError::invalid_query("get_value needs a column expression"));
        };
        let projection = format!("{column} AS retval");
        let rows = self.db.get(&plan.table, limit.map(Limit::Count), Some(&projection)).await?;
        self.data.shift_remove("retval");

        if rows.is_empty() {
            return Ok(None);
        }
        let mut values = rows.into_iter().map(|mut row| row.remove("retval").unwrap_or(Value::Null));
        if limit == Some(1) {
            return Ok(values.next().filter(|v| !v.is_null()));
        }
        let bound = limit.map_or(usize::MAX, |l| l as usize);
        Ok(Some(Value::Array(values.take(bound).collect())))
    }

    /// First value of `field` in the matching rows.
    pub async fn value(&mut self, field: &str) -> OrmResult<Option<Value>> {
        self.get_value(field, Some(1)).await
    }

    /// Every value of `field` in the matching rows.
    pub async fn column(&mut self, field: &str) -> OrmResult<Vec<Value>> {
        match self.get_value(field, None).await? {
            Some(Value::Array(values)) => Ok(values),
            _ => Ok(Vec::new()),
        }
    }
}
