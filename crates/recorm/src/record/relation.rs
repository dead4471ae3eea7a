//! Relation resolution: hasOne joins, folding joined columns back into
//! nested values, and lazy follow-up fetches.

use super::{Attr, Fetched, FetchedOne, Record, ReturnType, is_empty_value};
use crate::db::{Db, Logic, QueryOption};
use crate::error::OrmResult;
use crate::model::{ModelDef, Relation, RelationKind};
use crate::row::{Row, scalar_to_string};
use crate::session::Session;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use heck::ToSnakeCase;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// Turn the hasOne entries of `with` into joins on `db`.
///
/// The join key defaults to `<Target>id`; the join target is
/// `<alias>.<pk>` or `<prefix><target table>.<pk>`, and the local side is
/// qualified with the record alias (or the prefixed table).
pub(super) fn apply_joins(
    db: &mut Db,
    session: &Session,
    def: &ModelDef,
    alias: Option<&str>,
    with: &IndexMap<String, Relation>,
) -> OrmResult<()> {
    let prefix = session.prefix();
    for rel in with.values().filter(|r| r.kind == RelationKind::HasOne) {
        let target = session.registry().resolve(&rel.target)?;
        let join_alias = rel.alias.as_deref().unwrap_or_default();

        let key = rel
            .key
            .clone()
            .unwrap_or_else(|| format!("{}id", rel.target));
        let primary_key = match &rel.primary_key {
            Some(pk) => pk.clone(),
            None if !join_alias.is_empty() => format!("{join_alias}.{}", target.primary_key),
            None => format!("{prefix}{}.{}", target.table, target.primary_key),
        };
        let on = if key.contains('.') {
            format!("{prefix}{key} = {primary_key}")
        } else {
            match alias {
                Some(alias) => format!("{alias}.{key} = {primary_key}"),
                None => format!("{prefix}{}.{key} = {primary_key}", def.table),
            }
        };

        db.set_query_option(QueryOption::NestJoin);
        db.join(&format!("{} {join_alias}", target.table), &on, &rel.join_type);
    }
    Ok(())
}

/// Decode JSON and `|`-delimited columns of a fetched row in place.
pub(crate) fn decode_fields(def: &ModelDef, row: &mut Row) {
    for name in &def.json_fields {
        if let Some(value) = row.get_mut(name) {
            if let Value::String(text) = value {
                *value = serde_json::from_str(text).unwrap_or(Value::Null);
            }
        }
    }
    for name in &def.array_fields {
        if let Some(value) = row.get_mut(name) {
            if matches!(value, Value::Array(_) | Value::Null) {
                continue;
            }
            let text = scalar_to_string(value);
            *value = Value::Array(text.split('|').map(|s| Value::String(s.to_string())).collect());
        }
    }
}

/// Fold the `with` relations of one fetched row into its attribute bag.
///
/// A joined hasOne whose nested columns are missing (or null, i.e. the join
/// found nothing) falls back to a lazy fetch. hasMany relations are always
/// fetched lazily.
pub(super) async fn fold(
    session: &Session,
    def: &ModelDef,
    row: Row,
    with: &IndexMap<String, Relation>,
    return_type: ReturnType,
) -> OrmResult<IndexMap<String, Attr>> {
    let mut bag: IndexMap<String, Attr> = row.into_iter().map(|(k, v)| (k, Attr::Value(v))).collect();

    for (name, rel) in with {
        if rel.kind == RelationKind::HasMany {
            let loaded = load(session, def, &bag, name, rel, return_type).await?;
            bag.insert(name.clone(), loaded);
            continue;
        }

        let target = session.registry().resolve(&rel.target)?;
        let label = rel.alias.clone().unwrap_or_else(|| target.table.clone());
        let nested = match bag.get(&label) {
            Some(Attr::Value(Value::Object(columns))) => Some(columns.clone()),
            _ => None,
        };

        let Some(mut columns) = nested else {
            let loaded = load(session, def, &bag, name, rel, return_type).await?;
            bag.insert(name.clone(), loaded);
            continue;
        };

        decode_fields(&target, &mut columns);
        let attr = match return_type {
            ReturnType::Object => {
                let data = columns.into_iter().map(|(k, v)| (k, Attr::Value(v))).collect();
                let mut item = Record::hydrate(session.clone(), target, data);
                item.return_type = return_type;
                Attr::One(Some(Box::new(item)))
            }
            ReturnType::Array | ReturnType::Json => Attr::Value(Value::Object(columns)),
        };
        if label != *name {
            bag.shift_remove(&label);
        }
        bag.insert(name.clone(), attr);
    }

    Ok(bag)
}

/// Fetch one relation of the record whose attributes are `bag`.
///
/// A hasOne relation reads the target id from the attribute named by its key
/// (default: the relation name). A hasMany relation filters the target on
/// its foreign key (default: `<owner>_id`) equal to the owner's primary key.
/// A missing id or primary key resolves to nothing without querying.
///
/// Related rows materialize like the owner's: records for
/// [`ReturnType::Object`], plain values otherwise.
pub(super) fn load<'a>(
    session: &'a Session,
    owner: &'a ModelDef,
    bag: &'a IndexMap<String, Attr>,
    name: &'a str,
    rel: &'a Relation,
    return_type: ReturnType,
) -> BoxFuture<'a, OrmResult<Attr>> {
    async move {
        let target: Arc<ModelDef> = session.registry().resolve(&rel.target)?;
        let mut related = Record::new(session.clone(), target);
        // Nested rows stay objects inside the owner's JSON text.
        related.return_type = match return_type {
            ReturnType::Json => ReturnType::Array,
            other => other,
        };

        match rel.kind {
            RelationKind::HasOne => {
                let key = rel.key.as_deref().unwrap_or(name);
                let id = match bag.get(key).and_then(Attr::as_value) {
                    Some(id) if !is_empty_value(id) => id.clone(),
                    _ => return Ok(Attr::One(None)),
                };
                Ok(match related.by_id(id).await? {
                    Some(FetchedOne::Record(record)) => Attr::One(Some(record)),
                    Some(FetchedOne::Row(row)) => Attr::Value(Value::Object(row)),
                    Some(FetchedOne::Json(_)) | None => Attr::One(None),
                })
            }
            RelationKind::HasMany => {
                let key = rel
                    .key
                    .clone()
                    .unwrap_or_else(|| format!("{}_id", owner.name.to_snake_case()));
                let pk = match bag.get(&owner.primary_key).and_then(Attr::as_value) {
                    Some(pk) if !is_empty_value(pk) => pk.clone(),
                    _ => return Ok(Attr::Many(None)),
                };
                let found = related.where_cond(&key, pk, "=", Logic::And).get().await?;
                Ok(match found {
                    Some(Fetched::Records(list)) => Attr::Many(Some(list)),
                    Some(Fetched::Rows(rows)) => {
                        Attr::Value(Value::Array(rows.into_iter().map(Value::Object).collect()))
                    }
                    Some(Fetched::Json(_)) | None => Attr::Many(None),
                })
            }
        }
    }
    .boxed()
}
