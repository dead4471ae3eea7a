//! Static entity declarations.
//!
//! A [`ModelDef`] describes one table: its primary key, which fields are
//! validated and how, which columns hold JSON or `|`-delimited lists, which
//! relations can be loaded, and which timestamps are stamped on write.
//!
//! ```ignore
//! let user = ModelDef::new("User")
//!     .table("users")
//!     .field("name", FieldDef::required(FieldType::Text))
//!     .field("age", FieldDef::new(FieldType::Int))
//!     .json_fields(["settings"])
//!     .array_fields(["flags"])
//!     .relation("profile", Relation::has_one("Profile").key("profile_id"))
//!     .relation("orders", Relation::has_many("Order", "user_id"))
//!     .hidden(["password"])
//!     .timestamps(Some("created_at"), Some("updated_at"));
//! ```

use crate::record::Record;
use heck::ToSnakeCase;
use indexmap::IndexMap;

/// Validation type of a declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// No pattern check.
    Text,
    Int,
    Double,
    Bool,
    Datetime,
    /// A custom regular expression, optionally in `/.../flags` form.
    Pattern(String),
}

impl FieldType {
    /// Parse a textual type name; anything unknown is a custom pattern.
    pub fn parse(name: &str) -> Self {
        match name {
            "text" => FieldType::Text,
            "int" => FieldType::Int,
            "double" => FieldType::Double,
            "bool" => FieldType::Bool,
            "datetime" => FieldType::Datetime,
            other => FieldType::Pattern(other.to_string()),
        }
    }

    /// Name used in validation messages.
    pub fn name(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Int => "int",
            FieldType::Double => "double",
            FieldType::Bool => "bool",
            FieldType::Datetime => "datetime",
            FieldType::Pattern(p) => p,
        }
    }
}

/// Validation descriptor of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub ty: FieldType,
    pub required: bool,
}

impl FieldDef {
    pub fn new(ty: FieldType) -> Self {
        Self {
            ty,
            required: false,
        }
    }

    pub fn required(ty: FieldType) -> Self {
        Self { ty, required: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// A single related record, joinable.
    HasOne,
    /// A collection of related records, always fetched with a follow-up query.
    HasMany,
}

/// A declared relation to another registered model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub kind: RelationKind,
    /// Entity name of the related model.
    pub target: String,
    /// hasOne: local column holding the target's key (defaults to the
    /// relation name for lazy loads and `<Target>id` for joins).
    /// hasMany: the target's column referencing this record's primary key.
    pub key: Option<String>,
    /// SQL join type used when the relation is eager loaded.
    pub join_type: String,
    /// Join target column overriding `<target table>.<target pk>`.
    pub primary_key: Option<String>,
    /// Table alias used for the join.
    pub alias: Option<String>,
}

impl Relation {
    pub fn has_one(target: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::HasOne,
            target: target.into(),
            key: None,
            join_type: "LEFT".to_string(),
            primary_key: None,
            alias: None,
        }
    }

    pub fn has_many(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind: RelationKind::HasMany,
            key: Some(foreign_key.into()),
            ..Self::has_one(target)
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn join_type(mut self, join_type: impl Into<String>) -> Self {
        self.join_type = join_type.into();
        self
    }

    pub fn primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = Some(primary_key.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// Columns stamped with the current epoch seconds on write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timestamps {
    /// Set on insert when absent.
    pub create: Option<String>,
    /// Set on insert and update when absent.
    pub update: Option<String>,
}

/// Hook run on the record before its write payload is prepared.
pub type PreSaveHook = fn(&mut Record);

/// The declaration of one entity.
#[derive(Debug, Clone)]
pub struct ModelDef {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub db_fields: IndexMap<String, FieldDef>,
    pub json_fields: Vec<String>,
    pub array_fields: Vec<String>,
    pub relations: IndexMap<String, Relation>,
    pub hidden: Vec<String>,
    pub timestamps: Timestamps,
    pub pre_save: Option<PreSaveHook>,
}

impl ModelDef {
    /// A model named `name` over the table `snake_case(name)` with primary key `id`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table: name.to_snake_case(),
            name,
            primary_key: "id".to_string(),
            db_fields: IndexMap::new(),
            json_fields: Vec::new(),
            array_fields: Vec::new(),
            relations: IndexMap::new(),
            hidden: Vec::new(),
            timestamps: Timestamps::default(),
            pre_save: None,
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn primary_key(mut self, pk: impl Into<String>) -> Self {
        self.primary_key = pk.into();
        self
    }

    /// Declare a validated field. Once any field is declared, writes only
    /// send declared fields.
    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.db_fields.insert(name.into(), def);
        self
    }

    pub fn json_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.json_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn array_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.array_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    /// Attribute names that can be neither set nor read.
    pub fn hidden<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn timestamps(mut self, create: Option<&str>, update: Option<&str>) -> Self {
        self.timestamps = Timestamps {
            create: create.map(str::to_string),
            update: update.map(str::to_string),
        };
        self
    }

    pub fn pre_save(mut self, hook: PreSaveHook) -> Self {
        self.pre_save = Some(hook);
        self
    }

    pub fn is_hidden(&self, name: &str) -> bool {
        self.hidden.iter().any(|h| h == name)
    }

    pub fn is_json_field(&self, name: &str) -> bool {
        self.json_fields.iter().any(|f| f == name)
    }

    pub fn is_array_field(&self, name: &str) -> bool {
        self.array_fields.iter().any(|f| f == name)
    }
}
