//! Entity name → model declaration lookup.

use crate::error::{OrmError, OrmResult};
use crate::model::ModelDef;
use heck::{ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use std::collections::HashMap;
use std::sync::Arc;

/// Registration entry for auto-registering models.
///
/// ```ignore
/// fn user() -> ModelDef {
///     ModelDef::new("User").table("users")
/// }
///
/// recorm::inventory::submit! {
///     recorm::ModelRegistration { define: user }
/// }
/// ```
pub struct ModelRegistration {
    /// Function building the model declaration.
    pub define: fn() -> ModelDef,
}

inventory::collect!(ModelRegistration);

/// Naming styles understood by [`parse_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStyle {
    /// `UserInfo` → `user_info`
    Snake,
    /// `user_info` → `UserInfo`
    UpperCamel,
    /// `user_info` → `userInfo`
    LowerCamel,
}

/// Convert an identifier between naming styles.
pub fn parse_name(name: &str, style: NameStyle) -> String {
    match style {
        NameStyle::Snake => name.to_snake_case(),
        NameStyle::UpperCamel => name.to_upper_camel_case(),
        NameStyle::LowerCamel => name.to_lower_camel_case(),
    }
}

/// Resolves entity names (as used in relation declarations) to model
/// declarations. Lookups are case-style insensitive: `"user_profile"`,
/// `"userProfile"` and `"UserProfile"` name the same entry.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    models: HashMap<String, Arc<ModelDef>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with every model submitted via [`ModelRegistration`].
    pub fn with_registered() -> Self {
        let mut registry = Self::new();
        for reg in inventory::iter::<ModelRegistration> {
            registry.register((reg.define)());
        }
        registry
    }

    /// Register (or replace) a model under its entity name.
    pub fn register(&mut self, def: ModelDef) -> &mut Self {
        let key = parse_name(&def.name, NameStyle::UpperCamel);
        self.models.insert(key, Arc::new(def));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelDef>> {
        self.models
            .get(&parse_name(name, NameStyle::UpperCamel))
            .cloned()
    }

    /// Like [`Registry::get`], failing with [`OrmError::UnknownModel`].
    pub fn resolve(&self, name: &str) -> OrmResult<Arc<ModelDef>> {
        self.get(name)
            .ok_or_else(|| OrmError::UnknownModel(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models
            .contains_key(&parse_name(name, NameStyle::UpperCamel))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
