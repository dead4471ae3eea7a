//! Field validation run before every write.
//!
//! Each declared field is checked for presence (when required) and against
//! the pattern of its [`FieldType`]. All violations are collected; nothing
//! fails fast.

use crate::model::{FieldType, ModelDef};
use crate::row::{Row, scalar_to_string};
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock};

const INT_PATTERN: &str = r"^[0-9]*$";
const DOUBLE_PATTERN: &str = r"^[0-9\.]*$";
const BOOL_PATTERN: &str = r"(?i)^(yes|no|0|1|true|false)$";
const DATETIME_PATTERN: &str = r"^[0-9a-zA-Z -:]*$";

/// One violation: `table.field` and the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl Serialize for ValidationError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.field, &self.message)?;
        map.end()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

/// Violations accumulated by the last write attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    /// Message recorded for `table.field`, if any.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Whether a value compares equal to null under loose comparison
/// (`null`, `""`, `false`, `0`, `0.0`).
fn is_loosely_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

/// Translate a `/body/flags` pattern into a plain regex. Patterns without
/// delimiters are used as they are. Returns `None` for unsupported flags.
fn translate_pattern(pattern: &str) -> Option<String> {
    let mut chars = pattern.chars();
    let Some(delim) = chars.next() else {
        return Some(String::new());
    };
    if delim.is_ascii_alphanumeric() || delim.is_whitespace() || delim == '\\' || delim == '^' {
        return Some(pattern.to_string());
    }

    let end = match delim {
        '(' => ')',
        '{' => '}',
        '[' => ']',
        '<' => '>',
        d => d,
    };
    let close = pattern.rfind(end).filter(|&i| i > 0)?;
    let body = &pattern[delim.len_utf8()..close];
    let flags = &pattern[close + end.len_utf8()..];

    let mut inline = String::new();
    for flag in flags.chars() {
        match flag {
            'i' | 'm' | 's' | 'x' => inline.push(flag),
            'u' => {}
            _ => return None,
        }
    }
    if inline.is_empty() {
        Some(body.to_string())
    } else {
        Some(format!("(?{inline}){body}"))
    }
}

/// Compile (and cache) a pattern. Invalid patterns yield `None`.
fn compiled(pattern: &str) -> Option<Regex> {
    static CACHE: OnceLock<Mutex<HashMap<String, Option<Regex>>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    cache
        .entry(pattern.to_string())
        .or_insert_with(|| translate_pattern(pattern).and_then(|p| Regex::new(&p).ok()))
        .clone()
}

fn pattern_for(ty: &FieldType) -> Option<&str> {
    match ty {
        FieldType::Text => None,
        FieldType::Int => Some(INT_PATTERN),
        FieldType::Double => Some(DOUBLE_PATTERN),
        FieldType::Bool => Some(BOOL_PATTERN),
        FieldType::Datetime => Some(DATETIME_PATTERN),
        FieldType::Pattern(p) if p.is_empty() => None,
        FieldType::Pattern(p) => Some(p),
    }
}

/// Validate a prepared write payload against the model's declared fields.
///
/// Models without declared fields always pass. List and object values are
/// not checked.
pub fn validate(def: &ModelDef, data: &Row) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    for (name, field) in &def.db_fields {
        let value = data.get(name).unwrap_or(&Value::Null);
        if matches!(value, Value::Array(_) | Value::Object(_)) {
            continue;
        }

        let key = format!("{}.{}", def.table, name);
        let text = scalar_to_string(value);
        if field.required && text.is_empty() {
            errors.push(key, "is required");
            continue;
        }
        if is_loosely_null(value) {
            continue;
        }

        let Some(pattern) = pattern_for(&field.ty) else {
            continue;
        };
        let matched = compiled(pattern).is_some_and(|re| re.is_match(&text));
        if !matched {
            errors.push(key, format!("{} validation failed", field.ty.name()));
        }
    }

    errors
}
