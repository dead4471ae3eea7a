//! Keyed configuration sections loaded once at startup.
//!
//! Every `*.toml` file of the configuration directory becomes one section
//! named after the file stem:
//!
//! ```text
//! config/
//!   database.toml   -> "database"
//!   shop.toml       -> "shop"
//! ```
//!
//! ```ignore
//! let config = Config::load_dir("system_data/config")?;
//! let host = config.get("database.db_host");
//! let db: DatabaseConfig = config.database()?;
//! ```

use crate::error::{OrmError, OrmResult};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Read-only configuration: section name → TOML table.
#[derive(Debug, Clone, Default)]
pub struct Config {
    sections: toml::Table,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.toml` file in `dir`. A missing directory yields an
    /// empty configuration.
    pub fn load_dir(dir: impl AsRef<Path>) -> OrmResult<Self> {
        let dir = dir.as_ref();
        let mut config = Self::new();
        if !dir.is_dir() {
            return Ok(config);
        }

        let entries = fs::read_dir(dir).map_err(|e| OrmError::Config(format!("{}: {e}", dir.display())))?;
        let mut paths: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        for path in paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = fs::read_to_string(&path)
                .map_err(|e| OrmError::Config(format!("{}: {e}", path.display())))?;
            config
                .load_str(name, &text)
                .map_err(|e| OrmError::Config(format!("{}: {e}", path.display())))?;
        }
        Ok(config)
    }

    /// Parse TOML text into the section `name`, replacing any previous one.
    pub fn load_str(&mut self, name: &str, text: &str) -> OrmResult<()> {
        let table: toml::Table = text.parse().map_err(|e: toml::de::Error| OrmError::Config(e.to_string()))?;
        self.sections.insert(name.to_string(), toml::Value::Table(table));
        Ok(())
    }

    /// Dotted lookup: `"database.db_host"`, `"shop.limits.max_items"`.
    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        let mut parts = key.split('.');
        let mut current = self.sections.get(parts.next()?)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Deserialize a whole section.
    pub fn section<T: DeserializeOwned>(&self, name: &str) -> OrmResult<T> {
        let value = self
            .sections
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::Config(format!("missing config section '{name}'")))?;
        value
            .try_into()
            .map_err(|e: toml::de::Error| OrmError::Config(format!("section '{name}': {e}")))
    }

    /// The `database` section, with `DATABASE_URL` (environment or `.env`)
    /// taking precedence over the file values.
    pub fn database(&self) -> OrmResult<DatabaseConfig> {
        let db: DatabaseConfig = if self.has_section("database") {
            self.section("database")?
        } else {
            DatabaseConfig::default()
        };
        dotenvy::dotenv().ok();
        Ok(db.with_url_override(dotenvy::var("DATABASE_URL").ok()))
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_max_connections() -> usize {
    16
}

/// Database connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub db_host: String,
    #[serde(default = "default_port")]
    pub db_port: u16,
    #[serde(default)]
    pub db_user: String,
    #[serde(default)]
    pub db_pass: String,
    #[serde(default)]
    pub db_name: String,
    /// Table prefix applied to every table name.
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Full connection URL; overrides the individual fields when set.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_host: default_host(),
            db_port: default_port(),
            db_user: String::new(),
            db_pass: String::new(),
            db_name: String::new(),
            prefix: String::new(),
            max_connections: default_max_connections(),
            url: None,
        }
    }
}

impl DatabaseConfig {
    pub fn with_url_override(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.url = Some(url);
        }
        self
    }

    /// Driver configuration for these parameters.
    pub fn pg_config(&self) -> OrmResult<tokio_postgres::Config> {
        if let Some(url) = &self.url {
            return url
                .parse()
                .map_err(|e: tokio_postgres::Error| OrmError::Connection(e.to_string()));
        }

        let mut config = tokio_postgres::Config::new();
        config.host(&self.db_host).port(self.db_port);
        if !self.db_user.is_empty() {
            config.user(&self.db_user);
        }
        if !self.db_pass.is_empty() {
            config.password(&self.db_pass);
        }
        if !self.db_name.is_empty() {
            config.dbname(&self.db_name);
        }
        Ok(config)
    }
}
