//! # recorm
//!
//! An active-record data-access layer over PostgreSQL.
//!
//! ## Features
//!
//! - **Dynamic records**: one [`Record`] type carries the attributes of any
//!   table, described at runtime by a [`ModelDef`]
//! - **Fluent queries**: conditions, joins, ordering, limits and pagination
//!   chained on the record and consumed by a terminal call
//! - **Relations**: hasOne/hasMany, lazily on access or eagerly with `with()`
//!   (a single nested `to_json` join for hasOne)
//! - **Column marshaling**: JSON columns and `|`-delimited list columns are
//!   decoded on read and encoded on write
//! - **Validation**: required and typed fields are checked before every
//!   write; failures leave the database untouched
//! - **Safe defaults**: UPDATE and DELETE require a WHERE clause
//! - **Query monitoring**: every statement goes through a [`QueryMonitor`]
//!
//! ## Example
//!
//! ```ignore
//! use recorm::{FieldDef, FieldType, ModelDef, Registry, Relation, Session};
//! use serde_json::json;
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(
//!         ModelDef::new("User")
//!             .field("name", FieldDef::required(FieldType::Text))
//!             .json_fields(["settings"])
//!             .relation("profile", Relation::has_one("Profile").key("profile_id")),
//!     )
//!     .register(ModelDef::new("Profile"));
//!
//! let session = Session::builder(client).registry(registry).build();
//!
//! // Read
//! let users = session
//!     .model("User")?
//!     .where_("status", "active")
//!     .order("created_at DESC")
//!     .with("profile")
//!     .paginate(2)
//!     .await?;
//!
//! // Write
//! let mut user = session.model("User")?;
//! user.set("name", "alice").set("settings", json!({"theme": "dark"}));
//! if !user.save(None).await? {
//!     eprintln!("{}", user.errors());
//! }
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod model;
pub mod monitor;
pub mod record;
pub mod registry;
pub mod row;
pub mod session;
pub mod time_range;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{Executor, Param};
pub use config::{Config, DatabaseConfig};
pub use context::{DEFAULT_PAGE_LIMIT, OrmContext};
pub use db::{Condition, Db, Limit, LockMode, Logic, Operator, QueryOption, Sql};
pub use error::{OrmError, OrmResult};
pub use model::{FieldDef, FieldType, ModelDef, PreSaveHook, Relation, RelationKind, Timestamps};
pub use monitor::{
    CompositeMonitor, LoggingMonitor, NoopMonitor, QueryContext, QueryMonitor, QueryResult, QueryStats,
    QueryType, StatsMonitor,
};
pub use record::{Attr, Fetched, FetchedOne, Record, Related, ReturnType};
pub use registry::{ModelRegistration, NameStyle, Registry, parse_name};
pub use row::{Row, decode_row};
pub use session::{Session, SessionBuilder};
pub use time_range::{TimeExpr, TimeFilter};
pub use validate::{ValidationError, ValidationErrors, validate};

// Re-export inventory for model registration
pub use inventory;

#[cfg(feature = "tracing")]
pub use monitor::TracingMonitor;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_from_config, create_pool_with_config};
