//! Query monitoring for SQL issued by records.
//!
//! Every statement the query collaborator runs is reported to the session's
//! [`QueryMonitor`]: once before execution and once with its duration and
//! outcome.
//!
//! # Example
//!
//! ```rust,ignore
//! use recorm::monitor::{QueryContext, QueryMonitor, QueryResult};
//! use std::time::Duration;
//!
//! struct PrintMonitor;
//!
//! impl QueryMonitor for PrintMonitor {
//!     fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
//!         println!("[{:?}] {} - {}", duration, ctx.sql, result);
//!     }
//! }
//!
//! let session = Session::builder(executor).monitor(PrintMonitor).build();
//! ```

mod monitors;
mod types;

#[cfg(feature = "tracing")]
mod tracing_monitor;


pub use monitors::{CompositeMonitor, LoggingMonitor, NoopMonitor, QueryStats, StatsMonitor};
pub use types::{QueryContext, QueryMonitor, QueryResult, QueryType};

#[cfg(feature = "tracing")]
pub use tracing_monitor::TracingMonitor;

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
