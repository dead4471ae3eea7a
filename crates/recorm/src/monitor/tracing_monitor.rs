use super::truncate_sql_bytes;
use super::types::{QueryContext, QueryMonitor, QueryResult};
use std::time::Duration;
use tracing::Level;

/// A `tracing`-based monitor that emits every statement record helpers run.
///
/// Events use the target `recorm.sql`; failures are always emitted at `WARN`.
///
/// Enable via the crate feature: `recorm = { features = ["tracing"] }`.
#[derive(Debug, Clone)]
pub struct TracingMonitor {
    /// Tracing event level for successful statements.
    pub level: Level,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for TracingMonitor {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            max_sql_length: Some(200),
        }
    }
}

impl TracingMonitor {
    /// Create a new monitor with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }
}

impl QueryMonitor for TracingMonitor {
    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        /// Dispatch a tracing event at a runtime-determined level.
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        let sql = self.truncate_sql(&ctx.sql);
        let table = ctx.table.as_deref().unwrap_or("-");
        if let QueryResult::Error(message) = result {
            tracing::warn!(
                target: "recorm.sql",
                query_type = ?ctx.query_type,
                table,
                ?duration,
                error = %message,
                sql = %sql,
            );
            return;
        }
        emit_at_level!(
            self.level,
            target: "recorm.sql",
            query_type = ?ctx.query_type,
            table,
            param_count = ctx.param_count,
            ?duration,
            result = %result,
            sql = %sql,
        );
    }
}
