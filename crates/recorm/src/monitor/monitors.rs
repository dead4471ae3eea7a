use super::truncate_sql_bytes;
use super::types::{QueryContext, QueryMonitor, QueryResult, QueryType};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Discards every event. The session default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl QueryMonitor for NoopMonitor {
    fn on_query_complete(&self, _ctx: &QueryContext, _duration: Duration, _result: &QueryResult) {}
}

/// Writes one line per statement to stderr.
///
/// ```text
/// recorm users select 1.2ms -> 3 rows | SELECT * FROM users WHERE status = $1 [1 params]
/// ```
#[derive(Debug, Clone)]
pub struct LoggingMonitor {
    /// Skip statements faster than this.
    pub min_duration: Option<Duration>,
    /// Cut the SQL text after this many bytes.
    pub max_sql_length: Option<usize>,
    /// Only log statements against these tables (prefixed names).
    pub tables: Option<Vec<String>>,
    /// Only log failed statements.
    pub failures_only: bool,
}

impl Default for LoggingMonitor {
    fn default() -> Self {
        Self {
            min_duration: None,
            max_sql_length: Some(200),
            tables: None,
            failures_only: false,
        }
    }
}

impl LoggingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only log statements slower than `duration`.
    pub fn min_duration(mut self, duration: Duration) -> Self {
        self.min_duration = Some(duration);
        self
    }

    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Restrict logging to statements whose target table is listed.
    pub fn tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    pub fn failures_only(mut self) -> Self {
        self.failures_only = true;
        self
    }

    pub(crate) fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }

    /// The line logged for one event, or `None` when it is filtered out.
    pub(crate) fn line(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) -> Option<String> {
        if self.min_duration.is_some_and(|min| duration < min) {
            return None;
        }
        if self.failures_only && !matches!(result, QueryResult::Error(_)) {
            return None;
        }
        if let Some(tables) = &self.tables {
            let table = ctx.table.as_deref()?;
            if !tables.iter().any(|t| t == table) {
                return None;
            }
        }

        let kind = match ctx.query_type {
            QueryType::Select => "select",
            QueryType::Insert => "insert",
            QueryType::Update => "update",
            QueryType::Delete => "delete",
            QueryType::Other => "other",
        };
        let mut line = format!(
            "recorm {} {kind} {duration:.1?} -> {result} | {}",
            ctx.table.as_deref().unwrap_or("-"),
            self.truncate_sql(&ctx.sql)
        );
        if ctx.param_count > 0 {
            line.push_str(&format!(" [{} params]", ctx.param_count));
        }
        Some(line)
    }
}

impl QueryMonitor for LoggingMonitor {
    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        if let Some(line) = self.line(ctx, duration, result) {
            eprintln!("{line}");
        }
    }
}

/// Snapshot of what a [`StatsMonitor`] has seen.
#[derive(Debug, Clone, Default)]
pub struct QueryStats {
    pub total_queries: u64,
    pub failed_queries: u64,
    pub total_duration: Duration,
    pub select_count: u64,
    pub insert_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
    /// Rows returned by reads.
    pub rows_read: u64,
    /// Rows touched by writes.
    pub rows_affected: u64,
    /// Statements per target table.
    pub per_table: BTreeMap<String, u64>,
    pub max_duration: Duration,
    pub slowest_query: Option<String>,
}

/// Aggregates statement counts, row counts and timings, per table too.
///
/// Share it with the session through `monitor_arc` and read it back with
/// [`StatsMonitor::stats`].
#[derive(Debug, Default)]
pub struct StatsMonitor {
    stats: Mutex<QueryStats>,
}

impl StatsMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> QueryStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn reset(&self) {
        let mut stats = self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *stats = QueryStats::default();
    }
}

impl QueryMonitor for StatsMonitor {
    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        let mut stats = self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        stats.total_queries += 1;
        stats.total_duration = stats.total_duration.saturating_add(duration);
        match ctx.query_type {
            QueryType::Select => stats.select_count += 1,
            QueryType::Insert => stats.insert_count += 1,
            QueryType::Update => stats.update_count += 1,
            QueryType::Delete => stats.delete_count += 1,
            QueryType::Other => {}
        }
        match result {
            QueryResult::Rows(n) => stats.rows_read += *n as u64,
            QueryResult::Affected(n) => stats.rows_affected += n,
            QueryResult::Error(_) => stats.failed_queries += 1,
        }
        if let Some(table) = &ctx.table {
            *stats.per_table.entry(table.clone()).or_default() += 1;
        }
        if duration > stats.max_duration {
            stats.max_duration = duration;
            stats.slowest_query = Some(ctx.sql.clone());
        }
    }
}

/// Fans every event out to several monitors, in registration order.
#[derive(Clone, Default)]
pub struct CompositeMonitor {
    monitors: Vec<Arc<dyn QueryMonitor>>,
}

impl CompositeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<M: QueryMonitor + 'static>(mut self, monitor: M) -> Self {
        self.monitors.push(Arc::new(monitor));
        self
    }

    /// Add a shared monitor (e.g. a `StatsMonitor` the caller keeps reading).
    pub fn add_arc(mut self, monitor: Arc<dyn QueryMonitor>) -> Self {
        self.monitors.push(monitor);
        self
    }
}

impl QueryMonitor for CompositeMonitor {
    fn on_query_start(&self, ctx: &QueryContext) {
        for monitor in &self.monitors {
            monitor.on_query_start(ctx);
        }
    }

    fn on_query_complete(&self, ctx: &QueryContext, duration: Duration, result: &QueryResult) {
        for monitor in &self.monitors {
            monitor.on_query_complete(ctx, duration, result);
        }
    }
}
