//! Session: the handle records are created from.

use crate::client::Executor;
use crate::context::OrmContext;
use crate::db::Db;
use crate::error::{OrmError, OrmResult};
use crate::model::ModelDef;
use crate::monitor::{NoopMonitor, QueryMonitor};
use crate::record::Record;
use crate::registry::Registry;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

struct SessionInner {
    executor: Arc<dyn Executor>,
    registry: Arc<Registry>,
    context: Arc<OrmContext>,
    prefix: String,
    monitor: Arc<dyn QueryMonitor>,
    in_transaction: AtomicBool,
}

/// Cheap-clone handle bundling an executor, the model registry, the
/// pagination context, the table prefix and the query monitor.
///
/// A session wraps a single connection. Give each request (or task) its own
/// session so transactions and page counts never leak between them.
///
/// ```ignore
/// let session = Session::builder(client)
///     .registry(registry)
///     .prefix("shop_")
///     .monitor(LoggingMonitor::new())
///     .build();
///
/// let mut users = session.model("User")?;
/// let page = users.where_("status", 1).paginate(1).await?;
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("prefix", &self.inner.prefix)
            .field("models", &self.inner.registry.len())
            .field("page_limit", &self.inner.context.page_limit())
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// A session with an empty registry, default context and no prefix.
    pub fn new(executor: impl Executor + 'static) -> Self {
        Self::builder(executor).build()
    }

    pub fn builder(executor: impl Executor + 'static) -> SessionBuilder {
        SessionBuilder::new(Arc::new(executor))
    }

    pub fn executor(&self) -> &dyn Executor {
        self.inner.executor.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn context(&self) -> &OrmContext {
        &self.inner.context
    }

    /// Prefix prepended to every table name.
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    pub fn monitor(&self) -> &dyn QueryMonitor {
        self.inner.monitor.as_ref()
    }

    /// A fresh query collaborator bound to this session.
    pub fn db(&self) -> Db {
        Db::new(self.clone())
    }

    /// An empty record of a registered model.
    pub fn model(&self, name: &str) -> OrmResult<Record> {
        let def = self.registry().resolve(name)?;
        Ok(Record::new(self.clone(), def))
    }

    /// An empty record over an ad hoc table with no declarations.
    ///
    /// Characters outside `[-A-Za-z0-9_]` are stripped from the name.
    pub fn table(&self, name: &str) -> Record {
        let table: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        Record::new(self.clone(), Arc::new(ModelDef::new(&table).table(&table)))
    }

    /// An empty record for a model definition that is not registered.
    pub fn record(&self, def: impl Into<Arc<ModelDef>>) -> Record {
        Record::new(self.clone(), def.into())
    }

    // ==================== transactions ====================

    pub fn in_transaction(&self) -> bool {
        self.inner.in_transaction.load(Ordering::Acquire)
    }

    /// Begin a transaction on the session's connection.
    pub async fn start_transaction(&self) -> OrmResult<()> {
        if self.in_transaction() {
            return Err(OrmError::Other("transaction already started".to_string()));
        }
        self.inner.executor.batch_execute("BEGIN").await?;
        self.inner.in_transaction.store(true, Ordering::Release);
        Ok(())
    }

    pub async fn commit(&self) -> OrmResult<()> {
        self.inner.executor.batch_execute("COMMIT").await?;
        self.inner.in_transaction.store(false, Ordering::Release);
        Ok(())
    }

    pub async fn rollback(&self) -> OrmResult<()> {
        self.inner.executor.batch_execute("ROLLBACK").await?;
        self.inner.in_transaction.store(false, Ordering::Release);
        Ok(())
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    executor: Arc<dyn Executor>,
    registry: Arc<Registry>,
    context: Arc<OrmContext>,
    prefix: String,
    monitor: Arc<dyn QueryMonitor>,
}

impl SessionBuilder {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            registry: Arc::new(Registry::new()),
            context: Arc::new(OrmContext::default()),
            prefix: String::new(),
            monitor: Arc::new(NoopMonitor),
        }
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Share one registry between many sessions.
    pub fn registry_arc(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn context(mut self, context: OrmContext) -> Self {
        self.context = Arc::new(context);
        self
    }

    pub fn context_arc(mut self, context: Arc<OrmContext>) -> Self {
        self.context = context;
        self
    }

    /// Rows per page used by `paginate`.
    pub fn page_limit(self, limit: usize) -> Self {
        self.context.set_page_limit(limit);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn monitor(mut self, monitor: impl QueryMonitor + 'static) -> Self {
        self.monitor = Arc::new(monitor);
        self
    }

    pub fn monitor_arc(mut self, monitor: Arc<dyn QueryMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn build(self) -> Session {
        Session {
            inner: Arc::new(SessionInner {
                executor: self.executor,
                registry: self.registry,
                context: self.context,
                prefix: self.prefix,
                monitor: self.monitor,
                in_transaction: AtomicBool::new(false),
            }),
        }
    }
}
