use std::cell::RefCell;
use std::sync::{Arc, RwLock};

use tracing::Span;

use crate::config::Config;
use crate::job::Job;
use crate::plugin::{AttachFn, DetachFn, PluginManager, PluginToken, PluginTokenSource};
use crate::registry::Registry;
use crate::traits::{ClusterHandle, ObjectStore, SingleNode, SparqlClient, SqlIndex};

thread_local! {
    /// The job currently being processed on this thread. Each worker
    /// thread in a multi-threaded dispatch loop owns its own slot, so
    /// unlike the handler registry this needs no explicit ownership
    /// token: there is exactly one writer per thread by construction.
    static CURRENT_JOB: RefCell<Option<Job>> = const { RefCell::new(None) };
}

/// The shared execution context handed to every handler: configuration,
/// logging, the handler registry, and handles to the external services
/// (SPARQL store, object store, SQL index, cluster coordinator).
///
/// A `Context` is built once at startup and then wrapped in `Arc` and
/// shared across dispatch threads; the registry is the only part
/// mutated after construction (during plug-in attach/detach), which is
/// why it sits behind a `RwLock` rather than being directly `&mut`.
pub struct Context {
    config: Config,
    logger: Span,
    registry: RwLock<Registry>,
    tokens: PluginTokenSource,
    plugins: PluginManager,
    sparql: Arc<dyn SparqlClient>,
    store: Arc<dyn ObjectStore>,
    sql: Option<Arc<dyn SqlIndex>>,
    cluster: Arc<dyn ClusterHandle>,
}

impl Context {
    pub fn builder(config: Config) -> ContextBuilder {
        ContextBuilder {
            config,
            logger: None,
            sparql: None,
            store: None,
            sql: None,
            cluster: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn logger(&self) -> &Span {
        &self.logger
    }

    pub fn sparql(&self) -> &Arc<dyn SparqlClient> {
        &self.sparql
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn sql(&self) -> Option<&Arc<dyn SqlIndex>> {
        self.sql.as_ref()
    }

    pub fn cluster(&self) -> &Arc<dyn ClusterHandle> {
        &self.cluster
    }

    pub fn registry(&self) -> &RwLock<Registry> {
        &self.registry
    }

    /// Issue a fresh token for a plug-in about to attach. Internal
    /// built-ins use [`PluginToken::INTERNAL`] instead and never call
    /// this.
    pub fn issue_plugin_token(&self) -> PluginToken {
        self.tokens.issue()
    }

    /// Attach a plug-in: issue it a fresh token, run `attach` against
    /// this context's registry, and record `detach` to run when the
    /// plug-in is later torn down via [`Context::detach_plugin`] or
    /// [`Context::detach_all_plugins`].
    pub fn attach_plugin(&self, attach: &AttachFn, detach: Arc<DetachFn>) -> crate::error::Result<PluginToken> {
        let token = self.issue_plugin_token();
        self.plugins.attach(&self.registry, token, attach, detach)?;
        Ok(token)
    }

    /// Detach one plug-in: its registry entries are removed, then its
    /// detach hook runs. A no-op if `token` isn't currently attached.
    pub fn detach_plugin(&self, token: PluginToken) {
        self.plugins.detach(&self.registry, token);
    }

    /// Detach every attached plug-in, in reverse attachment order.
    pub fn detach_all_plugins(&self) {
        self.plugins.detach_all(&self.registry);
    }

    pub fn current_job(&self) -> Option<Job> {
        CURRENT_JOB.with(|cell| cell.borrow().clone())
    }

    pub fn set_current_job(&self, job: Option<Job>) {
        CURRENT_JOB.with(|cell| *cell.borrow_mut() = job);
    }

    /// A nested context for the bulk-import / update CLI paths: shares
    /// this context's registry, SPARQL/S3/SQL/cluster handles and
    /// plug-in token source (so tokens issued by a child never collide
    /// with its parent's), but gets its own logging span parented to
    /// this one, for one-shot CLI runs that should still nest under the
    /// daemon's logging hierarchy.
    pub fn child(self: &Arc<Self>, span_name: &'static str) -> Arc<Context> {
        Arc::new(Context {
            config: self.config.clone(),
            logger: tracing::info_span!(parent: &self.logger, "child", op = span_name),
            registry: RwLock::new(Registry::new()),
            tokens: PluginTokenSource::new(),
            plugins: PluginManager::new(),
            sparql: Arc::clone(&self.sparql),
            store: Arc::clone(&self.store),
            sql: self.sql.clone(),
            cluster: Arc::clone(&self.cluster),
        })
    }
}

/// Assembles a [`Context`]. External handles default to inert
/// single-node/no-op implementations so that unit tests exercising the
/// registry or pipeline in isolation don't need live SPARQL/S3/SQL
/// endpoints.
pub struct ContextBuilder {
    config: Config,
    logger: Option<Span>,
    sparql: Option<Arc<dyn SparqlClient>>,
    store: Option<Arc<dyn ObjectStore>>,
    sql: Option<Arc<dyn SqlIndex>>,
    cluster: Option<Arc<dyn ClusterHandle>>,
}

impl ContextBuilder {
    pub fn logger(mut self, logger: Span) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn sparql(mut self, sparql: Arc<dyn SparqlClient>) -> Self {
        self.sparql = Some(sparql);
        self
    }

    pub fn store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sql(mut self, index: Arc<dyn SqlIndex>) -> Self {
        self.sql = Some(index);
        self
    }

    pub fn cluster(mut self, cluster: Arc<dyn ClusterHandle>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn build(self) -> Arc<Context> {
        Arc::new(Context {
            config: self.config,
            logger: self.logger.unwrap_or_else(|| tracing::info_span!("twine")),
            registry: RwLock::new(Registry::new()),
            tokens: PluginTokenSource::new(),
            plugins: PluginManager::new(),
            sparql: self.sparql.unwrap_or_else(|| Arc::new(NullSparql)),
            store: self.store.unwrap_or_else(|| Arc::new(NullStore)),
            sql: self.sql,
            cluster: self.cluster.unwrap_or_else(|| Arc::new(SingleNode)),
        })
    }
}

struct NullSparql;

impl SparqlClient for NullSparql {
    fn select_graph(&self, _uri: &oxigraph::model::NamedNode) -> crate::error::Result<Vec<oxigraph::model::Triple>> {
        Ok(Vec::new())
    }

    fn put_graph(&self, _uri: &oxigraph::model::NamedNode, _triples: &[oxigraph::model::Triple]) -> crate::error::Result<()> {
        Ok(())
    }
}

struct NullStore;

impl ObjectStore for NullStore {
    fn get(&self, _key: &str) -> crate::error::Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn put(&self, _key: &str, _content_type: &str, _body: &[u8]) -> crate::error::Result<()> {
        Ok(())
    }
}
