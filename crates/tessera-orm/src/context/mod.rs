//! Sessions over one database connection.
//!
//! A [`DbContext`] owns an [`Executor`], compiles definitions, runs them in
//! submission order and rebuilds nested results. It scopes connections and
//! transactions around async callbacks, queues prepared writes, answers
//! repeated selects from a short-lived cache and drives migrations.
//!
//! ```rust,ignore
//! let ctx = DbContext::builder(executor)
//!     .database("Main")
//!     .schema("dbo")
//!     .model::<Employee>()
//!     .build()?;
//!
//! let adults = ctx
//!     .connect(|db| async move {
//!         db.query::<Employee>()
//!             .where_clause(|e| vec![expr::greater_than_or_equal(e.col("age"), 18)])
//!             .result(&db)
//!             .await
//!     })
//!     .await?;
//! ```

mod cache;
mod executor;

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use tessera_core::dialect::Dialect;
use tessera_core::schema::{Model, ModelRegistry};
use tessera_core::{QueryCompiler, QueryDef, TableName};

use crate::config::ContextConfig;
use crate::error::{BoxError, OrmError, Result};
use crate::graph::QueryGraph;
use crate::migration::Migration;
use crate::result::{parse_rows, ParseOption, Row};
use crate::scope::QueryScope;

use cache::SelectCache;
pub use executor::{BulkColumn, Executor, IsolationLevel};

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No connection.
    Ready,
    /// Connected, outside a transaction.
    Connected,
    /// Inside a transaction.
    Transacting,
}

#[derive(Debug)]
struct Prepared {
    statements: Vec<String>,
    option: Option<ParseOption>,
    keep: bool,
}

#[derive(Debug)]
struct State {
    status: SessionStatus,
    prepared: Vec<Prepared>,
    cache: SelectCache,
}

struct Inner {
    executor: AsyncMutex<Box<dyn Executor>>,
    state: Mutex<State>,
    scope: Arc<QueryScope>,
    compiler: QueryCompiler,
    models: ModelRegistry,
    migrations: Vec<Arc<dyn Migration>>,
}

/// A session: one logical connection, its transaction, prepared queue and
/// select cache.
///
/// Cloning is cheap and yields a handle to the same session. Statements
/// issued through any handle run one at a time, in order.
#[derive(Clone)]
pub struct DbContext {
    inner: Arc<Inner>,
}

impl fmt::Debug for DbContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbContext")
            .field("scope", &self.inner.scope)
            .field("status", &self.status())
            .field("models", &self.inner.models.len())
            .field("migrations", &self.inner.migrations.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`DbContext`].
pub struct DbContextBuilder {
    executor: Box<dyn Executor>,
    config: ContextConfig,
    dialect: Option<Arc<dyn Dialect>>,
    models: ModelRegistry,
    migrations: Vec<Arc<dyn Migration>>,
}

impl fmt::Debug for DbContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbContextBuilder")
            .field("executor", &self.executor)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DbContextBuilder {
    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the default database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = Some(database.into());
        self
    }

    /// Sets the default schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.config.schema = Some(schema.into());
        self
    }

    /// Uses a dialect instead of the configured one.
    #[must_use]
    pub fn dialect(mut self, dialect: Arc<dyn Dialect>) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Sets the select cache window. Zero disables the cache.
    #[must_use]
    pub fn select_cache_window(mut self, window: Duration) -> Self {
        self.config = self.config.select_cache_window(window);
        self
    }

    /// Registers a model for initialization.
    #[must_use]
    pub fn model<M: Model>(mut self) -> Self {
        self.models = self.models.register::<M>();
        self
    }

    /// Registers every model of a registry.
    #[must_use]
    pub fn models(mut self, models: &ModelRegistry) -> Self {
        for model in models.iter() {
            self.models.add(*model);
        }
        self
    }

    /// Registers a migration.
    #[must_use]
    pub fn migration(mut self, migration: impl Migration) -> Self {
        self.migrations.push(Arc::new(migration));
        self
    }

    /// Builds the session. Fails on an unknown dialect name.
    pub fn build(self) -> Result<DbContext> {
        let dialect = match self.dialect {
            Some(dialect) => dialect,
            None => self.config.resolve_dialect()?,
        };
        let mut scope = QueryScope::new(Arc::clone(&dialect));
        if let Some(database) = &self.config.database {
            scope = scope.database(database);
        }
        if let Some(schema) = &self.config.schema {
            scope = scope.schema(schema);
        }

        Ok(DbContext {
            inner: Arc::new(Inner {
                executor: AsyncMutex::new(self.executor),
                state: Mutex::new(State {
                    status: SessionStatus::Ready,
                    prepared: Vec::new(),
                    cache: SelectCache::new(self.config.cache_window()),
                }),
                scope: Arc::new(scope),
                compiler: QueryCompiler::new(dialect),
                models: self.models,
                migrations: self.migrations,
            }),
        })
    }
}

impl DbContext {
    /// Starts building a session over `executor`.
    #[must_use]
    pub fn builder(executor: impl Executor) -> DbContextBuilder {
        DbContextBuilder {
            executor: Box::new(executor),
            config: ContextConfig::default(),
            dialect: None,
            models: ModelRegistry::new(),
            migrations: Vec::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: SessionStatus) {
        self.state().status = status;
    }

    /// Current connection state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.state().status
    }

    /// Defaults and dialect graphs of this session resolve names against.
    #[must_use]
    pub fn scope(&self) -> &Arc<QueryScope> {
        &self.inner.scope
    }

    /// The compiler statements are produced with.
    #[must_use]
    pub fn compiler(&self) -> &QueryCompiler {
        &self.inner.compiler
    }

    /// Registered models.
    #[must_use]
    pub fn models(&self) -> &ModelRegistry {
        &self.inner.models
    }

    pub(crate) fn migrations(&self) -> &[Arc<dyn Migration>] {
        &self.inner.migrations
    }

    /// A graph over the table of `M`.
    #[must_use]
    pub fn query<M: Model>(&self) -> QueryGraph<M> {
        QueryGraph::new(Arc::clone(&self.inner.scope))
    }

    /// Connects, runs `f` inside a transaction, commits and closes.
    ///
    /// When `f` fails the transaction is rolled back, the connection closed
    /// and the error returned.
    pub async fn connect<F, Fut, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        self.connect_isolated(None, f).await
    }

    /// [`DbContext::connect`] with an explicit isolation level.
    pub async fn connect_isolated<F, Fut, R>(
        &self,
        isolation: Option<IsolationLevel>,
        f: F,
    ) -> Result<R>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        self.open().await?;
        if let Err(e) = self.begin(isolation).await {
            self.shutdown().await.ok();
            return Err(e);
        }

        let outcome = f(self.clone()).await;
        if self.status() == SessionStatus::Ready {
            return outcome;
        }
        let result = match outcome {
            Ok(value) => match self.commit().await {
                Ok(()) => Ok(value),
                Err(e) => Err(self.roll_back(e).await),
            },
            Err(e) => Err(self.roll_back(e).await),
        };
        let closed = self.shutdown().await;
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Connects, runs `f` without a transaction and closes.
    pub async fn connect_without_transaction<F, Fut, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        self.open().await?;
        let result = f(self.clone()).await;
        if self.status() == SessionStatus::Ready {
            return result;
        }
        let closed = self.shutdown().await;
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Runs `f` in a transaction on the open connection.
    ///
    /// Fails when not connected or already transacting. A failure of `f`
    /// rolls back and closes the connection.
    pub async fn transaction<F, Fut, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        self.transaction_isolated(None, f).await
    }

    /// [`DbContext::transaction`] with an explicit isolation level.
    pub async fn transaction_isolated<F, Fut, R>(
        &self,
        isolation: Option<IsolationLevel>,
        f: F,
    ) -> Result<R>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        match self.status() {
            SessionStatus::Ready => {
                return Err(OrmError::Session(String::from("not connected")));
            }
            SessionStatus::Transacting => {
                return Err(OrmError::Session(String::from("already in a transaction")));
            }
            SessionStatus::Connected => {}
        }
        self.begin(isolation).await?;

        let outcome = f(self.clone()).await;
        if self.status() == SessionStatus::Ready {
            return outcome;
        }
        let error = match outcome {
            Ok(value) => match self.commit().await {
                Ok(()) => return Ok(value),
                Err(e) => e,
            },
            Err(e) => e,
        };
        let error = self.roll_back(error).await;
        self.shutdown().await.ok();
        Err(error)
    }

    /// Rolls back the open transaction, if any, and closes the connection.
    ///
    /// Called inside a `connect` or `transaction` callback, the session ends
    /// there: nothing is committed or closed again when the callback returns.
    pub async fn close(&self) -> Result<()> {
        match self.status() {
            SessionStatus::Ready => Ok(()),
            SessionStatus::Connected => self.shutdown().await,
            SessionStatus::Transacting => {
                let rolled_back = self.rollback_tolerant().await;
                let closed = self.shutdown().await;
                rolled_back?;
                closed
            }
        }
    }

    async fn open(&self) -> Result<()> {
        if self.status() != SessionStatus::Ready {
            return Err(OrmError::Session(String::from("already connected")));
        }
        let mut executor = self.inner.executor.lock().await;
        executor.connect().await.map_err(OrmError::Executor)?;
        self.set_status(SessionStatus::Connected);
        debug!(scope = ?self.inner.scope.default_database(), "Connected");
        Ok(())
    }

    async fn begin(&self, isolation: Option<IsolationLevel>) -> Result<()> {
        let mut executor = self.inner.executor.lock().await;
        executor
            .begin_transaction(isolation)
            .await
            .map_err(OrmError::Executor)?;
        self.set_status(SessionStatus::Transacting);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut executor = self.inner.executor.lock().await;
        executor.commit_transaction().await.map_err(OrmError::Executor)?;
        self.set_status(SessionStatus::Connected);
        Ok(())
    }

    async fn rollback_transaction(&self) -> std::result::Result<(), BoxError> {
        let mut executor = self.inner.executor.lock().await;
        executor.rollback_transaction().await?;
        self.set_status(SessionStatus::Connected);
        Ok(())
    }

    /// Rolls back after `error`. Returns the error to report: `error` itself,
    /// or the rollback failure unless the server had already ended the
    /// transaction.
    async fn roll_back(&self, error: OrmError) -> OrmError {
        match self.rollback_tolerant().await {
            Ok(()) => error,
            Err(rollback) => rollback,
        }
    }

    /// Rolls back, ignoring the failure raised when the server has no open
    /// transaction left.
    async fn rollback_tolerant(&self) -> Result<()> {
        match self.rollback_transaction().await {
            Ok(()) => Ok(()),
            Err(rollback) => {
                let message = rollback.to_string();
                if message.contains("ROLLBACK") && message.contains("BEGIN") {
                    warn!(error = %message, "Ignoring rollback failure");
                    self.set_status(SessionStatus::Connected);
                    Ok(())
                } else {
                    Err(OrmError::Executor(rollback))
                }
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        let closed = {
            let mut executor = self.inner.executor.lock().await;
            executor.close().await
        };
        {
            let mut state = self.state();
            state.status = SessionStatus::Ready;
            state.prepared.clear();
            state.cache.clear();
        }
        debug!("Closed");
        closed.map_err(OrmError::Executor)
    }

    /// Runs statements that may change data, clearing the cache before and
    /// after the batch. Selects in flight meanwhile store nothing.
    async fn run_write(&self, statements: &[String]) -> Result<Vec<Vec<Row>>> {
        self.state().cache.clear();
        let results = self.run(statements).await;
        self.state().cache.clear();
        results
    }

    async fn run(&self, statements: &[String]) -> Result<Vec<Vec<Row>>> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }
        if self.status() == SessionStatus::Ready {
            return Err(OrmError::Session(String::from("not connected")));
        }
        for sql in statements {
            debug!(sql = %sql, "Executing SQL");
        }
        let mut executor = self.inner.executor.lock().await;
        executor
            .execute(statements)
            .await
            .map_err(|source| OrmError::Statement {
                statements: statements.join("\n\n"),
                source,
            })
    }

    /// Compiles and runs definitions as one batch, returning one parsed
    /// result per definition.
    ///
    /// A batch of selects is answered from the cache when the same text ran
    /// within the cache window. Any batch that writes clears the cache.
    pub async fn execute_defs(
        &self,
        defs: &[QueryDef],
        options: &[Option<ParseOption>],
    ) -> Result<Vec<Vec<Value>>> {
        let compiled = defs
            .iter()
            .map(|def| self.inner.compiler.compile(def))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let statements = compiled.concat();

        let results = if !defs.is_empty() && defs.iter().all(QueryDef::is_select) {
            let key = statements.join("\n\n");
            let (cached, generation) = {
                let mut state = self.state();
                (state.cache.get(&key), state.cache.generation())
            };
            if let Some(rows) = cached {
                debug!(statements = statements.len(), "Select cache hit");
                rows
            } else {
                let rows = self.run(&statements).await?;
                self.state().cache.insert(key, rows.clone(), generation);
                rows
            }
        } else if defs.iter().all(QueryDef::is_read_only) {
            self.run(&statements).await?
        } else {
            self.run_write(&statements).await?
        };

        let counts: Vec<usize> = compiled.iter().map(Vec::len).collect();
        Ok(demux(results, &counts)
            .into_iter()
            .enumerate()
            .map(|(i, rows)| parse_rows(rows, options.get(i).and_then(Option::as_ref)))
            .collect())
    }

    /// Runs raw statements. Clears the select cache.
    pub async fn execute_queries(&self, queries: &[String]) -> Result<Vec<Vec<Row>>> {
        self.run_write(queries).await
    }

    /// Queues a definition for [`DbContext::execute_prepared`]. Only entries
    /// queued with `keep` contribute a result.
    pub fn prepare(&self, def: &QueryDef, option: Option<ParseOption>, keep: bool) -> Result<()> {
        let statements = self.inner.compiler.compile(def)?;
        self.state().prepared.push(Prepared {
            statements,
            option,
            keep,
        });
        Ok(())
    }

    /// Number of queued definitions.
    #[must_use]
    pub fn prepared_len(&self) -> usize {
        self.state().prepared.len()
    }

    /// Runs every queued definition as one batch and returns the parsed
    /// results of the kept entries, in submission order.
    pub async fn execute_prepared(&self) -> Result<Vec<Vec<Value>>> {
        let queue = std::mem::take(&mut self.state().prepared);
        if queue.is_empty() {
            return Ok(Vec::new());
        }

        let statements: Vec<String> = queue
            .iter()
            .flat_map(|entry| entry.statements.iter().cloned())
            .collect();
        debug!(
            entries = queue.len(),
            statements = statements.len(),
            "Executing prepared statements"
        );
        let results = self.run_write(&statements).await?;

        let counts: Vec<usize> = queue.iter().map(|entry| entry.statements.len()).collect();
        Ok(demux(results, &counts)
            .into_iter()
            .zip(queue)
            .filter(|(_, entry)| entry.keep)
            .map(|(rows, entry)| parse_rows(rows, entry.option.as_ref()))
            .collect())
    }

    /// Loads rows through the executor's bulk path. Clears the select cache.
    pub async fn bulk_insert(
        &self,
        table: &TableName,
        columns: &[BulkColumn],
        rows: &[Row],
    ) -> Result<()> {
        if self.status() == SessionStatus::Ready {
            return Err(OrmError::Session(String::from("not connected")));
        }
        let name = self.inner.compiler.dialect().quote_table_name(table)?;
        self.state().cache.clear();
        debug!(table = %name, rows = rows.len(), "Bulk inserting");
        let loaded = {
            let mut executor = self.inner.executor.lock().await;
            executor.bulk_insert(&name, columns, rows).await
        };
        self.state().cache.clear();
        loaded.map_err(OrmError::Executor)
    }

    /// Returns `true` when the database exists.
    pub async fn is_database_exists(&self, database: &str) -> Result<bool> {
        let def = QueryDef::GetDatabaseInfo {
            database: database.to_string(),
        };
        let results = self.execute_defs(&[def], &[None]).await?;
        Ok(results.first().is_some_and(|rows| !rows.is_empty()))
    }

    /// Returns `true` when the table exists.
    pub async fn is_table_exists(&self, table: &TableName) -> Result<bool> {
        let def = QueryDef::GetTableInfo {
            table: table.clone(),
        };
        let results = self.execute_defs(&[def], &[None]).await?;
        Ok(results.first().is_some_and(|rows| !rows.is_empty()))
    }
}

/// Splits a batch result into one result set per definition, taking the
/// first set of each definition's statements.
fn demux(results: Vec<Vec<Row>>, counts: &[usize]) -> Vec<Vec<Row>> {
    let mut results = results.into_iter();
    counts
        .iter()
        .map(|&count| {
            let mut sets = results.by_ref().take(count);
            let first = sets.next().unwrap_or_default();
            sets.for_each(drop);
            first
        })
        .collect()
}
