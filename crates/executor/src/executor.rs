//! The Executor - single entry point for running commands.
//!
//! A call goes through these steps:
//!
//! 1. Look the id up in the registry and capture its invalidation signal.
//! 2. Resolve and coerce parameters.
//! 3. Serve a live cache entry if the definition caches, otherwise resolve
//!    the connection, pick the strategy handler and run it under the
//!    definition's timeout. Successes are cached without include rows.
//! 4. On success, fan out to the includes concurrently. Each include is
//!    served from its own cache entry when it caches.
//! 5. Stamp trace id, command id and elapsed time, and log one summary line.
//!
//! Failures never escape as `Err`: every outcome is an [`ExecutionResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use procdispatch_core::{
    Args, CommandDefinition, Error, ErrorKind, ExecutionContext, ExecutionResult, NamedRows,
    Result, RowList,
};
use procdispatch_registry::CommandRegistry;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{BoundParam, ProcedureBackend, ProcedureCall};
use crate::bind;
use crate::cache::{cache_key, CachedValue, MokaResultCache, ResultCache, INCLUDE_PREFIX, PRIMARY_PREFIX};
use crate::config::{DispatcherConfig, TransactionSettings};
use crate::connections::{ConnectionMap, ConnectionResolver};
use crate::handlers;

/// The command executor.
///
/// Cloning is cheap; clones share the registry, backend, connections and
/// cache.
///
/// # Thread Safety
///
/// Executor is `Send + Sync` and can be shared across tasks.
///
/// # Example
///
/// ```ignore
/// use procdispatch_executor::{Executor, MemoryBackend};
///
/// let executor = Executor::builder(registry, Arc::new(MemoryBackend::new()))
///     .config(&config)
///     .build();
///
/// let result = executor.execute("orders.list", Some(&args)).await;
/// ```
#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<CommandRegistry>,
    backend: Arc<dyn ProcedureBackend>,
    connections: Arc<dyn ConnectionResolver>,
    cache: Arc<dyn ResultCache>,
    default_timeout: Duration,
    transaction: TransactionSettings,
}

/// Builder for [`Executor`].
pub struct ExecutorBuilder {
    registry: Arc<CommandRegistry>,
    backend: Arc<dyn ProcedureBackend>,
    connections: Arc<dyn ConnectionResolver>,
    cache: Option<Arc<dyn ResultCache>>,
    max_entries: u64,
    default_timeout: Duration,
    transaction: TransactionSettings,
}

impl ExecutorBuilder {
    /// Apply timeout, transaction contract, cache capacity and the
    /// connection table from `config`.
    pub fn config(mut self, config: &DispatcherConfig) -> Self {
        self.default_timeout = config.default_timeout();
        self.transaction = config.transaction.clone();
        self.max_entries = config.cache.max_entries;
        self.connections = Arc::new(config.connection_map());
        self
    }

    /// Use a custom connection resolver.
    pub fn connections(mut self, resolver: impl ConnectionResolver + 'static) -> Self {
        self.connections = Arc::new(resolver);
        self
    }

    /// Use a custom or shared result cache.
    pub fn cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Timeout for definitions that declare none.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Override the transaction contract columns.
    pub fn transaction_settings(mut self, settings: TransactionSettings) -> Self {
        self.transaction = settings;
        self
    }

    /// Finish building.
    pub fn build(self) -> Executor {
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MokaResultCache::new(self.max_entries)));
        Executor {
            inner: Arc::new(Inner {
                registry: self.registry,
                backend: self.backend,
                connections: self.connections,
                cache,
                default_timeout: self.default_timeout,
                transaction: self.transaction,
            }),
        }
    }
}

/// Aborts the wrapped task when dropped, so cancelling a call cancels the
/// backend work too.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Executor {
    /// Start building an executor over `registry` and `backend`.
    pub fn builder(
        registry: Arc<CommandRegistry>,
        backend: Arc<dyn ProcedureBackend>,
    ) -> ExecutorBuilder {
        let defaults = DispatcherConfig::default();
        ExecutorBuilder {
            registry,
            backend,
            connections: Arc::new(ConnectionMap::new()),
            cache: None,
            max_entries: defaults.cache.max_entries,
            default_timeout: defaults.default_timeout(),
            transaction: defaults.transaction,
        }
    }

    /// Executor configured entirely from `config`.
    pub fn from_config(
        config: &DispatcherConfig,
        registry: Arc<CommandRegistry>,
        backend: Arc<dyn ProcedureBackend>,
    ) -> Self {
        Self::builder(registry, backend).config(config).build()
    }

    /// The registry commands are looked up in.
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.inner.registry
    }

    /// The result cache.
    pub fn cache(&self) -> &Arc<dyn ResultCache> {
        &self.inner.cache
    }

    /// Execute a command without an execution context.
    pub async fn execute(&self, id: &str, args: Option<&Args>) -> ExecutionResult {
        self.execute_with(None, id, args).await
    }

    /// Execute a command on behalf of the caller described by `ctx`.
    pub async fn execute_with(
        &self,
        ctx: Option<&ExecutionContext>,
        id: &str,
        args: Option<&Args>,
    ) -> ExecutionResult {
        let started = Instant::now();
        let (mut result, strategy) = match self.inner.registry.get(id) {
            Ok(def) => {
                let strategy = def.strategy.clone();
                (self.run_command(&def, args, ctx).await, strategy)
            }
            Err(e) => (ExecutionResult::from_error(&e), String::new()),
        };
        stamp(&mut result, id, started);
        log_summary(&result, &strategy);
        result
    }

    /// Execute several commands concurrently. Results keep input order.
    pub async fn execute_many(
        &self,
        ctx: Option<&ExecutionContext>,
        calls: Vec<(String, Option<Args>)>,
    ) -> Vec<ExecutionResult> {
        let count = calls.len();
        let mut tasks = JoinSet::new();
        for (index, (id, args)) in calls.into_iter().enumerate() {
            let this = self.clone();
            let ctx = ctx.cloned();
            tasks.spawn(async move {
                let result = this.execute_with(ctx.as_ref(), &id, args.as_ref()).await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<ExecutionResult>> = (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(target: "procdispatch::executor", error = %e, "Batch task failed"),
            }
        }
        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    ExecutionResult::fail("execution task failed", ErrorKind::Unhandled)
                })
            })
            .collect()
    }

    /// Whether `def` is still the registered definition. A replacement
    /// between lookup and signal capture pairs an old definition with a new
    /// signal, so such results are not cached.
    fn is_current(&self, def: &Arc<CommandDefinition>) -> bool {
        self.inner
            .registry
            .try_get(&def.id)
            .is_some_and(|live| Arc::ptr_eq(&live, def))
    }

    async fn run_command(
        &self,
        def: &Arc<CommandDefinition>,
        args: Option<&Args>,
        ctx: Option<&ExecutionContext>,
    ) -> ExecutionResult {
        // Captured before execution so a concurrent change is never cached as current
        let signal = self.inner.registry.invalidation_signal(&def.id);
        let cacheable = self.is_current(def);

        let params = match bind::bind_params(def, args, ctx) {
            Ok(params) => params,
            Err(e) => return ExecutionResult::from_error(&e),
        };

        let cached = def
            .cache_ttl()
            .filter(|_| cacheable)
            .map(|ttl| (cache_key(PRIMARY_PREFIX, def, &params), ttl));
        if let Some((key, _)) = &cached {
            if let Some(CachedValue::Result(mut hit)) = self.inner.cache.get(key) {
                hit.from_cache = true;
                self.attach_includes(&mut hit, def, args, ctx).await;
                return hit;
            }
        }

        let mut result = match self.run_strategy(def, params).await {
            Ok(result) => result,
            Err(e) => ExecutionResult::from_error(&e),
        };

        // Primary entries never hold include rows; includes have their own entries
        if result.success {
            if let Some((key, ttl)) = cached {
                self.inner
                    .cache
                    .insert(key, CachedValue::Result(result.clone()), ttl, &signal);
            }
        }
        self.attach_includes(&mut result, def, args, ctx).await;
        result
    }

    async fn attach_includes(
        &self,
        result: &mut ExecutionResult,
        def: &CommandDefinition,
        args: Option<&Args>,
        ctx: Option<&ExecutionContext>,
    ) {
        if result.success && !def.includes.is_empty() {
            result.lookups = self.fan_out(def, args, ctx).await;
        }
    }

    async fn run_strategy(
        &self,
        def: &CommandDefinition,
        params: Vec<BoundParam>,
    ) -> Result<ExecutionResult> {
        let connection = self.inner.connections.resolve(&def.connection)?;
        let strategy = def.parsed_strategy()?;
        let timeout = def.effective_timeout(self.inner.default_timeout);
        let call = ProcedureCall {
            command_id: def.id.clone(),
            procedure: def.procedure.clone(),
            params,
            timeout,
        };

        let mut task = tokio::spawn(handlers::dispatch(
            Arc::clone(&self.inner.backend),
            strategy,
            connection,
            call,
            self.inner.transaction.clone(),
        ));
        let _abort = AbortOnDrop(task.abort_handle());

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::backend(format!(
                "procedure '{}' failed unexpectedly: {}",
                def.procedure, e
            ))),
            Err(_) => Err(Error::Timeout {
                procedure: def.procedure.clone(),
                seconds: timeout.as_secs(),
            }),
        }
    }

    /// Run every include concurrently; failed includes contribute empty rows.
    async fn fan_out(
        &self,
        def: &CommandDefinition,
        args: Option<&Args>,
        ctx: Option<&ExecutionContext>,
    ) -> NamedRows {
        let mut tasks = JoinSet::new();
        for (ordinal, include) in def.includes.iter().enumerate() {
            let this = self.clone();
            let include = include.clone();
            let args = args.cloned();
            let ctx = ctx.cloned();
            tasks.spawn(async move {
                let rows = this.run_include(&include, args.as_ref(), ctx.as_ref()).await;
                (ordinal, rows)
            });
        }

        let mut slots: Vec<Option<RowList>> = vec![None; def.includes.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((ordinal, rows)) => slots[ordinal] = Some(rows),
                Err(e) => warn!(target: "procdispatch::executor", command = %def.id, error = %e, "Include task failed"),
            }
        }

        let mut lookups = NamedRows::new();
        for (include, rows) in def.includes.iter().zip(slots) {
            lookups.insert(include.clone(), rows.unwrap_or_default());
        }
        lookups
    }

    async fn run_include(
        &self,
        id: &str,
        args: Option<&Args>,
        ctx: Option<&ExecutionContext>,
    ) -> RowList {
        match self.include_rows(id, args, ctx).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(target: "procdispatch::executor", include = %id, error = %e, "Include failed");
                RowList::new()
            }
        }
    }

    async fn include_rows(
        &self,
        id: &str,
        args: Option<&Args>,
        ctx: Option<&ExecutionContext>,
    ) -> Result<RowList> {
        let def = self.inner.registry.get(id)?;
        let signal = self.inner.registry.invalidation_signal(&def.id);
        let cacheable = self.is_current(&def);
        let params = bind::bind_params(&def, args, ctx)?;

        let cached = def
            .cache_ttl()
            .filter(|_| cacheable)
            .map(|ttl| (cache_key(INCLUDE_PREFIX, &def, &params), ttl));
        if let Some((key, _)) = &cached {
            if let Some(CachedValue::Rows(rows)) = self.inner.cache.get(key) {
                return Ok(rows);
            }
        }

        let result = self.run_strategy(&def, params).await?;
        if !result.success {
            return Err(Error::backend(
                result
                    .error_message
                    .unwrap_or_else(|| "include failed".to_string()),
            ));
        }
        let rows = result.primary_rows();
        if let Some((key, ttl)) = cached {
            self.inner
                .cache
                .insert(key, CachedValue::Rows(rows.clone()), ttl, &signal);
        }
        Ok(rows)
    }
}

fn stamp(result: &mut ExecutionResult, id: &str, started: Instant) {
    result.trace_id = Uuid::new_v4().to_string();
    result.command_id = id.to_string();
    result.elapsed = started.elapsed();
}

fn log_summary(result: &ExecutionResult, strategy: &str) {
    let elapsed_ms = result.elapsed.as_millis() as u64;
    if result.success {
        info!(
            target: "procdispatch::executor",
            command = %result.command_id,
            strategy,
            elapsed_ms,
            cache_hit = result.from_cache,
            includes = result.lookups.len(),
            trace_id = %result.trace_id,
            "Command succeeded"
        );
    } else {
        warn!(
            target: "procdispatch::executor",
            command = %result.command_id,
            strategy,
            elapsed_ms,
            kind = ?result.error_kind,
            error = result.error_message.as_deref().unwrap_or(""),
            trace_id = %result.trace_id,
            "Command failed"
        );
    }
}
