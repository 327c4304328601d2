//! The pooled execution engine.
//!
//! Every call resolves its template first, then checks out one connection, runs the statement on
//! a blocking worker, and returns the connection to the pool exactly once before the result (or
//! error) reaches the caller.

mod streaming;

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bb8::Pool;
use tokio::sync::mpsc;

pub use streaming::{RowAck, RowHandler, StreamOptions, StreamSummary};
use streaming::StreamingSession;

use crate::config::{EngineConfig, RetryPolicy};
use crate::error::SqlTemplateError;
use crate::params::Param;
use crate::results::{CustomDbRow, ResultSet};
use crate::sqlite::query::{build_result_set, stream_rows};
use crate::sqlite::{SqliteManager, SqlitePooledConnection};
use crate::stats::{ADHOC_SOURCE, InvocationTimer, StatsCollector};
use crate::templates::{QueryTemplate, TemplateRegistry};
use crate::translation::{ResolveOptions, resolve};

/// Identifies the statement an invocation is recorded under.
struct StatKey<'a> {
    source: &'a str,
    name: &'a str,
    template: &'a str,
}

impl<'a> StatKey<'a> {
    fn adhoc(sql: &'a str) -> Self {
        Self {
            source: ADHOC_SOURCE,
            name: sql,
            template: sql,
        }
    }

    fn template(template: &'a QueryTemplate) -> Self {
        Self {
            source: template.source(),
            name: template.name(),
            template: template.sql(),
        }
    }
}

/// Pool handle plus resolution, retry, and statistics settings.
///
/// Cloning is cheap and clones share the pool and the statistics collector.
///
/// ```rust,no_run
/// use sql_templates::prelude::*;
///
/// # async fn demo() -> Result<(), SqlTemplateError> {
/// let engine = SqlEngine::open(EngineConfig::new(SqliteOptions::new("app.db"))).await?;
/// let filter = ParamObject::new().with("age>", 21);
/// let rows = engine
///     .execute_buffered("SELECT name FROM users WHERE ?", &[filter.into()])
///     .await?;
/// for row in &rows {
///     println!("{:?}", row.get("name"));
/// }
/// engine.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SqlEngine {
    pool: Pool<SqliteManager>,
    resolve_options: ResolveOptions,
    retry: RetryPolicy,
    stats: Option<Arc<StatsCollector>>,
    stats_dir: Option<PathBuf>,
}

impl std::fmt::Debug for SqlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlEngine")
            .field("pool", &self.pool.state())
            .field("resolve_options", &self.resolve_options)
            .field("retry", &self.retry)
            .field("stats", &self.stats.is_some())
            .finish()
    }
}

impl SqlEngine {
    /// Build the pool and, in debug mode, a statistics collector.
    ///
    /// # Errors
    /// Returns [`SqlTemplateError::ConnectionError`] / [`SqlTemplateError::ConfigError`] if the
    /// pool cannot be built.
    pub async fn open(config: EngineConfig) -> Result<Self, SqlTemplateError> {
        let pool = config.database.build_pool().await?;
        let stats = config
            .stats_enabled()
            .then(|| Arc::new(StatsCollector::new()));
        tracing::info!(
            path = %config.database.db_path,
            stats = stats.is_some(),
            "sql engine opened"
        );
        Ok(Self {
            pool,
            resolve_options: config.resolve_options(),
            retry: config.retry_policy(),
            stats,
            stats_dir: config.stats_dir,
        })
    }

    #[must_use]
    pub fn stats(&self) -> Option<&Arc<StatsCollector>> {
        self.stats.as_ref()
    }

    #[must_use]
    pub fn resolve_options(&self) -> ResolveOptions {
        self.resolve_options
    }

    /// Current pool occupancy.
    #[must_use]
    pub fn pool_state(&self) -> bb8::State {
        self.pool.state()
    }

    /// Resolve `sql` with this engine's dialect and underflow policy, without running it.
    ///
    /// # Errors
    /// As [`resolve`].
    pub fn render<'a>(
        &self,
        sql: &'a str,
        params: &[Param],
    ) -> Result<Cow<'a, str>, SqlTemplateError> {
        resolve(sql, params, self.resolve_options)
    }

    /// Load a template file and register its templates for statistics.
    ///
    /// # Errors
    /// Returns [`SqlTemplateError::TemplateLoad`] if the file is missing or malformed.
    pub fn load_templates(&self, path: &Path) -> Result<TemplateRegistry, SqlTemplateError> {
        let registry = TemplateRegistry::load(path)?;
        if let Some(stats) = &self.stats {
            for template in registry.iter() {
                stats.register(template.source(), template.name(), template.sql());
            }
        }
        Ok(registry)
    }

    /// Run raw SQL (possibly several statements) with no placeholder processing.
    ///
    /// # Errors
    /// Returns connection faults from the pool and [`SqlTemplateError::SqliteError`] from the
    /// database.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), SqlTemplateError> {
        let conn = self.acquire().await?;
        let sql = sql.to_string();
        let (conn, result) = run_blocking(conn, move |c| {
            c.execute_batch(&sql).map_err(SqlTemplateError::from)
        })
        .await?;
        drop(conn);
        result
    }

    /// Resolve and run ad hoc SQL, returning every row at once.
    ///
    /// # Errors
    /// Returns resolution errors before any connection is taken, connection faults from the pool,
    /// and execution faults from the database.
    pub async fn execute_buffered(
        &self,
        sql: &str,
        params: &[Param],
    ) -> Result<ResultSet, SqlTemplateError> {
        self.run_buffered(StatKey::adhoc(sql), params).await
    }

    /// Resolve and run a registered template, returning every row at once.
    ///
    /// # Errors
    /// As [`SqlEngine::execute_buffered`].
    pub async fn query_buffered(
        &self,
        template: &QueryTemplate,
        params: &[Param],
    ) -> Result<ResultSet, SqlTemplateError> {
        self.run_buffered(StatKey::template(template), params).await
    }

    /// Resolve and run ad hoc SQL, delivering rows one by one to `handler` under backpressure.
    ///
    /// Rows arrive in database order. The connection goes back to the pool as soon as the cursor
    /// is exhausted; [`RowHandler::on_end`] runs after that, once every row is acknowledged.
    ///
    /// # Errors
    /// As [`SqlEngine::execute_buffered`], plus [`SqlTemplateError::AckTimeout`] and
    /// [`SqlTemplateError::Cancelled`]. `on_end` is not called on error.
    pub async fn execute_streaming<H: RowHandler + ?Sized>(
        &self,
        sql: &str,
        params: &[Param],
        handler: &mut H,
        options: StreamOptions,
    ) -> Result<StreamSummary, SqlTemplateError> {
        self.run_streaming(StatKey::adhoc(sql), params, handler, options)
            .await
    }

    /// Streaming counterpart of [`SqlEngine::query_buffered`].
    ///
    /// # Errors
    /// As [`SqlEngine::execute_streaming`].
    pub async fn query_streaming<H: RowHandler + ?Sized>(
        &self,
        template: &QueryTemplate,
        params: &[Param],
        handler: &mut H,
        options: StreamOptions,
    ) -> Result<StreamSummary, SqlTemplateError> {
        self.run_streaming(StatKey::template(template), params, handler, options)
            .await
    }

    /// Shut the engine down, writing statistics reports when a stats directory is configured.
    /// Returns the report paths written.
    ///
    /// # Errors
    /// Returns [`SqlTemplateError::Io`] if a report cannot be written.
    pub fn close(self) -> Result<Vec<PathBuf>, SqlTemplateError> {
        let written = match (&self.stats, &self.stats_dir) {
            (Some(stats), Some(dir)) => stats.write_reports(dir)?,
            _ => Vec::new(),
        };
        tracing::info!(reports = written.len(), "sql engine closed");
        Ok(written)
    }

    fn begin(&self, key: &StatKey<'_>) -> Option<InvocationTimer> {
        self.stats
            .as_ref()
            .map(|stats| stats.begin(key.source, key.name, key.template))
    }

    async fn acquire(&self) -> Result<SqlitePooledConnection, SqlTemplateError> {
        let mut attempt = 0;
        loop {
            match self.pool.get_owned().await {
                Ok(conn) => return Ok(conn),
                Err(err) if attempt < self.retry.retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "connection checkout failed; retrying");
                    tokio::time::sleep(self.retry.backoff).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn run_buffered(
        &self,
        key: StatKey<'_>,
        params: &[Param],
    ) -> Result<ResultSet, SqlTemplateError> {
        let mut timer = self.begin(&key);
        let sql = resolve(key.template, params, self.resolve_options)?.into_owned();
        if let Some(t) = timer.as_mut() {
            t.resolved(&sql);
        }
        tracing::debug!(query = key.name, sql = %sql, "executing buffered");

        let conn = self.acquire().await?;
        if let Some(t) = timer.as_mut() {
            t.connection_acquired();
        }

        let joined = run_blocking(conn, move |c| build_result_set(c, &sql)).await;
        if let Some(t) = timer.as_mut() {
            t.query_finished();
        }
        let (conn, result) = joined?;
        drop(conn);
        if let Some(t) = timer.as_mut() {
            t.connection_released();
        }
        result
    }

    async fn run_streaming<H: RowHandler + ?Sized>(
        &self,
        key: StatKey<'_>,
        params: &[Param],
        handler: &mut H,
        options: StreamOptions,
    ) -> Result<StreamSummary, SqlTemplateError> {
        let mut timer = self.begin(&key);
        let sql = resolve(key.template, params, self.resolve_options)?.into_owned();
        if let Some(t) = timer.as_mut() {
            t.resolved(&sql);
        }
        if options.is_cancelled() {
            return Err(SqlTemplateError::Cancelled);
        }
        tracing::debug!(query = key.name, sql = %sql, "executing streaming");

        let conn = self.acquire().await?;
        if let Some(t) = timer.as_mut() {
            t.connection_acquired();
        }

        let (tx, mut rx) = mpsc::channel::<Result<CustomDbRow, SqlTemplateError>>(1);
        let producer = tokio::task::spawn_blocking(move || {
            let sent = stream_rows(&conn, &sql, &tx);
            (conn, sent)
        });

        let mut session = StreamingSession::new(&options);
        let delivered = pump(&mut session, &mut rx, handler).await;

        // Unblocks a producer parked on a full channel.
        drop(rx);
        let joined = producer.await;
        if let Some(t) = timer.as_mut() {
            t.query_finished();
        }
        let released = match joined {
            Ok((conn, sent)) => {
                drop(conn);
                tracing::trace!(sent, "row producer finished");
                Ok(())
            }
            Err(e) => Err(SqlTemplateError::ExecutionError(format!(
                "sqlite streaming worker failed: {e}"
            ))),
        };
        if let Some(t) = timer.as_mut() {
            t.connection_released();
        }

        delivered?;
        released?;
        session.drain().await?;
        handler.on_end();
        Ok(session.summary())
    }
}

/// Move rows from the producer to the handler, pausing at the concurrency limit.
async fn pump<H: RowHandler + ?Sized>(
    session: &mut StreamingSession,
    rx: &mut mpsc::Receiver<Result<CustomDbRow, SqlTemplateError>>,
    handler: &mut H,
) -> Result<(), SqlTemplateError> {
    loop {
        session.wait_for_capacity().await?;
        let next = match session.cancel_token() {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => return Err(SqlTemplateError::Cancelled),
                next = rx.recv() => next,
            },
            None => rx.recv().await,
        };
        match next {
            Some(Ok(row)) => session.deliver(handler, row),
            Some(Err(err)) => return Err(err),
            None => return Ok(()),
        }
    }
}

/// Run `func` against a checked-out connection on the blocking pool, handing the connection back
/// to the caller for release.
async fn run_blocking<F, R>(
    mut conn: SqlitePooledConnection,
    func: F,
) -> Result<(SqlitePooledConnection, Result<R, SqlTemplateError>), SqlTemplateError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlTemplateError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let result = func(&mut conn);
        (conn, result)
    })
    .await
    .map_err(|e| SqlTemplateError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))
}
