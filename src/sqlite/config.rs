use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bb8::Pool;
use serde::{Deserialize, Deserializer};

use crate::error::SqlTemplateError;

use super::manager::SqliteManager;

/// Default number of pooled connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
/// Default time to wait for a free connection.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

type ConnectFn = dyn Fn(&mut rusqlite::Connection) -> rusqlite::Result<()> + Send + Sync;

/// Callback run on every freshly opened connection, e.g. to register SQL functions or set
/// pragmas.
#[derive(Clone)]
pub struct ConnectHook(Arc<ConnectFn>);

impl ConnectHook {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(&mut rusqlite::Connection) -> rusqlite::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(hook))
    }

    pub(crate) fn run(&self, conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
        (self.0)(conn)
    }
}

impl fmt::Debug for ConnectHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConnectHook(..)")
    }
}

/// Options for configuring a `SQLite` pool.
///
/// Deserializes from `{"path": "...", "max_connections": 4, "connection_timeout_ms": 500}`; only
/// `path` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteOptions {
    #[serde(rename = "path")]
    pub db_path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(
        default = "default_connection_timeout",
        rename = "connection_timeout_ms",
        deserialize_with = "millis"
    )]
    pub connection_timeout: Duration,
    #[serde(skip)]
    pub on_connect: Option<ConnectHook>,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            on_connect: None,
        }
    }

    #[must_use]
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_on_connect(mut self, hook: ConnectHook) -> Self {
        self.on_connect = Some(hook);
        self
    }

    /// Build the connection pool described by these options.
    ///
    /// One connection is opened and validated up front so a bad path fails here rather than on
    /// the first query.
    ///
    /// # Errors
    /// Returns [`SqlTemplateError::ConfigError`] for a zero pool size and
    /// [`SqlTemplateError::ConnectionError`] if the database cannot be opened.
    pub async fn build_pool(&self) -> Result<Pool<SqliteManager>, SqlTemplateError> {
        if self.max_connections == 0 {
            return Err(SqlTemplateError::ConfigError(
                "max_connections must be at least 1".into(),
            ));
        }
        let manager = SqliteManager::new(self.db_path.clone(), self.on_connect.clone());
        let pool = Pool::builder()
            .max_size(self.max_connections)
            .connection_timeout(self.connection_timeout)
            .build(manager)
            .await
            .map_err(|e| {
                SqlTemplateError::ConnectionError(format!("sqlite pool error: {e}"))
            })?;
        {
            let _smoke = pool.get().await?;
        }
        tracing::debug!(
            path = %self.db_path,
            max_connections = self.max_connections,
            "sqlite pool ready"
        );
        Ok(pool)
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    /// Start from a filesystem path.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        Self::new(path.to_string_lossy().into_owned())
    }

    #[must_use]
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.opts.max_connections = max_connections;
        self
    }

    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.opts.connection_timeout = timeout;
        self
    }

    #[must_use]
    pub fn on_connect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut rusqlite::Connection) -> rusqlite::Result<()> + Send + Sync + 'static,
    {
        self.opts.on_connect = Some(ConnectHook::new(hook));
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_connection_timeout() -> Duration {
    DEFAULT_CONNECTION_TIMEOUT
}

pub(crate) fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}
