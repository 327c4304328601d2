//! Engine configuration: pool options plus resolution, statistics, and retry policy.
//!
//! ```json
//! {
//!   "database": { "path": "app.db", "max_connections": 4 },
//!   "mode": "debug",
//!   "stats_dir": "var/db",
//!   "underflow": "error",
//!   "acquire_retries": 2,
//!   "acquire_backoff_ms": 50
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::SqlTemplateError;
use crate::escape::EscapeDialect;
use crate::sqlite::SqliteOptions;
use crate::sqlite::config::millis;
use crate::translation::{ResolveOptions, UnderflowPolicy};

/// Runtime mode. `Debug` turns on invocation statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    Debug,
}

/// How many extra times to try checking out a connection, and how long to wait in between.
///
/// The default is fail-fast: one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }
}

/// Everything [`SqlEngine::open`](crate::executor::SqlEngine::open) needs.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub database: SqliteOptions,
    #[serde(default)]
    pub mode: Mode,
    /// Where [`SqlEngine::close`](crate::executor::SqlEngine::close) writes `.stats` reports.
    #[serde(default)]
    pub stats_dir: Option<PathBuf>,
    #[serde(default = "sqlite_dialect")]
    pub dialect: EscapeDialect,
    #[serde(default)]
    pub underflow: UnderflowPolicy,
    #[serde(default)]
    pub acquire_retries: u32,
    #[serde(default, rename = "acquire_backoff_ms", deserialize_with = "millis")]
    pub acquire_backoff: Duration,
}

impl EngineConfig {
    /// Production mode, `SQLite` escaping, passthrough underflow, fail-fast acquisition.
    #[must_use]
    pub fn new(database: SqliteOptions) -> Self {
        Self {
            database,
            mode: Mode::default(),
            stats_dir: None,
            dialect: sqlite_dialect(),
            underflow: UnderflowPolicy::default(),
            acquire_retries: 0,
            acquire_backoff: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_stats_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.stats_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_dialect(mut self, dialect: EscapeDialect) -> Self {
        self.dialect = dialect;
        self
    }

    #[must_use]
    pub fn with_underflow(mut self, underflow: UnderflowPolicy) -> Self {
        self.underflow = underflow;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.acquire_retries = policy.retries;
        self.acquire_backoff = policy.backoff;
        self
    }

    #[must_use]
    pub fn stats_enabled(&self) -> bool {
        self.mode == Mode::Debug
    }

    #[must_use]
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions::default()
            .with_dialect(self.dialect)
            .with_underflow(self.underflow)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.acquire_retries, self.acquire_backoff)
    }

    /// Parse a JSON configuration document.
    ///
    /// # Errors
    /// Returns [`SqlTemplateError::ConfigError`] if the JSON is malformed or misses `database`.
    pub fn from_json_str(json: &str) -> Result<Self, SqlTemplateError> {
        serde_json::from_str(json)
            .map_err(|e| SqlTemplateError::ConfigError(format!("invalid engine config: {e}")))
    }

    /// Read and parse a JSON configuration file.
    ///
    /// # Errors
    /// Returns [`SqlTemplateError::Io`] if the file cannot be read, otherwise as
    /// [`EngineConfig::from_json_str`].
    pub fn from_file(path: &Path) -> Result<Self, SqlTemplateError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

fn sqlite_dialect() -> EscapeDialect {
    EscapeDialect::Sqlite
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_uses_defaults() {
        let cfg = EngineConfig::from_json_str(r#"{"database": {"path": "a.db"}}"#).unwrap();
        assert_eq!(cfg.mode, Mode::Production);
        assert_eq!(cfg.dialect, EscapeDialect::Sqlite);
        assert_eq!(cfg.underflow, UnderflowPolicy::Passthrough);
        assert_eq!(cfg.retry_policy(), RetryPolicy::default());
        assert!(!cfg.stats_enabled());
    }

    #[test]
    fn full_json() {
        let cfg = EngineConfig::from_json_str(
            r#"{
                "database": {"path": "a.db", "max_connections": 2},
                "mode": "debug",
                "stats_dir": "/tmp/stats",
                "dialect": "mysql",
                "underflow": "error",
                "acquire_retries": 3,
                "acquire_backoff_ms": 20
            }"#,
        )
        .unwrap();
        assert!(cfg.stats_enabled());
        assert_eq!(cfg.stats_dir.as_deref(), Some(Path::new("/tmp/stats")));
        assert_eq!(cfg.database.max_connections, 2);
        assert_eq!(
            cfg.resolve_options(),
            ResolveOptions::default()
                .with_dialect(EscapeDialect::Mysql)
                .with_underflow(UnderflowPolicy::Error)
        );
        assert_eq!(
            cfg.retry_policy(),
            RetryPolicy::new(3, Duration::from_millis(20))
        );
    }

    #[test]
    fn missing_database_is_config_error() {
        let err = EngineConfig::from_json_str(r#"{"mode": "debug"}"#).unwrap_err();
        assert!(matches!(err, SqlTemplateError::ConfigError(_)));
    }

    #[test]
    fn unknown_mode_is_config_error() {
        let json = r#"{"database": {"path": "a"}, "mode": "loud"}"#;
        let err = EngineConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, SqlTemplateError::ConfigError(_)));
    }
}
