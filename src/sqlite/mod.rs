//! `SQLite` backend: pool manager, options, and statement execution on `rusqlite`.

pub mod config;
pub mod manager;
pub mod query;

pub use config::{ConnectHook, SqliteOptions, SqliteOptionsBuilder};
pub use manager::SqliteManager;
pub use query::build_result_set;

/// A pooled connection that can move into a blocking worker and back.
pub type SqlitePooledConnection = bb8::PooledConnection<'static, SqliteManager>;
