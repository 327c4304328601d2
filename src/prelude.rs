//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::clause::{ClauseMode, compile_set, compile_where};
pub use crate::config::{EngineConfig, Mode, RetryPolicy};
pub use crate::error::SqlTemplateError;
pub use crate::escape::{EscapeDialect, escape_identifier, escape_list, escape_value};
pub use crate::executor::{RowAck, RowHandler, SqlEngine, StreamOptions, StreamSummary};
pub use crate::params::{ClauseValue, Param, ParamObject, params_from_json};
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::sqlite::{ConnectHook, SqliteOptions, SqliteOptionsBuilder};
pub use crate::stats::{InvocationStat, StatsCollector};
pub use crate::templates::{QueryTemplate, TemplateRegistry};
pub use crate::translation::{ResolveOptions, UnderflowPolicy, resolve};
pub use crate::types::RowValues;
