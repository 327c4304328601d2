//! Named SQL templates with escaped placeholders, a key-value clause DSL for WHERE/SET
//! fragments, and pooled buffered or streaming execution on `SQLite`.
//!
//! ```rust
//! use sql_templates::prelude::*;
//!
//! let filter = ParamObject::new()
//!     .with("age>", 21)
//!     .with("name LIKE", "a%")
//!     .with("deleted_at", RowValues::Null);
//! let sql = resolve(
//!     "SELECT ?? FROM users WHERE ? ORDER BY ??",
//!     &[Param::from("name"), filter.into(), Param::from("age ASC")],
//!     ResolveOptions::default().with_dialect(EscapeDialect::Sqlite),
//! )?;
//! assert_eq!(
//!     sql,
//!     "SELECT `name` FROM users WHERE age >= 21 AND name LIKE 'a%' AND deleted_at IS NULL \
//!      ORDER BY `age` ASC"
//! );
//! # Ok::<(), SqlTemplateError>(())
//! ```

pub mod prelude;

pub mod clause;
pub mod config;
pub mod error;
pub mod escape;
pub mod executor;
pub mod params;
pub mod results;
pub mod sqlite;
pub mod stats;
pub mod templates;
pub mod translation;
pub mod types;

pub use config::{EngineConfig, Mode, RetryPolicy};
pub use error::SqlTemplateError;
pub use executor::{RowAck, RowHandler, SqlEngine, StreamOptions, StreamSummary};
pub use params::{ClauseValue, Param, ParamObject};
pub use results::{CustomDbRow, ResultSet};
pub use templates::{QueryTemplate, TemplateRegistry};
pub use translation::{ResolveOptions, UnderflowPolicy, resolve};
pub use types::RowValues;
