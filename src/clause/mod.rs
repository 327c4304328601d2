//! Compiles keyed parameter objects into WHERE predicates and SET assignment lists.
//!
//! WHERE keys follow a small grammar, checked in this order:
//!
//! | key | scalar | list |
//! |-----|--------|------|
//! | `password` / `password!` | `password [!]= SHA1(v)` | `password [NOT ]IN(SHA1(v), ...)` |
//! | `col LIKE` / `col NOT LIKE` | `col LIKE v` | `(col LIKE v1 OR col LIKE v2)` |
//! | `\|\|` | object: `(a OR b)` | objects: `(a OR b) AND (c OR d)` |
//! | `&&` | unsupported | objects: `((a AND b) OR (c))` |
//! | `col!` / `col<` / `col>` | `col != v` / `col <= v` / `col >= v` | `col NOT IN(...)` |
//! | `col` | `col = v`, `col IS NULL` | `col IN(...)` |
//!
//! WHERE keys are emitted verbatim, so they must come from application code, never from end
//! users. Values are always escaped.

mod key;
mod set_clause;
mod where_clause;

pub use set_clause::compile_set;
pub use where_clause::compile_where;

/// Which fragment a parameter object compiles to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseMode {
    Where,
    Set,
}

/// Compile `obj` in the given mode.
///
/// # Errors
/// Propagates [`compile_where`] / [`compile_set`] errors.
pub fn compile(
    obj: &crate::params::ParamObject,
    mode: ClauseMode,
    dialect: crate::escape::EscapeDialect,
) -> Result<String, crate::error::SqlTemplateError> {
    match mode {
        ClauseMode::Where => compile_where(obj, dialect),
        ClauseMode::Set => compile_set(obj, dialect),
    }
}
