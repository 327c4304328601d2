use std::borrow::Cow;

use serde::Deserialize;

mod parsers;
mod scanner;

use parsers::{is_block_comment_end, is_block_comment_start, is_line_comment_start, scan_word};
use scanner::{Clause, ClauseTracker, State};

use crate::clause::{ClauseMode, compile};
use crate::error::SqlTemplateError;
use crate::escape::{EscapeDialect, escape_identifier, escape_list, escape_value};
use crate::params::Param;
use crate::types::RowValues;

/// What to do with placeholders left over once the parameter list runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnderflowPolicy {
    /// Leave the placeholder text in the output.
    #[default]
    Passthrough,
    /// Fail with [`SqlTemplateError::PlaceholderUnderflow`].
    Error,
}

/// Per-call options for placeholder resolution.
///
/// # Examples
/// ```rust
/// use sql_templates::prelude::*;
///
/// let options = ResolveOptions::default()
///     .with_dialect(EscapeDialect::Sqlite)
///     .with_underflow(UnderflowPolicy::Error);
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveOptions {
    pub dialect: EscapeDialect,
    pub underflow: UnderflowPolicy,
}

impl ResolveOptions {
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
}

/// Substitute `?` and `??` placeholders in `sql` with escaped parameters, left to right.
///
/// - `?` bound to a scalar or list renders escaped literals.
/// - `?` bound to a [`ParamObject`](crate::params::ParamObject) compiles to a WHERE predicate
///   inside a `WHERE` clause and to a SET assignment list anywhere else.
/// - `??` renders an identifier; inside `ORDER BY` the parameter is `"column ASC|DESC"`.
/// - `\?` is a literal question mark.
///
/// Placeholders inside quoted text and comments are left alone. Clause tracking is keyword-based
/// and handles parenthesised subqueries; it is not a SQL parser.
///
/// ```rust
/// use sql_templates::prelude::*;
///
/// let sql = resolve(
///     "SELECT * FROM t WHERE a=? AND b=?",
///     &[Param::from(1), Param::from("x")],
///     ResolveOptions::default(),
/// )?;
/// assert_eq!(sql, "SELECT * FROM t WHERE a=1 AND b='x'");
/// # Ok::<(), SqlTemplateError>(())
/// ```
///
/// Returns a borrowed `Cow` when nothing was substituted.
///
/// # Errors
/// Returns [`SqlTemplateError::ParameterError`] / [`SqlTemplateError::UnsupportedClause`] when a
/// parameter cannot be rendered for its placeholder, and
/// [`SqlTemplateError::PlaceholderUnderflow`] when parameters run out under
/// [`UnderflowPolicy::Error`].
pub fn resolve<'a>(
    sql: &'a str,
    params: &[Param],
    options: ResolveOptions,
) -> Result<Cow<'a, str>, SqlTemplateError> {
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut state = State::Normal;
    let mut clauses = ClauseTracker::new();
    let mut next_param = 0;
    let mut placeholders = 0;
    let mut idx = 0;
    let bytes = sql.as_bytes();
    // Only MySQL treats backslash as an escape inside quoted text.
    let backslash_escapes = options.dialect == EscapeDialect::Mysql;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'`' => state = State::BacktickQuoted,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment;
                    idx += 1;
                }
                b'(' => clauses.open_paren(),
                b')' => clauses.close_paren(),
                b'\\' if bytes.get(idx + 1) == Some(&b'?') => {
                    let buf = out.get_or_insert_with(String::new);
                    buf.push_str(&sql[copied..idx]);
                    buf.push('?');
                    idx += 1;
                    copied = idx + 1;
                }
                b'?' => {
                    let identifier = bytes.get(idx + 1) == Some(&b'?');
                    let width = if identifier { 2 } else { 1 };
                    placeholders += 1;
                    if let Some(param) = params.get(next_param) {
                        next_param += 1;
                        let rendered = if identifier {
                            render_identifier(param, clauses.current())?
                        } else {
                            render_value(param, clauses.current(), options.dialect)?
                        };
                        let buf = out.get_or_insert_with(String::new);
                        buf.push_str(&sql[copied..idx]);
                        buf.push_str(&rendered);
                        copied = idx + width;
                    }
                    idx += width - 1;
                }
                _ if parsers::is_word_byte(b) => {
                    let end = scan_word(bytes, idx);
                    clauses.word(&sql[idx..end]);
                    idx = end - 1;
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\\' && backslash_escapes {
                    idx += 1; // skip escaped char
                } else if b == b'\'' {
                    if bytes.get(idx + 1) == Some(&b'\'') {
                        idx += 1; // skip escaped quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if b == b'\\' && backslash_escapes {
                    idx += 1;
                } else if b == b'"' {
                    if bytes.get(idx + 1) == Some(&b'"') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::BacktickQuoted => {
                if b == b'`' {
                    if bytes.get(idx + 1) == Some(&b'`') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if is_block_comment_end(bytes, idx) {
                    state = State::Normal;
                    idx += 1;
                }
            }
        }

        idx += 1;
    }

    let missing = placeholders - next_param;
    if missing > 0 {
        match options.underflow {
            UnderflowPolicy::Error => {
                return Err(SqlTemplateError::PlaceholderUnderflow {
                    placeholders,
                    params: params.len(),
                });
            }
            UnderflowPolicy::Passthrough => {
                tracing::warn!(
                    placeholders,
                    params = params.len(),
                    "parameters ran out; leaving {missing} placeholder(s) unresolved"
                );
            }
        }
    } else if next_param < params.len() {
        tracing::debug!(
            unused = params.len() - next_param,
            "more parameters than placeholders"
        );
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied.min(sql.len())..]);
            Ok(Cow::Owned(buf))
        }
        None => Ok(Cow::Borrowed(sql)),
    }
}

fn render_value(
    param: &Param,
    clause: Clause,
    dialect: EscapeDialect,
) -> Result<String, SqlTemplateError> {
    match param {
        Param::Value(v) => Ok(escape_value(v, dialect)),
        Param::List(values) if values.is_empty() => Err(SqlTemplateError::ParameterError(
            "empty list bound to `?`".into(),
        )),
        Param::List(values) => Ok(escape_list(values, dialect)),
        Param::Object(obj) => {
            let mode = if clause == Clause::Where {
                ClauseMode::Where
            } else {
                ClauseMode::Set
            };
            compile(obj, mode, dialect)
        }
    }
}

fn render_identifier(param: &Param, clause: Clause) -> Result<String, SqlTemplateError> {
    let one = |name: &str| {
        if clause == Clause::OrderBy {
            order_term(name)
        } else {
            Ok(escape_identifier(name))
        }
    };
    match param {
        Param::Value(RowValues::Text(name)) => one(name),
        Param::List(names) if !names.is_empty() => names
            .iter()
            .map(|name| match name {
                RowValues::Text(name) => one(name),
                other => Err(not_an_identifier(other)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.join(", ")),
        Param::Value(other) => Err(not_an_identifier(other)),
        _ => Err(SqlTemplateError::ParameterError(
            "`??` needs a name or a non-empty list of names".into(),
        )),
    }
}

/// `"column DIR"`: anything but `ASC` sorts descending.
fn order_term(term: &str) -> Result<String, SqlTemplateError> {
    let mut tokens = term.split_whitespace();
    let column = tokens.next().ok_or_else(|| {
        SqlTemplateError::ParameterError("empty ORDER BY term bound to `??`".into())
    })?;
    let direction = match tokens.next() {
        Some(dir) if dir.eq_ignore_ascii_case("ASC") => "ASC",
        _ => "DESC",
    };
    Ok(format!("{} {direction}", escape_identifier(column)))
}

fn not_an_identifier(value: &RowValues) -> SqlTemplateError {
    SqlTemplateError::ParameterError(format!("`??` needs text, got {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamObject;
    use serde_json::json;

    fn opts() -> ResolveOptions {
        ResolveOptions::default()
    }

    fn obj(value: serde_json::Value) -> Param {
        Param::Object(ParamObject::try_from(value).unwrap())
    }

    #[test]
    fn substitutes_scalars_in_order() {
        let sql = "SELECT * FROM t WHERE a=? AND b=?";
        let res = resolve(sql, &[Param::from(1), Param::from("x")], opts()).unwrap();
        assert_eq!(res, "SELECT * FROM t WHERE a=1 AND b='x'");
    }

    #[test]
    fn object_after_where_compiles_predicate() {
        let sql = "SELECT * FROM users WHERE ?";
        let res = resolve(sql, &[obj(json!({"age>": 18, "name!": "bob"}))], opts()).unwrap();
        assert_eq!(res, "SELECT * FROM users WHERE age >= 18 AND name != 'bob'");
    }

    #[test]
    fn object_elsewhere_compiles_assignments() {
        let sql = "UPDATE users SET ? WHERE ?";
        let res = resolve(
            sql,
            &[obj(json!({"name": "y"})), obj(json!({"id": 4}))],
            opts(),
        )
        .unwrap();
        assert_eq!(res, "UPDATE users SET `name` = 'y' WHERE id = 4");
    }

    #[test]
    fn insert_set_form() {
        let res = resolve(
            "INSERT INTO users SET ?",
            &[obj(json!({"password": "pw", "name": "n"}))],
            opts(),
        )
        .unwrap();
        assert_eq!(
            res,
            "INSERT INTO users SET `password` = SHA1('pw'), `name` = 'n'"
        );
    }

    #[test]
    fn where_tracking_survives_subqueries() {
        let sql = "SELECT * FROM t WHERE id IN (SELECT id FROM u LIMIT ?) AND ?";
        let res = resolve(sql, &[Param::from(5), obj(json!({"x": 1}))], opts()).unwrap();
        assert_eq!(
            res,
            "SELECT * FROM t WHERE id IN (SELECT id FROM u LIMIT 5) AND x = 1"
        );
    }

    #[test]
    fn identifier_placeholders() {
        let res = resolve(
            "SELECT ?? FROM ??",
            &[Param::from("name"), Param::from("db.users")],
            opts(),
        )
        .unwrap();
        assert_eq!(res, "SELECT `name` FROM `db`.`users`");
    }

    #[test]
    fn identifier_list() {
        let res = resolve("SELECT ?? FROM t", &[Param::from(vec!["a", "b"])], opts()).unwrap();
        assert_eq!(res, "SELECT `a`, `b` FROM t");
    }

    #[test]
    fn order_by_direction() {
        let sql = "SELECT * FROM t ORDER BY ??";
        assert_eq!(
            resolve(sql, &[Param::from("created ASC")], opts()).unwrap(),
            "SELECT * FROM t ORDER BY `created` ASC"
        );
        assert_eq!(
            resolve(sql, &[Param::from("created sideways")], opts()).unwrap(),
            "SELECT * FROM t ORDER BY `created` DESC"
        );
        assert_eq!(
            resolve(sql, &[Param::from("created")], opts()).unwrap(),
            "SELECT * FROM t ORDER BY `created` DESC"
        );
    }

    #[test]
    fn list_for_in() {
        let res = resolve("SELECT * FROM t WHERE id IN (?)", &[Param::from(vec![1, 2, 3])], opts())
            .unwrap();
        assert_eq!(res, "SELECT * FROM t WHERE id IN (1, 2, 3)");
    }

    #[test]
    fn skips_inside_literals_and_comments() {
        let sql = "SELECT '?', \"?\", `?` -- ?\n/* ? */ # ?\nFROM t WHERE a = ?";
        let res = resolve(sql, &[Param::from(7)], opts()).unwrap();
        assert_eq!(
            res,
            "SELECT '?', \"?\", `?` -- ?\n/* ? */ # ?\nFROM t WHERE a = 7"
        );
    }

    #[test]
    fn backslash_escaped_quote_does_not_end_literal() {
        let sql = r"SELECT 'it\'s ?' WHERE a = ?";
        let res = resolve(sql, &[Param::from(1)], opts()).unwrap();
        assert_eq!(res, r"SELECT 'it\'s ?' WHERE a = 1");
    }

    #[test]
    fn sqlite_backslash_is_an_ordinary_character() {
        let sqlite = opts().with_dialect(EscapeDialect::Sqlite);
        let res = resolve(r"SELECT 'C:\' AS dir, ? AS v", &[Param::from(7)], sqlite).unwrap();
        assert_eq!(res, r"SELECT 'C:\' AS dir, 7 AS v");

        let res = resolve(r#"SELECT "a\", 'b\', ?"#, &[Param::from("x")], sqlite).unwrap();
        assert_eq!(res, r#"SELECT "a\", 'b\', 'x'"#);
    }

    #[test]
    fn escaped_question_mark_is_literal() {
        let res = resolve(r"SELECT data \? 'k' FROM t WHERE a = ?", &[Param::from(1)], opts())
            .unwrap();
        assert_eq!(res, "SELECT data ? 'k' FROM t WHERE a = 1");
    }

    #[test]
    fn underflow_passthrough_leaves_placeholders() {
        let res = resolve("SELECT ?, ?, ??", &[Param::from(1)], opts()).unwrap();
        assert_eq!(res, "SELECT 1, ?, ??");
    }

    #[test]
    fn underflow_error_policy() {
        let err = resolve(
            "SELECT ?, ?",
            &[Param::from(1)],
            opts().with_underflow(UnderflowPolicy::Error),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SqlTemplateError::PlaceholderUnderflow {
                placeholders: 2,
                params: 1
            }
        ));
    }

    #[test]
    fn borrowed_when_nothing_substituted() {
        let sql = "SELECT 1";
        let res = resolve(sql, &[], opts()).unwrap();
        assert!(matches!(res, Cow::Borrowed(_)));
    }

    #[test]
    fn keeps_multibyte_text_intact() {
        let res = resolve("SELECT 'héllo', ? AS ünï", &[Param::from("wörld")], opts()).unwrap();
        assert_eq!(res, "SELECT 'héllo', 'wörld' AS ünï");
    }

    #[test]
    fn sqlite_dialect_escaping() {
        let res = resolve(
            "SELECT ?",
            &[Param::from("it's")],
            opts().with_dialect(EscapeDialect::Sqlite),
        )
        .unwrap();
        assert_eq!(res, "SELECT 'it''s'");
    }

    #[test]
    fn non_text_identifier_is_rejected() {
        let err = resolve("SELECT ??", &[Param::from(1)], opts()).unwrap_err();
        assert!(matches!(err, SqlTemplateError::ParameterError(_)));
    }
}
