//! Literal and identifier escaping.
//!
//! Every value interpolated into a template goes through [`escape_value`]; every column/table name
//! through [`escape_identifier`]. Output never lets a value leave its literal.

use std::fmt::Write;

use clap::ValueEnum;
use serde::Deserialize;

use crate::types::RowValues;

/// SQL dialect used for literal escaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EscapeDialect {
    /// Backslash escapes inside single quotes, `true`/`false` booleans.
    #[default]
    Mysql,
    /// Doubled single quotes, `1`/`0` booleans. Used by the `SQLite` backend.
    Sqlite,
}

/// Render a scalar as a SQL literal.
///
/// ```rust
/// use sql_templates::escape::{EscapeDialect, escape_value};
/// use sql_templates::prelude::RowValues;
///
/// assert_eq!(escape_value(&RowValues::Text("it's".into()), EscapeDialect::Mysql), r"'it\'s'");
/// assert_eq!(escape_value(&RowValues::Text("it's".into()), EscapeDialect::Sqlite), "'it''s'");
/// ```
#[must_use]
pub fn escape_value(value: &RowValues, dialect: EscapeDialect) -> String {
    let mut out = String::new();
    push_value(&mut out, value, dialect);
    out
}

/// Render a list of scalars as comma separated literals, e.g. for `IN (?)`.
#[must_use]
pub fn escape_list(values: &[RowValues], dialect: EscapeDialect) -> String {
    let mut out = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        push_value(&mut out, value, dialect);
    }
    out
}

/// Quote a column or table name with backticks.
///
/// Embedded backticks are doubled and dotted names are quoted per part, so `t.c` becomes
/// `` `t`.`c` ``. Both supported dialects accept backtick identifiers.
#[must_use]
pub fn escape_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    for (i, part) in name.split('.').enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push('`');
        out.push_str(&part.replace('`', "``"));
        out.push('`');
    }
    out
}

pub(crate) fn push_value(out: &mut String, value: &RowValues, dialect: EscapeDialect) {
    match value {
        RowValues::Null => out.push_str("NULL"),
        RowValues::Int(i) => {
            let _ = write!(out, "{i}");
        }
        RowValues::Float(f) if f.is_finite() => {
            let _ = write!(out, "{f}");
        }
        // NaN/inf have no SQL literal form.
        RowValues::Float(_) => out.push_str("NULL"),
        RowValues::Bool(b) => match dialect {
            EscapeDialect::Mysql => out.push_str(if *b { "true" } else { "false" }),
            EscapeDialect::Sqlite => out.push(if *b { '1' } else { '0' }),
        },
        RowValues::Text(s) => push_text(out, s, dialect),
        RowValues::Timestamp(dt) => {
            let _ = write!(out, "'{}'", dt.format("%F %T%.f"));
        }
        RowValues::Blob(bytes) => push_hex(out, bytes),
    }
}

fn push_text(out: &mut String, s: &str, dialect: EscapeDialect) {
    match dialect {
        EscapeDialect::Mysql => {
            out.push('\'');
            for c in s.chars() {
                match c {
                    '\0' => out.push_str("\\0"),
                    '\u{8}' => out.push_str("\\b"),
                    '\t' => out.push_str("\\t"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\u{1a}' => out.push_str("\\Z"),
                    '"' => out.push_str("\\\""),
                    '\'' => out.push_str("\\'"),
                    '\\' => out.push_str("\\\\"),
                    other => out.push(other),
                }
            }
            out.push('\'');
        }
        // SQLite text literals stop at NUL, so go through a blob instead.
        EscapeDialect::Sqlite if s.contains('\0') => {
            out.push_str("CAST(");
            push_hex(out, s.as_bytes());
            out.push_str(" AS TEXT)");
        }
        EscapeDialect::Sqlite => {
            out.push('\'');
            out.push_str(&s.replace('\'', "''"));
            out.push('\'');
        }
    }
}

fn push_hex(out: &mut String, bytes: &[u8]) {
    out.push_str("X'");
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out.push('\'');
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn mysql_strings_escape_control_and_quote_chars() {
        let v = RowValues::Text("a'b\"c\\d\n\r\t\0\u{1a}\u{8}".into());
        assert_eq!(
            escape_value(&v, EscapeDialect::Mysql),
            r#"'a\'b\"c\\d\n\r\t\0\Z\b'"#
        );
    }

    #[test]
    fn sqlite_strings_double_quotes() {
        let v = RowValues::Text("O'Brien".into());
        assert_eq!(escape_value(&v, EscapeDialect::Sqlite), "'O''Brien'");
    }

    #[test]
    fn sqlite_nul_goes_through_blob_cast() {
        let v = RowValues::Text("a\0b".into());
        assert_eq!(
            escape_value(&v, EscapeDialect::Sqlite),
            "CAST(X'610062' AS TEXT)"
        );
    }

    #[test]
    fn numbers_and_booleans() {
        assert_eq!(escape_value(&RowValues::Int(-42), EscapeDialect::Mysql), "-42");
        assert_eq!(escape_value(&RowValues::Float(1.5), EscapeDialect::Mysql), "1.5");
        assert_eq!(
            escape_value(&RowValues::Float(f64::NAN), EscapeDialect::Mysql),
            "NULL"
        );
        assert_eq!(escape_value(&RowValues::Bool(true), EscapeDialect::Mysql), "true");
        assert_eq!(escape_value(&RowValues::Bool(false), EscapeDialect::Sqlite), "0");
        assert_eq!(escape_value(&RowValues::Null, EscapeDialect::Sqlite), "NULL");
    }

    #[test]
    fn timestamps_and_blobs() {
        let dt = NaiveDate::from_ymd_opt(2021, 12, 31)
            .unwrap()
            .and_hms_milli_opt(23, 59, 58, 125)
            .unwrap();
        assert_eq!(
            escape_value(&RowValues::Timestamp(dt), EscapeDialect::Mysql),
            "'2021-12-31 23:59:58.125'"
        );
        assert_eq!(
            escape_value(&RowValues::Blob(vec![0xde, 0xad, 0x01]), EscapeDialect::Mysql),
            "X'dead01'"
        );
    }

    #[test]
    fn lists_join_with_comma_space() {
        let values = vec![RowValues::Text("a".into()), RowValues::Int(2)];
        assert_eq!(escape_list(&values, EscapeDialect::Mysql), "'a', 2");
        assert_eq!(escape_list(&[], EscapeDialect::Mysql), "");
    }

    #[test]
    fn identifiers_quote_per_part_and_double_backticks() {
        assert_eq!(escape_identifier("name"), "`name`");
        assert_eq!(escape_identifier("users.name"), "`users`.`name`");
        assert_eq!(escape_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn identifier_quoting_is_injective() {
        for name in ["id", "users.id", "a b", "select", "x.y.z"] {
            let quoted = escape_identifier(name);
            assert_eq!(quoted.replace('`', ""), name);
        }
    }
}
