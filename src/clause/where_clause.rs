use crate::error::SqlTemplateError;
use crate::escape::{EscapeDialect, escape_list, escape_value};
use crate::params::{ClauseValue, ParamObject};
use crate::types::RowValues;

use super::key::{ClauseKey, Operator};

const AND: &str = " AND ";
const OR: &str = " OR ";

/// Compile an object into a WHERE predicate: one fragment per key, joined with `AND`.
///
/// An empty object compiles to `1 = 1` so the surrounding `WHERE` stays valid.
///
/// # Errors
/// Returns [`SqlTemplateError::UnsupportedClause`] for value shapes the key grammar has no
/// rendering for (e.g. a single object under `&&`), and [`SqlTemplateError::ParameterError`] for
/// empty lists.
pub fn compile_where(
    obj: &ParamObject,
    dialect: EscapeDialect,
) -> Result<String, SqlTemplateError> {
    joined(obj, dialect, AND)
}

/// `conjunction` is the joiner WHERE mode would use. Inside an `||` group every such joiner,
/// nested ones included, becomes `OR`.
fn joined(
    obj: &ParamObject,
    dialect: EscapeDialect,
    conjunction: &'static str,
) -> Result<String, SqlTemplateError> {
    if obj.is_empty() {
        return Ok("1 = 1".to_string());
    }
    let parts = obj
        .iter()
        .map(|(key, value)| compile_key(key, value, dialect, conjunction))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(conjunction))
}

fn compile_key(
    key: &str,
    value: &ClauseValue,
    dialect: EscapeDialect,
    conjunction: &'static str,
) -> Result<String, SqlTemplateError> {
    match ClauseKey::parse(key) {
        ClauseKey::Password { negated } => password(key, value, negated, dialect),
        ClauseKey::Like(op) => like(op, value, dialect),
        ClauseKey::AnyOf => any_of(value, dialect, conjunction),
        ClauseKey::AllOf => all_of(value, dialect, conjunction),
        ClauseKey::Compare { column, op } => compare(key, column, op, value, dialect),
        ClauseKey::Column(column) => equals(column, value, dialect),
    }
}

fn password(
    key: &str,
    value: &ClauseValue,
    negated: bool,
    dialect: EscapeDialect,
) -> Result<String, SqlTemplateError> {
    match value {
        ClauseValue::Value(v) => Ok(format!(
            "password {}= SHA1({})",
            if negated { "!" } else { "" },
            escape_value(v, dialect)
        )),
        ClauseValue::List(values) => {
            let list = non_empty(key, values)?
                .iter()
                .map(|v| format!("SHA1({})", escape_value(v, dialect)))
                .collect::<Vec<_>>()
                .join(", ");
            Ok(format!(
                "password {}IN({list})",
                if negated { "NOT " } else { "" }
            ))
        }
        _ => Err(nested_object(key)),
    }
}

fn like(op: &str, value: &ClauseValue, dialect: EscapeDialect) -> Result<String, SqlTemplateError> {
    match value {
        ClauseValue::Value(v) => Ok(format!("{op} {}", escape_value(v, dialect))),
        ClauseValue::List(values) => {
            let alternatives = non_empty(op, values)?
                .iter()
                .map(|v| format!("{op} {}", escape_value(v, dialect)))
                .collect::<Vec<_>>()
                .join(" OR ");
            Ok(format!("({alternatives})"))
        }
        _ => Err(nested_object(op)),
    }
}

/// `||`: keys inside one group are OR-ed; several groups are joined like any other WHERE
/// fragments.
fn any_of(
    value: &ClauseValue,
    dialect: EscapeDialect,
    conjunction: &'static str,
) -> Result<String, SqlTemplateError> {
    let group = |obj: &ParamObject| -> Result<String, SqlTemplateError> {
        if obj.is_empty() {
            return Err(SqlTemplateError::UnsupportedClause(
                "`||` group must not be empty".into(),
            ));
        }
        Ok(format!("({})", joined(obj, dialect, OR)?))
    };
    match value {
        ClauseValue::Object(obj) => group(obj),
        ClauseValue::Objects(objs) if !objs.is_empty() => Ok(objs
            .iter()
            .map(group)
            .collect::<Result<Vec<_>, _>>()?
            .join(conjunction)),
        _ => Err(SqlTemplateError::UnsupportedClause(
            "`||` expects an object or a non-empty list of objects".into(),
        )),
    }
}

/// `&&`: each object is an AND-ed group; groups are OR-ed inside one outer parenthesis.
fn all_of(
    value: &ClauseValue,
    dialect: EscapeDialect,
    conjunction: &'static str,
) -> Result<String, SqlTemplateError> {
    match value {
        ClauseValue::Objects(objs) if !objs.is_empty() => {
            let groups = objs
                .iter()
                .map(|obj| joined(obj, dialect, conjunction).map(|sql| format!("({sql})")))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("({})", groups.join(OR)))
        }
        ClauseValue::Object(_) => Err(SqlTemplateError::UnsupportedClause(
            "`&&` does not accept a single object; wrap it in a list".into(),
        )),
        _ => Err(SqlTemplateError::UnsupportedClause(
            "`&&` expects a non-empty list of objects".into(),
        )),
    }
}

fn compare(
    key: &str,
    column: &str,
    op: Operator,
    value: &ClauseValue,
    dialect: EscapeDialect,
) -> Result<String, SqlTemplateError> {
    match value {
        ClauseValue::Value(v) => Ok(format!(
            "{column} {} {}",
            op.as_sql(),
            escape_value(v, dialect)
        )),
        // Every operator suffix turns a list into NOT IN, `<`/`>` included.
        ClauseValue::List(values) => Ok(format!(
            "{column} NOT IN({})",
            escape_list(non_empty(key, values)?, dialect)
        )),
        _ => Err(nested_object(key)),
    }
}

fn equals(
    column: &str,
    value: &ClauseValue,
    dialect: EscapeDialect,
) -> Result<String, SqlTemplateError> {
    match value {
        ClauseValue::Value(RowValues::Null) => Ok(format!("{column} IS NULL")),
        ClauseValue::Value(v) => Ok(format!("{column} = {}", escape_value(v, dialect))),
        ClauseValue::List(values) => Ok(format!(
            "{column} IN({})",
            escape_list(non_empty(column, values)?, dialect)
        )),
        _ => Err(nested_object(column)),
    }
}

fn non_empty<'v>(key: &str, values: &'v [RowValues]) -> Result<&'v [RowValues], SqlTemplateError> {
    if values.is_empty() {
        Err(SqlTemplateError::ParameterError(format!(
            "empty list for clause key `{key}`"
        )))
    } else {
        Ok(values)
    }
}

fn nested_object(key: &str) -> SqlTemplateError {
    SqlTemplateError::UnsupportedClause(format!(
        "clause key `{key}` does not accept nested objects"
    ))
}
