use crate::error::SqlTemplateError;
use crate::escape::{EscapeDialect, escape_identifier, escape_value};
use crate::params::{ClauseValue, ParamObject};

/// Compile an object into a SET assignment list: `` `col` = value, ... ``.
///
/// The `password` key is stored hashed: `` `password` = SHA1('...') ``.
///
/// # Errors
/// Returns [`SqlTemplateError::UnsupportedClause`] for an empty object or for a key whose value is
/// not a single scalar.
pub fn compile_set(obj: &ParamObject, dialect: EscapeDialect) -> Result<String, SqlTemplateError> {
    if obj.is_empty() {
        return Err(SqlTemplateError::UnsupportedClause(
            "SET object must have at least one key".into(),
        ));
    }

    let mut out = String::new();
    for (i, (key, value)) in obj.iter().enumerate() {
        let ClauseValue::Value(v) = value else {
            return Err(SqlTemplateError::UnsupportedClause(format!(
                "SET key `{key}` needs a single value"
            )));
        };
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&escape_identifier(key));
        out.push_str(" = ");
        if key == "password" {
            out.push_str("SHA1(");
            out.push_str(&escape_value(v, dialect));
            out.push(')');
        } else {
            out.push_str(&escape_value(v, dialect));
        }
    }
    Ok(out)
}
