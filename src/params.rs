//! Template parameters: scalars, scalar lists, and keyed clause objects.
//!
//! Parameters are consumed left to right, one per placeholder. A [`ParamObject`] bound to a `?`
//! placeholder is compiled into a WHERE predicate or a SET assignment list, depending on where the
//! placeholder sits in the template.

use chrono::NaiveDateTime;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::SqlTemplateError;
use crate::types::RowValues;

/// One positional template parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// A single escaped literal.
    Value(RowValues),
    /// A comma-separated list of escaped literals (e.g. for `IN (?)`).
    List(Vec<RowValues>),
    /// A keyed object compiled by the clause compiler.
    Object(ParamObject),
}

/// Value stored under one clause key.
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseValue {
    Value(RowValues),
    List(Vec<RowValues>),
    /// A nested object; only meaningful under the `||` key.
    Object(ParamObject),
    /// Several nested objects; used by the `||` and `&&` keys.
    Objects(Vec<ParamObject>),
}

/// Insertion-ordered object of clause keys.
///
/// Keys are unique; inserting an existing key replaces its value without moving it, so compiled
/// SQL stays reproducible.
///
/// ```rust
/// use sql_templates::prelude::*;
///
/// let filter = ParamObject::new()
///     .with("age>", 21)
///     .with("name!", "bob")
///     .with("deleted_at", RowValues::Null);
/// assert_eq!(filter.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamObject {
    entries: Vec<(String, ClauseValue)>,
}

impl ParamObject {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ClauseValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a key, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ClauseValue>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ClauseValue> {
        self.entries
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClauseValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<ClauseValue>> FromIterator<(K, V)> for ParamObject {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut obj = ParamObject::new();
        for (k, v) in iter {
            obj.insert(k, v);
        }
        obj
    }
}

impl From<ParamObject> for Param {
    fn from(value: ParamObject) -> Self {
        Param::Object(value)
    }
}

impl From<ParamObject> for ClauseValue {
    fn from(value: ParamObject) -> Self {
        ClauseValue::Object(value)
    }
}

impl From<Vec<ParamObject>> for ClauseValue {
    fn from(value: Vec<ParamObject>) -> Self {
        ClauseValue::Objects(value)
    }
}

macro_rules! impl_scalar_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Param {
                fn from(value: $t) -> Self {
                    Param::Value(value.into())
                }
            }

            impl From<$t> for ClauseValue {
                fn from(value: $t) -> Self {
                    ClauseValue::Value(value.into())
                }
            }

            impl From<Vec<$t>> for Param {
                fn from(values: Vec<$t>) -> Self {
                    Param::List(values.into_iter().map(Into::into).collect())
                }
            }

            impl From<Vec<$t>> for ClauseValue {
                fn from(values: Vec<$t>) -> Self {
                    ClauseValue::List(values.into_iter().map(Into::into).collect())
                }
            }
        )*
    };
}

impl_scalar_from!(RowValues, i64, i32, f64, bool, &str, String);

impl From<NaiveDateTime> for Param {
    fn from(value: NaiveDateTime) -> Self {
        Param::Value(RowValues::Timestamp(value))
    }
}

impl From<NaiveDateTime> for ClauseValue {
    fn from(value: NaiveDateTime) -> Self {
        ClauseValue::Value(RowValues::Timestamp(value))
    }
}

/// Convert a JSON array into a positional parameter list.
///
/// # Errors
/// Returns [`SqlTemplateError::ParameterError`] if `value` is not an array or one of its entries
/// cannot be represented as a [`Param`].
pub fn params_from_json(value: JsonValue) -> Result<Vec<Param>, SqlTemplateError> {
    match value {
        JsonValue::Array(items) => items.into_iter().map(Param::try_from).collect(),
        other => Err(SqlTemplateError::ParameterError(format!(
            "expected a JSON array of parameters, got {other}"
        ))),
    }
}

fn scalar_from_json(value: JsonValue) -> Result<RowValues, SqlTemplateError> {
    match value {
        JsonValue::Null => Ok(RowValues::Null),
        JsonValue::Bool(b) => Ok(RowValues::Bool(b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(RowValues::Int(i))
            } else {
                n.as_f64().map(RowValues::Float).ok_or_else(|| {
                    SqlTemplateError::ParameterError(format!("unrepresentable number {n}"))
                })
            }
        }
        JsonValue::String(s) => Ok(RowValues::Text(s)),
        other => Err(SqlTemplateError::ParameterError(format!(
            "expected a scalar, got {other}"
        ))),
    }
}

fn scalar_list_from_json(items: Vec<JsonValue>) -> Result<Vec<RowValues>, SqlTemplateError> {
    items.into_iter().map(scalar_from_json).collect()
}

impl TryFrom<JsonMap<String, JsonValue>> for ParamObject {
    type Error = SqlTemplateError;

    fn try_from(map: JsonMap<String, JsonValue>) -> Result<Self, Self::Error> {
        let mut obj = ParamObject::new();
        for (key, value) in map {
            obj.insert(key, ClauseValue::try_from(value)?);
        }
        Ok(obj)
    }
}

impl TryFrom<JsonValue> for ClauseValue {
    type Error = SqlTemplateError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::Object(map) => Ok(ClauseValue::Object(ParamObject::try_from(map)?)),
            JsonValue::Array(items) if items.iter().any(JsonValue::is_object) => {
                let objects = items
                    .into_iter()
                    .map(|item| match item {
                        JsonValue::Object(map) => ParamObject::try_from(map),
                        other => Err(SqlTemplateError::ParameterError(format!(
                            "cannot mix objects and scalars in one list: {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ClauseValue::Objects(objects))
            }
            JsonValue::Array(items) => Ok(ClauseValue::List(scalar_list_from_json(items)?)),
            scalar => Ok(ClauseValue::Value(scalar_from_json(scalar)?)),
        }
    }
}

impl TryFrom<JsonValue> for Param {
    type Error = SqlTemplateError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::Object(map) => Ok(Param::Object(ParamObject::try_from(map)?)),
            JsonValue::Array(items) => Ok(Param::List(scalar_list_from_json(items)?)),
            scalar => Ok(Param::Value(scalar_from_json(scalar)?)),
        }
    }
}

impl TryFrom<JsonValue> for ParamObject {
    type Error = SqlTemplateError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::Object(map) => ParamObject::try_from(map),
            other => Err(SqlTemplateError::ParameterError(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_replaces_in_place() {
        let obj = ParamObject::new()
            .with("a", 1)
            .with("b", 2)
            .with("a", 3);
        let keys: Vec<&str> = obj.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(obj.get("a"), Some(&ClauseValue::Value(RowValues::Int(3))));
    }

    #[test]
    fn json_object_keeps_key_order() {
        let obj = ParamObject::try_from(json!({"z": 1, "a": 2, "m": 3})).unwrap();
        let keys: Vec<&str> = obj.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn json_arrays_split_into_lists_and_objects() {
        let value = ClauseValue::try_from(json!([{"a": 1}, {"b": 2}])).unwrap();
        assert!(matches!(value, ClauseValue::Objects(ref v) if v.len() == 2));

        let value = ClauseValue::try_from(json!(["x", 2, null])).unwrap();
        assert_eq!(
            value,
            ClauseValue::List(vec![
                RowValues::Text("x".into()),
                RowValues::Int(2),
                RowValues::Null
            ])
        );
    }

    #[test]
    fn mixed_object_and_scalar_list_is_rejected() {
        let err = ClauseValue::try_from(json!([{"a": 1}, 2])).unwrap_err();
        assert!(matches!(err, SqlTemplateError::ParameterError(_)));
    }

    #[test]
    fn top_level_params_from_json() {
        let params = params_from_json(json!([1, "x", [1, 2], {"id": 5}])).unwrap();
        assert_eq!(params.len(), 4);
        assert_eq!(params[0], Param::Value(RowValues::Int(1)));
        assert!(matches!(params[2], Param::List(_)));
        assert!(matches!(params[3], Param::Object(_)));
        assert!(params_from_json(json!({"id": 5})).is_err());
    }

    #[test]
    fn large_unsigned_falls_back_to_float() {
        let p = Param::try_from(json!(u64::MAX)).unwrap();
        assert!(matches!(p, Param::Value(RowValues::Float(_))));
    }
}
