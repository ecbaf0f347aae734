//! Rows as the storage provider returns them.

use std::cmp::Ordering;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use query_engine_metadata::metadata::EntityDescriptor;

use crate::error::Error;

/// A stored row: scalar values, the stored key of single-valued relations
/// and the list of keys of many-to-many relations. Reverse relations are not
/// stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub IndexMap<String, Value>);

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The stored primary key. This is the raw identifier even when the
    /// primary key is a relation.
    pub fn key(&self, entity: &EntityDescriptor) -> Result<&Value, Error> {
        let primary_key = entity.primary_key();
        match self.0.get(primary_key.as_str()) {
            Some(value) if !value.is_null() => Ok(value),
            _ => Err(Error::MissingKey {
                entity: entity.name.to_string(),
                field: primary_key.to_string(),
            }),
        }
    }
}

/// Render a key for use as an object key in the response.
pub fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Equality of stored values. Numbers compare by value, so `1` equals `1.0`.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => l == r,
            _ => l.as_f64() == r.as_f64(),
        },
        (l, r) => l == r,
    }
}

/// Ordering of stored values of the same type. Values of different types,
/// and nulls, have no order.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => l.as_f64()?.partial_cmp(&r.as_f64()?),
        },
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_by_value() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
        assert_eq!(compare_values(&json!(2), &json!(10)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!(null), &json!(2)), None);
    }

    #[test]
    fn keys_render_without_quotes() {
        assert_eq!(key_string(&json!(3)), "3");
        assert_eq!(key_string(&json!("a-b")), "a-b");
    }
}
