//! Handle the translation of literal values.

use query_engine_metadata::metadata::{Lookup, ScalarType, ValueShape};
use query_engine_predicate::predicate::ast::Literal;
use serde_json::Value;

use crate::translation::error::{Error, NodeLocation};

/// Convert the JSON value of a comparison into a literal, checking it against
/// the shape the lookup expects and the type of the compared field.
pub fn translate_lookup_value(
    value: &Value,
    lookup: Lookup,
    scalar_type: ScalarType,
    location: &NodeLocation,
) -> Result<Literal, Error> {
    match lookup.value_shape() {
        ValueShape::Flag => match value {
            Value::Bool(b) => Ok(Literal::Bool(*b)),
            _ => Err(mismatch(value, "boolean", location)),
        },
        ValueShape::Pattern => match value {
            Value::String(pattern) => {
                let compiled = if lookup == Lookup::CaseInsensitiveRegex {
                    regex::Regex::new(&format!("(?i){pattern}"))
                } else {
                    regex::Regex::new(pattern)
                };
                compiled
                    .map(|_| Literal::String(pattern.clone()))
                    .map_err(|_| mismatch(value, "regular expression", location))
            }
            _ => Err(mismatch(value, "regular expression", location)),
        },
        ValueShape::List => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| translate_json_value(item, scalar_type, location))
                .collect::<Result<Vec<_>, _>>()
                .map(Literal::List),
            _ => Err(mismatch(value, &format!("list of {scalar_type}"), location)),
        },
        ValueShape::Pair => match value {
            Value::Array(items) if items.len() == 2 => items
                .iter()
                .map(|item| translate_json_value(item, scalar_type, location))
                .collect::<Result<Vec<_>, _>>()
                .map(Literal::List),
            _ => Err(mismatch(value, &format!("pair of {scalar_type}"), location)),
        },
        ValueShape::Single => match value {
            // `field = null` is the only comparison with null that means anything.
            Value::Null if lookup == Lookup::Exact => Ok(Literal::Null),
            _ => translate_json_value(value, scalar_type, location),
        },
    }
}

/// Convert a JSON value into a literal of the given type.
pub fn translate_json_value(
    value: &Value,
    scalar_type: ScalarType,
    location: &NodeLocation,
) -> Result<Literal, Error> {
    match (scalar_type, value) {
        // json documents accept anything
        (ScalarType::Json, value) => Ok(Literal::Json(value.clone())),

        (ScalarType::Boolean, Value::Bool(b)) => Ok(Literal::Bool(*b)),

        // numbers
        (ScalarType::Integer, Value::Number(num)) => num
            .as_i64()
            .map(Literal::Int)
            .ok_or_else(|| mismatch(value, "integer", location)),
        (ScalarType::Float, Value::Number(num)) => num
            .as_f64()
            .map(Literal::Float)
            .ok_or_else(|| mismatch(value, "float", location)),

        // numbers - for when the client passes numbers as strings
        (ScalarType::Integer, Value::String(s)) => s
            .trim()
            .parse()
            .map(Literal::Int)
            .map_err(|_| mismatch(value, "integer", location)),
        (ScalarType::Float, Value::String(s)) => s
            .trim()
            .parse()
            .map(Literal::Float)
            .map_err(|_| mismatch(value, "float", location)),

        // strings
        (ScalarType::Text, Value::String(s)) => Ok(Literal::String(s.clone())),

        (ScalarType::Uuid, Value::String(s)) => uuid::Uuid::parse_str(s)
            .map(Literal::Uuid)
            .map_err(|_| mismatch(value, "uuid", location)),

        // date and time
        (ScalarType::Date, Value::String(s)) if is_iso_date(s) => Ok(Literal::String(s.clone())),
        (ScalarType::DateTime, Value::String(s)) if is_iso_datetime(s) => {
            Ok(Literal::String(s.clone()))
        }

        (scalar_type, value) => Err(mismatch(value, &scalar_type.to_string(), location)),
    }
}

fn mismatch(value: &Value, expected: &str, location: &NodeLocation) -> Error {
    Error::TypeMismatch {
        location: location.clone(),
        value: value.clone(),
        expected: expected.to_string(),
    }
}

fn all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

/// `YYYY-MM-DD`
fn is_iso_date(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    match parts.as_slice() {
        [year, month, day] => {
            all_digits(year, 4)
                && all_digits(month, 2)
                && all_digits(day, 2)
                && matches!(month.parse::<u8>(), Ok(1..=12))
                && matches!(day.parse::<u8>(), Ok(1..=31))
        }
        _ => false,
    }
}

/// `YYYY-MM-DD`, then `T` or a space, then `HH:MM` with optional seconds,
/// fractions and offset.
fn is_iso_datetime(s: &str) -> bool {
    let Some((date, time)) = s.split_once(['T', ' ']) else {
        return false;
    };
    if !is_iso_date(date) {
        return false;
    }
    let time = time
        .strip_suffix('Z')
        .or_else(|| {
            time.rfind(['+', '-'])
                .filter(|index| *index >= 5)
                .map(|index| &time[..index])
        })
        .unwrap_or(time);
    let time = time.split('.').next().unwrap_or(time);
    let parts: Vec<&str> = time.split(':').collect();
    match parts.as_slice() {
        [hours, minutes] | [hours, minutes, _] if !all_digits(hours, 2) || !all_digits(minutes, 2) => {
            false
        }
        [_, _] => true,
        [_, _, seconds] => all_digits(seconds, 2),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn translate(value: Value, lookup: Lookup, scalar_type: ScalarType) -> Result<Literal, Error> {
        translate_lookup_value(&value, lookup, scalar_type, &NodeLocation::ast())
    }

    #[test]
    fn numbers_can_be_passed_as_strings() {
        assert_eq!(
            translate(json!("42"), Lookup::Exact, ScalarType::Integer).unwrap(),
            Literal::Int(42)
        );
        assert_eq!(
            translate(json!(2.5), Lookup::GreaterThan, ScalarType::Float).unwrap(),
            Literal::Float(2.5)
        );
        assert!(translate(json!("many"), Lookup::Exact, ScalarType::Integer).is_err());
    }

    #[test]
    fn in_needs_a_list_and_range_a_pair() {
        assert_eq!(
            translate(json!([1, 2, 3]), Lookup::In, ScalarType::Integer).unwrap(),
            Literal::List(vec![Literal::Int(1), Literal::Int(2), Literal::Int(3)])
        );
        assert!(translate(json!(1), Lookup::In, ScalarType::Integer).is_err());
        assert!(translate(json!([1, 2, 3]), Lookup::Range, ScalarType::Integer).is_err());
    }

    #[test]
    fn isnull_needs_a_boolean() {
        assert_eq!(
            translate(json!(true), Lookup::IsNull, ScalarType::Text).unwrap(),
            Literal::Bool(true)
        );
        assert!(translate(json!("yes"), Lookup::IsNull, ScalarType::Text).is_err());
    }

    #[test]
    fn regex_patterns_are_checked() {
        assert!(translate(json!("^Rust"), Lookup::Regex, ScalarType::Text).is_ok());
        assert!(translate(json!("(unclosed"), Lookup::Regex, ScalarType::Text).is_err());
    }

    #[test]
    fn null_only_compares_exactly() {
        assert_eq!(
            translate(Value::Null, Lookup::Exact, ScalarType::Text).unwrap(),
            Literal::Null
        );
        assert!(translate(Value::Null, Lookup::CaseInsensitiveContains, ScalarType::Text).is_err());
    }

    #[test]
    fn uuids_are_parsed() {
        let value = translate(
            json!(tests_common::ALICE),
            Lookup::Exact,
            ScalarType::Uuid,
        )
        .unwrap();
        assert!(matches!(value, Literal::Uuid(_)));
        assert!(translate(json!("alice"), Lookup::Exact, ScalarType::Uuid).is_err());
    }

    #[test]
    fn dates_and_datetimes_are_checked() {
        assert!(is_iso_date("2024-02-29"));
        assert!(!is_iso_date("2024-13-01"));
        assert!(!is_iso_date("yesterday"));
        assert!(is_iso_datetime("2024-01-10T09:00:00Z"));
        assert!(is_iso_datetime("2024-01-10 09:00"));
        assert!(is_iso_datetime("2024-01-10T09:00:00.123+02:00"));
        assert!(!is_iso_datetime("2024-01-10"));
        assert!(!is_iso_datetime("2024-01-10T9am"));
    }
}
