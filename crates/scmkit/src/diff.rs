//! Change detection between an existing resource and desired fields.
//!
//! Only fields the caller set are compared. Lists are sets unless the field
//! was declared ordered, and a missing list on the server equals an empty one.

use crate::desired::{DesiredSpec, FieldValue};
use serde_json::{Map, Value};

/// Whether applying `desired` would change `existing`.
#[must_use]
pub fn diff(existing: &Map<String, Value>, desired: &DesiredSpec) -> bool {
    desired
        .iter()
        .any(|(name, value)| field_changed(existing.get(name), value))
}

/// Dotted paths of the fields that would change.
#[must_use]
pub fn changed_fields(existing: &Map<String, Value>, desired: &DesiredSpec) -> Vec<String> {
    let mut changed = Vec::new();
    collect_changes(existing, desired, "", &mut changed);
    changed
}

fn collect_changes(
    existing: &Map<String, Value>,
    desired: &DesiredSpec,
    prefix: &str,
    out: &mut Vec<String>,
) {
    for (name, value) in desired.iter() {
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };
        let current = existing.get(name);
        match (value, current) {
            (FieldValue::Object(nested), Some(Value::Object(inner))) => {
                collect_changes(inner, nested, &path, out);
            }
            (FieldValue::Object(nested), None | Some(Value::Null)) => {
                collect_changes(&Map::new(), nested, &path, out);
            }
            _ => {
                if field_changed(current, value) {
                    out.push(path);
                }
            }
        }
    }
}

fn field_changed(existing: Option<&Value>, desired: &FieldValue) -> bool {
    match desired {
        FieldValue::Unset => false,
        FieldValue::Null => existing.is_some_and(|v| !v.is_null()),
        FieldValue::Scalar(want) => match existing {
            Some(have) => !values_equal(have, want),
            None => true,
        },
        FieldValue::Set(want) => {
            let have = list_or_empty(existing);
            match have {
                Some(have) => !set_equal(have, want),
                None => true,
            }
        }
        FieldValue::Ordered(want) => match list_or_empty(existing) {
            Some(have) => {
                have.len() != want.len() || have.iter().zip(want).any(|(a, b)| !values_equal(a, b))
            }
            None => true,
        },
        FieldValue::Object(nested) => match existing {
            Some(Value::Object(inner)) => diff(inner, nested),
            None | Some(Value::Null) => diff(&Map::new(), nested),
            Some(_) => true,
        },
    }
}

const EMPTY: &[Value] = &[];

/// Existing list, treating missing and null as empty; `None` for non-lists.
fn list_or_empty(existing: Option<&Value>) -> Option<&[Value]> {
    match existing {
        None | Some(Value::Null) => Some(EMPTY),
        Some(Value::Array(items)) => Some(items),
        Some(_) => None,
    }
}

fn set_equal(have: &[Value], want: &[Value]) -> bool {
    let covers = |a: &[Value], b: &[Value]| a.iter().all(|x| b.iter().any(|y| values_equal(x, y)));
    covers(have, want) && covers(want, have)
}

/// Structural equality where `1` and `1.0` compare equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}
