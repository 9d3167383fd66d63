//! Desired resource fields with partial-update semantics.
//!
//! A [`DesiredSpec`] only asserts the fields a caller cares about. Each field
//! is a [`FieldValue`], which keeps "not provided" ([`FieldValue::Unset`])
//! distinct from an explicit null ([`FieldValue::Null`]): unset fields are
//! neither sent nor compared, nulls are both.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Value of one desired field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Not provided; never sent, never compared.
    Unset,
    /// Explicit null.
    Null,
    /// Scalar (string, number, bool) or any opaque JSON value.
    Scalar(Value),
    /// List whose order is significant.
    Ordered(Vec<Value>),
    /// List compared as an unordered set.
    Set(Vec<Value>),
    /// Nested object compared field by field.
    Object(DesiredSpec),
}

impl FieldValue {
    /// Unordered list from anything convertible to JSON values.
    pub fn set<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    /// Ordered list from anything convertible to JSON values.
    pub fn ordered<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Ordered(items.into_iter().map(Into::into).collect())
    }

    /// Whether this field is unset.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Convert a JSON value, treating arrays as sets unless `name` is listed
    /// in `ordered_fields`.
    pub fn from_json(name: &str, value: &Value, ordered_fields: &[&str]) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Array(items) if ordered_fields.contains(&name) => Self::Ordered(items.clone()),
            Value::Array(items) => Self::Set(items.clone()),
            Value::Object(map) => Self::Object(DesiredSpec::from_map(map, ordered_fields)),
            scalar => Self::Scalar(scalar.clone()),
        }
    }

    /// Render for a request body; `None` when unset.
    #[must_use]
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Unset => None,
            Self::Null => Some(Value::Null),
            Self::Scalar(value) => Some(value.clone()),
            Self::Ordered(items) | Self::Set(items) => Some(Value::Array(items.clone())),
            Self::Object(spec) => Some(Value::Object(spec.to_payload())),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<DesiredSpec> for FieldValue {
    fn from(value: DesiredSpec) -> Self {
        Self::Object(value)
    }
}

/// Mapping of field name to desired value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredSpec {
    fields: BTreeMap<String, FieldValue>,
}

impl DesiredSpec {
    /// Create an empty spec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Get a field; a missing key reads as [`FieldValue::Unset`].
    #[must_use]
    pub fn get(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&FieldValue::Unset)
    }

    /// Iterate over declared fields, including explicitly unset ones.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.values().all(FieldValue::is_unset)
    }

    /// Desired `name`, when set to a string.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self.get("name") {
            FieldValue::Scalar(Value::String(name)) => Some(name),
            _ => None,
        }
    }

    /// Build from a JSON document, which must be an object.
    pub fn from_json(value: &Value, ordered_fields: &[&str]) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map, ordered_fields)),
            Value::Null => Ok(Self::new()),
            _ => Err(Error::validation("desired fields must be a JSON object")),
        }
    }

    fn from_map(map: &Map<String, Value>, ordered_fields: &[&str]) -> Self {
        let fields = map
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    FieldValue::from_json(name, value, ordered_fields),
                )
            })
            .collect();
        Self { fields }
    }

    /// Render the request body: unset fields omitted, nulls kept.
    #[must_use]
    pub fn to_payload(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|(name, value)| value.to_json().map(|v| (name.clone(), v)))
            .collect()
    }

    /// Overlay the set fields onto an existing document.
    ///
    /// Nested objects are merged recursively; everything else replaces.
    pub fn merge_into(&self, target: &mut Map<String, Value>) {
        for (name, value) in &self.fields {
            match value {
                FieldValue::Unset => {}
                FieldValue::Object(nested) => match target.get_mut(name) {
                    Some(Value::Object(existing)) => nested.merge_into(existing),
                    _ => {
                        target.insert(name.clone(), Value::Object(nested.to_payload()));
                    }
                },
                other => {
                    if let Some(json) = other.to_json() {
                        target.insert(name.clone(), json);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_classifies_fields() {
        let spec = DesiredSpec::from_json(
            &json!({
                "name": "web",
                "description": null,
                "tag": ["a", "b"],
                "encryption": ["aes-256-gcm", "aes-128-cbc"],
                "protocol": {"tcp": {"port": "443"}}
            }),
            &["encryption"],
        )
        .unwrap();

        assert_eq!(spec.get("name"), &FieldValue::from("web"));
        assert_eq!(spec.get("description"), &FieldValue::Null);
        assert_eq!(spec.get("tag"), &FieldValue::set(["a", "b"]));
        assert_eq!(
            spec.get("encryption"),
            &FieldValue::ordered(["aes-256-gcm", "aes-128-cbc"])
        );
        assert!(matches!(spec.get("protocol"), FieldValue::Object(_)));
        assert!(spec.get("missing").is_unset());
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(DesiredSpec::from_json(&json!(["a"]), &[]).is_err());
        assert!(DesiredSpec::from_json(&json!(null), &[]).unwrap().is_empty());
    }

    #[test]
    fn test_payload_omits_unset_keeps_null() {
        let spec = DesiredSpec::new()
            .with("name", "web")
            .with("description", FieldValue::Null)
            .with("tag", FieldValue::Unset);

        let payload = spec.to_payload();
        assert_eq!(payload.get("name"), Some(&json!("web")));
        assert_eq!(payload.get("description"), Some(&Value::Null));
        assert!(!payload.contains_key("tag"));
    }

    #[test]
    fn test_is_empty_ignores_unset() {
        let spec = DesiredSpec::new().with("tag", FieldValue::Unset);
        assert!(spec.is_empty());
        assert!(!spec.clone().with("name", "x").is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(DesiredSpec::new().with("name", "web").name(), Some("web"));
        assert_eq!(DesiredSpec::new().with("name", 5_i64).name(), None);
        assert_eq!(DesiredSpec::new().name(), None);
    }

    #[test]
    fn test_merge_into_nested() {
        let mut existing = match json!({
            "id": "1",
            "name": "svc",
            "protocol": {"tcp": {"port": "80", "override": {"timeout": 10}}}
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let tcp = DesiredSpec::new().with("port", "443");
        let spec = DesiredSpec::new()
            .with("protocol", DesiredSpec::new().with("tcp", tcp))
            .with("description", "https");

        spec.merge_into(&mut existing);
        assert_eq!(existing["protocol"]["tcp"]["port"], "443");
        assert_eq!(existing["protocol"]["tcp"]["override"]["timeout"], 10);
        assert_eq!(existing["description"], "https");
        assert_eq!(existing["id"], "1");
    }
}
