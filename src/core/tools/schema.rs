//! Parameter schemas for tool declarations.
//!
//! A typed subset of JSON Schema: objects with named properties and a required
//! subset, arrays with an item schema, and scalar leaves. Schemas serialize to the
//! lowercase JSON Schema form used by most realtime APIs; bindings that expect a
//! different casing convert in their translator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A parameter schema node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schema {
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default)]
        properties: BTreeMap<String, Schema>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        required: Vec<String>,
    },
    Array {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        items: Box<Schema>,
    },
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
        allowed: Option<Vec<String>>,
    },
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Boolean {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

/// A value that does not satisfy its schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{path}: missing required property '{property}'")]
    MissingProperty { path: String, property: String },

    #[error("{path}: '{value}' is not one of {allowed:?}")]
    NotAllowed {
        path: String,
        value: String,
        allowed: Vec<String>,
    },
}

impl Schema {
    pub fn object() -> Self {
        Schema::Object {
            description: None,
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn array(items: Schema) -> Self {
        Schema::Array {
            description: None,
            items: Box::new(items),
        }
    }

    pub fn string() -> Self {
        Schema::String {
            description: None,
            allowed: None,
        }
    }

    pub fn integer() -> Self {
        Schema::Integer { description: None }
    }

    pub fn number() -> Self {
        Schema::Number { description: None }
    }

    pub fn boolean() -> Self {
        Schema::Boolean { description: None }
    }

    /// Attach a human-readable description to this node.
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        let text = Some(text.into());
        match &mut self {
            Schema::Object { description, .. }
            | Schema::Array { description, .. }
            | Schema::String { description, .. }
            | Schema::Integer { description }
            | Schema::Number { description }
            | Schema::Boolean { description } => *description = text,
        }
        self
    }

    /// Restrict a string node to a fixed set of values. No-op on other nodes.
    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Schema::String { allowed, .. } = &mut self {
            *allowed = Some(values.into_iter().map(Into::into).collect());
        }
        self
    }

    /// Add a property to an object node. No-op on other nodes.
    pub fn property(mut self, name: impl Into<String>, schema: Schema, is_required: bool) -> Self {
        if let Schema::Object {
            properties,
            required,
            ..
        } = &mut self
        {
            let name = name.into();
            if is_required && !required.contains(&name) {
                required.push(name.clone());
            }
            properties.insert(name, schema);
        }
        self
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Schema::Object { .. })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Schema::Object { .. } => "object",
            Schema::Array { .. } => "array",
            Schema::String { .. } => "string",
            Schema::Integer { .. } => "integer",
            Schema::Number { .. } => "number",
            Schema::Boolean { .. } => "boolean",
        }
    }

    /// Render as a JSON Schema value.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Validate `value` against this schema.
    ///
    /// Returns the normalized value: integral floats given for `integer` nodes are
    /// converted to integers. Properties not named by an object schema are passed
    /// through untouched.
    pub fn validate(&self, value: &Value) -> Result<Value, SchemaViolation> {
        self.check(value, "$")
    }

    fn check(&self, value: &Value, path: &str) -> Result<Value, SchemaViolation> {
        match self {
            Schema::Object {
                properties,
                required,
                ..
            } => {
                let Value::Object(map) = value else {
                    return Err(self.mismatch(path, value));
                };

                for name in required {
                    if !map.contains_key(name) {
                        return Err(SchemaViolation::MissingProperty {
                            path: path.to_string(),
                            property: name.clone(),
                        });
                    }
                }

                let mut normalized = Map::with_capacity(map.len());
                for (key, field) in map {
                    let checked = match properties.get(key) {
                        Some(schema) => schema.check(field, &format!("{path}.{key}"))?,
                        None => field.clone(),
                    };
                    normalized.insert(key.clone(), checked);
                }
                Ok(Value::Object(normalized))
            }
            Schema::Array { items, .. } => {
                let Value::Array(elements) = value else {
                    return Err(self.mismatch(path, value));
                };
                elements
                    .iter()
                    .enumerate()
                    .map(|(index, element)| items.check(element, &format!("{path}[{index}]")))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            Schema::String { allowed, .. } => {
                let Value::String(text) = value else {
                    return Err(self.mismatch(path, value));
                };
                if let Some(allowed) = allowed
                    && !allowed.iter().any(|candidate| candidate == text)
                {
                    return Err(SchemaViolation::NotAllowed {
                        path: path.to_string(),
                        value: text.clone(),
                        allowed: allowed.clone(),
                    });
                }
                Ok(value.clone())
            }
            Schema::Integer { .. } => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
                Value::Number(n) => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                        Ok(Value::from(f as i64))
                    }
                    _ => Err(self.mismatch(path, value)),
                },
                _ => Err(self.mismatch(path, value)),
            },
            Schema::Number { .. } => match value {
                Value::Number(_) => Ok(value.clone()),
                _ => Err(self.mismatch(path, value)),
            },
            Schema::Boolean { .. } => match value {
                Value::Bool(_) => Ok(value.clone()),
                _ => Err(self.mismatch(path, value)),
            },
        }
    }

    fn mismatch(&self, path: &str, value: &Value) -> SchemaViolation {
        SchemaViolation::TypeMismatch {
            path: path.to_string(),
            expected: self.type_name(),
            found: json_kind(value),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_schema() -> Schema {
        let item = Schema::object()
            .property("menu", Schema::string(), true)
            .property("qty", Schema::integer(), true);
        Schema::object()
            .property("items", Schema::array(item), true)
            .property("note", Schema::string(), false)
    }

    #[test]
    fn test_serializes_as_json_schema() {
        let schema = order_schema();
        let json = schema.to_json();

        assert_eq!(json["type"], "object");
        assert_eq!(json["required"], json!(["items"]));
        assert_eq!(json["properties"]["items"]["type"], "array");
        assert_eq!(json["properties"]["items"]["items"]["type"], "object");
        assert_eq!(
            json["properties"]["items"]["items"]["properties"]["qty"]["type"],
            "integer"
        );
        assert!(json["properties"]["note"].get("description").is_none());
    }

    #[test]
    fn test_deserializes_from_json_schema() {
        let json = json!({
            "type": "object",
            "properties": {
                "size": {"type": "string", "enum": ["S", "M", "L"], "description": "Cup size"}
            },
            "required": ["size"]
        });

        let schema: Schema = serde_json::from_value(json).unwrap();
        assert!(schema.validate(&json!({"size": "M"})).is_ok());
        assert!(matches!(
            schema.validate(&json!({"size": "XL"})),
            Err(SchemaViolation::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_validate_accepts_valid_order() {
        let args = json!({"items": [{"menu": "cola", "qty": 2}], "note": "no ice"});
        assert_eq!(order_schema().validate(&args).unwrap(), args);
    }

    #[test]
    fn test_validate_reports_missing_nested_property() {
        let args = json!({"items": [{"menu": "cola"}]});
        let err = order_schema().validate(&args).unwrap_err();

        assert_eq!(
            err,
            SchemaViolation::MissingProperty {
                path: "$.items[0]".to_string(),
                property: "qty".to_string(),
            }
        );
        assert_eq!(err.to_string(), "$.items[0]: missing required property 'qty'");
    }

    #[test]
    fn test_validate_reports_type_mismatch_with_path() {
        let args = json!({"items": [{"menu": "cola", "qty": "two"}]});
        let err = order_schema().validate(&args).unwrap_err();

        assert_eq!(
            err.to_string(),
            "$.items[0].qty: expected integer, found string"
        );
    }

    #[test]
    fn test_validate_normalizes_integral_floats() {
        let args = json!({"items": [{"menu": "cola", "qty": 2.0}]});
        let normalized = order_schema().validate(&args).unwrap();

        assert_eq!(normalized, json!({"items": [{"menu": "cola", "qty": 2}]}));
        assert!(normalized["items"][0]["qty"].is_i64());
    }

    #[test]
    fn test_validate_rejects_fractional_integer() {
        let args = json!({"items": [{"menu": "cola", "qty": 1.5}]});
        assert!(order_schema().validate(&args).is_err());
    }

    #[test]
    fn test_validate_passes_unknown_properties_through() {
        let args = json!({"items": [], "channel": "drive-thru"});
        let normalized = order_schema().validate(&args).unwrap();
        assert_eq!(normalized["channel"], "drive-thru");
    }

    #[test]
    fn test_validate_requires_object_root() {
        let err = order_schema().validate(&json!("items")).unwrap_err();
        assert_eq!(err.to_string(), "$: expected object, found string");
    }

    #[test]
    fn test_describe_sets_description_on_any_node() {
        let schema = Schema::integer().describe("Quantity");
        assert_eq!(schema.to_json(), json!({"type": "integer", "description": "Quantity"}));
    }
}
