//! JSON Schema property descriptors.
//!
//! Elicitation requests and tool input schemas arrive as untyped JSON
//! fragments from the server. Each property is normalized once into a
//! [`FieldDescriptor`] with a closed [`FieldKind`] variant, instead of
//! re-inspecting the raw shape at every use site. The input schema is
//! treated as read-only and never mutated.

use serde_json::Value;

/// Scalar value types a schema property (or array item) can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Number,
    Integer,
    Boolean,
}

impl ScalarType {
    /// Map a schema `type` name to a scalar type. Unknown names fall back
    /// to string, matching the tolerant behavior needed for
    /// server-supplied schemas.
    pub fn from_name(name: &str) -> Self {
        match name {
            "number" => ScalarType::Number,
            "integer" => ScalarType::Integer,
            "boolean" => ScalarType::Boolean,
            _ => ScalarType::String,
        }
    }

    /// The kind-appropriate zero value used to seed required fields.
    pub fn zero(&self) -> Value {
        match self {
            ScalarType::Number | ScalarType::Integer => Value::from(0),
            ScalarType::String => Value::from(""),
            ScalarType::Boolean => Value::from(false),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarType::Number | ScalarType::Integer)
    }
}

/// Closed classification of a schema property, derived deterministically
/// from `{type, items.type}`:
///
/// - `items.type == "array"` ⇒ `NestedArray`
/// - `items.type == "object"` ⇒ `ObjectList` (array of objects edited as
///   key/value rows)
/// - plain `array` ⇒ `Array`
/// - `object` with `properties` ⇒ `Object` (nested form)
/// - `object` without `properties` ⇒ `ObjectList` (schema-less key/value rows)
/// - anything else ⇒ `Scalar`
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Scalar(ScalarType),
    /// Flat list of scalars; the payload is the item type.
    Array(ScalarType),
    /// List of lists of scalars; the payload is the inner item type.
    NestedArray(ScalarType),
    /// Key/value rows with an explicit value-type tag per row.
    ObjectList,
    /// Object with its own `properties`, built as a nested form.
    Object,
}

/// Bounds and option constraints lifted from a property fragment.
/// Enforced by per-control validators at form-build time, not by the
/// shallow submission gate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub format: Option<String>,
    pub pattern: Option<String>,
    pub enum_options: Vec<Value>,
}

impl Constraints {
    fn from_property(prop: &Value) -> Self {
        Constraints {
            minimum: prop.get("minimum").and_then(Value::as_f64),
            maximum: prop.get("maximum").and_then(Value::as_f64),
            min_length: prop
                .get("minLength")
                .and_then(Value::as_u64)
                .map(|n| n as usize),
            max_length: prop
                .get("maxLength")
                .and_then(Value::as_u64)
                .map(|n| n as usize),
            format: prop
                .get("format")
                .and_then(Value::as_str)
                .map(str::to_string),
            pattern: prop
                .get("pattern")
                .and_then(Value::as_str)
                .map(str::to_string),
            enum_options: prop
                .get("enum")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

/// One schema property, normalized for rendering and validation.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub kind: FieldKind,
    pub required: bool,
    pub constraints: Constraints,
    /// Schema `default`, or the kind-appropriate zero value.
    pub default_value: Value,
    /// The raw property fragment, kept for recursive builds and seeding.
    pub property: Value,
}

impl FieldDescriptor {
    /// Normalize one property fragment. Never fails: malformed fragments
    /// (array without `items`, non-object shapes) degrade to a best-effort
    /// string-typed descriptor.
    pub fn from_property(name: &str, prop: &Value, required: bool) -> Self {
        let kind = classify(prop);
        let default_value = prop
            .get("default")
            .cloned()
            .unwrap_or_else(|| zero_for(&kind));
        FieldDescriptor {
            name: name.to_string(),
            title: prop
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or(name)
                .to_string(),
            description: prop
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            kind,
            required,
            constraints: Constraints::from_property(prop),
            default_value,
            property: prop.clone(),
        }
    }

    /// Item type for array-like fields; `None` for the rest.
    pub fn item_type(&self) -> Option<ScalarType> {
        match self.kind {
            FieldKind::Array(t) | FieldKind::NestedArray(t) => Some(t),
            _ => None,
        }
    }
}

/// Parse a schema node's `properties` into descriptors. A missing or
/// non-object `properties` yields an empty list rather than an error.
pub fn parse_fields(schema: &Value) -> Vec<FieldDescriptor> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, prop)| {
            FieldDescriptor::from_property(name, prop, required.contains(&name.as_str()))
        })
        .collect()
}

fn classify(prop: &Value) -> FieldKind {
    let type_name = prop.get("type").and_then(Value::as_str).unwrap_or("string");
    match type_name {
        "array" => {
            let items = prop.get("items");
            let item_type = items
                .and_then(|i| i.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("string");
            match item_type {
                "array" => {
                    let inner = items
                        .and_then(|i| i.get("items"))
                        .and_then(|i| i.get("type"))
                        .and_then(Value::as_str)
                        .unwrap_or("string");
                    FieldKind::NestedArray(ScalarType::from_name(inner))
                }
                "object" => FieldKind::ObjectList,
                other => FieldKind::Array(ScalarType::from_name(other)),
            }
        }
        "object" => {
            if prop.get("properties").map(|p| p.is_object()).unwrap_or(false) {
                FieldKind::Object
            } else {
                FieldKind::ObjectList
            }
        }
        scalar => FieldKind::Scalar(ScalarType::from_name(scalar)),
    }
}

fn zero_for(kind: &FieldKind) -> Value {
    match kind {
        FieldKind::Scalar(t) => t.zero(),
        FieldKind::Array(_) | FieldKind::NestedArray(_) => Value::Array(Vec::new()),
        FieldKind::ObjectList | FieldKind::Object => {
            Value::Object(serde_json::Map::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_scalar_types() {
        assert_eq!(
            classify(&json!({"type": "string"})),
            FieldKind::Scalar(ScalarType::String)
        );
        assert_eq!(
            classify(&json!({"type": "integer"})),
            FieldKind::Scalar(ScalarType::Integer)
        );
        assert_eq!(
            classify(&json!({"type": "boolean"})),
            FieldKind::Scalar(ScalarType::Boolean)
        );
        // Unknown or missing type falls back to string
        assert_eq!(
            classify(&json!({})),
            FieldKind::Scalar(ScalarType::String)
        );
    }

    #[test]
    fn test_classify_array_kinds() {
        assert_eq!(
            classify(&json!({"type": "array", "items": {"type": "number"}})),
            FieldKind::Array(ScalarType::Number)
        );
        assert_eq!(
            classify(&json!({
                "type": "array",
                "items": {"type": "array", "items": {"type": "integer"}}
            })),
            FieldKind::NestedArray(ScalarType::Integer)
        );
        assert_eq!(
            classify(&json!({"type": "array", "items": {"type": "object"}})),
            FieldKind::ObjectList
        );
        // Array without items degrades to a string array
        assert_eq!(
            classify(&json!({"type": "array"})),
            FieldKind::Array(ScalarType::String)
        );
    }

    #[test]
    fn test_classify_object_kinds() {
        assert_eq!(
            classify(&json!({
                "type": "object",
                "properties": {"x": {"type": "string"}}
            })),
            FieldKind::Object
        );
        // Schema-less object is edited as key/value rows
        assert_eq!(classify(&json!({"type": "object"})), FieldKind::ObjectList);
    }

    #[test]
    fn test_zero_values() {
        assert_eq!(ScalarType::Number.zero(), json!(0));
        assert_eq!(ScalarType::Integer.zero(), json!(0));
        assert_eq!(ScalarType::String.zero(), json!(""));
        assert_eq!(ScalarType::Boolean.zero(), json!(false));
    }

    #[test]
    fn test_descriptor_constraints_and_default() {
        let prop = json!({
            "type": "string",
            "title": "User name",
            "description": "Login name",
            "minLength": 2,
            "maxLength": 32,
            "format": "email",
            "default": "anon"
        });
        let field = FieldDescriptor::from_property("username", &prop, true);
        assert_eq!(field.title, "User name");
        assert!(field.required);
        assert_eq!(field.constraints.min_length, Some(2));
        assert_eq!(field.constraints.max_length, Some(32));
        assert_eq!(field.constraints.format.as_deref(), Some("email"));
        assert_eq!(field.default_value, json!("anon"));
    }

    #[test]
    fn test_descriptor_zero_default() {
        let field = FieldDescriptor::from_property("count", &json!({"type": "integer"}), false);
        assert_eq!(field.default_value, json!(0));
        let field = FieldDescriptor::from_property("tags", &json!({"type": "array"}), false);
        assert_eq!(field.default_value, json!([]));
    }

    #[test]
    fn test_parse_fields_key_set() {
        let schema = json!({
            "type": "object",
            "properties": {
                "age": {"type": "integer"},
                "name": {"type": "string"}
            },
            "required": ["name"]
        });
        let fields = parse_fields(&schema);
        assert_eq!(fields.len(), 2);
        let name = fields.iter().find(|f| f.name == "name").unwrap();
        assert!(name.required);
        let age = fields.iter().find(|f| f.name == "age").unwrap();
        assert!(!age.required);
    }

    #[test]
    fn test_parse_fields_missing_properties() {
        assert!(parse_fields(&json!({"type": "object"})).is_empty());
        assert!(parse_fields(&json!("not a schema")).is_empty());
    }

    #[test]
    fn test_enum_options() {
        let prop = json!({"type": "string", "enum": ["red", "green", "blue"]});
        let field = FieldDescriptor::from_property("color", &prop, false);
        assert_eq!(field.constraints.enum_options.len(), 3);
    }
}
